//! Core types for the ledger
//!
//! All types are designed for:
//! - Exact integer arithmetic (256-bit bits, 8-decimal fixed-point prices)
//! - Memory safety (no unsafe code)
//! - Deterministic serialization (serde)

use crate::math::{MAX_PRICE, PRICE_DECIMALS};
use primitive_types::U256;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Holder account identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountId(String);

impl AccountId {
    /// Create new account ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A slot in the bit ledger
///
/// `Reserved` holds every bit not yet issued to a holder. It is a distinct
/// variant, so no holder identifier can ever alias it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Account {
    /// A holder account
    Real(AccountId),
    /// Unissued capacity; counterparty of every mint and burn
    Reserved,
}

impl Account {
    /// Holder account from any string-like id
    pub fn real(id: impl Into<String>) -> Self {
        Account::Real(AccountId::new(id))
    }

    /// True for the reserved sentinel
    pub fn is_reserved(&self) -> bool {
        matches!(self, Account::Reserved)
    }

    /// Holder id, if any
    pub fn as_real(&self) -> Option<&AccountId> {
        match self {
            Account::Real(id) => Some(id),
            Account::Reserved => None,
        }
    }
}

impl From<AccountId> for Account {
    fn from(id: AccountId) -> Self {
        Account::Real(id)
    }
}

impl From<&AccountId> for Account {
    fn from(id: &AccountId) -> Self {
        Account::Real(id.clone())
    }
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Account::Real(id) => write!(f, "{}", id),
            Account::Reserved => write!(f, "<reserved>"),
        }
    }
}

/// Validated price: 8-decimal fixed point, nonzero, at most `MAX_PRICE`
///
/// Conversion math only ever sees this type, so a zero divisor cannot reach it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Price(u128);

impl Price {
    /// Largest representable price
    pub const MAX: Price = Price(MAX_PRICE);

    /// Price of exactly 1.00
    pub const ONE: Price = Price(100_000_000);

    /// Validate a raw feed value. Zero is rejected, anything above `MAX_PRICE` is clamped.
    pub fn new(raw: U256) -> Option<Self> {
        if raw.is_zero() {
            return None;
        }
        if raw > U256::from(MAX_PRICE) {
            return Some(Self::MAX);
        }
        Some(Price(raw.low_u128()))
    }

    /// Validate a raw `u128` value (same rules as [`Price::new`])
    pub fn from_raw(raw: u128) -> Option<Self> {
        Self::new(U256::from(raw))
    }

    /// Parse a human price such as `3.00`; digits past the eighth decimal are truncated
    pub fn from_decimal(value: Decimal) -> Option<Self> {
        let scale = Decimal::from(10u64.pow(PRICE_DECIMALS));
        let mut scaled = value.checked_mul(scale)?.trunc();
        scaled.rescale(0);
        let raw = u128::try_from(scaled.mantissa()).ok()?;
        Self::from_raw(raw)
    }

    /// Raw fixed-point value
    pub fn get(&self) -> u128 {
        self.0
    }

    /// Raw value widened for bit math
    pub fn as_u256(&self) -> U256 {
        U256::from(self.0)
    }

    /// Render with 8 decimals; `MAX_PRICE` fits a `Decimal` mantissa exactly
    pub fn to_decimal(&self) -> Decimal {
        Decimal::try_from_i128_with_scale(self.0 as i128, PRICE_DECIMALS).unwrap_or(Decimal::MAX)
    }
}

impl TryFrom<Decimal> for Price {
    type Error = String;

    fn try_from(value: Decimal) -> std::result::Result<Self, Self::Error> {
        Price::from_decimal(value).ok_or_else(|| format!("price {} must be positive", value))
    }
}

impl From<Price> for Decimal {
    fn from(price: Price) -> Self {
        price.to_decimal()
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_decimal())
    }
}

/// One answer from a price source
///
/// `value` is meaningless when `is_valid` is false.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceReading {
    /// Raw 8-decimal value
    pub value: U256,
    /// Fresh and answered
    pub is_valid: bool,
}

impl PriceReading {
    /// A fresh reading
    pub fn valid(value: impl Into<U256>) -> Self {
        Self {
            value: value.into(),
            is_valid: true,
        }
    }

    /// A stale or missing reading
    pub fn invalid() -> Self {
        Self {
            value: U256::zero(),
            is_valid: false,
        }
    }

    /// Usable price, if the reading is valid and nonzero
    pub fn usable(&self) -> Option<Price> {
        if !self.is_valid {
            return None;
        }
        Price::new(self.value)
    }
}
