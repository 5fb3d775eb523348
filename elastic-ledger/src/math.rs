//! Conversion math between reference units, bits, and derived units
//!
//! Every conversion floors. Precision loss is one-directional (toward zero)
//! and derived quantities are always recomputed from bits and the current
//! price, so repeated rebases never accumulate drift.
//!
//! # Units
//!
//! - **reference units** (`uamount`): quantity of the deposited asset
//! - **bits**: internal ledger unit, the only stored quantity
//! - **derived units** (`amount`): the rebasing balance, priced at ~1.00

use crate::{types::Price, Error, Result};
use once_cell::sync::Lazy;
use primitive_types::U256;

/// Fractional digits of a price
pub const PRICE_DECIMALS: u32 = 8;

/// Largest storable price: `2^96 - 1`
pub const MAX_PRICE: u128 = (1u128 << 96) - 1;

/// Reference units the ledger can ever hold: one billion units at 18 decimals
pub static MAX_UNDERLYING: Lazy<U256> = Lazy::new(|| U256::exp10(27));

/// Largest multiple of `MAX_UNDERLYING` that fits in 256 bits
pub static TOTAL_BITS: Lazy<U256> = Lazy::new(|| U256::MAX - (U256::MAX % *MAX_UNDERLYING));

/// Exact ratio `TOTAL_BITS / MAX_UNDERLYING`
pub static BITS_PER_UNDERLYING: Lazy<U256> = Lazy::new(|| *TOTAL_BITS / *MAX_UNDERLYING);

/// `BITS_PER_UNDERLYING * 10^PRICE_DECIMALS`
pub static PRICE_BITS: Lazy<U256> =
    Lazy::new(|| *BITS_PER_UNDERLYING * U256::exp10(PRICE_DECIMALS as usize));

/// Bits backing one derived unit at `price`
pub fn bits_per_token(price: Price) -> U256 {
    *PRICE_BITS / price.as_u256()
}

/// Derived amount → bits
pub fn amount_to_bits(amount: U256, price: Price) -> Result<U256> {
    amount
        .checked_mul(bits_per_token(price))
        .ok_or(Error::Overflow("derived amount exceeds bit capacity"))
}

/// Bits → derived amount
pub fn bits_to_amount(bits: U256, price: Price) -> U256 {
    bits / bits_per_token(price)
}

/// Reference amount → bits (exact)
pub fn uamount_to_bits(uamount: U256) -> Result<U256> {
    uamount
        .checked_mul(*BITS_PER_UNDERLYING)
        .ok_or(Error::Overflow("reference amount exceeds bit capacity"))
}

/// Bits → reference amount
pub fn bits_to_uamount(bits: U256) -> U256 {
    bits / *BITS_PER_UNDERLYING
}

/// Bits → reference amount, rounded up
///
/// What the ledger charges to issue `bits`, so custody never backs fewer
/// bits than are active.
pub fn bits_to_uamount_ceil(bits: U256) -> U256 {
    let (units, rest) = bits.div_mod(*BITS_PER_UNDERLYING);
    if rest.is_zero() {
        units
    } else {
        units + 1
    }
}

/// Derived amount a reference amount would mint at `price`
pub fn underlying_to_amount(uamount: U256, price: Price) -> Result<U256> {
    Ok(bits_to_amount(uamount_to_bits(uamount)?, price))
}

/// Reference amount a derived amount would redeem at `price`
pub fn amount_to_underlying(amount: U256, price: Price) -> Result<U256> {
    Ok(bits_to_uamount(amount_to_bits(amount, price)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn price(raw: u128) -> Price {
        Price::from_raw(raw).unwrap()
    }

    fn e18(units: u64) -> U256 {
        U256::from(units) * U256::exp10(18)
    }

    #[test]
    fn test_total_bits_is_exact_multiple() {
        assert!((*TOTAL_BITS % *MAX_UNDERLYING).is_zero());
        assert_eq!(*BITS_PER_UNDERLYING * *MAX_UNDERLYING, *TOTAL_BITS);
        // No larger multiple fits.
        assert!(U256::MAX - *TOTAL_BITS < *MAX_UNDERLYING);
    }

    #[test]
    fn test_bits_per_token_at_parity() {
        assert_eq!(bits_per_token(Price::ONE), *BITS_PER_UNDERLYING);
    }

    #[test]
    fn test_bits_per_token_never_zero() {
        assert!(!bits_per_token(Price::MAX).is_zero());
    }

    #[test]
    fn test_uamount_round_trip_is_exact() {
        let u = U256::from(123_456_789u64);
        assert_eq!(bits_to_uamount(uamount_to_bits(u).unwrap()), u);
    }

    #[test]
    fn test_deposit_scenario_three_dollars() {
        let bits = uamount_to_bits(e18(1)).unwrap();
        assert_eq!(bits_to_amount(bits, price(300_000_000)), e18(3));
        assert_eq!(bits_to_amount(bits, price(400_000_000)), e18(4));
    }

    #[test]
    fn test_conversions_floor() {
        // One bit short of a full token floors to the previous token.
        let p = price(300_000_000);
        let bits = amount_to_bits(U256::from(10u64), p).unwrap() - U256::one();
        assert_eq!(bits_to_amount(bits, p), U256::from(9u64));
    }

    #[test]
    fn test_ceil_charges_partial_unit() {
        let p = price(300_000_000);
        let bits = amount_to_bits(U256::from(4u64), p).unwrap();
        assert_eq!(bits_to_uamount(bits), U256::one());
        assert_eq!(bits_to_uamount_ceil(bits), U256::from(2u64));

        let exact = uamount_to_bits(U256::from(7u64)).unwrap();
        assert_eq!(bits_to_uamount_ceil(exact), U256::from(7u64));
        assert_eq!(bits_to_uamount_ceil(*TOTAL_BITS), *MAX_UNDERLYING);
    }

    #[test]
    fn test_overflow_is_reported() {
        assert!(matches!(uamount_to_bits(U256::MAX), Err(Error::Overflow(_))));
        assert!(matches!(
            amount_to_bits(U256::MAX, Price::ONE),
            Err(Error::Overflow(_))
        ));
    }

    #[test]
    fn test_max_underlying_fits() {
        assert_eq!(uamount_to_bits(*MAX_UNDERLYING).unwrap(), *TOTAL_BITS);
    }

    #[test]
    fn test_composite_views() {
        let p = price(200_000_000);
        assert_eq!(underlying_to_amount(e18(5), p).unwrap(), e18(10));
        assert_eq!(amount_to_underlying(e18(10), p).unwrap(), e18(5));
    }
}
