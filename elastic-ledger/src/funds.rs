//! Reference-asset movement
//!
//! The ledger never holds the reference asset itself. It asks a
//! [`FundsMover`] to move it between a holder and ledger custody, and treats
//! each call as atomic: it either fully succeeds or has no effect.

use crate::types::AccountId;
use parking_lot::RwLock;
use primitive_types::U256;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Party to a reference-asset movement
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FundsParty {
    /// An external holder
    Holder(AccountId),
    /// Assets backing the ledger
    Custody,
}

impl fmt::Display for FundsParty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FundsParty::Holder(id) => write!(f, "{}", id),
            FundsParty::Custody => write!(f, "<custody>"),
        }
    }
}

/// Why a funds movement failed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FundsError {
    /// Source lacks the amount
    #[error("{0}")]
    InsufficientFunds(String),

    /// Mover refused the transfer
    #[error("{0}")]
    TransferRejected(String),
}

/// Atomic reference-asset transfer mechanism
pub trait FundsMover {
    /// Move `amount` from `from` to `to`; on error nothing moved
    fn move_funds(
        &mut self,
        from: &FundsParty,
        to: &FundsParty,
        amount: U256,
    ) -> std::result::Result<(), FundsError>;

    /// Reference units held by `party`
    fn balance_of(&self, party: &FundsParty) -> U256;
}

impl<F: FundsMover + ?Sized> FundsMover for Box<F> {
    fn move_funds(
        &mut self,
        from: &FundsParty,
        to: &FundsParty,
        amount: U256,
    ) -> std::result::Result<(), FundsError> {
        (**self).move_funds(from, to, amount)
    }

    fn balance_of(&self, party: &FundsParty) -> U256 {
        (**self).balance_of(party)
    }
}

#[derive(Debug, Default)]
struct Book {
    balances: HashMap<FundsParty, U256>,
    reject_all: bool,
}

/// Shared in-memory balance book
///
/// Clones share state, so tests keep a handle to inspect custody while the
/// ledger owns another.
#[derive(Debug, Clone, Default)]
pub struct InMemoryFunds {
    book: Arc<RwLock<Book>>,
}

impl InMemoryFunds {
    /// Empty book
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit `amount` to a holder out of thin air
    pub fn fund(&self, holder: &AccountId, amount: U256) {
        let mut book = self.book.write();
        let entry = book
            .balances
            .entry(FundsParty::Holder(holder.clone()))
            .or_default();
        *entry = entry.saturating_add(amount);
    }

    /// Make every subsequent movement fail with `TransferRejected`
    pub fn set_reject_all(&self, reject: bool) {
        self.book.write().reject_all = reject;
    }

    /// Holder balance shortcut
    pub fn holder_balance(&self, holder: &AccountId) -> U256 {
        self.balance_of(&FundsParty::Holder(holder.clone()))
    }

    /// Custody balance shortcut
    pub fn custody_balance(&self) -> U256 {
        self.balance_of(&FundsParty::Custody)
    }
}

impl FundsMover for InMemoryFunds {
    fn move_funds(
        &mut self,
        from: &FundsParty,
        to: &FundsParty,
        amount: U256,
    ) -> std::result::Result<(), FundsError> {
        let mut book = self.book.write();
        if book.reject_all {
            return Err(FundsError::TransferRejected(format!(
                "transfer of {} from {} to {} rejected",
                amount, from, to
            )));
        }

        let available = book.balances.get(from).copied().unwrap_or_default();
        if amount > available {
            return Err(FundsError::InsufficientFunds(format!(
                "{} holds {}, needs {}",
                from, available, amount
            )));
        }
        if from == to || amount.is_zero() {
            return Ok(());
        }

        book.balances.insert(from.clone(), available - amount);
        let credited = book.balances.entry(to.clone()).or_default();
        *credited = credited.saturating_add(amount);
        Ok(())
    }

    fn balance_of(&self, party: &FundsParty) -> U256 {
        self.book.read().balances.get(party).copied().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_move_between_holder_and_custody() {
        let mut funds = InMemoryFunds::new();
        let alice = AccountId::new("alice");
        funds.fund(&alice, U256::from(100u64));

        funds
            .move_funds(
                &FundsParty::Holder(alice.clone()),
                &FundsParty::Custody,
                U256::from(60u64),
            )
            .unwrap();

        assert_eq!(funds.holder_balance(&alice), U256::from(40u64));
        assert_eq!(funds.custody_balance(), U256::from(60u64));
    }

    #[test]
    fn test_insufficient_funds_moves_nothing() {
        let mut funds = InMemoryFunds::new();
        let alice = AccountId::new("alice");
        funds.fund(&alice, U256::from(10u64));

        let err = funds
            .move_funds(
                &FundsParty::Holder(alice.clone()),
                &FundsParty::Custody,
                U256::from(11u64),
            )
            .unwrap_err();
        assert!(matches!(err, FundsError::InsufficientFunds(_)));
        assert_eq!(funds.holder_balance(&alice), U256::from(10u64));
    }

    #[test]
    fn test_reject_all() {
        let mut funds = InMemoryFunds::new();
        let alice = AccountId::new("alice");
        funds.fund(&alice, U256::from(10u64));
        funds.set_reject_all(true);

        let err = funds
            .move_funds(
                &FundsParty::Holder(alice),
                &FundsParty::Custody,
                U256::from(1u64),
            )
            .unwrap_err();
        assert!(matches!(err, FundsError::TransferRejected(_)));
    }
}
