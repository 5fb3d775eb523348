//! Bit ledger: the account → bits map and its reserved sentinel
//!
//! `move_bits` is the only mutation path, and it is a single debit + credit
//! pair, so Σ(bits) == `TOTAL_BITS` holds structurally after every call.
//!
//! While a journal is open every write records the value it overwrote, which
//! lets a failed operation restore the ledger exactly.

use crate::{
    math::TOTAL_BITS,
    types::{Account, AccountId},
    Error, Result,
};
use primitive_types::U256;
use std::collections::HashMap;

/// Account → bits map plus the reserved sentinel
#[derive(Debug, Clone)]
pub struct BitLedger {
    /// Holder balances; absent means zero
    balances: HashMap<AccountId, U256>,

    /// Unissued bits
    reserved: U256,

    /// Overwritten values since `begin`, oldest first
    journal: Option<Vec<(Account, U256)>>,
}

impl Default for BitLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl BitLedger {
    /// Create a ledger with every bit held by the sentinel
    pub fn new() -> Self {
        let mut ledger = Self {
            balances: HashMap::new(),
            reserved: U256::zero(),
            journal: None,
        };
        ledger.credit_reserved_init();
        ledger
    }

    fn credit_reserved_init(&mut self) {
        self.reserved = *TOTAL_BITS;
    }

    /// Bits held by `account`
    pub fn bits_of(&self, account: &Account) -> U256 {
        match account {
            Account::Reserved => self.reserved,
            Account::Real(id) => self.balances.get(id).copied().unwrap_or_default(),
        }
    }

    /// Bits issued to holders: `TOTAL_BITS - reserved`
    pub fn active_bits(&self) -> U256 {
        *TOTAL_BITS - self.reserved
    }

    /// Sum over every slot including the sentinel, `None` on overflow
    pub fn total_bits(&self) -> Option<U256> {
        self.balances
            .values()
            .try_fold(self.reserved, |acc, bits| acc.checked_add(*bits))
    }

    /// Holders with a nonzero balance
    pub fn holders(&self) -> impl Iterator<Item = (&AccountId, &U256)> {
        self.balances.iter()
    }

    /// Number of holders with a nonzero balance
    pub fn holder_count(&self) -> usize {
        self.balances.len()
    }

    /// Move `bits` from one slot to another
    ///
    /// Zero-bit and self moves succeed without touching storage.
    pub fn move_bits(&mut self, from: &Account, to: &Account, bits: U256) -> Result<()> {
        let available = self.bits_of(from);
        if bits > available {
            return Err(Error::InsufficientBalance {
                account: from.clone(),
                requested: bits,
                available,
            });
        }

        if bits.is_zero() || from == to {
            return Ok(());
        }

        let credited = self.bits_of(to).checked_add(bits).ok_or_else(|| {
            Error::InvariantViolation(format!("credit to {} exceeds total bits", to))
        })?;

        self.set(from, available - bits);
        self.set(to, credited);

        Ok(())
    }

    /// Start recording writes
    pub fn begin(&mut self) {
        debug_assert!(self.journal.is_none(), "bit journal already open");
        self.journal = Some(Vec::new());
    }

    /// Keep all writes since `begin`
    pub fn commit(&mut self) {
        self.journal = None;
    }

    /// Undo all writes since `begin`
    pub fn rollback(&mut self) {
        if let Some(journal) = self.journal.take() {
            for (account, previous) in journal.into_iter().rev() {
                self.write(&account, previous);
            }
        }
    }

    fn set(&mut self, account: &Account, bits: U256) {
        let previous = self.bits_of(account);
        if let Some(journal) = self.journal.as_mut() {
            journal.push((account.clone(), previous));
        }
        self.write(account, bits);
    }

    fn write(&mut self, account: &Account, bits: U256) {
        match account {
            Account::Reserved => self.reserved = bits,
            Account::Real(id) => {
                if bits.is_zero() {
                    self.balances.remove(id);
                } else {
                    self.balances.insert(id.clone(), bits);
                }
            }
        }
    }
}
