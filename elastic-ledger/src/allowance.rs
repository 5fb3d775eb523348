//! Spender allowances, denominated in derived units
//!
//! An allowance of `U256::MAX` is infinite and never decremented.

use crate::{types::AccountId, Error, Result};
use primitive_types::U256;
use std::collections::HashMap;

type Key = (AccountId, AccountId);

/// (owner, spender) → derived amount
#[derive(Debug, Clone, Default)]
pub struct Allowances {
    entries: HashMap<Key, U256>,
    journal: Option<Vec<(Key, U256)>>,
}

impl Allowances {
    /// Empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Amount `spender` may move out of `owner`
    pub fn allowance(&self, owner: &AccountId, spender: &AccountId) -> U256 {
        self.entries
            .get(&(owner.clone(), spender.clone()))
            .copied()
            .unwrap_or_default()
    }

    /// Overwrite the allowance
    pub fn approve(&mut self, owner: &AccountId, spender: &AccountId, amount: U256) {
        self.set((owner.clone(), spender.clone()), amount);
    }

    /// Add to the allowance; returns the new value
    pub fn increase(
        &mut self,
        owner: &AccountId,
        spender: &AccountId,
        added: U256,
    ) -> Result<U256> {
        let updated = self
            .allowance(owner, spender)
            .checked_add(added)
            .ok_or(Error::Overflow("allowance"))?;
        self.approve(owner, spender, updated);
        Ok(updated)
    }

    /// Subtract from the allowance; returns the new value
    pub fn decrease(
        &mut self,
        owner: &AccountId,
        spender: &AccountId,
        subtracted: U256,
    ) -> Result<U256> {
        let allowed = self.allowance(owner, spender);
        let updated = allowed
            .checked_sub(subtracted)
            .ok_or(Error::InsufficientAllowance {
                requested: subtracted,
                allowed,
            })?;
        self.approve(owner, spender, updated);
        Ok(updated)
    }

    /// Consume `amount`; `None` when infinite, else the remaining allowance
    pub fn spend(
        &mut self,
        owner: &AccountId,
        spender: &AccountId,
        amount: U256,
    ) -> Result<Option<U256>> {
        let allowed = self.allowance(owner, spender);
        if allowed == U256::MAX {
            return Ok(None);
        }
        self.decrease(owner, spender, amount).map(Some)
    }

    /// Start recording writes
    pub fn begin(&mut self) {
        self.journal = Some(Vec::new());
    }

    /// Keep writes since `begin`
    pub fn commit(&mut self) {
        self.journal = None;
    }

    /// Undo writes since `begin`
    pub fn rollback(&mut self) {
        if let Some(journal) = self.journal.take() {
            for (key, previous) in journal.into_iter().rev() {
                self.write(key, previous);
            }
        }
    }

    fn set(&mut self, key: Key, amount: U256) {
        let previous = self.entries.get(&key).copied().unwrap_or_default();
        if let Some(journal) = self.journal.as_mut() {
            journal.push((key.clone(), previous));
        }
        self.write(key, amount);
    }

    fn write(&mut self, key: Key, amount: U256) {
        if amount.is_zero() {
            self.entries.remove(&key);
        } else {
            self.entries.insert(key, amount);
        }
    }
}
