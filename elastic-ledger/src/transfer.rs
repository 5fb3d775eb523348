//! Mint, burn, and transfer on top of the bit ledger
//!
//! The reserved sentinel is the counterparty of every mint and burn. Each
//! move raises one `Transfer` event carrying both the exact bits and their
//! derived amount at the operation's price.

use crate::{
    bits::BitLedger,
    events::{EventLog, LedgerEvent},
    math,
    types::{Account, AccountId, Price},
    Error, Result,
};
use primitive_types::U256;

/// Borrowed view over the ledger's bits and event buffer
#[derive(Debug)]
pub struct TransferEngine<'a> {
    bits: &'a mut BitLedger,
    events: &'a mut EventLog,
}

impl<'a> TransferEngine<'a> {
    /// Wrap the ledger parts an operation mutates
    pub fn new(bits: &'a mut BitLedger, events: &'a mut EventLog) -> Self {
        Self { bits, events }
    }

    /// Issue `amount` derived units to `to`; returns bits minted
    pub fn mint_from_amount(&mut self, to: &AccountId, amount: U256, price: Price) -> Result<U256> {
        if amount.is_zero() {
            return Err(Error::ZeroAmount("mint amount must be positive"));
        }
        let bits = math::amount_to_bits(amount, price)?;
        self.move_bits(&Account::Reserved, &Account::from(to), bits, price)?;
        Ok(bits)
    }

    /// Retire `amount` derived units from `from`; returns bits burned
    pub fn burn_to_amount(&mut self, from: &AccountId, amount: U256, price: Price) -> Result<U256> {
        if amount.is_zero() {
            return Err(Error::ZeroAmount("burn amount must be positive"));
        }
        let bits = math::amount_to_bits(amount, price)?;
        self.move_bits(&Account::from(from), &Account::Reserved, bits, price)?;
        Ok(bits)
    }

    /// Move `amount` derived units between holders; zero is a valid no-op
    pub fn transfer(
        &mut self,
        from: &AccountId,
        to: &AccountId,
        amount: U256,
        price: Price,
    ) -> Result<U256> {
        let bits = math::amount_to_bits(amount, price)?;
        self.move_bits(&Account::from(from), &Account::from(to), bits, price)?;
        Ok(bits)
    }

    /// Move every bit `from` holds; returns the bits moved
    pub fn move_all(&mut self, from: &Account, to: &Account, price: Price) -> Result<U256> {
        let bits = self.bits.bits_of(from);
        self.move_bits(from, to, bits, price)?;
        Ok(bits)
    }

    /// Debit + credit + event
    pub fn move_bits(&mut self, from: &Account, to: &Account, bits: U256, price: Price) -> Result<()> {
        self.bits.move_bits(from, to, bits)?;

        let amount = math::bits_to_amount(bits, price);
        tracing::debug!(%from, %to, %amount, %bits, "transfer");

        self.events.emit(LedgerEvent::Transfer {
            from: from.clone(),
            to: to.clone(),
            amount,
            bits,
        });
        Ok(())
    }
}
