//! Main ledger orchestration layer
//!
//! Ties the bit ledger, rebase engine, allowances, and event log to the two
//! external collaborators (price source and funds mover) and exposes the
//! holder-facing operations.
//!
//! Every mutating operation runs as one transaction:
//!
//! 1. rebase precondition (`with_rebase`)
//! 2. conversions at the resulting `last_price`
//! 3. bit moves (journaled)
//! 4. funds movement, always last
//!
//! Any error restores the journal checkpoint, drops the buffered events, and,
//! under [`RebaseCommit::WithOperation`], undoes the precondition rebase too.
//!
//! # Example
//!
//! ```
//! use elastic_ledger::{AccountId, InMemoryFunds, Ledger, ManualPriceSource};
//! use primitive_types::U256;
//!
//! # fn main() -> elastic_ledger::Result<()> {
//! let price = ManualPriceSource::new("usd-feed", 300_000_000u64);
//! let funds = InMemoryFunds::new();
//! let alice = AccountId::new("alice");
//! funds.fund(&alice, U256::exp10(18));
//!
//! let mut ledger = Ledger::new(price.clone(), funds)?;
//! let minted = ledger.deposit(&alice, &alice, U256::exp10(18))?;
//! assert_eq!(minted, U256::from(3u64) * U256::exp10(18));
//!
//! price.set_price(400_000_000u64);
//! ledger.rebase()?;
//! assert_eq!(ledger.balance_of(&alice.clone().into()), U256::from(4u64) * U256::exp10(18));
//! # Ok(())
//! # }
//! ```

use crate::{
    allowance::Allowances,
    bits::BitLedger,
    config::{Config, RebaseCommit},
    events::{EventLog, LedgerEvent, Sequenced},
    funds::{FundsMover, FundsParty},
    math::{self, TOTAL_BITS},
    metrics::Metrics,
    oracle::PriceSource,
    rebase::RebaseEngine,
    transfer::TransferEngine,
    types::{Account, AccountId, Price},
    Error, Result,
};
use primitive_types::U256;
use serde::Serialize;
use std::collections::VecDeque;

/// Point-in-time summary of the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerStatus {
    /// Committed rebases
    pub epoch: u64,
    /// Last committed price
    pub last_price: Price,
    /// Derived supply at the current price
    pub total_supply: U256,
    /// Reference units backing the supply
    pub total_underlying: U256,
    /// Bits issued to holders
    pub active_bits: U256,
    /// Holders with a nonzero balance
    pub holder_count: usize,
}

/// Elastic-supply ledger
#[derive(Debug)]
pub struct Ledger<P, F> {
    /// Account → bits
    bits: BitLedger,

    /// Last price + epoch
    rebase: RebaseEngine,

    /// Spender allowances
    allowances: Allowances,

    /// Committed and pending events
    events: EventLog,

    /// External price feed
    source: P,

    /// External reference-asset mover
    funds: F,

    /// Whether a failed operation undoes its precondition rebase
    commit_policy: RebaseCommit,

    /// Prometheus metrics
    metrics: Metrics,

    /// Epoch of a rebase inside the open transaction, counted on commit
    pending_rebase: Option<u64>,
}

impl<P: PriceSource, F: FundsMover> Ledger<P, F> {
    /// Create a ledger with the default rebase commit policy
    ///
    /// Fails with `OracleUnavailable` if the source has no usable price.
    pub fn new(source: P, funds: F) -> Result<Self> {
        Self::with_policy(source, funds, RebaseCommit::default())
    }

    /// Create a ledger from configuration
    pub fn with_config(source: P, funds: F, config: &Config) -> Result<Self> {
        let mut ledger = Self::with_policy(source, funds, config.rebase.commit)?;
        ledger.events.set_max_retained(config.events.max_retained);
        Ok(ledger)
    }

    /// Create a ledger with an explicit rebase commit policy
    pub fn with_policy(source: P, funds: F, commit_policy: RebaseCommit) -> Result<Self> {
        let (rebase, initial) = RebaseEngine::initialize(&source)?;

        let metrics = Metrics::new()
            .map_err(|e| Error::Other(format!("Failed to create metrics: {}", e)))?;
        metrics.record_rebase(initial.epoch);

        let mut events = EventLog::new();
        events.emit(LedgerEvent::OracleUpdated {
            source_id: source.source_id().to_string(),
        });
        events.emit(LedgerEvent::Rebase {
            epoch: initial.epoch,
            price: initial.price,
        });
        events.commit();

        tracing::info!(
            source = source.source_id(),
            price = %initial.price,
            policy = ?commit_policy,
            "ledger created"
        );

        Ok(Self {
            bits: BitLedger::new(),
            rebase,
            allowances: Allowances::new(),
            events,
            source,
            funds,
            commit_policy,
            metrics,
            pending_rebase: None,
        })
    }

    // ------------------------------------------------------------------
    // Views
    // ------------------------------------------------------------------

    /// Price views use: a usable reading now, else `last_price`
    pub fn current_price(&self) -> Price {
        self.rebase.current_price(&self.source)
    }

    /// Last committed price
    pub fn last_price(&self) -> Price {
        self.rebase.last_price()
    }

    /// Committed rebases since creation
    pub fn epoch(&self) -> u64 {
        self.rebase.epoch()
    }

    /// Derived supply at the current price
    pub fn total_supply(&self) -> U256 {
        math::bits_to_amount(self.bits.active_bits(), self.current_price())
    }

    /// Reference units backing the supply
    pub fn total_underlying(&self) -> U256 {
        math::bits_to_uamount(self.bits.active_bits())
    }

    /// Derived balance at the current price; 0 for the sentinel
    pub fn balance_of(&self, account: &Account) -> U256 {
        if account.is_reserved() {
            return U256::zero();
        }
        math::bits_to_amount(self.bits.bits_of(account), self.current_price())
    }

    /// Reference-unit balance, unaffected by rebases; 0 for the sentinel
    pub fn scaled_balance_of(&self, account: &Account) -> U256 {
        if account.is_reserved() {
            return U256::zero();
        }
        math::bits_to_uamount(self.bits.bits_of(account))
    }

    /// Raw bits of any slot, sentinel included
    pub fn bits_of(&self, account: &Account) -> U256 {
        self.bits.bits_of(account)
    }

    /// Bits issued to holders
    pub fn active_bits(&self) -> U256 {
        self.bits.active_bits()
    }

    /// Derived amount `uamount` would mint right now
    pub fn underlying_to_amount(&self, uamount: U256) -> Result<U256> {
        math::underlying_to_amount(uamount, self.current_price())
    }

    /// Reference amount `amount` would redeem right now
    pub fn amount_to_underlying(&self, amount: U256) -> Result<U256> {
        math::amount_to_underlying(amount, self.current_price())
    }

    /// Amount `spender` may move out of `owner`
    pub fn allowance(&self, owner: &AccountId, spender: &AccountId) -> U256 {
        self.allowances.allowance(owner, spender)
    }

    /// Point-in-time summary
    pub fn status(&self) -> LedgerStatus {
        LedgerStatus {
            epoch: self.epoch(),
            last_price: self.last_price(),
            total_supply: self.total_supply(),
            total_underlying: self.total_underlying(),
            active_bits: self.active_bits(),
            holder_count: self.bits.holder_count(),
        }
    }

    /// Verify Σ(bits) == TOTAL_BITS
    pub fn check_conservation(&self) -> Result<()> {
        match self.bits.total_bits() {
            Some(total) if total == *TOTAL_BITS => Ok(()),
            Some(total) => Err(Error::InvariantViolation(format!(
                "bit total {} != {}",
                total, *TOTAL_BITS
            ))),
            None => Err(Error::InvariantViolation(
                "bit total overflows 256 bits".to_string(),
            )),
        }
    }

    /// Committed events still held, oldest first
    pub fn events(&self) -> &VecDeque<Sequenced> {
        self.events.events()
    }

    /// Hand committed events to a consumer
    pub fn drain_events(&mut self) -> Vec<Sequenced> {
        self.events.drain()
    }

    /// Metrics collector
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Price source
    pub fn source(&self) -> &P {
        &self.source
    }

    /// Funds mover
    pub fn funds(&self) -> &F {
        &self.funds
    }

    /// Active rebase commit policy
    pub fn commit_policy(&self) -> RebaseCommit {
        self.commit_policy
    }

    // ------------------------------------------------------------------
    // Transaction wrappers
    // ------------------------------------------------------------------

    /// Run `op` as one all-or-nothing unit
    fn atomically<T>(&mut self, op: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let checkpoint = self.rebase.snapshot();
        self.bits.begin();
        self.allowances.begin();

        match op(self) {
            Ok(value) => {
                self.bits.commit();
                self.allowances.commit();
                self.events.commit();
                if let Some(epoch) = self.pending_rebase.take() {
                    self.metrics.record_rebase(epoch);
                }
                Ok(value)
            }
            Err(err) => {
                self.bits.rollback();
                self.allowances.rollback();
                self.events.rollback();
                self.pending_rebase = None;
                self.rebase.restore(checkpoint);
                self.metrics.record_rollback(checkpoint.epoch);
                tracing::warn!(error = %err, epoch = checkpoint.epoch, "operation rolled back");
                Err(err)
            }
        }
    }

    /// Rebase precondition, then `op` at the resulting price
    fn with_rebase<T>(&mut self, op: impl FnOnce(&mut Self, Price) -> Result<T>) -> Result<T> {
        match self.commit_policy {
            RebaseCommit::WithOperation => self.atomically(|ledger| {
                ledger.maybe_rebase();
                let price = ledger.rebase.last_price();
                op(ledger, price)
            }),
            RebaseCommit::Independent => {
                self.atomically(|ledger| {
                    ledger.maybe_rebase();
                    Ok(())
                })?;
                self.atomically(|ledger| {
                    let price = ledger.rebase.last_price();
                    op(ledger, price)
                })
            }
        }
    }

    fn maybe_rebase(&mut self) {
        match self.rebase.maybe_rebase(&self.source) {
            Some(rebase) => {
                self.events.emit(LedgerEvent::Rebase {
                    epoch: rebase.epoch,
                    price: rebase.price,
                });
                self.pending_rebase = Some(rebase.epoch);
            }
            None => self.metrics.record_unusable_reading(),
        }
    }

    fn transfers(&mut self) -> TransferEngine<'_> {
        TransferEngine::new(&mut self.bits, &mut self.events)
    }

    // ------------------------------------------------------------------
    // Rebase
    // ------------------------------------------------------------------

    /// Run the rebase precondition and nothing else
    pub fn rebase(&mut self) -> Result<()> {
        self.atomically(|ledger| {
            ledger.maybe_rebase();
            Ok(())
        })
    }

    // ------------------------------------------------------------------
    // Transfers
    // ------------------------------------------------------------------

    /// Move `amount` derived units; a zero-bit transfer is a successful no-op
    pub fn transfer(&mut self, from: &AccountId, to: &AccountId, amount: U256) -> Result<bool> {
        self.with_rebase(|ledger, price| {
            ledger.transfers().transfer(from, to, amount, price)?;
            ledger.metrics.transfers_total.inc();
            Ok(true)
        })
    }

    /// Move every bit `from` holds; returns the derived amount moved
    pub fn transfer_all(&mut self, from: &AccountId, to: &AccountId) -> Result<U256> {
        self.with_rebase(|ledger, price| {
            let bits = ledger
                .transfers()
                .move_all(&Account::from(from), &Account::from(to), price)?;
            ledger.metrics.transfers_total.inc();
            Ok(math::bits_to_amount(bits, price))
        })
    }

    /// Spend `spender`'s allowance to move `amount` out of `from`
    pub fn transfer_from(
        &mut self,
        spender: &AccountId,
        from: &AccountId,
        to: &AccountId,
        amount: U256,
    ) -> Result<bool> {
        self.with_rebase(|ledger, price| {
            ledger.allowances.spend(from, spender, amount)?;
            ledger.transfers().transfer(from, to, amount, price)?;
            ledger.metrics.transfers_total.inc();
            Ok(true)
        })
    }

    /// Spend `spender`'s allowance to move all of `from`'s balance
    pub fn transfer_all_from(
        &mut self,
        spender: &AccountId,
        from: &AccountId,
        to: &AccountId,
    ) -> Result<U256> {
        self.with_rebase(|ledger, price| {
            let from_account = Account::from(from);
            let amount = math::bits_to_amount(ledger.bits.bits_of(&from_account), price);
            ledger.allowances.spend(from, spender, amount)?;
            ledger
                .transfers()
                .move_all(&from_account, &Account::from(to), price)?;
            ledger.metrics.transfers_total.inc();
            Ok(amount)
        })
    }

    // ------------------------------------------------------------------
    // Allowances
    // ------------------------------------------------------------------

    /// Set `spender`'s allowance over `owner`
    pub fn approve(&mut self, owner: &AccountId, spender: &AccountId, amount: U256) -> Result<bool> {
        self.atomically(|ledger| {
            ledger.allowances.approve(owner, spender, amount);
            ledger.emit_approval(owner, spender, amount);
            Ok(true)
        })
    }

    /// Raise an allowance
    pub fn increase_allowance(
        &mut self,
        owner: &AccountId,
        spender: &AccountId,
        added: U256,
    ) -> Result<U256> {
        self.atomically(|ledger| {
            let updated = ledger.allowances.increase(owner, spender, added)?;
            ledger.emit_approval(owner, spender, updated);
            Ok(updated)
        })
    }

    /// Lower an allowance; `InsufficientAllowance` below zero
    pub fn decrease_allowance(
        &mut self,
        owner: &AccountId,
        spender: &AccountId,
        subtracted: U256,
    ) -> Result<U256> {
        self.atomically(|ledger| {
            let updated = ledger.allowances.decrease(owner, spender, subtracted)?;
            ledger.emit_approval(owner, spender, updated);
            Ok(updated)
        })
    }

    fn emit_approval(&mut self, owner: &AccountId, spender: &AccountId, amount: U256) {
        self.events.emit(LedgerEvent::Approval {
            owner: owner.clone(),
            spender: spender.clone(),
            amount,
        });
    }

    // ------------------------------------------------------------------
    // Mint / burn (derived-amount denominated)
    // ------------------------------------------------------------------

    /// Mint `amount` derived units to `beneficiary`, paid by `payer`
    ///
    /// Returns the reference units pulled into custody. The charge rounds
    /// up, so every issued bit is backed.
    pub fn mint(&mut self, payer: &AccountId, beneficiary: &AccountId, amount: U256) -> Result<U256> {
        self.with_rebase(|ledger, price| {
            let bits = ledger.transfers().mint_from_amount(beneficiary, amount, price)?;
            let uamount = math::bits_to_uamount_ceil(bits);
            ledger.pull_funds(payer, uamount)?;

            ledger.metrics.deposits_total.inc();
            tracing::info!(%payer, %beneficiary, %amount, %uamount, "mint");
            Ok(uamount)
        })
    }

    /// Burn `amount` derived units from `owner`, paying `recipient`
    ///
    /// Returns the reference units paid out of custody.
    pub fn burn(&mut self, owner: &AccountId, recipient: &AccountId, amount: U256) -> Result<U256> {
        self.with_rebase(|ledger, price| {
            let uamount = math::amount_to_underlying(amount, price)?;
            if !amount.is_zero() && uamount.is_zero() {
                return Err(Error::ZeroAmount("burn amount is below one reference unit"));
            }

            ledger.transfers().burn_to_amount(owner, amount, price)?;
            ledger.push_funds(recipient, uamount)?;

            ledger.metrics.withdrawals_total.inc();
            tracing::info!(%owner, %recipient, %amount, %uamount, "burn");
            Ok(uamount)
        })
    }

    /// Burn `owner`'s whole balance; returns the derived amount burned
    pub fn burn_all(&mut self, owner: &AccountId, recipient: &AccountId) -> Result<U256> {
        self.with_rebase(|ledger, price| {
            let (_, amount) = ledger.redeem_all(owner, recipient, price)?;
            Ok(amount)
        })
    }

    // ------------------------------------------------------------------
    // Deposit / withdraw (reference-amount denominated)
    // ------------------------------------------------------------------

    /// Deposit `uamount` reference units from `depositor` for `beneficiary`
    ///
    /// Returns the derived amount credited.
    pub fn deposit(
        &mut self,
        depositor: &AccountId,
        beneficiary: &AccountId,
        uamount: U256,
    ) -> Result<U256> {
        self.with_rebase(|ledger, price| ledger.deposit_at(depositor, beneficiary, uamount, price))
    }

    /// Deposit everything `depositor` holds with the funds mover
    ///
    /// Returns the derived amount credited.
    pub fn deposit_all(&mut self, depositor: &AccountId, beneficiary: &AccountId) -> Result<U256> {
        self.with_rebase(|ledger, price| {
            let uamount = ledger
                .funds
                .balance_of(&FundsParty::Holder(depositor.clone()));
            ledger.deposit_at(depositor, beneficiary, uamount, price)
        })
    }

    /// Withdraw `uamount` reference units from `owner` to `recipient`
    ///
    /// Returns the derived amount debited.
    pub fn withdraw(
        &mut self,
        owner: &AccountId,
        recipient: &AccountId,
        uamount: U256,
    ) -> Result<U256> {
        self.with_rebase(|ledger, price| {
            let bits = math::uamount_to_bits(uamount)?;
            let amount = math::bits_to_amount(bits, price);
            if amount.is_zero() {
                return Err(Error::ZeroAmount("withdrawal too small to burn"));
            }

            ledger
                .transfers()
                .move_bits(&Account::from(owner), &Account::Reserved, bits, price)?;
            ledger.push_funds(recipient, uamount)?;

            ledger.metrics.withdrawals_total.inc();
            tracing::info!(%owner, %recipient, %uamount, %amount, "withdraw");
            Ok(amount)
        })
    }

    /// Withdraw `owner`'s whole balance; returns the reference units paid
    pub fn withdraw_all(&mut self, owner: &AccountId, recipient: &AccountId) -> Result<U256> {
        self.with_rebase(|ledger, price| {
            let (uamount, _) = ledger.redeem_all(owner, recipient, price)?;
            Ok(uamount)
        })
    }

    fn deposit_at(
        &mut self,
        depositor: &AccountId,
        beneficiary: &AccountId,
        uamount: U256,
        price: Price,
    ) -> Result<U256> {
        let bits = math::uamount_to_bits(uamount)?;
        let amount = math::bits_to_amount(bits, price);
        if amount.is_zero() {
            return Err(Error::ZeroAmount("deposit too small to mint"));
        }

        self.transfers()
            .move_bits(&Account::Reserved, &Account::from(beneficiary), bits, price)?;
        self.pull_funds(depositor, uamount)?;

        self.metrics.deposits_total.inc();
        tracing::info!(%depositor, %beneficiary, %uamount, %amount, "deposit");
        Ok(amount)
    }

    /// One snapshot of `owner`'s bits drives both the ledger move and the payout
    fn redeem_all(
        &mut self,
        owner: &AccountId,
        recipient: &AccountId,
        price: Price,
    ) -> Result<(U256, U256)> {
        let owner_account = Account::from(owner);
        let bits = self.bits.bits_of(&owner_account);
        let uamount = math::bits_to_uamount(bits);
        let amount = math::bits_to_amount(bits, price);
        if uamount.is_zero() || amount.is_zero() {
            return Err(Error::ZeroAmount("balance too small to redeem"));
        }

        self.transfers()
            .move_bits(&owner_account, &Account::Reserved, bits, price)?;
        self.push_funds(recipient, uamount)?;

        self.metrics.withdrawals_total.inc();
        tracing::info!(%owner, %recipient, %uamount, %amount, "redeem all");
        Ok((uamount, amount))
    }

    fn pull_funds(&mut self, from: &AccountId, uamount: U256) -> Result<()> {
        self.funds
            .move_funds(&FundsParty::Holder(from.clone()), &FundsParty::Custody, uamount)?;
        Ok(())
    }

    fn push_funds(&mut self, to: &AccountId, uamount: U256) -> Result<()> {
        self.funds
            .move_funds(&FundsParty::Custody, &FundsParty::Holder(to.clone()), uamount)?;
        Ok(())
    }
}
