//! Ledger events and the committed event log
//!
//! Events raised inside an operation are buffered and only become visible
//! when the operation commits. A rolled-back operation leaves no trace in
//! the log.
//!
//! The transfer stream plus the price-at-epoch history is enough to rebuild
//! every balance; see [`replay`]. The log keeps at most `max_retained`
//! committed events and drops the oldest beyond that, so a consumer that
//! needs the full stream must drain it.

use crate::{
    bits::BitLedger,
    math,
    types::{Account, AccountId, Price},
    Result,
};
use primitive_types::U256;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

/// Notification raised by a committed operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEvent {
    /// Price refreshed, epoch advanced
    Rebase {
        /// Epoch after the rebase
        epoch: u64,
        /// Adopted price
        price: Price,
    },

    /// Bits moved; `Reserved` on either side marks a mint or burn
    Transfer {
        /// Debited slot
        from: Account,
        /// Credited slot
        to: Account,
        /// Derived amount at the operation's price
        amount: U256,
        /// Exact bits moved
        bits: U256,
    },

    /// Price source attached
    OracleUpdated {
        /// Source identifier
        source_id: String,
    },

    /// Allowance set
    Approval {
        /// Allowance owner
        owner: AccountId,
        /// Allowed spender
        spender: AccountId,
        /// Derived amount allowed
        amount: U256,
    },
}

/// Committed event with its position in the log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sequenced {
    /// Position in the log, starting at 0
    pub sequence: u64,
    /// The event
    pub event: LedgerEvent,
}

/// Default bound on committed events held in memory
pub const DEFAULT_MAX_RETAINED: usize = 100_000;

/// Append-only committed log plus the pending buffer of the open operation
#[derive(Debug)]
pub struct EventLog {
    committed: VecDeque<Sequenced>,
    pending: Vec<LedgerEvent>,
    next_sequence: u64,
    max_retained: usize,
    dropped: u64,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::with_max_retained(DEFAULT_MAX_RETAINED)
    }
}

impl EventLog {
    /// Empty log with the default retention bound
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty log holding at most `max_retained` committed events
    pub fn with_max_retained(max_retained: usize) -> Self {
        Self {
            committed: VecDeque::new(),
            pending: Vec::new(),
            next_sequence: 0,
            max_retained: max_retained.max(1),
            dropped: 0,
        }
    }

    /// Change the retention bound; trims immediately if needed
    pub fn set_max_retained(&mut self, max_retained: usize) {
        self.max_retained = max_retained.max(1);
        self.trim();
    }

    /// Buffer an event for the open operation
    pub fn emit(&mut self, event: LedgerEvent) {
        self.pending.push(event);
    }

    /// Publish the buffered events; returns how many were published
    pub fn commit(&mut self) -> usize {
        let count = self.pending.len();
        for event in self.pending.drain(..) {
            self.committed.push_back(Sequenced {
                sequence: self.next_sequence,
                event,
            });
            self.next_sequence += 1;
        }
        self.trim();
        count
    }

    /// Drop the buffered events
    pub fn rollback(&mut self) {
        self.pending.clear();
    }

    /// Committed events still held, oldest first
    pub fn events(&self) -> &VecDeque<Sequenced> {
        &self.committed
    }

    /// Committed events with `sequence >= from`
    pub fn since(&self, from: u64) -> impl Iterator<Item = &Sequenced> {
        self.committed.iter().filter(move |e| e.sequence >= from)
    }

    /// Hand the committed events to a consumer; sequences keep counting
    pub fn drain(&mut self) -> Vec<Sequenced> {
        std::mem::take(&mut self.committed).into()
    }

    /// Events dropped by the retention bound so far
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    fn trim(&mut self) {
        let excess = self.committed.len().saturating_sub(self.max_retained);
        if excess > 0 {
            self.committed.drain(..excess);
            self.dropped += excess as u64;
            tracing::debug!(
                dropped = excess,
                retained = self.max_retained,
                "event log full, oldest events dropped"
            );
        }
    }

    /// Sequence the next committed event will get
    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }
}

/// Ledger state rebuilt from an event stream
#[derive(Debug, Clone)]
pub struct Replay {
    ledger: BitLedger,
    prices: BTreeMap<u64, Price>,
}

impl Replay {
    /// Bits held by `account` at the end of the stream
    pub fn bits_of(&self, account: &Account) -> U256 {
        self.ledger.bits_of(account)
    }

    /// Price adopted at `epoch`
    pub fn price_at(&self, epoch: u64) -> Option<Price> {
        self.prices.get(&epoch).copied()
    }

    /// Latest epoch and its price
    pub fn latest(&self) -> Option<(u64, Price)> {
        self.prices.iter().next_back().map(|(e, p)| (*e, *p))
    }

    /// Derived balance at the latest price; 0 for the sentinel
    pub fn balance_of(&self, account: &Account) -> Option<U256> {
        if account.is_reserved() {
            return Some(U256::zero());
        }
        let (_, price) = self.latest()?;
        Some(math::bits_to_amount(self.bits_of(account), price))
    }

    /// Rebuilt bit ledger
    pub fn ledger(&self) -> &BitLedger {
        &self.ledger
    }
}

/// Rebuild bit balances and price history from events, oldest first
pub fn replay<'a>(events: impl IntoIterator<Item = &'a LedgerEvent>) -> Result<Replay> {
    let mut ledger = BitLedger::new();
    let mut prices = BTreeMap::new();

    for event in events {
        match event {
            LedgerEvent::Rebase { epoch, price } => {
                prices.insert(*epoch, *price);
            }
            LedgerEvent::Transfer { from, to, bits, .. } => {
                ledger.move_bits(from, to, *bits)?;
            }
            LedgerEvent::OracleUpdated { .. } | LedgerEvent::Approval { .. } => {}
        }
    }

    Ok(Replay { ledger, prices })
}
