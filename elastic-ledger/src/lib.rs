//! Elastic Ledger
//!
//! Elastic-supply token ledger: holder balances track an external price so
//! that each balance stays worth a fixed quantity of a reference asset.
//!
//! # Architecture
//!
//! - **Bits**: the only stored quantity; balances are derived on read
//! - **Rebase precondition**: every mutating operation refreshes the price first
//! - **Journaled transactions**: a failed operation leaves no trace
//! - **Single Writer**: one actor task serialises all operations
//!
//! # Invariants
//!
//! - Bit conservation: Σ(bits), sentinel included, == TOTAL_BITS at all times
//! - Exactness: depositing `u` and withdrawing everything returns exactly `u`
//! - Deterministic replay: transfer events + price history → same balances
//! - Epoch increments exactly once per committed rebase

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod actor;
pub mod allowance;
pub mod bits;
pub mod config;
pub mod error;
pub mod events;
pub mod funds;
pub mod ledger;
pub mod math;
pub mod metrics;
pub mod oracle;
pub mod rebase;
pub mod transfer;
pub mod types;

// Re-exports
pub use actor::{spawn_ledger_actor, LedgerHandle};
pub use config::{Config, RebaseCommit};
pub use error::{Error, Result};
pub use events::{replay, LedgerEvent, Sequenced};
pub use funds::{FundsMover, FundsParty, InMemoryFunds};
pub use ledger::{Ledger, LedgerStatus};
pub use oracle::{FeedOracle, ManualFeed, ManualPriceSource, PriceSource, RoundSource};
pub use types::{Account, AccountId, Price, PriceReading};
