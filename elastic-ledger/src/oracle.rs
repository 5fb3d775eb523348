//! Price sources
//!
//! The ledger only sees [`PriceSource::get_price`]: a raw 8-decimal value
//! and a validity flag. Staleness is the source's concern. [`FeedOracle`]
//! applies the standard policy to an aggregator-style round feed: a round
//! older than the threshold (default 86 400 s) or dated in the future is
//! invalid, and so is a missing or negative answer.

use crate::{math::PRICE_DECIMALS, types::PriceReading};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use primitive_types::U256;
use std::sync::Arc;

/// Default maximum age of a usable round
pub const DEFAULT_STALENESS_THRESHOLD_SECS: u64 = 86_400;

/// External price feed consulted before every mutating operation
pub trait PriceSource {
    /// Identifier reported in `OracleUpdated`
    fn source_id(&self) -> &str;

    /// Current reading; never errors, staleness is expressed via `is_valid`
    fn get_price(&self) -> PriceReading;
}

impl<P: PriceSource + ?Sized> PriceSource for Box<P> {
    fn source_id(&self) -> &str {
        (**self).source_id()
    }

    fn get_price(&self) -> PriceReading {
        (**self).get_price()
    }
}

/// Price source driven by hand
///
/// Clones share the same reading, so a test or operator can keep a handle
/// while the ledger owns another.
#[derive(Debug, Clone)]
pub struct ManualPriceSource {
    source_id: String,
    reading: Arc<RwLock<PriceReading>>,
}

impl ManualPriceSource {
    /// Source starting at `raw` (8-decimal fixed point)
    pub fn new(source_id: impl Into<String>, raw: impl Into<U256>) -> Self {
        Self {
            source_id: source_id.into(),
            reading: Arc::new(RwLock::new(PriceReading::valid(raw))),
        }
    }

    /// Publish a fresh price
    pub fn set_price(&self, raw: impl Into<U256>) {
        *self.reading.write() = PriceReading::valid(raw);
    }

    /// Publish an arbitrary reading
    pub fn set_reading(&self, reading: PriceReading) {
        *self.reading.write() = reading;
    }

    /// Mark the feed stale
    pub fn set_invalid(&self) {
        *self.reading.write() = PriceReading::invalid();
    }
}

impl PriceSource for ManualPriceSource {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    fn get_price(&self) -> PriceReading {
        *self.reading.read()
    }
}

/// Wall clock used for staleness checks
pub trait Clock {
    /// Current time
    fn now(&self) -> DateTime<Utc>;
}

/// System time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<RwLock<DateTime<Utc>>>,
}

impl ManualClock {
    /// Clock frozen at `now`
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(RwLock::new(now)),
        }
    }

    /// Jump to `now`
    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.write() = now;
    }

    /// Move forward by `secs`
    pub fn advance(&self, secs: i64) {
        let mut now = self.now.write();
        *now += chrono::Duration::seconds(secs);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read()
    }
}

/// One aggregator round
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Round {
    /// Signed answer in the feed's own decimals
    pub answer: i128,
    /// When the answer was written
    pub updated_at: DateTime<Utc>,
}

/// Aggregator-style feed: latest round plus fixed decimals
pub trait RoundSource {
    /// Decimals of `Round::answer`
    fn decimals(&self) -> u32;

    /// Latest round, `None` when the feed has never answered
    fn latest_round(&self) -> Option<Round>;
}

/// In-memory round feed
#[derive(Debug, Clone)]
pub struct ManualFeed {
    decimals: u32,
    round: Arc<RwLock<Option<Round>>>,
}

impl ManualFeed {
    /// Feed with no answer yet
    pub fn new(decimals: u32) -> Self {
        Self {
            decimals,
            round: Arc::new(RwLock::new(None)),
        }
    }

    /// Write a new round
    pub fn answer(&self, answer: i128, updated_at: DateTime<Utc>) {
        *self.round.write() = Some(Round { answer, updated_at });
    }
}

impl RoundSource for ManualFeed {
    fn decimals(&self) -> u32 {
        self.decimals
    }

    fn latest_round(&self) -> Option<Round> {
        *self.round.read()
    }
}

/// Staleness predicate on unix seconds
///
/// age = now - updated_at; negative ages (rounds from the future) are stale.
#[inline]
pub fn is_fresh(updated_at: i64, now: i64, max_staleness_secs: u64) -> bool {
    let age = now.saturating_sub(updated_at);
    !(age < 0 || age as u64 > max_staleness_secs)
}

/// Rescale a nonnegative answer from `decimals` to `PRICE_DECIMALS` (floor)
pub fn rescale_answer(answer: u128, decimals: u32) -> U256 {
    let answer = U256::from(answer);
    if decimals >= PRICE_DECIMALS {
        let shift = (decimals - PRICE_DECIMALS) as usize;
        // 10^78 no longer fits; every u128 answer floors to zero well before that.
        if shift > 77 {
            return U256::zero();
        }
        answer / U256::exp10(shift)
    } else {
        answer * U256::exp10((PRICE_DECIMALS - decimals) as usize)
    }
}

/// [`PriceSource`] over a [`RoundSource`] with a staleness threshold
#[derive(Debug, Clone)]
pub struct FeedOracle<R, C = SystemClock> {
    source_id: String,
    feed: R,
    clock: C,
    staleness_threshold_secs: u64,
}

impl<R: RoundSource> FeedOracle<R, SystemClock> {
    /// Oracle on system time with the default threshold
    pub fn new(source_id: impl Into<String>, feed: R) -> Self {
        Self::with_clock(source_id, feed, SystemClock, DEFAULT_STALENESS_THRESHOLD_SECS)
    }
}

impl<R: RoundSource, C: Clock> FeedOracle<R, C> {
    /// Oracle with an explicit clock and threshold
    pub fn with_clock(
        source_id: impl Into<String>,
        feed: R,
        clock: C,
        staleness_threshold_secs: u64,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            feed,
            clock,
            staleness_threshold_secs,
        }
    }

    /// Configured threshold in seconds
    pub fn staleness_threshold_secs(&self) -> u64 {
        self.staleness_threshold_secs
    }
}

impl<R: RoundSource, C: Clock> PriceSource for FeedOracle<R, C> {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    fn get_price(&self) -> PriceReading {
        let Some(round) = self.feed.latest_round() else {
            tracing::debug!(source = %self.source_id, "feed has no answer");
            return PriceReading::invalid();
        };

        let Ok(answer) = u128::try_from(round.answer) else {
            tracing::debug!(source = %self.source_id, answer = round.answer, "negative answer");
            return PriceReading::invalid();
        };

        let now = self.clock.now().timestamp();
        if !is_fresh(round.updated_at.timestamp(), now, self.staleness_threshold_secs) {
            tracing::debug!(
                source = %self.source_id,
                updated_at = %round.updated_at,
                "stale round"
            );
            return PriceReading::invalid();
        }

        PriceReading::valid(rescale_answer(answer, self.feed.decimals()))
    }
}
