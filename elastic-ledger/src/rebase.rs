//! Rebase state machine
//!
//! Holds the last usable price and the epoch counter. A rebase commits
//! whenever the source returns a valid, nonzero reading, even if the clamped
//! price equals the previous one: the epoch counts fresh readings, not price
//! changes. Unusable readings are absorbed by keeping `last_price`.

use crate::{
    oracle::PriceSource,
    types::Price,
    Error, Result,
};
use serde::{Deserialize, Serialize};

/// A committed rebase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rebase {
    /// Epoch after the rebase
    pub epoch: u64,
    /// Price adopted
    pub price: Price,
}

/// Scalar rebase state, cheap to snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebaseState {
    /// Last usable price
    pub last_price: Price,
    /// Committed rebases since creation
    pub epoch: u64,
}

/// Tracks `last_price` and `epoch`
#[derive(Debug, Clone)]
pub struct RebaseEngine {
    state: RebaseState,
}

impl RebaseEngine {
    /// Take the first reading; fails with `OracleUnavailable` if it is unusable
    ///
    /// The returned rebase is epoch 1.
    pub fn initialize<P: PriceSource + ?Sized>(source: &P) -> Result<(Self, Rebase)> {
        let price = source.get_price().usable().ok_or_else(|| {
            Error::OracleUnavailable(format!(
                "source {} returned no usable initial price",
                source.source_id()
            ))
        })?;

        let mut engine = Self {
            state: RebaseState {
                last_price: price,
                epoch: 0,
            },
        };
        let rebase = engine.commit(price);
        Ok((engine, rebase))
    }

    /// Consult the source and rebase if the reading is usable
    pub fn maybe_rebase<P: PriceSource + ?Sized>(&mut self, source: &P) -> Option<Rebase> {
        let reading = source.get_price();
        match reading.usable() {
            Some(price) => Some(self.commit(price)),
            None => {
                tracing::debug!(
                    source = source.source_id(),
                    is_valid = reading.is_valid,
                    last_price = %self.state.last_price,
                    epoch = self.state.epoch,
                    "unusable price reading, keeping last price"
                );
                None
            }
        }
    }

    /// Price a read-only view should use: a usable reading, else `last_price`
    pub fn current_price<P: PriceSource + ?Sized>(&self, source: &P) -> Price {
        source
            .get_price()
            .usable()
            .unwrap_or(self.state.last_price)
    }

    /// Last usable price
    pub fn last_price(&self) -> Price {
        self.state.last_price
    }

    /// Committed rebases since creation
    pub fn epoch(&self) -> u64 {
        self.state.epoch
    }

    /// Copy of the scalar state
    pub fn snapshot(&self) -> RebaseState {
        self.state
    }

    /// Reinstate a snapshot (rollback)
    pub fn restore(&mut self, state: RebaseState) {
        self.state = state;
    }

    fn commit(&mut self, price: Price) -> Rebase {
        self.state.last_price = price;
        self.state.epoch += 1;

        tracing::info!(epoch = self.state.epoch, price = %price, "rebase");

        Rebase {
            epoch: self.state.epoch,
            price,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::MAX_PRICE;
    use crate::oracle::ManualPriceSource;
    use crate::types::PriceReading;
    use primitive_types::U256;

    #[test]
    fn test_initialize_is_epoch_one() {
        let source = ManualPriceSource::new("feed", 300_000_000u64);
        let (engine, rebase) = RebaseEngine::initialize(&source).unwrap();
        assert_eq!(rebase.epoch, 1);
        assert_eq!(engine.epoch(), 1);
        assert_eq!(engine.last_price().get(), 300_000_000);
    }

    #[test]
    fn test_initialize_fails_without_price() {
        let source = ManualPriceSource::new("feed", 300_000_000u64);
        source.set_invalid();
        assert!(matches!(
            RebaseEngine::initialize(&source),
            Err(Error::OracleUnavailable(_))
        ));

        source.set_price(0u64);
        assert!(matches!(
            RebaseEngine::initialize(&source),
            Err(Error::OracleUnavailable(_))
        ));
    }

    #[test]
    fn test_same_price_still_advances_epoch() {
        let source = ManualPriceSource::new("feed", 100_000_000u64);
        let (mut engine, _) = RebaseEngine::initialize(&source).unwrap();

        let rebase = engine.maybe_rebase(&source).unwrap();
        assert_eq!(rebase.epoch, 2);
        assert_eq!(rebase.price, Price::ONE);
    }

    #[test]
    fn test_invalid_reading_keeps_state() {
        let source = ManualPriceSource::new("feed", 300_000_000u64);
        let (mut engine, _) = RebaseEngine::initialize(&source).unwrap();

        source.set_reading(PriceReading {
            value: U256::from(500_000_000u64),
            is_valid: false,
        });
        assert!(engine.maybe_rebase(&source).is_none());
        assert_eq!(engine.epoch(), 1);
        assert_eq!(engine.last_price().get(), 300_000_000);
    }

    #[test]
    fn test_zero_reading_is_rejected() {
        let source = ManualPriceSource::new("feed", 300_000_000u64);
        let (mut engine, _) = RebaseEngine::initialize(&source).unwrap();

        source.set_price(0u64);
        assert!(engine.maybe_rebase(&source).is_none());
        assert_eq!(engine.epoch(), 1);
        assert_eq!(engine.current_price(&source).get(), 300_000_000);
    }

    #[test]
    fn test_price_clamped_to_max() {
        let source = ManualPriceSource::new("feed", 300_000_000u64);
        let (mut engine, _) = RebaseEngine::initialize(&source).unwrap();

        source.set_price(U256::from(MAX_PRICE) + U256::one());
        let rebase = engine.maybe_rebase(&source).unwrap();
        assert_eq!(rebase.price.get(), MAX_PRICE);
        assert_eq!(engine.last_price(), Price::MAX);
    }

    #[test]
    fn test_current_price_does_not_mutate() {
        let source = ManualPriceSource::new("feed", 300_000_000u64);
        let (engine, _) = RebaseEngine::initialize(&source).unwrap();

        source.set_price(400_000_000u64);
        assert_eq!(engine.current_price(&source).get(), 400_000_000);
        assert_eq!(engine.last_price().get(), 300_000_000);
        assert_eq!(engine.epoch(), 1);
    }

    #[test]
    fn test_restore_snapshot() {
        let source = ManualPriceSource::new("feed", 300_000_000u64);
        let (mut engine, _) = RebaseEngine::initialize(&source).unwrap();
        let snapshot = engine.snapshot();

        source.set_price(400_000_000u64);
        engine.maybe_rebase(&source);
        engine.restore(snapshot);
        assert_eq!(engine.snapshot(), snapshot);
    }
}
