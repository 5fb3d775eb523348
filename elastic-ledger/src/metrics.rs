//! Metrics collection for observability
//!
//! Each ledger owns its own Prometheus registry, so several ledgers (or
//! tests) can live in one process.
//!
//! # Metrics
//!
//! - `ledger_rebases_total` - Committed rebases
//! - `ledger_unusable_readings_total` - Stale, invalid, or zero readings absorbed
//! - `ledger_epoch` - Current epoch
//! - `ledger_transfers_total` - Holder-to-holder transfers
//! - `ledger_deposits_total` - Deposits and mints
//! - `ledger_withdrawals_total` - Withdrawals and burns
//! - `ledger_rolled_back_total` - Operations rolled back

use axum::{extract::State, http::StatusCode, routing::get, Router};
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Committed rebases
    pub rebases_total: IntCounter,

    /// Unusable readings absorbed
    pub unusable_readings_total: IntCounter,

    /// Current epoch
    pub epoch: IntGauge,

    /// Holder-to-holder transfers
    pub transfers_total: IntCounter,

    /// Deposits and mints
    pub deposits_total: IntCounter,

    /// Withdrawals and burns
    pub withdrawals_total: IntCounter,

    /// Rolled-back operations
    pub rolled_back_total: IntCounter,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let rebases_total = IntCounter::new("ledger_rebases_total", "Committed rebases")?;
        registry.register(Box::new(rebases_total.clone()))?;

        let unusable_readings_total = IntCounter::new(
            "ledger_unusable_readings_total",
            "Stale, invalid, or zero price readings absorbed",
        )?;
        registry.register(Box::new(unusable_readings_total.clone()))?;

        let epoch = IntGauge::new("ledger_epoch", "Current rebase epoch")?;
        registry.register(Box::new(epoch.clone()))?;

        let transfers_total =
            IntCounter::new("ledger_transfers_total", "Holder-to-holder transfers")?;
        registry.register(Box::new(transfers_total.clone()))?;

        let deposits_total = IntCounter::new("ledger_deposits_total", "Deposits and mints")?;
        registry.register(Box::new(deposits_total.clone()))?;

        let withdrawals_total =
            IntCounter::new("ledger_withdrawals_total", "Withdrawals and burns")?;
        registry.register(Box::new(withdrawals_total.clone()))?;

        let rolled_back_total =
            IntCounter::new("ledger_rolled_back_total", "Operations rolled back")?;
        registry.register(Box::new(rolled_back_total.clone()))?;

        Ok(Self {
            rebases_total,
            unusable_readings_total,
            epoch,
            transfers_total,
            deposits_total,
            withdrawals_total,
            rolled_back_total,
            registry,
        })
    }

    /// Record a committed rebase
    pub fn record_rebase(&self, epoch: u64) {
        self.rebases_total.inc();
        self.epoch.set(i64::try_from(epoch).unwrap_or(i64::MAX));
    }

    /// Record an absorbed reading
    pub fn record_unusable_reading(&self) {
        self.unusable_readings_total.inc();
    }

    /// Record a rollback; `epoch` is the restored epoch
    pub fn record_rollback(&self, epoch: u64) {
        self.rolled_back_total.inc();
        self.epoch.set(i64::try_from(epoch).unwrap_or(i64::MAX));
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render the registry in Prometheus text format
    pub fn encode(&self) -> prometheus::Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = vec![];
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// `GET /metrics` over a ledger's registry
pub fn router(metrics: Metrics) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metrics)
}

/// Prometheus scrape handler
pub async fn metrics_handler(
    State(metrics): State<Metrics>,
) -> std::result::Result<String, (StatusCode, String)> {
    metrics.encode().map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to export metrics: {}", e),
        )
    })
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field("rebases_total", &self.rebases_total.get())
            .field("epoch", &self.epoch.get())
            .field("rolled_back_total", &self.rolled_back_total.get())
            .finish_non_exhaustive()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new().expect("Failed to create metrics")
    }
}
