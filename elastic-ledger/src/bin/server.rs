//! Ledger server binary
//!
//! Runs one ledger behind its actor until ctrl-c and serves its metrics on
//! `metrics_listen_addr`. Prices come from a feed oracle with the configured
//! staleness threshold, seeded with `oracle.initial_price`. Committed events
//! are drained on a timer and logged.

use chrono::Utc;
use elastic_ledger::{
    math::PRICE_DECIMALS,
    metrics,
    oracle::{FeedOracle, ManualFeed, SystemClock},
    spawn_ledger_actor, Config, InMemoryFunds, Ledger,
};
use std::time::Duration;

const EVENT_DRAIN_INTERVAL: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let config = Config::from_env()?;
    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        "Starting elastic ledger server"
    );

    let feed = ManualFeed::new(PRICE_DECIMALS);
    feed.answer(i128::try_from(config.oracle.initial_price.get())?, Utc::now());
    let source = FeedOracle::with_clock(
        config.oracle.source_id.clone(),
        feed,
        SystemClock,
        config.oracle.staleness_threshold_secs,
    );

    let ledger = Ledger::with_config(source, InMemoryFunds::new(), &config)?;
    let registry = ledger.metrics().clone();
    let (handle, task) = spawn_ledger_actor(ledger, config.actor.mailbox_capacity);

    let listener = tokio::net::TcpListener::bind(&config.metrics_listen_addr).await?;
    tracing::info!(addr = %config.metrics_listen_addr, "Serving GET /metrics");
    let metrics_server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, metrics::router(registry)).await {
            tracing::error!("Metrics server failed: {}", e);
        }
    });

    let status = handle.status().await?;
    tracing::info!(epoch = status.epoch, price = %status.last_price, "Ledger ready");

    let mut drain_timer = tokio::time::interval(EVENT_DRAIN_INTERVAL);
    loop {
        tokio::select! {
            _ = drain_timer.tick() => {
                for sequenced in handle.drain_events().await? {
                    tracing::info!(
                        sequence = sequenced.sequence,
                        event = %serde_json::to_string(&sequenced.event)?,
                        "ledger event"
                    );
                }
            }
            result = tokio::signal::ctrl_c() => {
                result?;
                break;
            }
        }
    }

    tracing::info!("Shutting down ledger server");
    handle.shutdown().await?;
    let ledger = task.await?;
    metrics_server.abort();
    ledger.check_conservation()?;
    tracing::info!(epoch = ledger.epoch(), "Ledger stopped");
    Ok(())
}
