//! Configuration for the ledger

use crate::events::DEFAULT_MAX_RETAINED;
use crate::oracle::DEFAULT_STALENESS_THRESHOLD_SECS;
use crate::types::Price;
use serde::{Deserialize, Serialize};

/// Ledger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Service name
    pub service_name: String,

    /// Service version
    pub service_version: String,

    /// Address the server exposes `/metrics` on
    pub metrics_listen_addr: String,

    /// Price source configuration
    pub oracle: OracleConfig,

    /// Rebase configuration
    pub rebase: RebaseConfig,

    /// Actor configuration
    pub actor: ActorConfig,

    /// Event log configuration
    pub events: EventsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_name: "elastic-ledger".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            metrics_listen_addr: "0.0.0.0:9090".to_string(),
            oracle: OracleConfig::default(),
            rebase: RebaseConfig::default(),
            actor: ActorConfig::default(),
            events: EventsConfig::default(),
        }
    }
}

/// Price source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    /// Identifier reported in `OracleUpdated`
    pub source_id: String,

    /// Maximum age of a usable round (seconds)
    pub staleness_threshold_secs: u64,

    /// Price the demo source starts at
    pub initial_price: Price,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            source_id: "reference-usd".to_string(),
            staleness_threshold_secs: DEFAULT_STALENESS_THRESHOLD_SECS,
            initial_price: Price::ONE,
        }
    }
}

/// When the rebase run before an operation becomes permanent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RebaseCommit {
    /// Rebase commits or rolls back together with the operation
    #[default]
    WithOperation,
    /// Rebase commits even if the operation then fails
    Independent,
}

/// Rebase configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RebaseConfig {
    /// Commit policy of the precondition rebase
    pub commit: RebaseCommit,
}

/// Actor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ActorConfig {
    /// Bounded mailbox size (backpressure)
    pub mailbox_capacity: usize,
}

impl Default for ActorConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: 1000,
        }
    }
}

/// Event log configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Committed events kept in memory before the oldest are dropped
    pub max_retained: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            max_retained: DEFAULT_MAX_RETAINED,
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(addr) = std::env::var("LEDGER_METRICS_ADDR") {
            config.metrics_listen_addr = addr;
        }

        if let Ok(source_id) = std::env::var("LEDGER_ORACLE_SOURCE") {
            config.oracle.source_id = source_id;
        }

        if let Ok(secs) = std::env::var("LEDGER_STALENESS_SECS") {
            config.oracle.staleness_threshold_secs = secs.parse().map_err(|e| {
                crate::Error::Config(format!("Invalid LEDGER_STALENESS_SECS: {}", e))
            })?;
        }

        if let Ok(price) = std::env::var("LEDGER_INITIAL_PRICE") {
            let value: rust_decimal::Decimal = price.parse().map_err(|e| {
                crate::Error::Config(format!("Invalid LEDGER_INITIAL_PRICE: {}", e))
            })?;
            config.oracle.initial_price = Price::from_decimal(value).ok_or_else(|| {
                crate::Error::Config("LEDGER_INITIAL_PRICE must be positive".to_string())
            })?;
        }

        if let Ok(max) = std::env::var("LEDGER_EVENTS_MAX_RETAINED") {
            config.events.max_retained = max.parse().map_err(|e| {
                crate::Error::Config(format!("Invalid LEDGER_EVENTS_MAX_RETAINED: {}", e))
            })?;
        }

        if let Ok(commit) = std::env::var("LEDGER_REBASE_COMMIT") {
            config.rebase.commit = match commit.as_str() {
                "with_operation" => RebaseCommit::WithOperation,
                "independent" => RebaseCommit::Independent,
                other => {
                    return Err(crate::Error::Config(format!(
                        "Unknown LEDGER_REBASE_COMMIT: {}",
                        other
                    )))
                }
            };
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the ledger cannot run with
    pub fn validate(&self) -> crate::Result<()> {
        if self.actor.mailbox_capacity == 0 {
            return Err(crate::Error::Config(
                "actor.mailbox_capacity must be positive".to_string(),
            ));
        }
        if self.events.max_retained == 0 {
            return Err(crate::Error::Config(
                "events.max_retained must be positive".to_string(),
            ));
        }
        if self.metrics_listen_addr.parse::<std::net::SocketAddr>().is_err() {
            return Err(crate::Error::Config(format!(
                "metrics_listen_addr is not a socket address: {}",
                self.metrics_listen_addr
            )));
        }
        if self.oracle.source_id.is_empty() {
            return Err(crate::Error::Config(
                "oracle.source_id must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
