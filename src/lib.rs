//! Rescue Core
//!
//! Moves assets out of a compromised account that holds no ether, without
//! the account ever being funded.
//!
//! ## Architecture
//! - Engine: builds the zero-gas transfers and the conditions they must meet
//! - Settlement: check-and-send payment to the block producer, paid by a donor
//! - Builder: orders and signs the bundle
//! - Simulator: prices a bundle by what it pays the block producer
//! - Relay: private bundle submission and inclusion tracking
//! - Submission: one attempt per new block until inclusion
//! - Burner: drains any ether sent to the compromised account

pub mod builder;
pub mod burner;
pub mod chain;
pub mod config;
pub mod engine;
pub mod error;
pub mod relay;
pub mod settlement;
pub mod simulator;
pub mod submission;
pub mod types;

pub use builder::{BundleComposer, SignedBundle};
pub use chain::{new_heads, ChainState, RpcChain};
pub use config::{Config, Settings};
pub use engine::{Engine, EngineKind};
pub use relay::{FlashbotsRelay, Relay};
pub use settlement::SettlementVerifier;
pub use simulator::Simulator;
pub use submission::{Rescue, RescueOutcome, SubmissionLoop};

use config::{LoggingConfig, MetricsConfig};
use tracing_subscriber::{fmt, EnvFilter};

/// Install the global subscriber. `RUST_LOG` overrides the configured level.
pub fn init_tracing(config: &LoggingConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.level))?;
    let builder = fmt().with_env_filter(filter).with_target(false);

    if config.json_output {
        builder
            .json()
            .try_init()
            .map_err(|e| anyhow::anyhow!(e))?;
    } else {
        builder.try_init().map_err(|e| anyhow::anyhow!(e))?;
    }
    Ok(())
}

/// Start the Prometheus exporter when a listen address is configured
pub fn init_metrics(config: &MetricsConfig) -> anyhow::Result<()> {
    if let Some(addr) = &config.listen_addr {
        let addr: std::net::SocketAddr = addr.parse()?;
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()?;
        tracing::info!(%addr, "Metrics exporter listening");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_disabled_without_address() {
        assert!(init_metrics(&MetricsConfig::default()).is_ok());
    }

    #[test]
    fn test_bad_metrics_address() {
        let config = MetricsConfig {
            listen_addr: Some("not an address".to_string()),
        };
        assert!(init_metrics(&config).is_err());
    }
}
