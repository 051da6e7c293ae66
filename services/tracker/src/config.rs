//! Tracker configuration: JSON file, environment overrides, validation.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use transport::ChannelPaths;
use types::SymbolSpec;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    pub network: NetworkConfig,
    pub tracking: TrackingConfig,
    /// Append-only outcome ledger location.
    pub ledger_path: PathBuf,
    pub symbols: Vec<SymbolSpec>,
    pub metrics_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Directory the channel sockets live under; must match the router.
    pub socket_root: PathBuf,
    /// Consumer id for event hub registration.
    pub consumer_id: String,
    pub reconnect_delay_secs: u64,
    /// How often unreported outcomes are retried toward the router.
    pub report_retry_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingConfig {
    /// Quote silence beyond this marks a position UNRESOLVED.
    pub quote_gap_ceiling_secs: u64,
    /// How often the quote-gap sweep runs.
    pub sweep_interval_secs: u64,
    /// Stops within this many pips of the fill count as breakeven exits.
    pub breakeven_epsilon_pips: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            tracking: TrackingConfig::default(),
            ledger_path: PathBuf::from("/var/lib/firegrid/outcomes.jsonl"),
            symbols: vec![
                SymbolSpec::forex_default("EURUSD"),
                SymbolSpec::forex_default("GBPUSD"),
                SymbolSpec::forex_default("USDJPY"),
            ],
            metrics_interval_secs: 60,
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            socket_root: PathBuf::from("/tmp/firegrid"),
            consumer_id: "outcome-tracker".to_string(),
            reconnect_delay_secs: 5,
            report_retry_secs: 30,
        }
    }
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            quote_gap_ceiling_secs: 4 * 3600,
            sweep_interval_secs: 60,
            breakeven_epsilon_pips: 0.1,
        }
    }
}

impl TrackerConfig {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path))?;
        let config: Self =
            serde_json::from_str(&contents).with_context(|| format!("parsing config {}", path))?;
        Ok(config)
    }

    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(root) = std::env::var("FIREGRID_SOCKET_ROOT") {
            config.network.socket_root = PathBuf::from(root);
        }
        if let Ok(path) = std::env::var("FIREGRID_LEDGER_PATH") {
            config.ledger_path = PathBuf::from(path);
        }
        if let Ok(value) = std::env::var("FIREGRID_QUOTE_GAP_CEILING_SECS") {
            if let Ok(secs) = value.parse() {
                config.tracking.quote_gap_ceiling_secs = secs;
            }
        }
        config
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.tracking.quote_gap_ceiling_secs == 0 {
            anyhow::bail!("quote_gap_ceiling_secs must be positive");
        }
        if self.tracking.sweep_interval_secs == 0 {
            anyhow::bail!("sweep_interval_secs must be positive");
        }
        if self.network.consumer_id.is_empty() {
            anyhow::bail!("consumer_id must not be empty");
        }
        Ok(())
    }

    pub fn channel_paths(&self) -> ChannelPaths {
        ChannelPaths::under(&self.network.socket_root)
    }
}
