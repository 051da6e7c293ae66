//! Router configuration: JSON file, environment overrides, validation.

use anyhow::Context;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use transport::ChannelPaths;
use types::{SymbolSpec, UserRiskProfile};

/// Complete configuration for the fire router service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    pub network: NetworkConfig,
    pub dispatch: DispatchConfig,
    pub policy: PolicyConfig,
    /// Symbol specs the sizer and vitality engine should know about.
    pub symbols: Vec<SymbolSpec>,
    /// Inline user risk profiles (policy-engine export).
    pub profiles: Vec<UserRiskProfile>,
    /// Optional separate profiles file; entries extend `profiles`.
    pub profiles_path: Option<PathBuf>,
    /// Starting account balances per user id, until the terminal reports
    /// fresher snapshots. Users absent here cannot be sized.
    pub starting_balances: HashMap<String, Decimal>,
}

/// Socket layout and queue sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Directory the six channel sockets live under.
    pub socket_root: PathBuf,
    /// Peer silence beyond this marks a channel DEGRADED.
    pub heartbeat_window_secs: u64,
    /// How often this node emits its own beacons.
    pub heartbeat_interval_secs: u64,
    pub market_queue: usize,
    pub signal_queue: usize,
    pub confirm_queue: usize,
    pub heartbeat_queue: usize,
}

/// Dispatch and reconciliation timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// A FIRED mission with no confirmation inside this window is REJECTED.
    pub confirm_timeout_secs: u64,
    pub connect_timeout_ms: u64,
    pub send_timeout_ms: u64,
    /// Node id the remote terminal heartbeats under.
    pub terminal_node_id: String,
}

/// Policy, hygiene, and observability knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Pattern-tag prefixes classified as fast-mode signals.
    pub fast_patterns: Vec<String>,
    /// Monitored fast/patient distribution target (fraction fast).
    pub mode_target_fast_share: f64,
    /// Warn when the observed share drifts further than this from target.
    pub mode_warn_tolerance: f64,
    /// Terminal missions are kept this long for idempotent re-delivery.
    pub retention_hours: u64,
    pub cleanup_interval_secs: u64,
    pub metrics_interval_secs: u64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            dispatch: DispatchConfig::default(),
            policy: PolicyConfig::default(),
            symbols: vec![
                SymbolSpec::forex_default("EURUSD"),
                SymbolSpec::forex_default("GBPUSD"),
                SymbolSpec::forex_default("USDJPY"),
            ],
            profiles: Vec::new(),
            profiles_path: None,
            starting_balances: HashMap::new(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            socket_root: PathBuf::from("/tmp/firegrid"),
            heartbeat_window_secs: 60,
            heartbeat_interval_secs: 15,
            market_queue: 1024,
            signal_queue: 64,
            confirm_queue: 256,
            heartbeat_queue: 64,
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            confirm_timeout_secs: 15,
            connect_timeout_ms: 500,
            send_timeout_ms: 500,
            terminal_node_id: "terminal".to_string(),
        }
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            fast_patterns: vec![
                "momentum".to_string(),
                "scalp".to_string(),
                "breakout".to_string(),
            ],
            mode_target_fast_share: 0.60,
            mode_warn_tolerance: 0.15,
            retention_hours: 24,
            cleanup_interval_secs: 300,
            metrics_interval_secs: 60,
        }
    }
}

impl RouterConfig {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path))?;
        let config: Self =
            serde_json::from_str(&contents).with_context(|| format!("parsing config {}", path))?;
        Ok(config)
    }

    /// Defaults plus environment overrides for the knobs operators actually
    /// flip in deployment.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(root) = std::env::var("FIREGRID_SOCKET_ROOT") {
            config.network.socket_root = PathBuf::from(root);
        }
        if let Ok(value) = std::env::var("FIREGRID_CONFIRM_TIMEOUT_SECS") {
            if let Ok(secs) = value.parse() {
                config.dispatch.confirm_timeout_secs = secs;
            }
        }
        if let Ok(value) = std::env::var("FIREGRID_HEARTBEAT_WINDOW_SECS") {
            if let Ok(secs) = value.parse() {
                config.network.heartbeat_window_secs = secs;
            }
        }
        if let Ok(path) = std::env::var("FIREGRID_PROFILES_PATH") {
            config.profiles_path = Some(PathBuf::from(path));
        }
        config
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.dispatch.confirm_timeout_secs == 0 {
            anyhow::bail!("confirm_timeout_secs must be positive");
        }
        if self.network.heartbeat_window_secs == 0 {
            anyhow::bail!("heartbeat_window_secs must be positive");
        }
        if !(0.0..=1.0).contains(&self.policy.mode_target_fast_share) {
            anyhow::bail!("mode_target_fast_share must be within [0, 1]");
        }
        if self.policy.retention_hours == 0 {
            anyhow::bail!("retention_hours must be positive");
        }
        for spec in &self.symbols {
            if spec.pip_size <= 0.0 || spec.volume_step <= 0.0 {
                anyhow::bail!("symbol {} has non-positive pip size or lot step", spec.symbol);
            }
        }
        for profile in &self.profiles {
            if profile.max_concurrent_slots == 0 {
                anyhow::bail!("profile {} has zero slots", profile.user_id);
            }
        }
        Ok(())
    }

    /// Inline profiles plus the optional profiles file.
    pub fn load_profiles(&self) -> anyhow::Result<Vec<UserRiskProfile>> {
        let mut profiles = self.profiles.clone();
        if let Some(path) = &self.profiles_path {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("reading profiles file {}", path.display()))?;
            let extra: Vec<UserRiskProfile> = serde_json::from_str(&contents)
                .with_context(|| format!("parsing profiles file {}", path.display()))?;
            profiles.extend(extra);
        }
        Ok(profiles)
    }

    pub fn channel_paths(&self) -> ChannelPaths {
        ChannelPaths::under(&self.network.socket_root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::{Tier, UserId};

    #[test]
    fn default_config_validates() {
        assert!(RouterConfig::default().validate().is_ok());
    }

    #[test]
    fn config_round_trips_through_json() {
        let mut config = RouterConfig::default();
        config
            .profiles
            .push(UserRiskProfile::for_tier(UserId::new("user-1"), Tier::Gold));
        let json = serde_json::to_string_pretty(&config).unwrap();
        let back: RouterConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.profiles.len(), 1);
        assert_eq!(
            back.dispatch.confirm_timeout_secs,
            config.dispatch.confirm_timeout_secs
        );
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let mut config = RouterConfig::default();
        config.dispatch.confirm_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn profiles_file_extends_inline_profiles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profiles.json");
        let exported = vec![UserRiskProfile::for_tier(UserId::new("user-2"), Tier::Silver)];
        std::fs::write(&path, serde_json::to_string(&exported).unwrap()).unwrap();

        let mut config = RouterConfig::default();
        config
            .profiles
            .push(UserRiskProfile::for_tier(UserId::new("user-1"), Tier::Gold));
        config.profiles_path = Some(path);

        let profiles = config.load_profiles().unwrap();
        assert_eq!(profiles.len(), 2);
    }
}
