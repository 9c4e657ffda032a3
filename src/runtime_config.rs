// =============================================================================
// Runtime Configuration — Hot-reloadable radar settings with atomic save
// =============================================================================
//
// Central configuration hub for the radar pipeline. Every tunable parameter
// lives here so the service can be reconfigured at runtime without a restart.
//
// Persistence uses an atomic tmp + rename pattern to prevent corruption on
// crash. All fields carry `#[serde(default = "...")]` so that adding new
// fields never breaks loading an older config file.
// =============================================================================

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::types::ChainId;

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_chains() -> Vec<ChainId> {
    vec![ChainId::Sol, ChainId::Eth, ChainId::Bsc, ChainId::Base]
}

fn default_refresh_ms() -> u64 {
    30_000
}

fn default_sentinel_refresh_ms() -> u64 {
    120_000
}

fn default_min_liq_list() -> f64 {
    12_000.0
}

fn default_min_liq_alert() -> f64 {
    20_000.0
}

fn default_max_tax() -> f64 {
    10.0
}

fn default_max_age_hours() -> f64 {
    48.0
}

fn default_score_alert() -> f64 {
    70.0
}

fn default_surge15_min() -> f64 {
    2.5
}

fn default_imbalance5_min() -> f64 {
    0.4
}

fn default_alert_hourly_ceiling() -> u32 {
    50
}

fn default_bind_addr() -> String {
    "0.0.0.0:3001".to_string()
}

fn default_false() -> bool {
    false
}

// =============================================================================
// RuntimeConfig
// =============================================================================

/// Top-level runtime configuration for the radar.
///
/// Every field has a serde default so that older JSON files missing new
/// fields still deserialise correctly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Which chains discovery/polling run on.
    #[serde(default = "default_chains")]
    pub chains: Vec<ChainId>,

    /// Polling cadence, milliseconds.
    #[serde(default = "default_refresh_ms")]
    pub refresh_ms: u64,

    /// Per-exchange Sentinel cadence, milliseconds.
    #[serde(default = "default_sentinel_refresh_ms")]
    pub sentinel_refresh_ms: u64,

    /// Minimum liquidity (USD) for leaderboard/hotlist eligibility.
    #[serde(default = "default_min_liq_list")]
    pub min_liq_list: f64,

    /// Minimum liquidity (USD) for alert dispatch.
    #[serde(default = "default_min_liq_alert")]
    pub min_liq_alert: f64,

    /// Maximum buy/sell tax percentage before the `high_tax` security flag fires.
    #[serde(default = "default_max_tax")]
    pub max_tax: f64,

    /// Maximum pair age (hours) eligible for the hotlist/leaderboards.
    #[serde(default = "default_max_age_hours")]
    pub max_age_hours: f64,

    /// Minimum composite score to dispatch an alert.
    #[serde(default = "default_score_alert")]
    pub score_alert: f64,

    /// Minimum `vol_15 / (2*vol_5)` ratio to dispatch an alert.
    #[serde(default = "default_surge15_min")]
    pub surge15_min: f64,

    /// Minimum imbalance5 to dispatch an alert.
    #[serde(default = "default_imbalance5_min")]
    pub imbalance5_min: f64,

    /// Maximum alerts dispatched per rolling hour.
    #[serde(default = "default_alert_hourly_ceiling")]
    pub alert_hourly_ceiling: u32,

    /// Advisory flag surfaced in `GET /config`; does not change pipeline
    /// behaviour in this core — an external API gateway is the enforcement
    /// point for the declared allow-list.
    #[serde(default = "default_false")]
    pub radar_only: bool,

    #[serde(default = "default_false")]
    pub enable_portfolio_sim: bool,

    #[serde(default = "default_false")]
    pub enable_trade_actions: bool,

    #[serde(default = "default_false")]
    pub enable_wallet_integrations: bool,

    /// HTTP/WebSocket transport bind address.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            chains: default_chains(),
            refresh_ms: default_refresh_ms(),
            sentinel_refresh_ms: default_sentinel_refresh_ms(),
            min_liq_list: default_min_liq_list(),
            min_liq_alert: default_min_liq_alert(),
            max_tax: default_max_tax(),
            max_age_hours: default_max_age_hours(),
            score_alert: default_score_alert(),
            surge15_min: default_surge15_min(),
            imbalance5_min: default_imbalance5_min(),
            alert_hourly_ceiling: default_alert_hourly_ceiling(),
            radar_only: false,
            enable_portfolio_sim: false,
            enable_trade_actions: false,
            enable_wallet_integrations: false,
            bind_addr: default_bind_addr(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read runtime config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse runtime config from {}", path.display()))?;

        info!(
            path = %path.display(),
            chains = ?config.chains,
            refresh_ms = config.refresh_ms,
            "runtime config loaded"
        );

        Ok(config)
    }

    /// Persist the current configuration to `path` using an atomic write
    /// (write to `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self)
            .context("failed to serialise runtime config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "runtime config saved (atomic)");
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let cfg = RuntimeConfig::default();
        assert_eq!(cfg.chains.len(), 4);
        assert_eq!(cfg.refresh_ms, 30_000);
        assert_eq!(cfg.sentinel_refresh_ms, 120_000);
        assert!((cfg.min_liq_list - 12_000.0).abs() < f64::EPSILON);
        assert!((cfg.min_liq_alert - 20_000.0).abs() < f64::EPSILON);
        assert!((cfg.score_alert - 70.0).abs() < f64::EPSILON);
        assert!(!cfg.radar_only);
    }

    #[test]
    fn deserialise_empty_json_uses_defaults() {
        let cfg: RuntimeConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.refresh_ms, 30_000);
        assert_eq!(cfg.alert_hourly_ceiling, 50);
        assert!(!cfg.enable_trade_actions);
    }

    #[test]
    fn deserialise_partial_json_fills_defaults() {
        let json = r#"{ "refresh_ms": 5000, "radar_only": true }"#;
        let cfg: RuntimeConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.refresh_ms, 5000);
        assert!(cfg.radar_only);
        assert_eq!(cfg.chains.len(), 4);
        assert!((cfg.score_alert - 70.0).abs() < f64::EPSILON);
    }

    #[test]
    fn roundtrip_serialisation() {
        let cfg = RuntimeConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let cfg2: RuntimeConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(cfg.chains, cfg2.chains);
        assert_eq!(cfg.refresh_ms, cfg2.refresh_ms);
        assert_eq!(cfg.radar_only, cfg2.radar_only);
    }

    #[test]
    fn save_then_load_round_trips_to_disk() {
        let dir = std::env::temp_dir().join(format!(
            "radar_cfg_test_{}",
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("radar_config.json");

        let mut cfg = RuntimeConfig::default();
        cfg.refresh_ms = 9999;
        cfg.save(&path).unwrap();

        let loaded = RuntimeConfig::load(&path).unwrap();
        assert_eq!(loaded.refresh_ms, 9999);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
