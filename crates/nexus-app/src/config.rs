//! Application configuration.

use crate::error::{AppError, AppResult};
use nexus_bus::DEFAULT_HISTORY_CAPACITY;
use nexus_feed::StoreConfig;
use nexus_ws::FeedConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "NEXUS_CONFIG";
/// Config file used when neither the CLI nor the environment names one.
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Seconds between market status lines.
    #[serde(default = "default_status_interval_secs")]
    pub status_interval_secs: u64,

    #[serde(default)]
    pub bus: BusConfig,

    #[serde(default)]
    pub store: StoreConfig,

    /// Feed connections opened at startup.
    #[serde(default)]
    pub feeds: Vec<FeedEntry>,

    #[serde(default)]
    pub telemetry: TelemetryConfig,

    #[serde(default)]
    pub demo: DemoConfig,
}

fn default_status_interval_secs() -> u64 {
    30
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            status_interval_secs: default_status_interval_secs(),
            bus: BusConfig::default(),
            store: StoreConfig::default(),
            feeds: Vec::new(),
            telemetry: TelemetryConfig::default(),
            demo: DemoConfig::default(),
        }
    }
}

/// Event bus configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    /// Bounded event history size.
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
}

fn default_history_capacity() -> usize {
    DEFAULT_HISTORY_CAPACITY
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            history_capacity: default_history_capacity(),
        }
    }
}

/// One configured feed connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedEntry {
    pub id: String,
    pub url: String,

    #[serde(default = "default_reconnect")]
    pub reconnect: bool,

    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
}

fn default_reconnect() -> bool {
    true
}

fn default_reconnect_delay_ms() -> u64 {
    3000
}

fn default_max_reconnect_attempts() -> u32 {
    5
}

impl FeedEntry {
    pub fn to_feed_config(&self) -> FeedConfig {
        FeedConfig {
            url: self.url.clone(),
            reconnect: self.reconnect,
            reconnect_delay: Duration::from_millis(self.reconnect_delay_ms),
            max_reconnect_attempts: self.max_reconnect_attempts,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Default filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

/// Synthetic market data for running without network feeds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DemoConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Milliseconds between synthetic ticks.
    #[serde(default = "default_demo_interval_ms")]
    pub interval_ms: u64,
}

fn default_demo_interval_ms() -> u64 {
    2000
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_ms: default_demo_interval_ms(),
        }
    }
}

impl AppConfig {
    /// Pick the config path: CLI argument > `NEXUS_CONFIG` > default.
    pub fn resolve_path(cli: Option<String>) -> String {
        cli.or_else(|| std::env::var(CONFIG_ENV).ok())
            .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string())
    }

    /// Load `path` if it exists, otherwise defaults.
    ///
    /// The flag is `false` when the file was missing. Nothing is logged, so
    /// this can run before logging is initialized.
    pub fn load_or_default(path: &str) -> AppResult<(Self, bool)> {
        if Path::new(path).exists() {
            Ok((Self::from_file(path)?, true))
        } else {
            Ok((Self::default(), false))
        }
    }

    /// Load from a specific file.
    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config: {e}")))?;

        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> AppResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the pipeline cannot run with.
    pub fn validate(&self) -> AppResult<()> {
        if self.status_interval_secs == 0 {
            return Err(AppError::Config(
                "status_interval_secs must be positive".to_string(),
            ));
        }
        if self.demo.enabled && self.demo.interval_ms == 0 {
            return Err(AppError::Config(
                "demo.interval_ms must be positive".to_string(),
            ));
        }

        let mut ids = HashSet::new();
        for feed in &self.feeds {
            if feed.id.trim().is_empty() {
                return Err(AppError::Config("Feed id must not be empty".to_string()));
            }
            if feed.url.trim().is_empty() {
                return Err(AppError::Config(format!("Feed {} has no url", feed.id)));
            }
            if !ids.insert(feed.id.as_str()) {
                return Err(AppError::Config(format!("Duplicate feed id: {}", feed.id)));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_file() {
        let config = AppConfig::from_toml("").unwrap();
        assert_eq!(config.status_interval_secs, 30);
        assert_eq!(config.bus.history_capacity, 1000);
        assert_eq!(config.store.active_symbol, "BTCUSDT");
        assert_eq!(config.store.watchlist.len(), 4);
        assert!(config.feeds.is_empty());
        assert_eq!(config.telemetry.log_level, "info");
        assert!(!config.demo.enabled);
        assert_eq!(config.demo.interval_ms, 2000);
    }

    #[test]
    fn test_parse_feeds() {
        let toml = r#"
status_interval_secs = 5

[bus]
history_capacity = 50

[store]
active_symbol = "ETHUSDT"
watchlist = ["ETHUSDT"]

[[feeds]]
id = "btc-ticker"
url = "wss://stream.binance.com:9443/ws/btcusdt@ticker"

[[feeds]]
id = "eth-trades"
url = "wss://stream.binance.com:9443/ws/ethusdt@trade"
reconnect = false
reconnect_delay_ms = 500
max_reconnect_attempts = 0
"#;

        let config = AppConfig::from_toml(toml).unwrap();
        assert_eq!(config.status_interval_secs, 5);
        assert_eq!(config.bus.history_capacity, 50);
        assert_eq!(config.store.active_symbol, "ETHUSDT");
        assert_eq!(config.feeds.len(), 2);

        let btc = config.feeds[0].to_feed_config();
        assert!(btc.reconnect);
        assert_eq!(btc.reconnect_delay, Duration::from_millis(3000));
        assert_eq!(btc.max_reconnect_attempts, 5);

        let eth = config.feeds[1].to_feed_config();
        assert!(!eth.reconnect);
        assert_eq!(eth.reconnect_delay, Duration::from_millis(500));
        assert_eq!(eth.max_reconnect_attempts, 0);
    }

    #[test]
    fn test_duplicate_feed_id_rejected() {
        let toml = r#"
[[feeds]]
id = "a"
url = "ws://localhost:1"

[[feeds]]
id = "a"
url = "ws://localhost:2"
"#;
        let err = AppConfig::from_toml(toml).unwrap_err();
        assert!(err.to_string().contains("Duplicate feed id"));
    }

    #[test]
    fn test_empty_url_rejected() {
        let toml = r#"
[[feeds]]
id = "a"
url = ""
"#;
        assert!(matches!(
            AppConfig::from_toml(toml),
            Err(AppError::Config(_))
        ));
    }

    #[test]
    fn test_zero_status_interval_rejected() {
        assert!(AppConfig::from_toml("status_interval_secs = 0").is_err());
    }

    #[test]
    fn test_parse_error_message() {
        let err = AppConfig::from_toml("status_interval_secs = \"soon\"").unwrap_err();
        assert!(err.to_string().contains("Failed to parse config"));
    }

    #[test]
    fn test_missing_file_falls_back() {
        let (config, found) = AppConfig::load_or_default("does/not/exist.toml").unwrap();
        assert!(!found);
        assert!(config.feeds.is_empty());
    }

    #[test]
    fn test_resolve_path_prefers_cli() {
        assert_eq!(
            AppConfig::resolve_path(Some("custom.toml".to_string())),
            "custom.toml"
        );
    }

    #[test]
    fn test_shipped_default_config_parses() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../../config/default.toml");
        let config = AppConfig::from_file(path).unwrap();
        assert!(!config.feeds.is_empty());
    }
}
