//! Configuration parsing for the GDAX streaming client.
//!
//! The runner reads its settings from a single JSON file. Only `products` is
//! required; everything else falls back to defaults suitable for the public
//! Coinbase Exchange feed.
//!
//! # Example config
//!
//! ```json
//! {
//!   "GdaxStream": { "module_name": "gdax_md", "log_path": "/tmp/log" },
//!   "ws_url": "wss://ws-feed.exchange.coinbase.com",
//!   "products": ["BTC-USD", "ETH-USD"],
//!   "channel_capacity": 1024,
//!   "ping_interval_sec": 30,
//!   "reconnect": { "enabled": true, "delay_ms": 2000, "max_attempts": 0 }
//! }
//! ```

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;

use crate::error::GxError;

/// Public Coinbase Exchange (formerly GDAX) WebSocket feed.
pub const DEFAULT_WS_URL: &str = "wss://ws-feed.exchange.coinbase.com";

/// Default per-channel broadcast capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Top-level application config, deserialized from a JSON file.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Module metadata (name, log path).
    #[serde(rename = "GdaxStream", default)]
    pub meta: Option<ModuleMeta>,

    /// WebSocket endpoint.
    #[serde(default = "default_ws_url")]
    pub ws_url: String,

    /// Product ids to subscribe at startup (e.g. `["BTC-USD"]`).
    pub products: Vec<String>,

    /// Buffered messages per channel before slow consumers start lagging.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Keep-alive ping interval in seconds. Absent or `0` disables pings.
    pub ping_interval_sec: Option<u64>,

    /// Extra HTTP headers for the WebSocket handshake.
    #[serde(default)]
    pub extra_headers: HashMap<String, String>,

    /// Caller-side reconnect policy used by the runner.
    #[serde(default)]
    pub reconnect: ReconnectConfig,
}

/// Module metadata block.
#[derive(Debug, Clone, Deserialize)]
pub struct ModuleMeta {
    pub module_name: Option<String>,
    pub log_path: Option<String>,
}

/// What the runner does after the venue drops the connection.
#[derive(Debug, Clone, Deserialize)]
pub struct ReconnectConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Pause before reconnecting, in milliseconds.
    #[serde(default = "default_reconnect_delay_ms")]
    pub delay_ms: u64,
    /// Give up after this many reconnects in a row that did not resubscribe
    /// every channel; `0` means never.
    #[serde(default)]
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            delay_ms: default_reconnect_delay_ms(),
            max_attempts: 0,
        }
    }
}

impl ReconnectConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    /// Whether reconnect number `attempt` (1-based) may go ahead.
    pub fn allows(&self, attempt: u32) -> bool {
        self.enabled && (self.max_attempts == 0 || attempt <= self.max_attempts)
    }
}

impl AppConfig {
    /// Returns the module name, defaulting to `"gdax_md"`.
    pub fn module_name(&self) -> String {
        self.meta
            .as_ref()
            .and_then(|m| m.module_name.clone())
            .unwrap_or_else(|| "gdax_md".to_string())
    }

    /// Returns the log path.
    pub fn log_path(&self) -> Option<String> {
        self.meta.as_ref().and_then(|m| m.log_path.clone())
    }

    pub fn ping_interval(&self) -> Option<Duration> {
        self.ping_interval_sec.filter(|s| *s > 0).map(Duration::from_secs)
    }

    /// Reject settings the client cannot work with.
    pub fn validate(&self) -> Result<(), GxError> {
        if self.ws_url.is_empty() {
            return Err(GxError::Config("ws_url is empty".into()));
        }
        if self.channel_capacity == 0 {
            return Err(GxError::Config("channel_capacity must be > 0".into()));
        }
        if let Some(p) = self.products.iter().find(|p| p.trim().is_empty()) {
            return Err(GxError::Config(format!("invalid product id {p:?}")));
        }
        Ok(())
    }
}

fn default_ws_url() -> String {
    DEFAULT_WS_URL.to_string()
}

fn default_channel_capacity() -> usize {
    DEFAULT_CHANNEL_CAPACITY
}

fn default_reconnect_delay_ms() -> u64 {
    2_000
}

fn default_true() -> bool {
    true
}

/// Load and parse a JSON config file.
pub fn load_config(path: &std::path::Path) -> anyhow::Result<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: AppConfig = serde_json::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_uses_defaults() {
        let cfg: AppConfig = serde_json::from_str(r#"{"products": ["BTC-USD"]}"#).unwrap();
        assert_eq!(cfg.ws_url, DEFAULT_WS_URL);
        assert_eq!(cfg.channel_capacity, DEFAULT_CHANNEL_CAPACITY);
        assert_eq!(cfg.module_name(), "gdax_md");
        assert!(cfg.ping_interval().is_none());
        assert!(cfg.reconnect.enabled);
        assert_eq!(cfg.reconnect.delay(), Duration::from_millis(2_000));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn full_config() {
        let json = r#"{
            "GdaxStream": { "module_name": "gdax_test", "log_path": "/tmp/log" },
            "ws_url": "wss://example.test/feed",
            "products": ["BTC-USD", "ETH-USD"],
            "channel_capacity": 16,
            "ping_interval_sec": 5,
            "extra_headers": { "X-Test": "1" },
            "reconnect": { "enabled": false, "delay_ms": 10, "max_attempts": 3 }
        }"#;
        let cfg: AppConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.module_name(), "gdax_test");
        assert_eq!(cfg.log_path().as_deref(), Some("/tmp/log"));
        assert_eq!(cfg.products, vec!["BTC-USD", "ETH-USD"]);
        assert_eq!(cfg.ping_interval(), Some(Duration::from_secs(5)));
        assert_eq!(cfg.extra_headers.get("X-Test").map(String::as_str), Some("1"));
        assert!(!cfg.reconnect.enabled);
        assert_eq!(cfg.reconnect.max_attempts, 3);
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut cfg: AppConfig = serde_json::from_str(r#"{"products": ["BTC-USD", " "]}"#).unwrap();
        assert!(matches!(cfg.validate(), Err(GxError::Config(_))));

        cfg.products = vec!["BTC-USD".into()];
        cfg.channel_capacity = 0;
        assert!(matches!(cfg.validate(), Err(GxError::Config(_))));
    }

    #[test]
    fn zero_ping_interval_disables_pings() {
        let cfg: AppConfig =
            serde_json::from_str(r#"{"products": ["BTC-USD"], "ping_interval_sec": 0}"#).unwrap();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.ping_interval(), None);
    }

    #[test]
    fn reconnect_budget() {
        let mut policy = ReconnectConfig::default();
        assert!(policy.allows(1));
        assert!(policy.allows(1_000));

        policy.max_attempts = 2;
        assert!(policy.allows(2));
        assert!(!policy.allows(3));

        policy.enabled = false;
        assert!(!policy.allows(1));
    }
}
