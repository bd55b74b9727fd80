//! Configuration schema and figment-based loading.
//!
//! Configuration is layered, lowest to highest priority:
//!
//! 1. Built-in defaults
//! 2. `braze.toml` in the current directory
//! 3. Environment variables (`BRAZE_*`, `__` as section separator)
//!
//! # Environment Variable Mapping
//!
//! - `BRAZE_POLL_INTERVAL_MS=5000` → `poll_interval_ms = 5000`
//! - `BRAZE_LOGGING__LEVEL=debug` → `logging.level = "debug"`

use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrazeConfig {
    /// Delay between source polls in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Queue receive timeout in milliseconds; on expiry the dispatcher
    /// re-checks for cancellation.
    #[serde(default = "default_recv_timeout_ms")]
    pub recv_timeout_ms: u64,

    /// Grace period granted to in-flight handler executions at shutdown.
    #[serde(default = "default_drain_grace_ms")]
    pub drain_grace_ms: u64,

    /// Maximum number of memoized dependency results; unbounded when unset.
    #[serde(default)]
    pub memo_capacity: Option<usize>,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl BrazeConfig {
    /// The poll interval as a [`Duration`].
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// The queue receive timeout as a [`Duration`].
    pub fn recv_timeout(&self) -> Duration {
        Duration::from_millis(self.recv_timeout_ms)
    }

    /// The shutdown drain grace as a [`Duration`].
    pub fn drain_grace(&self) -> Duration {
        Duration::from_millis(self.drain_grace_ms)
    }
}

impl Default for BrazeConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            recv_timeout_ms: default_recv_timeout_ms(),
            drain_grace_ms: default_drain_grace_ms(),
            memo_capacity: None,
            logging: LoggingConfig::default(),
        }
    }
}

fn default_poll_interval_ms() -> u64 {
    2000
}

fn default_recv_timeout_ms() -> u64 {
    3000
}

fn default_drain_grace_ms() -> u64 {
    5000
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Base log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,

    /// Include the target (module path) in log output.
    #[serde(default = "default_true")]
    pub target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            target: true,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Compact single-line output.
    #[default]
    Compact,
    /// Standard fmt output.
    Full,
    /// Multi-line human-friendly output.
    Pretty,
}

/// Loads the configuration from defaults, `braze.toml`, and `BRAZE_*`
/// environment variables.
pub fn load() -> Result<BrazeConfig, figment::Error> {
    Figment::from(Serialized::defaults(BrazeConfig::default()))
        .merge(Toml::file("braze.toml"))
        .merge(Env::prefixed("BRAZE_").split("__"))
        .extract()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = BrazeConfig::default();
        assert_eq!(config.poll_interval(), Duration::from_secs(2));
        assert_eq!(config.recv_timeout(), Duration::from_secs(3));
        assert_eq!(config.memo_capacity, None);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, LogFormat::Compact);
    }

    #[test]
    fn toml_overrides_defaults() {
        let config: BrazeConfig = Figment::from(Serialized::defaults(BrazeConfig::default()))
            .merge(Toml::string(
                r#"
                poll_interval_ms = 500
                memo_capacity = 64

                [logging]
                level = "debug"
                format = "pretty"
                "#,
            ))
            .extract()
            .unwrap();

        assert_eq!(config.poll_interval_ms, 500);
        assert_eq!(config.memo_capacity, Some(64));
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, LogFormat::Pretty);
        // untouched keys keep their defaults
        assert_eq!(config.recv_timeout_ms, 3000);
    }
}
