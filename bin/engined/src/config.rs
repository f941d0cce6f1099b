//! Daemon configuration.
//!
//! Strongly-typed configuration loaded via the `config` crate from
//! environment variables with `__` separators, e.g. `NATS__URL` or
//! `ENGINE__RELOAD_INTERVAL_SECONDS`.

use homeflow_engine::EngineConfig;
use serde::Deserialize;
use std::time::Duration;

/// Top-level daemon configuration.
#[derive(Debug, Deserialize)]
pub struct DaemonConfig {
    /// PostgreSQL connection URL.
    pub database_url: String,

    /// NATS connection settings.
    #[serde(default)]
    pub nats: NatsSettings,

    /// Email sender settings.
    #[serde(default)]
    pub mail: MailSettings,

    /// Engine tuning knobs.
    #[serde(default)]
    pub engine: EngineSettings,
}

/// NATS connection settings.
#[derive(Debug, Clone, Deserialize)]
pub struct NatsSettings {
    /// Server URL (e.g. "nats://localhost:4222").
    #[serde(default = "default_nats_url")]
    pub url: String,
}

fn default_nats_url() -> String {
    "nats://localhost:4222".to_string()
}

impl Default for NatsSettings {
    fn default() -> Self {
        Self {
            url: default_nats_url(),
        }
    }
}

/// Email sender settings.
#[derive(Debug, Clone, Deserialize)]
pub struct MailSettings {
    /// Base URL of the notification service.
    #[serde(default = "default_mail_base_url")]
    pub base_url: String,
}

fn default_mail_base_url() -> String {
    "http://localhost:8025".to_string()
}

impl Default for MailSettings {
    fn default() -> Self {
        Self {
            base_url: default_mail_base_url(),
        }
    }
}

/// Engine tuning knobs, mirrored into [`EngineConfig`].
#[derive(Debug, Clone, Deserialize)]
pub struct EngineSettings {
    /// Topic namespace for device traffic.
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Seconds between workflow catalog reloads.
    #[serde(default = "default_reload_interval_seconds")]
    pub reload_interval_seconds: u64,

    /// Seconds between pending-correlation sweeps.
    #[serde(default = "default_prune_interval_seconds")]
    pub prune_interval_seconds: u64,

    /// Correlation lifetime when a node does not specify one.
    #[serde(default = "default_result_timeout_seconds")]
    pub default_result_timeout_seconds: i64,

    /// Seed cooldowns at startup to absorb retained-delivery bursts.
    #[serde(default)]
    pub warm_cooldowns_on_start: bool,
}

fn default_namespace() -> String {
    "homeflow".to_string()
}

fn default_reload_interval_seconds() -> u64 {
    10
}

fn default_prune_interval_seconds() -> u64 {
    60
}

fn default_result_timeout_seconds() -> i64 {
    15
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            reload_interval_seconds: default_reload_interval_seconds(),
            prune_interval_seconds: default_prune_interval_seconds(),
            default_result_timeout_seconds: default_result_timeout_seconds(),
            warm_cooldowns_on_start: false,
        }
    }
}

impl EngineSettings {
    /// Converts the settings into the engine's config type.
    #[must_use]
    pub fn to_engine_config(&self) -> EngineConfig {
        EngineConfig {
            namespace: self.namespace.clone(),
            reload_interval: Duration::from_secs(self.reload_interval_seconds),
            prune_interval: Duration::from_secs(self.prune_interval_seconds),
            default_result_timeout_sec: self.default_result_timeout_seconds,
            warm_cooldowns_on_start: self.warm_cooldowns_on_start,
        }
    }
}

impl DaemonConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required configuration is missing or invalid.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(
                config::Environment::default()
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_settings_have_spec_defaults() {
        let settings = EngineSettings::default();
        assert_eq!(settings.reload_interval_seconds, 10);
        assert_eq!(settings.prune_interval_seconds, 60);
        assert_eq!(settings.default_result_timeout_seconds, 15);
        assert!(!settings.warm_cooldowns_on_start);
    }

    #[test]
    fn engine_settings_convert_to_engine_config() {
        let settings = EngineSettings {
            namespace: "hf".to_string(),
            reload_interval_seconds: 5,
            ..EngineSettings::default()
        };
        let config = settings.to_engine_config();
        assert_eq!(config.namespace, "hf");
        assert_eq!(config.reload_interval, Duration::from_secs(5));
    }
}
