//! Engine configuration.

use std::{env, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Port used when the caller supplies none or an unparseable one.
pub const DEFAULT_PORT: u16 = 50001;

/// Configuration error.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
}

/// Tunables for the session engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Delay between polling ticks.
    #[serde(with = "millis")]
    pub poll_interval: Duration,
    /// Port used when none is given.
    pub default_port: u16,
    /// Per-request timeout applied by network transports.
    #[serde(with = "millis")]
    pub request_timeout: Duration,
    /// Maximum number of in-flight sends per broadcast.
    pub broadcast_concurrency: usize,
    /// Prepended to broadcast bodies.
    pub broadcast_prefix: String,
    /// Capacity of the engine event channel.
    pub event_buffer: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            default_port: DEFAULT_PORT,
            request_timeout: Duration::from_secs(10),
            broadcast_concurrency: 16,
            broadcast_prefix: "[Broadcast] ".to_owned(),
            event_buffer: 256,
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by `POLLCHAT_*` environment variables.
    ///
    /// # Errors
    /// Returns error if a variable is set but does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`Self::from_env`] with an explicit variable source.
    ///
    /// # Errors
    /// Returns error if a variable is set but does not parse.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(ms) = parse_var::<u64>(&lookup, "POLLCHAT_POLL_INTERVAL_MS")? {
            config.poll_interval = Duration::from_millis(ms.max(1));
        }
        if let Some(port) = parse_var(&lookup, "POLLCHAT_DEFAULT_PORT")? {
            config.default_port = port;
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "POLLCHAT_REQUEST_TIMEOUT_MS")? {
            config.request_timeout = Duration::from_millis(ms);
        }
        if let Some(limit) = parse_var::<usize>(&lookup, "POLLCHAT_BROADCAST_CONCURRENCY")? {
            config.broadcast_concurrency = limit.max(1);
        }

        Ok(config)
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError> {
    let Some(value) = lookup(key).filter(|v| !v.trim().is_empty()) else {
        return Ok(None);
    };
    value
        .trim()
        .parse()
        .map(Some)
        .map_err(|_| ConfigError::InvalidValue { key, value })
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_match_service_conventions() {
        let config = EngineConfig::default();
        assert_eq!(config.poll_interval, Duration::from_secs(2));
        assert_eq!(config.default_port, 50001);
        assert_eq!(config.broadcast_prefix, "[Broadcast] ");
    }

    #[test]
    fn env_overrides_defaults() {
        let config = EngineConfig::from_lookup(lookup(&[
            ("POLLCHAT_POLL_INTERVAL_MS", "500"),
            ("POLLCHAT_DEFAULT_PORT", "8080"),
            ("POLLCHAT_BROADCAST_CONCURRENCY", "0"),
        ]))
        .unwrap();
        assert_eq!(config.poll_interval, Duration::from_millis(500));
        assert_eq!(config.default_port, 8080);
        assert_eq!(config.broadcast_concurrency, 1);
        assert_eq!(config.request_timeout, Duration::from_secs(10));
    }

    #[test]
    fn rejects_malformed_values() {
        let err = EngineConfig::from_lookup(lookup(&[("POLLCHAT_DEFAULT_PORT", "huge")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidValue {
                key: "POLLCHAT_DEFAULT_PORT",
                value: "huge".into()
            }
        );
    }

    #[test]
    fn deserializes_partial_json() {
        let config: EngineConfig = serde_json::from_str(r#"{"poll_interval": 250}"#).unwrap();
        assert_eq!(config.poll_interval, Duration::from_millis(250));
        assert_eq!(config.default_port, DEFAULT_PORT);
    }
}
