//! Server configuration types.
//!
//! The `orreryd` binary builds a [`ServerConfig`] from environment
//! variables; tests and embedders construct or deserialize one directly.

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

/// A configuration value could not be used.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A setting has an unusable value.
    #[error("invalid {name}: {reason}")]
    Invalid {
        /// The setting.
        name: &'static str,
        /// What was wrong with it.
        reason: String,
    },
}

/// Configuration for the API server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Listen address (e.g., "0.0.0.0:17070").
    #[serde(default = "ServerConfig::default_listen_addr")]
    pub listen_addr: String,

    /// Directory holding the `RocksDB` store.
    #[serde(default = "ServerConfig::default_data_dir")]
    pub data_dir: String,

    /// The model served. A fresh one is generated if not set.
    #[serde(default)]
    pub model_uuid: Option<Uuid>,

    /// Retries after the first conflicting attempt.
    #[serde(default = "ServerConfig::default_max_txn_retries")]
    pub max_txn_retries: u32,

    /// Agent tokens, as `token=tag[,token=tag...]`.
    #[serde(default)]
    pub agent_tokens: String,

    /// Maximum request body size in bytes.
    #[serde(default = "ServerConfig::default_max_body")]
    pub max_body_bytes: usize,

    /// Request timeout in seconds.
    #[serde(default = "ServerConfig::default_request_timeout")]
    pub request_timeout_seconds: u64,
}

impl ServerConfig {
    fn default_listen_addr() -> String {
        "0.0.0.0:17070".to_string()
    }

    fn default_data_dir() -> String {
        "/var/lib/orrery".to_string()
    }

    const fn default_max_txn_retries() -> u32 {
        3
    }

    const fn default_max_body() -> usize {
        1024 * 1024 // 1 MB
    }

    const fn default_request_timeout() -> u64 {
        30
    }

    /// Read settings from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if a variable is set to an unusable
    /// value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read settings through `lookup`, falling back to defaults for unset
    /// names.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if a value does not parse.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(addr) = lookup("LISTEN_ADDR") {
            config.listen_addr = addr;
        }
        if let Some(dir) = lookup("DATA_DIR") {
            config.data_dir = dir;
        }
        if let Some(uuid) = lookup("MODEL_UUID") {
            config.model_uuid = Some(parse("MODEL_UUID", &uuid)?);
        }
        if let Some(retries) = lookup("MAX_TXN_RETRIES") {
            config.max_txn_retries = parse("MAX_TXN_RETRIES", &retries)?;
        }
        if let Some(tokens) = lookup("AGENT_TOKENS") {
            config.agent_tokens = tokens;
        }
        if let Some(timeout) = lookup("REQUEST_TIMEOUT_SECONDS") {
            config.request_timeout_seconds = parse("REQUEST_TIMEOUT_SECONDS", &timeout)?;
        }
        Ok(config)
    }

    /// Get the request timeout as a `Duration`.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

fn parse<T>(name: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse::<T>().map_err(|err| ConfigError::Invalid {
        name,
        reason: err.to_string(),
    })
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: Self::default_listen_addr(),
            data_dir: Self::default_data_dir(),
            model_uuid: None,
            max_txn_retries: Self::default_max_txn_retries(),
            agent_tokens: String::new(),
            max_body_bytes: Self::default_max_body(),
            request_timeout_seconds: Self::default_request_timeout(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.listen_addr, "0.0.0.0:17070");
        assert_eq!(config.max_txn_retries, 3);
        assert_eq!(config.max_body_bytes, 1024 * 1024);
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn deserialize_fills_defaults() {
        let config: ServerConfig = serde_json::from_str(r#"{"max_txn_retries": 7}"#).unwrap();
        assert_eq!(config.max_txn_retries, 7);
        assert_eq!(config.request_timeout_seconds, 30);
        assert!(config.model_uuid.is_none());
    }

    #[test]
    fn lookup_overrides_defaults() {
        let env: HashMap<&str, &str> = [
            ("LISTEN_ADDR", "127.0.0.1:9000"),
            ("MODEL_UUID", "6ba7b810-9dad-11d1-80b4-00c04fd430c8"),
            ("MAX_TXN_RETRIES", "5"),
            ("AGENT_TOKENS", "t=machine-0"),
        ]
        .into_iter()
        .collect();
        let config =
            ServerConfig::from_lookup(|name| env.get(name).map(|v| (*v).to_string())).unwrap();

        assert_eq!(config.listen_addr, "127.0.0.1:9000");
        assert_eq!(config.max_txn_retries, 5);
        assert_eq!(config.agent_tokens, "t=machine-0");
        assert!(config.model_uuid.is_some());
        assert_eq!(config.data_dir, "/var/lib/orrery");
    }

    #[test]
    fn lookup_rejects_bad_numbers() {
        let err = ServerConfig::from_lookup(|name| {
            (name == "MAX_TXN_RETRIES").then(|| "lots".to_string())
        })
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "MAX_TXN_RETRIES", .. }));
    }
}
