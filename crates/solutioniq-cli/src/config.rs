use std::env;
use std::path::PathBuf;
use std::time::Duration;

use solutioniq_api::ApiClientConfig;
use solutioniq_stream::ChannelConfig;
use solutioniq_sync::{PollerConfig, SyncConfig};
use thiserror::Error;

pub const DEFAULT_API_URL: &str = "http://localhost:8000";
pub const DEFAULT_WS_URL: &str = "ws://localhost:8000/ws/stream";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub api_url: String,
    pub ws_url: String,
    pub api_token: Option<String>,
    pub request_timeout_ms: u64,
    pub reconnect_floor_ms: u64,
    pub reconnect_ceiling_ms: u64,
    pub poll_interval_ms: u64,
    pub poll_max_attempts: u32,
    pub preferences_path: PathBuf,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid SOLUTIONIQ_REQUEST_TIMEOUT_MS: {0}")]
    InvalidRequestTimeoutMs(String),
    #[error("invalid SOLUTIONIQ_RECONNECT_FLOOR_MS: {0}")]
    InvalidReconnectFloorMs(String),
    #[error("invalid SOLUTIONIQ_RECONNECT_CEILING_MS: {0}")]
    InvalidReconnectCeilingMs(String),
    #[error("invalid SOLUTIONIQ_POLL_INTERVAL_MS: {0}")]
    InvalidPollIntervalMs(String),
    #[error("invalid SOLUTIONIQ_POLL_MAX_ATTEMPTS: {0}")]
    InvalidPollMaxAttempts(String),
    #[error("invalid SOLUTIONIQ_WS_URL: {0}")]
    InvalidWsUrl(String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary variable source. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let api_url = var("SOLUTIONIQ_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let ws_url = var("SOLUTIONIQ_WS_URL").unwrap_or_else(|| DEFAULT_WS_URL.to_string());
        if !(ws_url.starts_with("ws://") || ws_url.starts_with("wss://")) {
            return Err(ConfigError::InvalidWsUrl(format!(
                "expected ws:// or wss:// URL, got {ws_url}"
            )));
        }
        let api_token = var("SOLUTIONIQ_API_TOKEN");

        let request_timeout_ms = positive_u64(
            var("SOLUTIONIQ_REQUEST_TIMEOUT_MS"),
            15_000,
            ConfigError::InvalidRequestTimeoutMs,
        )?;
        let reconnect_floor_ms = positive_u64(
            var("SOLUTIONIQ_RECONNECT_FLOOR_MS"),
            1_000,
            ConfigError::InvalidReconnectFloorMs,
        )?;
        let reconnect_ceiling_ms = positive_u64(
            var("SOLUTIONIQ_RECONNECT_CEILING_MS"),
            30_000,
            ConfigError::InvalidReconnectCeilingMs,
        )?;
        if reconnect_ceiling_ms < reconnect_floor_ms {
            return Err(ConfigError::InvalidReconnectCeilingMs(format!(
                "{reconnect_ceiling_ms} is below the reconnect floor {reconnect_floor_ms}"
            )));
        }
        let poll_interval_ms = positive_u64(
            var("SOLUTIONIQ_POLL_INTERVAL_MS"),
            2_000,
            ConfigError::InvalidPollIntervalMs,
        )?;
        let poll_max_attempts = match var("SOLUTIONIQ_POLL_MAX_ATTEMPTS") {
            None => 60,
            Some(raw) => match raw.parse::<u32>() {
                Ok(0) => {
                    return Err(ConfigError::InvalidPollMaxAttempts(
                        "must be greater than zero".to_string(),
                    ));
                }
                Ok(value) => value,
                Err(error) => return Err(ConfigError::InvalidPollMaxAttempts(error.to_string())),
            },
        };

        let preferences_path = var("SOLUTIONIQ_PREFERENCES_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| default_preferences_path(var("HOME")));

        Ok(Self {
            api_url,
            ws_url,
            api_token,
            request_timeout_ms,
            reconnect_floor_ms,
            reconnect_ceiling_ms,
            poll_interval_ms,
            poll_max_attempts,
            preferences_path,
        })
    }

    pub fn api_client_config(&self) -> ApiClientConfig {
        let mut config = ApiClientConfig::new(self.api_url.clone());
        config.timeout_ms = self.request_timeout_ms;
        match self.api_token.as_deref() {
            Some(token) => config.with_token(token),
            None => config,
        }
    }

    pub fn channel_config(&self) -> ChannelConfig {
        let mut config = ChannelConfig::new(
            self.ws_url.clone(),
            self.api_token.clone().unwrap_or_default(),
        );
        config.backoff_floor = Duration::from_millis(self.reconnect_floor_ms);
        config.backoff_ceiling = Duration::from_millis(self.reconnect_ceiling_ms);
        config
    }

    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            poller: PollerConfig {
                interval: Duration::from_millis(self.poll_interval_ms),
                max_attempts: self.poll_max_attempts,
            },
            ..SyncConfig::default()
        }
    }
}

fn positive_u64(
    raw: Option<String>,
    default: u64,
    error: fn(String) -> ConfigError,
) -> Result<u64, ConfigError> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    match raw.parse::<u64>() {
        Ok(0) => Err(error("must be greater than zero".to_string())),
        Ok(value) => Ok(value),
        Err(parse_error) => Err(error(parse_error.to_string())),
    }
}

fn default_preferences_path(home: Option<String>) -> PathBuf {
    match home {
        Some(home) => PathBuf::from(home)
            .join(".config")
            .join("solutioniq")
            .join("preferences.json"),
        None => PathBuf::from("solutioniq-preferences.json"),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::path::PathBuf;

    use super::{Config, ConfigError, DEFAULT_API_URL, DEFAULT_WS_URL};

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() -> Result<(), ConfigError> {
        let config = config_from(&[("HOME", "/home/ada")])?;
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert_eq!(config.ws_url, DEFAULT_WS_URL);
        assert_eq!(config.api_token, None);
        assert_eq!(config.request_timeout_ms, 15_000);
        assert_eq!(config.reconnect_floor_ms, 1_000);
        assert_eq!(config.reconnect_ceiling_ms, 30_000);
        assert_eq!(config.poll_interval_ms, 2_000);
        assert_eq!(config.poll_max_attempts, 60);
        assert_eq!(
            config.preferences_path,
            PathBuf::from("/home/ada/.config/solutioniq/preferences.json")
        );
        Ok(())
    }

    #[test]
    fn overrides_are_parsed_and_blank_values_ignored() -> Result<(), ConfigError> {
        let config = config_from(&[
            ("SOLUTIONIQ_API_URL", "https://api.example.com"),
            ("SOLUTIONIQ_WS_URL", "wss://api.example.com/ws/stream"),
            ("SOLUTIONIQ_API_TOKEN", "  "),
            ("SOLUTIONIQ_POLL_INTERVAL_MS", "500"),
            ("SOLUTIONIQ_POLL_MAX_ATTEMPTS", "10"),
            ("SOLUTIONIQ_PREFERENCES_PATH", "/tmp/prefs.json"),
        ])?;
        assert_eq!(config.api_url, "https://api.example.com");
        assert_eq!(config.api_token, None);
        assert_eq!(config.poll_interval_ms, 500);
        assert_eq!(config.poll_max_attempts, 10);
        assert_eq!(config.preferences_path, PathBuf::from("/tmp/prefs.json"));

        let sync = config.sync_config();
        assert_eq!(sync.poller.max_attempts, 10);
        assert_eq!(sync.poller.interval.as_millis(), 500);
        Ok(())
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(matches!(
            config_from(&[("SOLUTIONIQ_REQUEST_TIMEOUT_MS", "soon")]),
            Err(ConfigError::InvalidRequestTimeoutMs(_))
        ));
        assert!(matches!(
            config_from(&[("SOLUTIONIQ_POLL_MAX_ATTEMPTS", "0")]),
            Err(ConfigError::InvalidPollMaxAttempts(_))
        ));
        assert!(matches!(
            config_from(&[
                ("SOLUTIONIQ_RECONNECT_FLOOR_MS", "5000"),
                ("SOLUTIONIQ_RECONNECT_CEILING_MS", "1000"),
            ]),
            Err(ConfigError::InvalidReconnectCeilingMs(_))
        ));
        assert!(matches!(
            config_from(&[("SOLUTIONIQ_WS_URL", "http://localhost:8000/ws")]),
            Err(ConfigError::InvalidWsUrl(_))
        ));
    }

    #[test]
    fn token_flows_into_client_and_channel_configs() -> Result<(), ConfigError> {
        let config = config_from(&[("SOLUTIONIQ_API_TOKEN", "secret")])?;
        assert_eq!(config.api_client_config().token.as_deref(), Some("secret"));
        assert_eq!(config.channel_config().token, "secret");
        Ok(())
    }
}
