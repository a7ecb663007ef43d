use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use serde::Deserialize;
use thiserror::Error;

use crate::store::VEHICLE_DATA_PATH;

pub const CONFIG_ENV_VAR: &str = "SPEED_MONITOR_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "speed-monitor.yaml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Deployment settings. Simulation thresholds are constants and not configurable.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub tick_period_ms: u64,
    pub command_addr: String,
    pub audio_alerts: bool,
    pub autostart: bool,
    pub store: StoreConfig,
    pub speech: SpeechConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tick_period_ms: 1000,
            command_addr: "127.0.0.1:7878".to_string(),
            audio_alerts: true,
            autostart: false,
            store: StoreConfig::Memory,
            speech: SpeechConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StoreConfig {
    Memory,
    Firebase {
        database_url: String,
        #[serde(default = "default_store_path")]
        path: String,
        #[serde(default)]
        auth_token: Option<String>,
        #[serde(default = "default_poll_interval_ms")]
        poll_interval_ms: u64,
        #[serde(default = "default_timeout_ms")]
        timeout_ms: u64,
    },
}

fn default_store_path() -> String {
    VEHICLE_DATA_PATH.to_string()
}

fn default_poll_interval_ms() -> u64 {
    2000
}

fn default_timeout_ms() -> u64 {
    5000
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SpeechConfig {
    /// espeak-compatible program; `null` uses the terminal notification only
    pub command: Option<String>,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            command: Some("espeak".to_string()),
        }
    }
}

impl Config {
    pub fn from_yaml(path: &Path, text: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(path, &text)
    }

    /// `$SPEED_MONITOR_CONFIG`, else `./speed-monitor.yaml` when present, else defaults.
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(path) = env::var(CONFIG_ENV_VAR) {
            return Self::from_file(Path::new(&path));
        }
        let local = Path::new(DEFAULT_CONFIG_FILE);
        if local.exists() {
            return Self::from_file(local);
        }
        Ok(Self::default())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_period_ms == 0 {
            return Err(ConfigError::Invalid("tick_period_ms must be positive".to_string()));
        }
        if let StoreConfig::Firebase { database_url, poll_interval_ms, .. } = &self.store {
            if !database_url.starts_with("https://") && !database_url.starts_with("http://") {
                return Err(ConfigError::Invalid(format!(
                    "database_url must be an http(s) URL, got {database_url}"
                )));
            }
            if *poll_interval_ms == 0 {
                return Err(ConfigError::Invalid("poll_interval_ms must be positive".to_string()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Result<Config, ConfigError> {
        Config::from_yaml(Path::new("test.yaml"), text)
    }

    #[test]
    fn empty_document_uses_defaults() {
        assert_eq!(parse("{}").unwrap(), Config::default());
    }

    #[test]
    fn firebase_store_with_defaults() {
        let config = parse(
            "store:\n  kind: firebase\n  database_url: https://example-rtdb.firebaseio.com\nspeech:\n  command: null\n",
        )
        .unwrap();
        match config.store {
            StoreConfig::Firebase { path, poll_interval_ms, timeout_ms, auth_token, .. } => {
                assert_eq!(path, "vehicleData");
                assert_eq!(poll_interval_ms, 2000);
                assert_eq!(timeout_ms, 5000);
                assert_eq!(auth_token, None);
            }
            other => panic!("unexpected store {other:?}"),
        }
        assert_eq!(config.speech.command, None);
    }

    #[test]
    fn rejects_zero_tick_period() {
        assert!(matches!(parse("tick_period_ms: 0"), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_non_http_database_url() {
        let err = parse("store:\n  kind: firebase\n  database_url: ftp://nope\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_unknown_fields() {
        assert!(matches!(parse("speed_limit: 80"), Err(ConfigError::Parse { .. })));
    }
}
