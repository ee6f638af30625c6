use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use alloy_primitives::{address, Address};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Escrow contract deployment the client talks to unless configured otherwise.
pub const DEFAULT_CONTRACT_ADDRESS: Address = address!("ed8F2aF05f40614bAA80A587158d06BB2104934a");

pub const DEFAULT_CONFIG_PATH: &str = "config/gig-escrow.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to access config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("unable to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("unable to encode config: {0}")]
    Encode(#[from] toml::ser::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    pub chain: ChainConfig,
    pub display: DisplayConfig,
    pub requests: RequestConfig,
    pub creation: CreationConfig,
    pub logging: LoggingConfig,
}

impl ClientConfig {
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads the file when it exists and falls back to defaults otherwise.
    pub fn load_or_default(path: &Path) -> ConfigResult<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
        let encoded = toml::to_string_pretty(self)?;
        fs::write(path, encoded).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.display.unit_decimals > 77 {
            return Err(ConfigError::Invalid(format!(
                "display.unit_decimals must be at most 77, got {}",
                self.display.unit_decimals
            )));
        }
        if self.display.utc_offset_minutes.abs() >= 24 * 60 {
            return Err(ConfigError::Invalid(
                "display.utc_offset_minutes must be within one day".into(),
            ));
        }
        crate::time_format::DeadlineFormatter::new(
            self.display.utc_offset_minutes,
            self.display.deadline_format.clone(),
        )
        .map_err(|err| ConfigError::Invalid(format!("display: {err}")))?;
        if self.requests.timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "requests.timeout_ms must be greater than zero".into(),
            ));
        }
        if self.requests.signal_poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "requests.signal_poll_interval_ms must be greater than zero".into(),
            ));
        }
        if self.creation.track_confirmations && self.creation.confirmation_poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "creation.confirmation_poll_interval_ms must be greater than zero".into(),
            ));
        }
        if let Some(endpoint) = &self.chain.rpc_endpoint {
            reqwest::Url::parse(endpoint).map_err(|err| {
                ConfigError::Invalid(format!("chain.rpc_endpoint {endpoint:?}: {err}"))
            })?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChainConfig {
    /// JSON-RPC endpoint of the wallet provider. Absent means no wallet capability.
    pub rpc_endpoint: Option<String>,
    /// Chain the escrow contract is deployed on. Unchecked when absent.
    pub chain_id: Option<u64>,
    pub contract_address: Address,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            rpc_endpoint: None,
            chain_id: None,
            contract_address: DEFAULT_CONTRACT_ADDRESS,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DisplayConfig {
    pub unit_symbol: String,
    pub unit_decimals: u8,
    pub utc_offset_minutes: i32,
    pub deadline_format: String,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            unit_symbol: "BNB".to_owned(),
            unit_decimals: 18,
            utc_offset_minutes: 0,
            deadline_format: crate::time_format::DEFAULT_DEADLINE_FORMAT.to_owned(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RequestConfig {
    pub timeout_ms: u64,
    pub signal_poll_interval_ms: u64,
}

impl RequestConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn signal_poll_interval(&self) -> Duration {
        Duration::from_millis(self.signal_poll_interval_ms)
    }
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 15_000,
            signal_poll_interval_ms: 2_000,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CreationConfig {
    pub validate_before_submit: bool,
    pub track_confirmations: bool,
    pub confirmation_poll_interval_ms: u64,
    pub confirmation_max_attempts: u32,
}

impl CreationConfig {
    pub fn confirmation_poll_interval(&self) -> Duration {
        Duration::from_millis(self.confirmation_poll_interval_ms)
    }
}

impl Default for CreationConfig {
    fn default() -> Self {
        Self {
            validate_before_submit: true,
            track_confirmations: true,
            confirmation_poll_interval_ms: 2_000,
            confirmation_max_attempts: 30,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: "compact".to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_target_the_known_deployment_without_wallet() {
        let config = ClientConfig::default();
        assert!(config.chain.rpc_endpoint.is_none());
        assert_eq!(config.chain.contract_address, DEFAULT_CONTRACT_ADDRESS);
        assert_eq!(config.display.unit_symbol, "BNB");
        assert_eq!(config.display.unit_decimals, 18);
        assert!(config.creation.validate_before_submit);
        config.validate().expect("defaults are valid");
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("nested").join("client.toml");

        let mut config = ClientConfig::default();
        config.chain.rpc_endpoint = Some("http://127.0.0.1:8545".into());
        config.chain.chain_id = Some(97);
        config.display.utc_offset_minutes = 120;
        config.creation.track_confirmations = false;
        config.save(&path).expect("save config");

        let restored = ClientConfig::load(&path).expect("load config");
        assert_eq!(restored, config);
    }

    #[test]
    fn partial_files_fill_in_defaults() {
        let config: ClientConfig = toml::from_str(
            r#"
            [chain]
            rpc_endpoint = "http://localhost:8545"

            [display]
            unit_symbol = "ETH"
            "#,
        )
        .expect("parse partial config");
        assert_eq!(config.display.unit_symbol, "ETH");
        assert_eq!(config.display.unit_decimals, 18);
        assert_eq!(config.requests, RequestConfig::default());
        assert_eq!(config.chain.contract_address, DEFAULT_CONTRACT_ADDRESS);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = TempDir::new().expect("tempdir");
        let config =
            ClientConfig::load_or_default(&dir.path().join("absent.toml")).expect("defaults");
        assert_eq!(config, ClientConfig::default());
    }

    #[test]
    fn rejects_invalid_endpoint_and_zero_timeout() {
        let mut config = ClientConfig::default();
        config.chain.rpc_endpoint = Some("not a url".into());
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = ClientConfig::default();
        config.requests.timeout_ms = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_unrenderable_deadline_format() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("client.toml");
        std::fs::write(&path, "[display]\ndeadline_format = \"%Q\"\n").expect("write config");

        match ClientConfig::load(&path) {
            Err(ConfigError::Invalid(reason)) => assert!(reason.contains("%Q"), "{reason}"),
            other => panic!("expected invalid config, got {other:?}"),
        }
    }
}
