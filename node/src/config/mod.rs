//! Node settings, stored as TOML under `~/.shuttermint/<name>/shuttermint.toml`.

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::{KeyPairError, KeyperKeypair, ValidatorPubkey};
use crate::utilities::from_hex;

pub const DEFAULT_SHUTTERMINT_URL: &str = "http://localhost:26657";
pub const DEFAULT_DKG_PHASE_LENGTH: i64 = 30;
pub const DEFAULT_DKG_START_BLOCK_DELTA: u64 = 200;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_PERSIST_MIN_DURATION_MS: u64 = 30_000;

const ROOT_DIR: &str = ".shuttermint";
const CONFIG_FILE: &str = "shuttermint.toml";

#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("Configuration file does not exist: '{0}'")]
    DoesNotExist(String),
    #[error("ParsingFailed: {0}")]
    ParsingFailed(#[from] config::ConfigError),
    #[error("TomlError: {0}")]
    TomlError(#[from] toml::ser::Error),
    #[error("IoError: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Invalid setting {setting}: {reason}")]
    InvalidSetting {
        setting: &'static str,
        reason: String,
    },
    #[error("Home directory not found")]
    NoHomeDir,
}

pub type Result<T> = std::result::Result<T, ConfigurationError>;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Configuration {
    pub app: AppConfiguration,
    pub keyper: KeyperConfiguration,
    pub shuttermint: ShuttermintConfiguration,
    pub storage: StorageConfiguration,
}

/// Settings of the replicated state machine.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AppConfiguration {
    pub snapshot_path: String,
    /// Zero persists on every commit.
    #[serde(default = "default_persist_min_duration_ms")]
    pub persist_min_duration_ms: u64,
    #[serde(default)]
    pub dev_mode: bool,
}

/// Keys of the local keyper. All hex encoded.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct KeyperConfiguration {
    pub signing_key: String,
    pub encryption_key: String,
    pub validator_public_key: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ShuttermintConfiguration {
    #[serde(default = "default_url")]
    pub url: String,
    #[serde(default = "default_dkg_phase_length")]
    pub dkg_phase_length: i64,
    #[serde(default = "default_dkg_start_block_delta")]
    pub dkg_start_block_delta: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StorageConfiguration {
    pub sqlite_path: String,
    #[serde(default)]
    pub create_if_not_exists: bool,
}

fn default_persist_min_duration_ms() -> u64 {
    DEFAULT_PERSIST_MIN_DURATION_MS
}

fn default_url() -> String {
    DEFAULT_SHUTTERMINT_URL.to_string()
}

fn default_dkg_phase_length() -> i64 {
    DEFAULT_DKG_PHASE_LENGTH
}

fn default_dkg_start_block_delta() -> u64 {
    DEFAULT_DKG_START_BLOCK_DELTA
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

impl Default for ShuttermintConfiguration {
    fn default() -> Self {
        ShuttermintConfiguration {
            url: default_url(),
            dkg_phase_length: DEFAULT_DKG_PHASE_LENGTH,
            dkg_start_block_delta: DEFAULT_DKG_START_BLOCK_DELTA,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl AppConfiguration {
    pub fn persist_min_duration(&self) -> Duration {
        Duration::from_millis(self.persist_min_duration_ms)
    }
}

impl KeyperConfiguration {
    pub fn signing_keypair(&self) -> std::result::Result<KeyperKeypair, KeyPairError> {
        KeyperKeypair::from_hex(&self.signing_key)
    }

    pub fn encryption_secret_key(&self) -> std::result::Result<k256::SecretKey, KeyPairError> {
        let bytes = from_hex(&self.encryption_key).map_err(|_| KeyPairError::PrivateKey)?;
        k256::SecretKey::from_slice(&bytes).map_err(|_| KeyPairError::PrivateKey)
    }

    pub fn validator_public_key(&self) -> std::result::Result<ValidatorPubkey, KeyPairError> {
        let bytes = from_hex(&self.validator_public_key).map_err(|_| KeyPairError::PublicKey)?;
        ValidatorPubkey::new(&bytes)
    }
}

impl ShuttermintConfiguration {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Configuration {
    pub fn try_load<I: Into<PathBuf>>(path: I) -> Result<Configuration> {
        let path = path.into();
        if !path.exists() {
            return Err(ConfigurationError::DoesNotExist(
                path.display().to_string(),
            ));
        }
        let config = config::Config::builder()
            .add_source(config::File::from(path))
            .build()?;

        let configuration: Configuration = config.try_deserialize()?;
        configuration.validate()?;
        Ok(configuration)
    }

    pub fn try_load_from_home_dir(node_name: &str) -> Result<Configuration> {
        let path = Self::config_file_path(node_name)?;
        Configuration::try_load(path)
    }

    pub fn try_write<I: Into<PathBuf>>(&self, path: I) -> Result<()> {
        let path = path.into();
        let config = toml::to_string(&self)?;
        let config = format!(
            "#This file is generated by cli and automatically overwritten every time when cli is run\n{config}",
        );

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::fs::File::create(path)?;
        file.write_all(config.as_bytes())?;
        Ok(())
    }

    pub fn try_write_home_dir(&self, node_name: &str) -> Result<()> {
        let path = Self::config_file_path(node_name)?;
        self.try_write(path)
    }

    pub fn root_dir() -> Result<PathBuf> {
        dirs::home_dir()
            .map(|home| home.join(ROOT_DIR))
            .ok_or(ConfigurationError::NoHomeDir)
    }

    pub fn config_file_path(node_name: &str) -> Result<PathBuf> {
        Ok(Self::root_dir()?.join(node_name).join(CONFIG_FILE))
    }

    fn validate(&self) -> Result<()> {
        if self.shuttermint.dkg_phase_length < 0 {
            return Err(ConfigurationError::InvalidSetting {
                setting: "shuttermint.dkg_phase_length",
                reason: format!("must not be negative, got {}", self.shuttermint.dkg_phase_length),
            });
        }
        if self.shuttermint.poll_interval_ms == 0 {
            return Err(ConfigurationError::InvalidSetting {
                setting: "shuttermint.poll_interval_ms",
                reason: "must be positive".to_string(),
            });
        }
        Ok(())
    }
}
