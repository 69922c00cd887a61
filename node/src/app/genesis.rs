use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::app::config::{BatchConfig, BatchConfigError};
use crate::app::forks::{ForkHeightOverride, ForkHeightOverrides, ForkHeights};
use crate::crypto::{Address, AddressError};

#[derive(Error, Debug)]
pub enum GenesisError {
    #[error("cannot parse genesis app state: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid keyper address: {0}")]
    InvalidKeyper(#[from] AddressError),
    #[error("invalid genesis keyper config: {0}")]
    InvalidConfig(#[from] BatchConfigError),
}

pub type Result<T> = std::result::Result<T, GenesisError>;

/// The initial keyper set, who bootstrap the chain by voting on the first real batch config.
///
/// Keyper addresses are accepted in any case and written in checksummed form.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenesisAppState {
    pub keypers: Vec<String>,
    pub threshold: u64,
    pub initial_eon: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fork_heights: Option<ForkHeights>,
    /// Per chain id overrides of the fork heights.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fork_overrides: BTreeMap<String, ForkHeightOverrides>,
}

impl GenesisAppState {
    pub fn new(keypers: &[Address], threshold: u64, initial_eon: u64) -> Self {
        GenesisAppState {
            keypers: keypers.iter().map(Address::to_checksum).collect(),
            threshold,
            initial_eon,
            fork_heights: None,
            fork_overrides: BTreeMap::new(),
        }
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn get_keypers(&self) -> Result<Vec<Address>> {
        Ok(self
            .keypers
            .iter()
            .map(|k| k.parse::<Address>())
            .collect::<std::result::Result<Vec<_>, _>>()?)
    }

    /// The genesis batch config: activation block 0, config index 0.
    pub fn batch_config(&self) -> Result<BatchConfig> {
        let config = BatchConfig {
            keyper_config_index: 0,
            activation_block_number: 0,
            threshold: self.threshold,
            keypers: self.get_keypers()?,
            started: false,
            validators_updated: false,
        };
        config.ensure_valid()?;
        Ok(config)
    }

    /// Missing fork heights disable every fork.
    pub fn fork_heights(&self) -> ForkHeights {
        match &self.fork_heights {
            Some(heights) => heights.clone(),
            None => {
                log::warn!("No fork heights in genesis, assuming all forks disabled");
                ForkHeights::all_disabled()
            }
        }
    }

    pub fn check_in_update_override(&self, chain_id: &str) -> Option<ForkHeightOverride> {
        self.fork_overrides
            .get(chain_id)
            .and_then(|overrides| overrides.check_in_update.clone())
    }
}

#[cfg(test)]
mod test {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn test_parse_minimal_genesis() {
        let json = br#"{
            "keypers": ["0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed"],
            "threshold": 1,
            "initialEon": 7
        }"#;
        let genesis = GenesisAppState::from_json(json).unwrap();
        let config = genesis.batch_config().unwrap();
        assert_eq!(
            config.keypers[0].to_checksum(),
            "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed"
        );
        assert_eq!(genesis.initial_eon, 7);
        assert_eq!(genesis.fork_heights(), ForkHeights::all_disabled());
    }

    #[test]
    fn test_parse_fork_settings() {
        let json = br#"{
            "keypers": ["0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed"],
            "threshold": 1,
            "initialEon": 0,
            "forkHeights": {"checkInUpdate": 10},
            "forkOverrides": {"shutter-test": {"checkInUpdate": {"eon": 3}}}
        }"#;
        let genesis = GenesisAppState::from_json(json).unwrap();
        assert_eq!(genesis.fork_heights().check_in_update, Some(10));
        assert_eq!(
            genesis.check_in_update_override("shutter-test"),
            Some(ForkHeightOverride {
                height: None,
                eon: Some(3)
            })
        );
        assert_eq!(genesis.check_in_update_override("other"), None);
    }

    #[test]
    fn test_invalid_genesis() {
        let genesis = GenesisAppState::new(&[Address::new([1; 20])], 2, 0);
        assert_matches!(
            genesis.batch_config(),
            Err(GenesisError::InvalidConfig(BatchConfigError::ThresholdTooHigh { .. }))
        );
        assert_matches!(
            GenesisAppState::from_json(b"{not json"),
            Err(GenesisError::Json(_))
        );
    }

    #[test]
    fn test_written_genesis_parses_back() {
        let genesis = GenesisAppState::new(&[Address::new([0xab; 20])], 1, 4);
        let json = genesis.to_json_pretty().unwrap();
        assert!(json.contains("initialEon"));
        assert_eq!(GenesisAppState::from_json(json.as_bytes()).unwrap(), genesis);
    }
}
