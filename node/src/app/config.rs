use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::app::voting::{Equals, Voting};
use crate::crypto::address::{ensure_unique_addresses, find_address_index};
use crate::crypto::Address;
use crate::events;
use crate::shmsg;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BatchConfigError {
    #[error("no keypers in batch config")]
    NoKeypers,
    #[error("threshold must not be zero")]
    ZeroThreshold,
    #[error("threshold too high ({threshold} > {keypers} keypers)")]
    ThresholdTooHigh { threshold: u64, keypers: usize },
    #[error("keyper address has invalid length")]
    InvalidAddress,
    #[error("duplicate keyper address {0}")]
    DuplicateKeyper(Address),
    #[error("start activation block number of next config ({next}) lower than current one ({current})")]
    ActivationBlockDecreased { next: u64, current: u64 },
    #[error("config index of next config ({next}) not greater than current one ({current})")]
    IndexNotIncreasing { next: u64, current: u64 },
}

pub type Result<T> = std::result::Result<T, BatchConfigError>;

/// A keyper set together with the block from which on it is responsible.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchConfig {
    pub keyper_config_index: u64,
    pub activation_block_number: u64,
    pub threshold: u64,
    pub keypers: Vec<Address>,
    pub started: bool,
    pub validators_updated: bool,
}

impl BatchConfig {
    /// Extracts the config carried by a vote. `started` and `validators_updated` are false.
    pub fn from_message(msg: &shmsg::BatchConfig) -> Result<Self> {
        let keypers = msg
            .keypers
            .iter()
            .map(|bytes| Address::from_slice(bytes).map_err(|_| BatchConfigError::InvalidAddress))
            .collect::<Result<Vec<_>>>()?;
        ensure_unique_addresses(&keypers).map_err(BatchConfigError::DuplicateKeyper)?;

        Ok(BatchConfig {
            keyper_config_index: msg.keyper_config_index,
            activation_block_number: msg.activation_block_number,
            threshold: msg.threshold,
            keypers,
            started: false,
            validators_updated: false,
        })
    }

    pub fn ensure_valid(&self) -> Result<()> {
        if self.keypers.is_empty() {
            return Err(BatchConfigError::NoKeypers);
        }
        if self.threshold == 0 {
            return Err(BatchConfigError::ZeroThreshold);
        }
        if self.threshold > self.keypers.len() as u64 {
            return Err(BatchConfigError::ThresholdTooHigh {
                threshold: self.threshold,
                keypers: self.keypers.len(),
            });
        }
        Ok(())
    }

    pub fn keyper_index(&self, address: &Address) -> Option<u64> {
        find_address_index(&self.keypers, address).map(|i| i as u64)
    }

    pub fn is_keyper(&self, address: &Address) -> bool {
        self.keyper_index(address).is_some()
    }

    pub fn to_event(&self) -> events::BatchConfig {
        events::BatchConfig {
            height: 0,
            activation_block_number: self.activation_block_number,
            threshold: self.threshold,
            keypers: self.keypers.clone(),
            keyper_config_index: self.keyper_config_index,
        }
    }
}

/// Field by field comparison of every vote relevant config field.
#[derive(Default, Clone, Debug, PartialEq, Eq)]
pub struct ConfigEquality;

impl Equals<BatchConfig> for ConfigEquality {
    fn equals(a: &BatchConfig, b: &BatchConfig) -> bool {
        a.keyper_config_index == b.keyper_config_index
            && a.activation_block_number == b.activation_block_number
            && a.threshold == b.threshold
            && a.keypers == b.keypers
            && a.started == b.started
            && a.validators_updated == b.validators_updated
    }
}

pub type ConfigVoting = Voting<BatchConfig, ConfigEquality>;

/// Append-only list of adopted configs, starting with an empty sentinel config.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigRegistry {
    configs: Vec<BatchConfig>,
}

impl Default for ConfigRegistry {
    fn default() -> Self {
        ConfigRegistry {
            configs: vec![BatchConfig::default()],
        }
    }
}

impl ConfigRegistry {
    /// Replaces the sentinel with the genesis config.
    pub fn with_genesis(config: BatchConfig) -> Self {
        ConfigRegistry {
            configs: vec![config],
        }
    }

    /// True as long as only the empty sentinel config is present.
    pub fn is_empty(&self) -> bool {
        self.configs.len() == 1 && self.configs[0].keypers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.configs.len()
    }

    /// # Panics
    ///
    /// Panics if the registry has no configs. It always starts with one and never shrinks.
    pub fn last(&self) -> &BatchConfig {
        self.configs
            .last()
            .expect("internal error: config list is empty")
    }

    pub fn first(&self) -> &BatchConfig {
        self.configs
            .first()
            .expect("internal error: config list is empty")
    }

    pub fn get(&self, index: usize) -> Option<&BatchConfig> {
        self.configs.get(index)
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &BatchConfig> {
        self.configs.iter()
    }

    pub(crate) fn get_mut(&mut self, index: usize) -> Option<&mut BatchConfig> {
        self.configs.get_mut(index)
    }

    pub fn find_by_index(&self, keyper_config_index: u64) -> Option<&BatchConfig> {
        self.configs
            .iter()
            .find(|c| c.keyper_config_index == keyper_config_index)
    }

    /// Checks whether `config` could be appended.
    pub fn check(&self, config: &BatchConfig) -> Result<()> {
        config.ensure_valid()?;
        let last = self.last();
        if config.activation_block_number < last.activation_block_number {
            return Err(BatchConfigError::ActivationBlockDecreased {
                next: config.activation_block_number,
                current: last.activation_block_number,
            });
        }
        if config.keyper_config_index <= last.keyper_config_index {
            return Err(BatchConfigError::IndexNotIncreasing {
                next: config.keyper_config_index,
                current: last.keyper_config_index,
            });
        }
        Ok(())
    }

    pub fn add(&mut self, config: BatchConfig) -> Result<()> {
        self.check(&config)?;
        log::info!(
            "Adding keyper config {} activating at block {}",
            config.keyper_config_index,
            config.activation_block_number
        );
        self.configs.push(config);
        Ok(())
    }

    /// Whether `address` is a keyper in any config, current or past.
    pub fn is_keyper(&self, address: &Address) -> bool {
        self.configs.iter().any(|c| c.is_keyper(address))
    }

    /// Union of all keypers ever configured. May contain duplicates.
    pub fn all_keypers(&self) -> Vec<Address> {
        self.configs
            .iter()
            .flat_map(|c| c.keypers.iter().copied())
            .collect()
    }
}

#[cfg(test)]
mod test {
    use assert_matches::assert_matches;

    use super::*;

    fn addr(b: u8) -> Address {
        Address::new([b; 20])
    }

    fn config(index: u64, activation: u64, threshold: u64, n: u8) -> BatchConfig {
        BatchConfig {
            keyper_config_index: index,
            activation_block_number: activation,
            threshold,
            keypers: (1..=n).map(addr).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_ensure_valid() {
        assert_matches!(config(1, 0, 1, 0).ensure_valid(), Err(BatchConfigError::NoKeypers));
        assert_matches!(config(1, 0, 0, 2).ensure_valid(), Err(BatchConfigError::ZeroThreshold));
        assert_matches!(
            config(1, 0, 3, 2).ensure_valid(),
            Err(BatchConfigError::ThresholdTooHigh { .. })
        );
        assert!(config(1, 0, 2, 2).ensure_valid().is_ok());
    }

    #[test]
    fn test_from_message_rejects_duplicates_and_short_addresses() {
        let mut msg = shmsg::BatchConfig {
            activation_block_number: 10,
            keypers: vec![addr(1).to_vec(), addr(1).to_vec()],
            threshold: 1,
            keyper_config_index: 1,
        };
        assert_matches!(
            BatchConfig::from_message(&msg),
            Err(BatchConfigError::DuplicateKeyper(_))
        );
        msg.keypers = vec![vec![1; 19]];
        assert_matches!(
            BatchConfig::from_message(&msg),
            Err(BatchConfigError::InvalidAddress)
        );
        msg.keypers = vec![addr(1).to_vec(), addr(2).to_vec()];
        let bc = BatchConfig::from_message(&msg).unwrap();
        assert_eq!(bc.keyper_index(&addr(2)), Some(1));
        assert!(!bc.started);
    }

    #[test]
    fn test_registry_ordering_rules() {
        let mut registry = ConfigRegistry::with_genesis(config(0, 0, 2, 3));
        assert_matches!(
            registry.add(config(0, 10, 2, 3)),
            Err(BatchConfigError::IndexNotIncreasing { .. })
        );
        registry.add(config(1, 10, 2, 3)).unwrap();
        assert_matches!(
            registry.add(config(2, 9, 2, 3)),
            Err(BatchConfigError::ActivationBlockDecreased { .. })
        );
        // equal activation block numbers are allowed
        registry.add(config(2, 10, 2, 4)).unwrap();
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.last().keyper_config_index, 2);
        assert!(registry.is_keyper(&addr(4)));
        assert!(!registry.is_keyper(&addr(5)));
    }

    #[test]
    fn test_registry_iterates_from_latest() {
        let mut registry = ConfigRegistry::with_genesis(config(0, 0, 2, 3));
        registry.add(config(1, 10, 2, 3)).unwrap();
        registry.add(config(2, 20, 2, 3)).unwrap();
        let indices: Vec<u64> = registry.iter().rev().map(|c| c.keyper_config_index).collect();
        assert_eq!(indices, vec![2, 1, 0]);
    }

    #[test]
    fn test_sentinel() {
        let registry = ConfigRegistry::default();
        assert!(registry.is_empty());
        assert_eq!(registry.last(), &BatchConfig::default());
    }

    #[test]
    fn test_config_equality_covers_flags() {
        let a = config(1, 10, 2, 3);
        let mut b = a.clone();
        assert!(ConfigEquality::equals(&a, &b));
        b.started = true;
        assert!(!ConfigEquality::equals(&a, &b));
    }
}
