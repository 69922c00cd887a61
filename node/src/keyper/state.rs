//! The keyper's local mirror of the shuttermint state, rebuilt from events.

use std::collections::BTreeMap;

use k256::PublicKey;
use serde::{Deserialize, Serialize};

use crate::crypto::address::find_address_index;
use crate::crypto::Address;
use crate::dkg::PureDkg;
use crate::events;
use crate::storage::{Queries, StorageError};

/// A keyper config as announced by a batch config event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedConfig {
    pub keyper_config_index: u64,
    /// Shuttermint height of the announcing event.
    pub height: i64,
    pub activation_block_number: u64,
    pub threshold: u64,
    pub keypers: Vec<Address>,
    pub started: bool,
}

impl ObservedConfig {
    pub fn from_event(event: &events::BatchConfig) -> Self {
        ObservedConfig {
            keyper_config_index: event.keyper_config_index,
            height: event.height,
            activation_block_number: event.activation_block_number,
            threshold: event.threshold,
            keypers: event.keypers.clone(),
            started: false,
        }
    }

    pub fn keyper_index(&self, address: &Address) -> Option<u64> {
        find_address_index(&self.keypers, address).map(|i| i as u64)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedEon {
    pub eon: u64,
    /// Shuttermint height the eon started at. Its DKG phases count from here.
    pub height: i64,
    pub activation_block_number: u64,
    pub keyper_config_index: u64,
}

impl ObservedEon {
    pub fn from_event(event: &events::EonStarted) -> Self {
        ObservedEon {
            eon: event.eon,
            height: event.height,
            activation_block_number: event.activation_block_number,
            keyper_config_index: event.keyper_config_index,
        }
    }
}

/// A DKG the local keyper takes part in. Stored as one blob per eon.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveDkg {
    pub eon: u64,
    pub start_height: i64,
    pub keypers: Vec<Address>,
    pub pure: PureDkg,
}

impl ActiveDkg {
    pub fn keyper_index(&self, address: &Address) -> Option<u64> {
        find_address_index(&self.keypers, address).map(|i| i as u64)
    }

    pub fn keyper_address(&self, index: u64) -> Option<Address> {
        self.keypers.get(index as usize).copied()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ShuttermintState {
    pub configs: BTreeMap<u64, ObservedConfig>,
    pub eons: BTreeMap<u64, ObservedEon>,
    pub encryption_keys: BTreeMap<Address, PublicKey>,
    pub dkgs: BTreeMap<u64, ActiveDkg>,
}

impl ShuttermintState {
    pub fn load(queries: &Queries<'_>) -> Result<Self, StorageError> {
        let configs = queries
            .batch_configs()?
            .into_iter()
            .map(|c| (c.keyper_config_index, c))
            .collect();
        let eons = queries.eons()?.into_iter().map(|e| (e.eon, e)).collect();
        let encryption_keys = queries.encryption_keys()?.into_iter().collect();
        let dkgs = queries
            .dkg_records()?
            .into_iter()
            .map(|dkg| (dkg.eon, dkg))
            .collect();
        Ok(ShuttermintState {
            configs,
            eons,
            encryption_keys,
            dkgs,
        })
    }

    /// Writes the live DKG records. Everything else is written as it is observed.
    pub fn save(&self, queries: &Queries<'_>) -> Result<(), StorageError> {
        for dkg in self.dkgs.values() {
            queries.put_dkg_record(dkg)?;
        }
        Ok(())
    }
}
