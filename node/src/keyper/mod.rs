//! The keyper side: follows the shuttermint chain, runs the DKG and sends messages.

use std::time::Duration;

use thiserror::Error;

use crate::config::Configuration;
use crate::crypto::{Address, KeyPairError, KeyperKeypair, ValidatorPubkey};
use crate::dkg::PhaseLength;
use crate::shmsg::Message;
use crate::storage::{Queries, StorageError};

pub mod driver;
pub(crate) mod handlers;
pub mod rpc;
pub mod sender;
pub mod shutdown;
pub mod state;

pub use driver::{Observer, ObserverError};
pub use rpc::{BlockResults, BlockSource, ShuttermintClient};
pub use sender::{MessageSender, RecordingSender, RpcMessageSender, SenderError};

#[derive(Error, Debug)]
pub enum KeyperConfigError {
    #[error("Invalid {key} key: {source}")]
    Key {
        key: &'static str,
        source: KeyPairError,
    },
}

/// Everything the observer needs to know about the local keyper.
#[derive(Clone)]
pub struct KeyperConfig {
    pub signing_keypair: KeyperKeypair,
    pub encryption_key: k256::SecretKey,
    pub validator_public_key: ValidatorPubkey,
    pub phase_length: PhaseLength,
    pub dkg_start_block_delta: u64,
    pub poll_interval: Duration,
}

impl KeyperConfig {
    pub fn from_configuration(conf: &Configuration) -> Result<Self, KeyperConfigError> {
        let key_error = |key| move |source| KeyperConfigError::Key { key, source };
        Ok(KeyperConfig {
            signing_keypair: conf
                .keyper
                .signing_keypair()
                .map_err(key_error("signing"))?,
            encryption_key: conf
                .keyper
                .encryption_secret_key()
                .map_err(key_error("encryption"))?,
            validator_public_key: conf
                .keyper
                .validator_public_key()
                .map_err(key_error("validator"))?,
            phase_length: PhaseLength::constant(conf.shuttermint.dkg_phase_length),
            dkg_start_block_delta: conf.shuttermint.dkg_start_block_delta,
            poll_interval: conf.shuttermint.poll_interval(),
        })
    }

    pub fn address(&self) -> Address {
        self.signing_keypair.address()
    }
}

/// A keyper set to vote for, as announced on the main chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProposedConfig {
    pub keyper_config_index: u64,
    pub activation_block_number: u64,
    pub keypers: Vec<Address>,
    pub threshold: u64,
}

/// Schedules a vote for `proposal` once the main chain is within `delta` blocks of its
/// activation. Each config index is voted for at most once. Returns whether a vote was
/// scheduled.
pub fn schedule_batch_config(
    queries: &Queries<'_>,
    proposal: &ProposedConfig,
    main_chain_block: u64,
    delta: u64,
) -> Result<bool, StorageError> {
    if queries.last_batch_config_sent()? == Some(proposal.keyper_config_index) {
        return Ok(false);
    }
    if main_chain_block < proposal.activation_block_number
        && proposal.activation_block_number - main_chain_block > delta
    {
        log::info!(
            "Not yet voting for config {} (main chain block {}, activation {}, delta {})",
            proposal.keyper_config_index,
            main_chain_block,
            proposal.activation_block_number,
            delta
        );
        return Ok(false);
    }

    queries.set_last_batch_config_sent(proposal.keyper_config_index)?;
    queries.schedule_message(&Message::batch_config(
        proposal.keyper_config_index,
        proposal.activation_block_number,
        &proposal.keypers,
        proposal.threshold,
    ))?;
    Ok(true)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::storage::sqlite::test_utils::open_temp_db;

    fn proposal(index: u64) -> ProposedConfig {
        ProposedConfig {
            keyper_config_index: index,
            activation_block_number: 1000,
            keypers: vec![Address::new([1; 20]), Address::new([2; 20])],
            threshold: 2,
        }
    }

    #[test]
    fn test_schedule_batch_config_waits_for_delta() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_temp_db(&dir);
        let queries = db.queries();

        assert!(!schedule_batch_config(&queries, &proposal(1), 700, 200).unwrap());
        assert!(queries.scheduled_messages().unwrap().is_empty());

        assert!(schedule_batch_config(&queries, &proposal(1), 800, 200).unwrap());
        let scheduled = queries.scheduled_messages().unwrap();
        assert_eq!(scheduled.len(), 1);
        assert_eq!(
            scheduled[0].description,
            "new batch config (activation-block-number=1000, config-index=1)"
        );
    }

    #[test]
    fn test_schedule_batch_config_once_per_index() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_temp_db(&dir);
        let queries = db.queries();

        assert!(schedule_batch_config(&queries, &proposal(1), 1200, 200).unwrap());
        assert!(!schedule_batch_config(&queries, &proposal(1), 1200, 200).unwrap());
        assert!(schedule_batch_config(&queries, &proposal(2), 1200, 200).unwrap());
        assert_eq!(queries.scheduled_messages().unwrap().len(), 2);
    }
}
