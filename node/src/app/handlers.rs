//! Handlers for delivered messages.
//!
//! Every handler either applies its message and returns the events to emit,
//! or fails without touching the state. Failures become rejected transactions.

use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::PublicKey;
use thiserror::Error;

use crate::abci::types::ResponseDeliverTx;
use crate::abci::Event;
use crate::app::config::{BatchConfig, BatchConfigError, ConfigEquality, ConfigVoting};
use crate::app::dkg::DkgInstanceError;
use crate::app::messages::{
    parse_accusation, parse_apology, parse_poly_commitment, parse_poly_eval, MessageError,
};
use crate::app::voting::{Equals, VotingError};
use crate::app::ShutterApp;
use crate::crypto::{Address, ValidatorPubkey};
use crate::events::{self, AbciEvent};
use crate::shmsg;
use crate::shmsg::message::Payload;

#[derive(Error, Debug)]
pub enum DeliverError {
    #[error("Malformed BatchConfig message: {0}")]
    MalformedBatchConfig(BatchConfigError),
    #[error("checkConfig: {0}")]
    InvalidConfig(BatchConfigError),
    #[error("not allowed to vote on config changes")]
    NotAllowedToVote,
    #[error("Error adding vote: {0}")]
    Vote(#[from] VotingError),
    #[error("sender {0} already checked in")]
    AlreadyCheckedIn(Address),
    #[error("sender {0} is not a keyper")]
    NotAKeyper(Address),
    #[error("malformed validator public key: expected 32 bytes, got {0}")]
    MalformedValidatorKey(usize),
    #[error("malformed encryption public key: {0}")]
    MalformedEncryptionKey(String),
    #[error("cannot handle DKGResult message for eon {0}")]
    UnknownEon(u64),
    #[error("already voted on dkg result")]
    AlreadyVotedOnResult,
    #[error("Error: Failed to parse {kind} message: {source}")]
    Parse {
        kind: &'static str,
        source: MessageError,
    },
    #[error("Error: Received {0} message while DKG is not active")]
    DkgNotActive(&'static str),
    #[error("Error: Failed to register {kind} message: {source}")]
    Register {
        kind: &'static str,
        source: DkgInstanceError,
    },
}

pub type Result<T> = std::result::Result<T, DeliverError>;

const COMPRESSED_KEY_LENGTH: usize = 33;

impl ShutterApp {
    pub(crate) fn deliver_message(&mut self, payload: Payload, sender: Address) -> ResponseDeliverTx {
        let result = match &payload {
            Payload::BatchConfig(msg) => self.deliver_batch_config(msg, sender),
            Payload::CheckIn(msg) => self.deliver_check_in(msg, sender),
            Payload::BlockSeen(msg) => Ok(self.deliver_block_seen(msg, sender)),
            Payload::DkgResult(msg) => self.deliver_dkg_result(msg, sender),
            Payload::PolyEval(msg) => self.deliver_poly_eval(msg, sender),
            Payload::PolyCommitment(msg) => self.deliver_poly_commitment(msg, sender),
            Payload::Accusation(msg) => self.deliver_accusation(msg, sender),
            Payload::Apology(msg) => self.deliver_apology(msg, sender),
        };
        match result {
            Ok(events) => ResponseDeliverTx::ok(events),
            Err(err) => {
                log::debug!("Rejected message from {}: {}", sender, err);
                ResponseDeliverTx::rejected(err.to_string())
            }
        }
    }

    fn deliver_batch_config(&mut self, msg: &shmsg::BatchConfig, sender: Address) -> Result<Vec<Event>> {
        let config = BatchConfig::from_message(msg).map_err(DeliverError::MalformedBatchConfig)?;
        if ConfigEquality::equals(self.configs.last(), &config) {
            log::debug!(
                "Ignoring vote of {} for the current keyper config {}",
                sender,
                config.keyper_config_index
            );
            return Ok(vec![]);
        }
        self.configs
            .check(&config)
            .map_err(DeliverError::InvalidConfig)?;

        let current = self.configs.last();
        if !current.is_keyper(&sender) {
            return Err(DeliverError::NotAllowedToVote);
        }
        let threshold = current.threshold as usize;
        self.config_voting.add_vote(sender, config)?;

        let Some(adopted) = self.config_voting.outcome(threshold).cloned() else {
            return Ok(vec![]);
        };
        self.config_voting = ConfigVoting::new();
        self.configs
            .add(adopted.clone())
            .map_err(DeliverError::InvalidConfig)?;
        self.update_check_tx_members();

        let mut events = vec![adopted.to_event().make_abci_event()];
        let eon = self.start_dkg(adopted.clone());
        events.push(self.eon_started_event(eon, &adopted));
        Ok(events)
    }

    fn deliver_check_in(&mut self, msg: &shmsg::CheckIn, sender: Address) -> Result<Vec<Event>> {
        if self.identities.contains_key(&sender) && !self.is_check_in_update_active() {
            return Err(DeliverError::AlreadyCheckedIn(sender));
        }
        if !self.configs.is_keyper(&sender) {
            return Err(DeliverError::NotAKeyper(sender));
        }
        let validator_key = ValidatorPubkey::new(&msg.validator_public_key)
            .map_err(|_| DeliverError::MalformedValidatorKey(msg.validator_public_key.len()))?;
        if msg.encryption_public_key.len() != COMPRESSED_KEY_LENGTH {
            return Err(DeliverError::MalformedEncryptionKey(format!(
                "expected {} bytes, got {}",
                COMPRESSED_KEY_LENGTH,
                msg.encryption_public_key.len()
            )));
        }
        let encryption_key = PublicKey::from_sec1_bytes(&msg.encryption_public_key)
            .map_err(|err| DeliverError::MalformedEncryptionKey(err.to_string()))?;

        if let Some(previous) = self.identities.insert(sender, validator_key) {
            log::info!("Keyper {} replaced validator key {}", sender, previous);
        }
        self.encryption_keys.insert(
            sender,
            encryption_key.to_encoded_point(true).as_bytes().to_vec(),
        );

        let event = events::CheckIn {
            height: 0,
            sender,
            encryption_public_key: encryption_key,
        };
        Ok(vec![event.make_abci_event()])
    }

    fn deliver_block_seen(&mut self, msg: &shmsg::BlockSeen, sender: Address) -> Vec<Event> {
        let seen = self.blocks_seen.entry(sender).or_default();
        *seen = (*seen).max(msg.block_number);
        vec![]
    }

    fn deliver_dkg_result(&mut self, msg: &shmsg::DkgResult, sender: Address) -> Result<Vec<Event>> {
        let dkg = self
            .dkg_map
            .get_mut(&msg.eon)
            .ok_or(DeliverError::UnknownEon(msg.eon))?;
        dkg.add_success_vote(sender, msg.success)
            .map_err(|err| match err {
                DkgInstanceError::NotAKeyper(sender) => DeliverError::NotAKeyper(sender),
                _ => DeliverError::AlreadyVotedOnResult,
            })?;
        Ok(self.maybe_start_eon(msg.eon).into_iter().collect())
    }

    /// Retries the DKG of `eon` with the same config once enough keypers reported failure,
    /// unless a newer eon has started in the meantime.
    fn maybe_start_eon(&mut self, eon: u64) -> Option<Event> {
        let dkg = self.dkg_map.get(&eon)?;
        if dkg.outcome()? || self.eon_counter > eon {
            return None;
        }
        let config = dkg.config.clone();
        log::info!("DKG for eon {} failed, retrying", eon);
        let next_eon = self.start_dkg(config.clone());
        Some(self.eon_started_event(next_eon, &config))
    }

    fn deliver_poly_eval(&mut self, msg: &shmsg::PolyEval, sender: Address) -> Result<Vec<Event>> {
        const KIND: &str = "PolyEval";
        let event = parse_poly_eval(msg, sender).map_err(|source| DeliverError::Parse { kind: KIND, source })?;
        self.dkg_map
            .get_mut(&event.eon)
            .ok_or(DeliverError::DkgNotActive(KIND))?
            .register_poly_eval(&event)
            .map_err(|source| DeliverError::Register { kind: KIND, source })?;
        Ok(vec![event.make_abci_event()])
    }

    fn deliver_poly_commitment(&mut self, msg: &shmsg::PolyCommitment, sender: Address) -> Result<Vec<Event>> {
        const KIND: &str = "PolyCommitment";
        let event = parse_poly_commitment(msg, sender)
            .map_err(|source| DeliverError::Parse { kind: KIND, source })?;
        self.dkg_map
            .get_mut(&event.eon)
            .ok_or(DeliverError::DkgNotActive(KIND))?
            .register_poly_commitment(&event)
            .map_err(|source| DeliverError::Register { kind: KIND, source })?;
        Ok(vec![event.make_abci_event()])
    }

    fn deliver_accusation(&mut self, msg: &shmsg::Accusation, sender: Address) -> Result<Vec<Event>> {
        const KIND: &str = "Accusation";
        let event = parse_accusation(msg, sender).map_err(|source| DeliverError::Parse { kind: KIND, source })?;
        self.dkg_map
            .get_mut(&event.eon)
            .ok_or(DeliverError::DkgNotActive(KIND))?
            .register_accusation(&event)
            .map_err(|source| DeliverError::Register { kind: KIND, source })?;
        Ok(vec![event.make_abci_event()])
    }

    fn deliver_apology(&mut self, msg: &shmsg::Apology, sender: Address) -> Result<Vec<Event>> {
        const KIND: &str = "Apology";
        let event = parse_apology(msg, sender).map_err(|source| DeliverError::Parse { kind: KIND, source })?;
        self.dkg_map
            .get_mut(&event.eon)
            .ok_or(DeliverError::DkgNotActive(KIND))?
            .register_apology(&event)
            .map_err(|source| DeliverError::Register { kind: KIND, source })?;
        Ok(vec![event.make_abci_event()])
    }
}
