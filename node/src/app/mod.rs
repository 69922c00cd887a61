//! The shuttermint replicated state machine.
//!
//! [`ShutterApp`] keeps the keyper configs, the DKG bookkeeping of every eon,
//! keyper identities and the consensus validator set. It is driven by the
//! consensus engine through the [`Application`] trait and must stay fully
//! deterministic: all maps are ordered and nothing reads the clock, except
//! for deciding when to write a snapshot.

pub mod config;
pub mod dkg;
pub mod forks;
pub mod genesis;
pub(crate) mod handlers;
pub mod messages;
pub mod nonce;
pub mod persist;
pub mod powermap;
pub mod quorum;
pub mod voting;

#[cfg(test)]
pub(crate) mod testing;

use std::collections::BTreeMap;

use k256::PublicKey;
use serde::{Deserialize, Serialize};

use crate::abci::application::Result;
use crate::abci::types::{
    RequestBeginBlock, RequestCheckTx, RequestDeliverTx, RequestEndBlock, RequestInfo,
    RequestInitChain, ResponseBeginBlock, ResponseCheckTx, ResponseCommit, ResponseDeliverTx,
    ResponseEndBlock, ResponseInfo, ResponseInitChain,
};
use crate::abci::{Application, ApplicationError, Event};
use crate::app::config::{BatchConfig, ConfigRegistry, ConfigVoting};
use crate::app::dkg::DkgInstance;
use crate::app::forks::{is_fork_active, ForkHeightOverride, ForkHeights};
use crate::app::genesis::GenesisAppState;
use crate::app::nonce::{CheckTxState, NonceTracker};
use crate::app::persist::Persister;
use crate::app::powermap::Powermap;
use crate::app::quorum::num_required_transition_validators;
use crate::crypto::{Address, ValidatorPubkey};
use crate::events::{AbciEvent, BatchConfigStarted, EonStarted};
use crate::shmsg::decode_tx;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ShutterApp {
    pub(crate) configs: ConfigRegistry,
    pub(crate) dkg_map: BTreeMap<u64, DkgInstance>,
    pub(crate) config_voting: ConfigVoting,
    pub(crate) identities: BTreeMap<Address, ValidatorPubkey>,
    /// Compressed secp256k1 keys, validated on check-in.
    pub(crate) encryption_keys: BTreeMap<Address, Vec<u8>>,
    pub(crate) blocks_seen: BTreeMap<Address, u64>,
    pub(crate) validators: Powermap,
    pub(crate) eon_counter: u64,
    pub(crate) last_block_height: i64,
    pub(crate) chain_id: String,
    pub(crate) fork_heights: ForkHeights,
    pub(crate) check_in_update_override: Option<ForkHeightOverride>,
    pub(crate) nonce_tracker: NonceTracker,
    pub(crate) check_tx_state: CheckTxState,
    /// Dev mode only changes the responses, never the state.
    #[serde(skip)]
    pub(crate) dev_mode: bool,
    #[serde(skip)]
    pub(crate) persister: Option<Persister>,
}

impl ShutterApp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_dev_mode(&mut self, dev_mode: bool) {
        if dev_mode {
            log::warn!("Dev mode enabled, validator updates will not be sent to the consensus engine");
        }
        self.dev_mode = dev_mode;
    }

    pub fn configs(&self) -> &ConfigRegistry {
        &self.configs
    }

    pub fn dkg(&self, eon: u64) -> Option<&DkgInstance> {
        self.dkg_map.get(&eon)
    }

    pub fn dkg_instances(&self) -> impl Iterator<Item = &DkgInstance> {
        self.dkg_map.values()
    }

    pub fn eon_counter(&self) -> u64 {
        self.eon_counter
    }

    pub fn last_block_height(&self) -> i64 {
        self.last_block_height
    }

    pub fn chain_id(&self) -> &str {
        &self.chain_id
    }

    pub fn validators(&self) -> &Powermap {
        &self.validators
    }

    pub fn identities(&self) -> &BTreeMap<Address, ValidatorPubkey> {
        &self.identities
    }

    pub fn encryption_key(&self, keyper: &Address) -> Option<PublicKey> {
        self.encryption_keys
            .get(keyper)
            .and_then(|bytes| PublicKey::from_sec1_bytes(bytes).ok())
    }

    pub fn blocks_seen(&self, keyper: &Address) -> u64 {
        self.blocks_seen.get(keyper).copied().unwrap_or_default()
    }

    /// Height of the block currently being delivered.
    pub fn current_block_height(&self) -> i64 {
        self.last_block_height + 1
    }

    pub fn is_check_in_update_active(&self) -> bool {
        is_fork_active(
            self.fork_heights.check_in_update,
            self.check_in_update_override.as_ref(),
            self.current_block_height(),
            self.eon_counter,
        )
    }

    pub(crate) fn update_check_tx_members(&mut self) {
        self.check_tx_state.set_members(self.configs.all_keypers());
    }

    /// Starts a new eon for `config` and returns its number.
    pub(crate) fn start_dkg(&mut self, config: BatchConfig) -> u64 {
        self.eon_counter += 1;
        let eon = self.eon_counter;
        log::info!(
            "Starting DKG for eon {} with keyper config {}",
            eon,
            config.keyper_config_index
        );
        self.dkg_map.insert(eon, DkgInstance::new(config, eon));
        eon
    }

    pub(crate) fn eon_started_event(&self, eon: u64, config: &BatchConfig) -> Event {
        EonStarted {
            height: 0,
            eon,
            activation_block_number: config.activation_block_number,
            keyper_config_index: config.keyper_config_index,
        }
        .make_abci_event()
    }

    fn count_checked_in(&self, keypers: &[Address]) -> u64 {
        keypers
            .iter()
            .filter(|k| self.identities.contains_key(*k))
            .count() as u64
    }

    fn make_powermap(&self, keypers: &[Address]) -> Powermap {
        Powermap::for_keypers(keypers.iter().map(|k| self.identities.get(k).copied()))
    }

    /// Power map of the latest config that has started and completed its check-ins.
    /// Falls back to the stored validators before any config got there.
    fn current_validators(&self) -> Powermap {
        match self
            .configs
            .iter()
            .rev()
            .find(|c| c.started && c.validators_updated)
        {
            Some(config) => self.make_powermap(&config.keypers),
            None => self.validators.clone(),
        }
    }

    fn start_configs(&mut self) -> Vec<Event> {
        let mut events = vec![];
        for i in 0..self.configs.len() {
            let prev_index = i.saturating_sub(1);
            let (Some(prev), Some(config)) = (self.configs.get(prev_index), self.configs.get(i))
            else {
                continue;
            };
            if config.started {
                continue;
            }
            let seen = prev
                .keypers
                .iter()
                .filter(|k| self.blocks_seen(k) >= config.activation_block_number)
                .count() as u64;
            if seen < prev.threshold {
                continue;
            }
            let index = config.keyper_config_index;
            if let Some(config) = self.configs.get_mut(i) {
                config.started = true;
            }
            log::info!("Keyper config {} started", index);
            events.push(
                BatchConfigStarted {
                    height: 0,
                    keyper_config_index: index,
                }
                .make_abci_event(),
            );
        }
        events
    }

    fn mark_validators_updated(&mut self) {
        for i in 0..self.configs.len() {
            let Some(config) = self.configs.get(i) else {
                continue;
            };
            if !config.started || config.validators_updated {
                continue;
            }
            let checked_in = self.count_checked_in(&config.keypers);
            let required = num_required_transition_validators(config);
            if checked_in < required {
                log::debug!(
                    "Keyper config {}: {} of {} required keypers checked in",
                    config.keyper_config_index,
                    checked_in,
                    required
                );
                continue;
            }
            let index = config.keyper_config_index;
            if let Some(config) = self.configs.get_mut(i) {
                config.validators_updated = true;
            }
            log::info!("Keyper config {} takes over the validator set", index);
        }
    }
}

impl Application for ShutterApp {
    fn info(&self, _request: RequestInfo) -> ResponseInfo {
        ResponseInfo {
            last_block_height: self.last_block_height,
            last_block_app_hash: vec![],
        }
    }

    fn init_chain(&mut self, request: RequestInitChain) -> Result<ResponseInitChain> {
        let genesis = GenesisAppState::from_json(&request.app_state_bytes)
            .map_err(|err| ApplicationError::InvalidGenesis(err.to_string()))?;
        let config = genesis
            .batch_config()
            .map_err(|err| ApplicationError::InvalidGenesis(err.to_string()))?;
        if !self.configs.is_empty() {
            return Err(ApplicationError::NonEmptyState);
        }

        log::info!(
            "Initializing chain {} with {} keypers, threshold {}, initial eon {}",
            request.chain_id,
            config.keypers.len(),
            config.threshold,
            genesis.initial_eon
        );
        self.validators = Powermap::from_validator_updates(&request.validators);
        self.configs = ConfigRegistry::with_genesis(config);
        self.eon_counter = genesis.initial_eon;
        self.check_tx_state = CheckTxState::new();
        self.update_check_tx_members();
        self.fork_heights = genesis.fork_heights();
        self.check_in_update_override = genesis.check_in_update_override(&request.chain_id);
        self.chain_id = request.chain_id;
        Ok(ResponseInitChain)
    }

    fn check_tx(&mut self, request: RequestCheckTx) -> ResponseCheckTx {
        let (sender, msg) = match decode_tx(&request.tx) {
            Ok(decoded) => decoded,
            Err(err) => {
                log::debug!("check_tx: cannot decode transaction: {}", err);
                return ResponseCheckTx::rejected("cannot decode message");
            }
        };
        if msg.chain_id != self.chain_id.as_bytes() {
            return ResponseCheckTx::rejected("wrong chain");
        }
        if !self.nonce_tracker.check(&sender, msg.random_nonce) {
            return ResponseCheckTx::rejected("nonce already used");
        }
        if !self.check_tx_state.is_member(&sender) {
            log::debug!("check_tx: {} is not a keyper set member", sender);
            return ResponseCheckTx::rejected("not a keyper set member");
        }
        if !self.check_tx_state.add_tx(sender, msg.random_nonce) {
            return ResponseCheckTx::rejected("nonce already used in mempool");
        }
        ResponseCheckTx::ok()
    }

    fn begin_block(&mut self, request: RequestBeginBlock) -> ResponseBeginBlock {
        let mut events = vec![];
        if request.height == 1 {
            events.push(self.configs.first().to_event().make_abci_event());
        }
        ResponseBeginBlock { events }
    }

    fn deliver_tx(&mut self, request: RequestDeliverTx) -> ResponseDeliverTx {
        let (sender, msg) = match decode_tx(&request.tx) {
            Ok(decoded) => decoded,
            Err(err) => {
                log::debug!("deliver_tx: cannot decode transaction: {}", err);
                return ResponseDeliverTx::rejected(format!(
                    "Error while decoding transaction: {err}"
                ));
            }
        };
        if msg.chain_id != self.chain_id.as_bytes() {
            return ResponseDeliverTx::rejected(format!(
                "wrong chain id (expected {}, got {})",
                self.chain_id,
                String::from_utf8_lossy(&msg.chain_id)
            ));
        }
        if !self.nonce_tracker.check_and_add(sender, msg.random_nonce) {
            return ResponseDeliverTx::rejected(format!(
                "Nonce {} of {} already used",
                msg.random_nonce, sender
            ));
        }
        match msg.msg.and_then(|m| m.payload) {
            Some(payload) => self.deliver_message(payload, sender),
            None => ResponseDeliverTx::rejected("message has no payload"),
        }
    }

    fn end_block(&mut self, request: RequestEndBlock) -> ResponseEndBlock {
        let events = self.start_configs();
        self.mark_validators_updated();

        let new_validators = self.current_validators();
        let validator_updates = Powermap::diff(&self.validators, &new_validators);
        if !validator_updates.is_empty() {
            log::info!(
                "Validator updates at height {}: {:?}",
                request.height,
                validator_updates
            );
        }
        self.validators = new_validators;
        self.last_block_height = request.height;

        if self.dev_mode {
            return ResponseEndBlock {
                validator_updates: vec![],
                events,
            };
        }
        ResponseEndBlock {
            validator_updates,
            events,
        }
    }

    fn commit(&mut self) -> ResponseCommit {
        self.check_tx_state.reset();
        if let Err(err) = self.maybe_persist() {
            log::error!("Failed to persist shutter app state: {}", err);
        }
        ResponseCommit
    }
}
