//! Applies shuttermint events to the keyper's mirror and drives the local DKGs.
//!
//! Events the local keyper can't use (unknown eons, foreign senders, messages in
//! the wrong phase) are logged and skipped. Only storage and crypto failures abort
//! the block.

use std::collections::BTreeMap;

use curve25519_dalek::scalar::Scalar;
use rand::rngs::OsRng;

use crate::crypto::address::find_address_index;
use crate::crypto::{ecies, Address};
use crate::dkg::{AccusationMsg, ApologyMsg, Phase, PolyCommitmentMsg, PolyEvalMsg, PureDkg};
use crate::events::{self, ShutterEvent};
use crate::keyper::driver::{ObserverError, Result};
use crate::keyper::state::{ActiveDkg, ObservedConfig, ObservedEon, ShuttermintState};
use crate::keyper::KeyperConfig;
use crate::shmsg::Message;
use crate::storage::{PendingPolyEval, Queries, StoredDkgResult};

impl ShuttermintState {
    pub(crate) fn handle_event(
        &mut self,
        config: &KeyperConfig,
        queries: &Queries<'_>,
        event: &ShutterEvent,
    ) -> Result<()> {
        log::info!("Handling shuttermint event {}", event);
        match event {
            ShutterEvent::BatchConfig(e) => self.handle_batch_config(config, queries, e),
            ShutterEvent::BatchConfigStarted(e) => self.handle_batch_config_started(queries, e),
            ShutterEvent::CheckIn(e) => self.handle_check_in(queries, e),
            ShutterEvent::EonStarted(e) => self.handle_eon_started(config, queries, e),
            ShutterEvent::PolyCommitment(e) => {
                self.handle_poly_commitment(e);
                Ok(())
            }
            ShutterEvent::PolyEval(e) => {
                self.handle_poly_eval(config, e);
                Ok(())
            }
            ShutterEvent::Accusation(e) => {
                self.handle_accusation(e);
                Ok(())
            }
            ShutterEvent::Apology(e) => {
                self.handle_apology(e);
                Ok(())
            }
        }
    }

    fn handle_batch_config(
        &mut self,
        config: &KeyperConfig,
        queries: &Queries<'_>,
        e: &events::BatchConfig,
    ) -> Result<()> {
        let observed = ObservedConfig::from_event(e);
        queries.insert_batch_config(&observed)?;

        if observed.keyper_index(&config.address()).is_some() {
            log::info!(
                "Local keyper is a member of config {}, checking in",
                e.keyper_config_index
            );
            queries.schedule_message(&Message::check_in(
                config.validator_public_key.as_bytes(),
                &config.encryption_key.public_key(),
            ))?;
        }
        let vote = Message::batch_config(
            e.keyper_config_index,
            e.activation_block_number,
            &e.keypers,
            e.threshold,
        );
        let dropped = queries.delete_scheduled_messages_by_description(&vote.describe())?;
        if dropped > 0 {
            log::debug!("Dropped {} pending votes for config {}", dropped, e.keyper_config_index);
        }

        self.configs.insert(observed.keyper_config_index, observed);
        Ok(())
    }

    fn handle_batch_config_started(
        &mut self,
        queries: &Queries<'_>,
        e: &events::BatchConfigStarted,
    ) -> Result<()> {
        queries.set_batch_config_started(e.keyper_config_index)?;
        if let Some(config) = self.configs.get_mut(&e.keyper_config_index) {
            config.started = true;
        }
        Ok(())
    }

    fn handle_check_in(&mut self, queries: &Queries<'_>, e: &events::CheckIn) -> Result<()> {
        queries.insert_encryption_key(&e.sender, &e.encryption_public_key)?;
        self.encryption_keys
            .insert(e.sender, e.encryption_public_key);
        Ok(())
    }

    /// Joins the DKG of a new eon if the local keyper is a member and the dealing
    /// phase is still open at the next block. Keypers catching up on old blocks
    /// skip eons whose dealing phase is over.
    ///
    /// # Panics
    ///
    /// Panics if the DKG would be `Off` at the next block, which means the phase
    /// schedule is broken.
    fn handle_eon_started(
        &mut self,
        config: &KeyperConfig,
        queries: &Queries<'_>,
        e: &events::EonStarted,
    ) -> Result<()> {
        let observed = ObservedEon::from_event(e);
        queries.insert_eon(&observed)?;
        self.eons.insert(observed.eon, observed);

        let Some(batch_config) = self.configs.get(&e.keyper_config_index) else {
            log::warn!(
                "Eon {} started with unknown keyper config {}",
                e.eon,
                e.keyper_config_index
            );
            return Ok(());
        };
        let Some(keyper_index) = batch_config.keyper_index(&config.address()) else {
            return Ok(());
        };

        let next_height = queries.last_committed_height()? + 1;
        let phase = config.phase_length.phase_at_height(next_height, e.height);
        if phase == Phase::Off {
            panic!(
                "DKG of eon {} started at height {} is off at height {}",
                e.eon, e.height, next_height
            );
        }
        if phase > Phase::Dealing {
            log::info!(
                "Missed the dealing phase of eon {} (start height {}, current phase {:?})",
                e.eon,
                e.height,
                phase
            );
            return Ok(());
        }

        let mut dkg = ActiveDkg {
            eon: e.eon,
            start_height: e.height,
            keypers: batch_config.keypers.clone(),
            pure: PureDkg::new(
                e.eon,
                batch_config.keypers.len() as u64,
                batch_config.threshold,
                keyper_index,
            ),
        };
        log::info!(
            "Starting DKG for eon {} as keyper {} of {}",
            e.eon,
            keyper_index,
            dkg.keypers.len()
        );
        if !shift_phase(config, queries, e.height, &mut dkg)? {
            self.dkgs.insert(e.eon, dkg);
        }
        Ok(())
    }

    fn handle_poly_commitment(&mut self, e: &events::PolyCommitment) {
        let Some(dkg) = self.dkgs.get_mut(&e.eon) else {
            log::info!("Event for non existent eon received: {}", e.eon);
            return;
        };
        let Some(sender) = dkg.keyper_index(&e.sender) else {
            log::info!("Received PolyCommitment from non keyper address {}", e.sender);
            return;
        };
        if sender == dkg.pure.keyper {
            return;
        }
        let msg = PolyCommitmentMsg {
            eon: e.eon,
            sender,
            gammas: e.gammas.clone(),
        };
        if let Err(err) = dkg.pure.handle_poly_commitment(msg) {
            log::info!("Failed to handle PolyCommitment from {}: {}", e.sender, err);
        }
    }

    fn handle_poly_eval(&mut self, config: &KeyperConfig, e: &events::PolyEval) {
        let my_address = config.address();
        if e.sender == my_address {
            return;
        }
        let Some(dkg) = self.dkgs.get_mut(&e.eon) else {
            log::info!("Event for non existent eon received: {}", e.eon);
            return;
        };
        let Some(sender) = dkg.keyper_index(&e.sender) else {
            log::info!("Received PolyEval from non keyper address {}", e.sender);
            return;
        };
        let Some(position) = find_address_index(&e.receivers, &my_address) else {
            return;
        };
        let Some(encrypted) = e.encrypted_evals.get(position) else {
            log::info!("PolyEval from {} has no eval for us", e.sender);
            return;
        };

        let eval = match decrypt_eval(&config.encryption_key, encrypted) {
            Some(eval) => eval,
            None => {
                log::info!("Could not decrypt poly eval from {}", e.sender);
                return;
            }
        };
        let msg = PolyEvalMsg {
            eon: e.eon,
            sender,
            receiver: dkg.pure.keyper,
            eval,
        };
        match dkg.pure.handle_poly_eval(msg) {
            Ok(()) => log::info!("Got poly eval from keyper {} for eon {}", sender, e.eon),
            Err(err) => log::info!("Failed to handle PolyEval from {}: {}", e.sender, err),
        }
    }

    fn handle_accusation(&mut self, e: &events::Accusation) {
        let Some(dkg) = self.dkgs.get_mut(&e.eon) else {
            log::info!("Event for non existent eon received: {}", e.eon);
            return;
        };
        if dkg.pure.phase != Phase::Accusing {
            log::warn!(
                "Received accusation from {} in phase {}",
                e.sender,
                dkg.pure.phase
            );
            return;
        }
        let Some(accuser) = dkg.keyper_index(&e.sender) else {
            log::info!("Cannot handle accusation, bad sender {}", e.sender);
            return;
        };
        if accuser == dkg.pure.keyper {
            return;
        }
        for accused_address in &e.accused {
            let Some(accused) = dkg.keyper_index(accused_address) else {
                log::info!("Accused address {} is not a keyper", accused_address);
                continue;
            };
            let msg = AccusationMsg {
                eon: e.eon,
                accuser,
                accused,
            };
            if let Err(err) = dkg.pure.handle_accusation(msg) {
                log::info!("Cannot handle accusation from {}: {}", e.sender, err);
            }
        }
    }

    fn handle_apology(&mut self, e: &events::Apology) {
        let Some(dkg) = self.dkgs.get_mut(&e.eon) else {
            log::info!("Event for non existent eon received: {}", e.eon);
            return;
        };
        if dkg.pure.phase != Phase::Apologizing {
            log::warn!("Received apology from {} in phase {}", e.sender, dkg.pure.phase);
            return;
        }
        let Some(accused) = dkg.keyper_index(&e.sender) else {
            log::info!("Failed to handle apology, bad sender {}", e.sender);
            return;
        };
        for (accuser_address, eval) in e.accusers.iter().zip(&e.poly_evals) {
            let Some(accuser) = dkg.keyper_index(accuser_address) else {
                log::info!("Accuser address {} is not a keyper", accuser_address);
                continue;
            };
            let msg = ApologyMsg {
                eon: e.eon,
                accuser,
                accused,
                eval: *eval,
            };
            if let Err(err) = dkg.pure.handle_apology(msg) {
                log::info!("Failed to handle apology from {}: {}", e.sender, err);
            }
        }
    }

    /// Advances every local DKG to its phase at `height`. Finished DKGs are dropped.
    pub(crate) fn shift_phases(
        &mut self,
        config: &KeyperConfig,
        queries: &Queries<'_>,
        height: i64,
    ) -> Result<()> {
        let eons: Vec<u64> = self.dkgs.keys().copied().collect();
        for eon in eons {
            let Some(mut dkg) = self.dkgs.remove(&eon) else {
                continue;
            };
            if !shift_phase(config, queries, height, &mut dkg)? {
                self.dkgs.insert(eon, dkg);
            }
        }
        Ok(())
    }

    /// Encrypts and schedules every pending eval whose receiver has checked in.
    /// All evals of one eon go out in a single message.
    pub(crate) fn send_poly_evals(&self, queries: &Queries<'_>) -> Result<()> {
        let mut batches: BTreeMap<u64, (Vec<Address>, Vec<Vec<u8>>)> = BTreeMap::new();
        for pending in queries.pending_poly_evals()? {
            let Some(key) = self.encryption_keys.get(&pending.receiver) else {
                continue;
            };
            let encrypted = ecies::encrypt(&mut OsRng, key, pending.eval.as_bytes())?;
            let (receivers, evals) = batches.entry(pending.eon).or_default();
            receivers.push(pending.receiver);
            evals.push(encrypted);
            queries.delete_pending_poly_eval(pending.eon, &pending.receiver)?;
        }
        for (eon, (receivers, evals)) in batches {
            log::info!("Sending {} poly evals for eon {}", receivers.len(), eon);
            queries.schedule_message(&Message::poly_eval(eon, &receivers, evals))?;
        }
        Ok(())
    }
}

fn decrypt_eval(key: &k256::SecretKey, encrypted: &[u8]) -> Option<Scalar> {
    let plain = ecies::decrypt(key, encrypted).ok()?;
    let raw: [u8; 32] = plain.as_slice().try_into().ok()?;
    Option::from(Scalar::from_canonical_bytes(raw))
}

/// Moves `dkg` forward until it reaches its phase at `height`. Returns `true` once
/// the DKG is finalized and its record removed.
fn shift_phase(
    config: &KeyperConfig,
    queries: &Queries<'_>,
    height: i64,
    dkg: &mut ActiveDkg,
) -> Result<bool> {
    let target = config.phase_length.phase_at_height(height, dkg.start_height);
    while dkg.pure.phase < target {
        let current = dkg.pure.phase;
        log::info!(
            "Phase transition for eon {} at height {}: {} -> {}",
            dkg.eon,
            height,
            current,
            current.next().unwrap_or(current)
        );
        match current {
            Phase::Off => start_dealing(queries, dkg)?,
            Phase::Dealing => start_accusing(queries, dkg)?,
            Phase::Accusing => start_apologizing(queries, dkg)?,
            Phase::Apologizing => {
                finalize(queries, dkg)?;
                return Ok(true);
            }
            Phase::Finalized => return Ok(true),
        }
    }
    Ok(false)
}

fn start_dealing(queries: &Queries<'_>, dkg: &mut ActiveDkg) -> Result<()> {
    let (commitment, evals) = dkg.pure.start_phase1_dealing(&mut OsRng)?;
    queries.schedule_message(&Message::poly_commitment(
        dkg.eon,
        commitment.gammas.to_bytes_list(),
    ))?;
    for eval in evals {
        let receiver = dkg
            .keyper_address(eval.receiver)
            .ok_or(ObserverError::UnknownKeyperIndex(eval.receiver))?;
        queries.insert_pending_poly_eval(&PendingPolyEval {
            eon: dkg.eon,
            receiver,
            eval: eval.eval,
        })?;
    }
    Ok(())
}

fn start_accusing(queries: &Queries<'_>, dkg: &mut ActiveDkg) -> Result<()> {
    let accusations = dkg.pure.start_phase2_accusing()?;
    if accusations.is_empty() {
        log::info!("No one to accuse in eon {}", dkg.eon);
        return Ok(());
    }
    let accused = accusations
        .iter()
        .map(|a| {
            dkg.keyper_address(a.accused)
                .ok_or(ObserverError::UnknownKeyperIndex(a.accused))
        })
        .collect::<Result<Vec<_>>>()?;
    queries.schedule_message(&Message::accusation(dkg.eon, &accused))?;
    Ok(())
}

fn start_apologizing(queries: &Queries<'_>, dkg: &mut ActiveDkg) -> Result<()> {
    let apologies = dkg.pure.start_phase3_apologizing()?;
    if apologies.is_empty() {
        log::info!("No apologies needed in eon {}", dkg.eon);
        return Ok(());
    }
    let mut accusers = Vec::with_capacity(apologies.len());
    let mut evals = Vec::with_capacity(apologies.len());
    for apology in apologies {
        accusers.push(
            dkg.keyper_address(apology.accuser)
                .ok_or(ObserverError::UnknownKeyperIndex(apology.accuser))?,
        );
        evals.push(apology.eval.to_bytes().to_vec());
    }
    queries.schedule_message(&Message::apology(dkg.eon, &accusers, evals))?;
    Ok(())
}

fn finalize(queries: &Queries<'_>, dkg: &mut ActiveDkg) -> Result<()> {
    dkg.pure.finalize();
    queries.delete_dkg_record(dkg.eon)?;
    let deleted = queries.delete_pending_poly_evals_for_eon(dkg.eon)?;
    log::info!("Deleted {} undelivered poly evals of eon {}", deleted, dkg.eon);

    let stored = match dkg.pure.compute_result() {
        Ok(result) => {
            log::info!("DKG process for eon {} succeeded", dkg.eon);
            queries.insert_eon_public_key(dkg.eon, result.public_key.compress().as_bytes())?;
            StoredDkgResult {
                eon: dkg.eon,
                success: true,
                error: None,
                pure_result: Some(result),
            }
        }
        Err(err) => {
            log::error!("DKG process for eon {} failed: {}", dkg.eon, err);
            StoredDkgResult {
                eon: dkg.eon,
                success: false,
                error: Some(err.to_string()),
                pure_result: None,
            }
        }
    };
    queries.schedule_message(&Message::dkg_result(dkg.eon, stored.success))?;
    queries.insert_dkg_result(&stored)?;
    Ok(())
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use super::*;
    use crate::app::testing::TestKeyper;
    use crate::dkg::PhaseLength;
    use crate::storage::sqlite::test_utils::open_temp_db;

    fn keyper_config(keyper: &TestKeyper) -> KeyperConfig {
        KeyperConfig {
            signing_keypair: keyper.keypair.clone(),
            encryption_key: keyper.encryption_key.clone(),
            validator_public_key: keyper.validator_key,
            phase_length: PhaseLength::constant(10),
            dkg_start_block_delta: 0,
            poll_interval: Duration::from_millis(10),
        }
    }

    fn batch_config(keypers: &[Address]) -> ShutterEvent {
        ShutterEvent::BatchConfig(events::BatchConfig {
            height: 1,
            activation_block_number: 0,
            threshold: 2,
            keypers: keypers.to_vec(),
            keyper_config_index: 1,
        })
    }

    fn eon_started(height: i64) -> ShutterEvent {
        ShutterEvent::EonStarted(events::EonStarted {
            height,
            eon: 1,
            activation_block_number: 0,
            keyper_config_index: 1,
        })
    }

    #[test]
    fn test_eon_started_starts_dealing_for_member() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_temp_db(&dir);
        let queries = db.queries();
        let (me, other) = (TestKeyper::new(), TestKeyper::new());
        let config = keyper_config(&me);
        let mut state = ShuttermintState::default();
        queries.set_last_committed_height(5).unwrap();

        state
            .handle_event(&config, &queries, &batch_config(&[me.address(), other.address()]))
            .unwrap();
        state.handle_event(&config, &queries, &eon_started(5)).unwrap();

        let dkg = state.dkgs.get(&1).unwrap();
        assert_eq!(dkg.pure.phase, Phase::Dealing);
        assert_eq!(dkg.start_height, 5);
        assert_eq!(dkg.pure.keyper, 0);

        let descriptions: Vec<String> = queries
            .scheduled_messages()
            .unwrap()
            .into_iter()
            .map(|m| m.description)
            .collect();
        assert_eq!(descriptions.len(), 2);
        assert_eq!(descriptions[1], Message::poly_commitment(1, vec![]).describe());

        let pending = queries.pending_poly_evals().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].receiver, other.address());
    }

    #[test]
    fn test_eon_started_after_dealing_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_temp_db(&dir);
        let queries = db.queries();
        let (me, other) = (TestKeyper::new(), TestKeyper::new());
        let config = keyper_config(&me);
        let mut state = ShuttermintState::default();
        // the chain is already ten blocks past the eon start
        queries.set_last_committed_height(15).unwrap();

        state
            .handle_event(&config, &queries, &batch_config(&[me.address(), other.address()]))
            .unwrap();
        state.handle_event(&config, &queries, &eon_started(5)).unwrap();

        assert!(state.dkgs.is_empty());
        assert!(state.eons.contains_key(&1));
        assert_eq!(queries.scheduled_messages().unwrap().len(), 1);
        assert!(queries.pending_poly_evals().unwrap().is_empty());
    }

    #[test]
    fn test_eon_started_ignored_for_non_member() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_temp_db(&dir);
        let queries = db.queries();
        let me = TestKeyper::new();
        let config = keyper_config(&me);
        let mut state = ShuttermintState::default();

        let others = [Address::new([1; 20]), Address::new([2; 20])];
        state
            .handle_event(&config, &queries, &batch_config(&others))
            .unwrap();
        state.handle_event(&config, &queries, &eon_started(5)).unwrap();

        assert!(state.dkgs.is_empty());
        assert!(state.eons.contains_key(&1));
        assert!(queries.scheduled_messages().unwrap().is_empty());
    }

    #[test]
    fn test_poly_evals_wait_for_receiver_key() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_temp_db(&dir);
        let queries = db.queries();
        let receiver = TestKeyper::new();
        queries
            .insert_pending_poly_eval(&PendingPolyEval {
                eon: 1,
                receiver: receiver.address(),
                eval: Scalar::from(7u64),
            })
            .unwrap();
        let mut state = ShuttermintState::default();

        state.send_poly_evals(&queries).unwrap();
        assert!(queries.scheduled_messages().unwrap().is_empty());
        assert_eq!(queries.pending_poly_evals().unwrap().len(), 1);

        state
            .encryption_keys
            .insert(receiver.address(), receiver.encryption_key.public_key());
        state.send_poly_evals(&queries).unwrap();
        assert_eq!(queries.scheduled_messages().unwrap().len(), 1);
        assert!(queries.pending_poly_evals().unwrap().is_empty());
    }

    #[test]
    fn test_encrypted_eval_decrypts_for_receiver() {
        let receiver = TestKeyper::new();
        let eval = Scalar::from(42u64);
        let encrypted = ecies::encrypt(
            &mut OsRng,
            &receiver.encryption_key.public_key(),
            eval.as_bytes(),
        )
        .unwrap();

        assert_eq!(decrypt_eval(&receiver.encryption_key, &encrypted), Some(eval));
        let stranger = TestKeyper::new();
        assert_eq!(decrypt_eval(&stranger.encryption_key, &encrypted), None);
    }

    #[test]
    fn test_events_for_unknown_eon_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_temp_db(&dir);
        let queries = db.queries();
        let me = TestKeyper::new();
        let config = keyper_config(&me);
        let mut state = ShuttermintState::default();

        let accusation = ShutterEvent::Accusation(events::Accusation {
            height: 3,
            eon: 9,
            sender: Address::new([1; 20]),
            accused: vec![me.address()],
        });
        state.handle_event(&config, &queries, &accusation).unwrap();
        assert_eq!(state, ShuttermintState::default());
    }
}
