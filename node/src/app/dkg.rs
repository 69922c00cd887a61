use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::app::config::BatchConfig;
use crate::app::voting::{PrimitiveEquals, Voting, VotingError};
use crate::crypto::Address;
use crate::events::{Accusation, Apology, PolyCommitment, PolyEval};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DkgInstanceError {
    #[error("message is for eon {got}, not {expected}")]
    WrongEon { expected: u64, got: u64 },
    #[error("sender {0} is not a keyper")]
    NotAKeyper(Address),
    #[error("receiver {0} is not a keyper")]
    ReceiverNotAKeyper(Address),
    #[error("accused {0} is not a keyper")]
    AccusedNotAKeyper(Address),
    #[error("accuser {0} is not a keyper")]
    AccuserNotAKeyper(Address),
    #[error("duplicate {kind} message from {sender}")]
    Duplicate { kind: &'static str, sender: Address },
    #[error("duplicate poly eval from {sender} to {receiver}")]
    DuplicatePolyEval { sender: Address, receiver: Address },
    #[error(transparent)]
    Voting(#[from] VotingError),
}

pub type Result<T> = std::result::Result<T, DkgInstanceError>;

pub type DkgSuccessVoting = Voting<bool, PrimitiveEquals>;

/// Bookkeeping for the DKG of one eon.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DkgInstance {
    pub config: BatchConfig,
    pub eon: u64,
    pub success_voting: DkgSuccessVoting,
    poly_evals_seen: BTreeSet<(Address, Address)>,
    poly_commitments_seen: BTreeSet<Address>,
    accusations_seen: BTreeSet<Address>,
    apologies_seen: BTreeSet<Address>,
}

impl DkgInstance {
    pub fn new(config: BatchConfig, eon: u64) -> Self {
        DkgInstance {
            config,
            eon,
            success_voting: DkgSuccessVoting::new(),
            poly_evals_seen: BTreeSet::new(),
            poly_commitments_seen: BTreeSet::new(),
            accusations_seen: BTreeSet::new(),
            apologies_seen: BTreeSet::new(),
        }
    }

    fn check_eon(&self, eon: u64) -> Result<()> {
        if eon != self.eon {
            return Err(DkgInstanceError::WrongEon {
                expected: self.eon,
                got: eon,
            });
        }
        Ok(())
    }

    fn check_sender(&self, sender: &Address) -> Result<()> {
        if !self.config.is_keyper(sender) {
            return Err(DkgInstanceError::NotAKeyper(*sender));
        }
        Ok(())
    }

    /// Registers all `(sender, receiver)` pairs of `msg` or none of them.
    pub fn register_poly_eval(&mut self, msg: &PolyEval) -> Result<()> {
        self.check_eon(msg.eon)?;
        self.check_sender(&msg.sender)?;
        for receiver in &msg.receivers {
            if !self.config.is_keyper(receiver) {
                return Err(DkgInstanceError::ReceiverNotAKeyper(*receiver));
            }
            if self.poly_evals_seen.contains(&(msg.sender, *receiver)) {
                return Err(DkgInstanceError::DuplicatePolyEval {
                    sender: msg.sender,
                    receiver: *receiver,
                });
            }
        }
        for receiver in &msg.receivers {
            self.poly_evals_seen.insert((msg.sender, *receiver));
        }
        Ok(())
    }

    pub fn register_poly_commitment(&mut self, msg: &PolyCommitment) -> Result<()> {
        self.check_eon(msg.eon)?;
        self.check_sender(&msg.sender)?;
        if !self.poly_commitments_seen.insert(msg.sender) {
            return Err(DkgInstanceError::Duplicate {
                kind: "poly commitment",
                sender: msg.sender,
            });
        }
        Ok(())
    }

    pub fn register_accusation(&mut self, msg: &Accusation) -> Result<()> {
        self.check_eon(msg.eon)?;
        self.check_sender(&msg.sender)?;
        if let Some(accused) = msg.accused.iter().find(|a| !self.config.is_keyper(a)) {
            return Err(DkgInstanceError::AccusedNotAKeyper(*accused));
        }
        if !self.accusations_seen.insert(msg.sender) {
            return Err(DkgInstanceError::Duplicate {
                kind: "accusation",
                sender: msg.sender,
            });
        }
        Ok(())
    }

    pub fn register_apology(&mut self, msg: &Apology) -> Result<()> {
        self.check_eon(msg.eon)?;
        self.check_sender(&msg.sender)?;
        if let Some(accuser) = msg.accusers.iter().find(|a| !self.config.is_keyper(a)) {
            return Err(DkgInstanceError::AccuserNotAKeyper(*accuser));
        }
        if !self.apologies_seen.insert(msg.sender) {
            return Err(DkgInstanceError::Duplicate {
                kind: "apology",
                sender: msg.sender,
            });
        }
        Ok(())
    }

    /// Records the DKG outcome reported by `sender`. Each keyper votes once.
    pub fn add_success_vote(&mut self, sender: Address, success: bool) -> Result<()> {
        self.check_sender(&sender)?;
        self.success_voting.add_vote(sender, success)?;
        Ok(())
    }

    /// The agreed outcome once `threshold` keypers reported the same result.
    pub fn outcome(&self) -> Option<bool> {
        self.success_voting
            .outcome(self.config.threshold as usize)
            .copied()
    }
}

#[cfg(test)]
mod test {
    use assert_matches::assert_matches;

    use super::*;

    fn addr(b: u8) -> Address {
        Address::new([b; 20])
    }

    fn instance() -> DkgInstance {
        let config = BatchConfig {
            keyper_config_index: 1,
            activation_block_number: 100,
            threshold: 2,
            keypers: vec![addr(1), addr(2), addr(3)],
            ..Default::default()
        };
        DkgInstance::new(config, 8)
    }

    fn poly_eval(sender: u8, receivers: &[u8]) -> PolyEval {
        PolyEval {
            height: 0,
            eon: 8,
            sender: addr(sender),
            receivers: receivers.iter().map(|r| addr(*r)).collect(),
            encrypted_evals: receivers.iter().map(|_| vec![0]).collect(),
        }
    }

    #[test]
    fn test_poly_eval_registration_is_atomic() {
        let mut dkg = instance();
        dkg.register_poly_eval(&poly_eval(1, &[2])).unwrap();
        assert_matches!(
            dkg.register_poly_eval(&poly_eval(1, &[3, 2])),
            Err(DkgInstanceError::DuplicatePolyEval { .. })
        );
        // receiver 3 was not registered by the failed call
        dkg.register_poly_eval(&poly_eval(1, &[3])).unwrap();
        dkg.register_poly_eval(&poly_eval(2, &[1, 3])).unwrap();
    }

    #[test]
    fn test_rejects_non_keypers_and_wrong_eon() {
        let mut dkg = instance();
        assert_matches!(
            dkg.register_poly_eval(&poly_eval(9, &[1])),
            Err(DkgInstanceError::NotAKeyper(_))
        );
        assert_matches!(
            dkg.register_poly_eval(&poly_eval(1, &[9])),
            Err(DkgInstanceError::ReceiverNotAKeyper(_))
        );
        let mut msg = poly_eval(1, &[2]);
        msg.eon = 7;
        assert_matches!(
            dkg.register_poly_eval(&msg),
            Err(DkgInstanceError::WrongEon { .. })
        );
    }

    #[test]
    fn test_duplicate_accusation() {
        let mut dkg = instance();
        let msg = Accusation {
            height: 0,
            eon: 8,
            sender: addr(1),
            accused: vec![addr(2)],
        };
        dkg.register_accusation(&msg).unwrap();
        assert_matches!(
            dkg.register_accusation(&msg),
            Err(DkgInstanceError::Duplicate { kind: "accusation", .. })
        );
    }

    #[test]
    fn test_success_voting() {
        let mut dkg = instance();
        dkg.add_success_vote(addr(1), false).unwrap();
        assert_eq!(dkg.outcome(), None);
        assert_matches!(
            dkg.add_success_vote(addr(1), true),
            Err(DkgInstanceError::Voting(VotingError::AlreadyVoted(_)))
        );
        dkg.add_success_vote(addr(2), false).unwrap();
        assert_eq!(dkg.outcome(), Some(false));
    }
}
