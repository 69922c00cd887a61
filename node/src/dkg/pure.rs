//! Feldman style distributed key generation over the Ristretto group.
//!
//! Each keyper deals a random polynomial of degree `threshold - 1`, publishes
//! commitments to its coefficients and sends every other keyper its share.
//! Keypers accuse dealers whose share is missing or doesn't match the
//! commitment, and accused dealers may apologize by publishing the share.
//! Dealers that stay accused are excluded from the result.

use std::collections::{BTreeMap, BTreeSet};

use curve25519_dalek::ristretto::RistrettoPoint;
use curve25519_dalek::scalar::Scalar;
use curve25519_dalek::traits::Identity;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dkg::gammas::{keyper_x, Gammas};
use crate::dkg::Phase;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PureDkgError {
    #[error("operation not allowed in phase {0}")]
    WrongPhase(Phase),
    #[error("message for eon {got}, expected {expected}")]
    WrongEon { expected: u64, got: u64 },
    #[error("keyper index {0} out of range")]
    IndexOutOfRange(u64),
    #[error("message for receiver {0} is not addressed to us")]
    WrongReceiver(u64),
    #[error("commitment has degree {got}, expected {expected}")]
    WrongDegree { expected: usize, got: usize },
    #[error("duplicate message from keyper {0}")]
    Duplicate(u64),
    #[error("keyper {0} accused itself")]
    SelfAccusation(u64),
    #[error("apology for non existent accusation ({accuser} -> {accused})")]
    NoAccusation { accuser: u64, accused: u64 },
    #[error("apology eval from keyper {0} does not match commitment")]
    InvalidApology(u64),
    #[error("missing valid poly eval from qualified dealer {0}")]
    MissingEval(u64),
    #[error("only {got} qualified dealers, need {needed}")]
    NotEnoughDealers { needed: u64, got: u64 },
}

pub type Result<T> = std::result::Result<T, PureDkgError>;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolyCommitmentMsg {
    pub eon: u64,
    pub sender: u64,
    pub gammas: Gammas,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolyEvalMsg {
    pub eon: u64,
    pub sender: u64,
    pub receiver: u64,
    pub eval: Scalar,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccusationMsg {
    pub eon: u64,
    pub accuser: u64,
    pub accused: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApologyMsg {
    pub eon: u64,
    pub accuser: u64,
    pub accused: u64,
    pub eval: Scalar,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DkgResult {
    pub eon: u64,
    pub num_keypers: u64,
    pub threshold: u64,
    pub keyper: u64,
    pub secret_key_share: Scalar,
    pub public_key: RistrettoPoint,
    pub public_key_shares: Vec<RistrettoPoint>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PureDkg {
    pub eon: u64,
    pub num_keypers: u64,
    pub threshold: u64,
    pub keyper: u64,
    pub phase: Phase,
    polynomial: Vec<Scalar>,
    commitments: BTreeMap<u64, Gammas>,
    /// Evals of other dealers' polynomials at our index, keyed by dealer.
    evals: BTreeMap<u64, Scalar>,
    /// `(accuser, accused)` pairs.
    accusations: BTreeSet<(u64, u64)>,
    apologies: BTreeMap<(u64, u64), Scalar>,
}

fn evaluate(coefficients: &[Scalar], x: &Scalar) -> Scalar {
    coefficients
        .iter()
        .rev()
        .fold(Scalar::ZERO, |acc, c| acc * x + c)
}

impl PureDkg {
    pub fn new(eon: u64, num_keypers: u64, threshold: u64, keyper: u64) -> Self {
        PureDkg {
            eon,
            num_keypers,
            threshold,
            keyper,
            phase: Phase::Off,
            polynomial: vec![],
            commitments: BTreeMap::new(),
            evals: BTreeMap::new(),
            accusations: BTreeSet::new(),
            apologies: BTreeMap::new(),
        }
    }

    fn require_phase(&self, phase: Phase) -> Result<()> {
        if self.phase != phase {
            return Err(PureDkgError::WrongPhase(self.phase));
        }
        Ok(())
    }

    fn require_eon(&self, eon: u64) -> Result<()> {
        if eon != self.eon {
            return Err(PureDkgError::WrongEon {
                expected: self.eon,
                got: eon,
            });
        }
        Ok(())
    }

    fn require_index(&self, index: u64) -> Result<()> {
        if index >= self.num_keypers {
            return Err(PureDkgError::IndexOutOfRange(index));
        }
        Ok(())
    }

    /// Deals a fresh polynomial. Returns our commitment and the evals for all other keypers.
    pub fn start_phase1_dealing<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
    ) -> Result<(PolyCommitmentMsg, Vec<PolyEvalMsg>)> {
        self.require_phase(Phase::Off)?;

        let degree = self.threshold.saturating_sub(1);
        self.polynomial = (0..=degree).map(|_| Scalar::random(rng)).collect();
        let gammas = Gammas::from_coefficients(&self.polynomial);

        let mut evals = vec![];
        for receiver in 0..self.num_keypers {
            let eval = evaluate(&self.polynomial, &keyper_x(receiver));
            if receiver == self.keyper {
                self.evals.insert(self.keyper, eval);
                continue;
            }
            evals.push(PolyEvalMsg {
                eon: self.eon,
                sender: self.keyper,
                receiver,
                eval,
            });
        }
        self.commitments.insert(self.keyper, gammas.clone());
        self.phase = Phase::Dealing;

        let commitment = PolyCommitmentMsg {
            eon: self.eon,
            sender: self.keyper,
            gammas,
        };
        Ok((commitment, evals))
    }

    pub fn handle_poly_commitment(&mut self, msg: PolyCommitmentMsg) -> Result<()> {
        self.require_phase(Phase::Dealing)?;
        self.require_eon(msg.eon)?;
        self.require_index(msg.sender)?;
        let expected = self.threshold.saturating_sub(1) as usize;
        if msg.gammas.is_empty() || msg.gammas.degree() != expected {
            return Err(PureDkgError::WrongDegree {
                expected,
                got: msg.gammas.degree(),
            });
        }
        if self.commitments.contains_key(&msg.sender) {
            return Err(PureDkgError::Duplicate(msg.sender));
        }
        self.commitments.insert(msg.sender, msg.gammas);
        Ok(())
    }

    pub fn handle_poly_eval(&mut self, msg: PolyEvalMsg) -> Result<()> {
        self.require_phase(Phase::Dealing)?;
        self.require_eon(msg.eon)?;
        self.require_index(msg.sender)?;
        if msg.receiver != self.keyper {
            return Err(PureDkgError::WrongReceiver(msg.receiver));
        }
        if self.evals.contains_key(&msg.sender) {
            return Err(PureDkgError::Duplicate(msg.sender));
        }
        self.evals.insert(msg.sender, msg.eval);
        Ok(())
    }

    fn eval_is_valid(&self, dealer: u64) -> bool {
        match (self.commitments.get(&dealer), self.evals.get(&dealer)) {
            (Some(gammas), Some(eval)) => gammas.verify_eval(&keyper_x(self.keyper), eval),
            _ => false,
        }
    }

    /// Accuses every dealer that committed but sent no eval or an eval that doesn't verify.
    pub fn start_phase2_accusing(&mut self) -> Result<Vec<AccusationMsg>> {
        self.require_phase(Phase::Dealing)?;
        let mut accusations = vec![];
        let dealers: Vec<u64> = self.commitments.keys().copied().collect();
        for dealer in dealers {
            if dealer == self.keyper || self.eval_is_valid(dealer) {
                continue;
            }
            self.accusations.insert((self.keyper, dealer));
            accusations.push(AccusationMsg {
                eon: self.eon,
                accuser: self.keyper,
                accused: dealer,
            });
        }
        self.phase = Phase::Accusing;
        Ok(accusations)
    }

    pub fn handle_accusation(&mut self, msg: AccusationMsg) -> Result<()> {
        self.require_phase(Phase::Accusing)?;
        self.require_eon(msg.eon)?;
        self.require_index(msg.accuser)?;
        self.require_index(msg.accused)?;
        if msg.accuser == msg.accused {
            return Err(PureDkgError::SelfAccusation(msg.accuser));
        }
        if !self.accusations.insert((msg.accuser, msg.accused)) {
            return Err(PureDkgError::Duplicate(msg.accuser));
        }
        Ok(())
    }

    /// Answers every accusation against us with the eval for the accuser.
    pub fn start_phase3_apologizing(&mut self) -> Result<Vec<ApologyMsg>> {
        self.require_phase(Phase::Accusing)?;
        let apologies = self
            .accusations
            .iter()
            .filter(|(_, accused)| *accused == self.keyper)
            .map(|(accuser, accused)| ApologyMsg {
                eon: self.eon,
                accuser: *accuser,
                accused: *accused,
                eval: evaluate(&self.polynomial, &keyper_x(*accuser)),
            })
            .collect();
        self.phase = Phase::Apologizing;
        Ok(apologies)
    }

    pub fn handle_apology(&mut self, msg: ApologyMsg) -> Result<()> {
        self.require_phase(Phase::Apologizing)?;
        self.require_eon(msg.eon)?;
        self.require_index(msg.accuser)?;
        self.require_index(msg.accused)?;
        let key = (msg.accuser, msg.accused);
        if !self.accusations.contains(&key) {
            return Err(PureDkgError::NoAccusation {
                accuser: msg.accuser,
                accused: msg.accused,
            });
        }
        if self.apologies.contains_key(&key) {
            return Err(PureDkgError::Duplicate(msg.accused));
        }
        let valid = self
            .commitments
            .get(&msg.accused)
            .map(|gammas| gammas.verify_eval(&keyper_x(msg.accuser), &msg.eval))
            .unwrap_or(false);
        if !valid {
            return Err(PureDkgError::InvalidApology(msg.accused));
        }
        self.apologies.insert(key, msg.eval);
        if msg.accuser == self.keyper {
            self.evals.insert(msg.accused, msg.eval);
        }
        Ok(())
    }

    pub fn finalize(&mut self) {
        self.phase = Phase::Finalized;
    }

    /// Dealers with a commitment and an apology for every accusation against them.
    pub fn qualified_dealers(&self) -> Vec<u64> {
        self.commitments
            .keys()
            .copied()
            .filter(|dealer| {
                self.accusations
                    .iter()
                    .filter(|(_, accused)| accused == dealer)
                    .all(|key| self.apologies.contains_key(key))
            })
            .collect()
    }

    pub fn compute_result(&self) -> Result<DkgResult> {
        self.require_phase(Phase::Finalized)?;
        let qualified = self.qualified_dealers();
        if (qualified.len() as u64) < self.threshold {
            return Err(PureDkgError::NotEnoughDealers {
                needed: self.threshold,
                got: qualified.len() as u64,
            });
        }

        let mut secret_key_share = Scalar::ZERO;
        let mut public_key = RistrettoPoint::identity();
        for dealer in &qualified {
            if !self.eval_is_valid(*dealer) {
                return Err(PureDkgError::MissingEval(*dealer));
            }
            secret_key_share += self.evals[dealer];
            public_key += self.commitments[dealer].constant_term();
        }

        let public_key_shares = (0..self.num_keypers)
            .map(|keyper| {
                let x = keyper_x(keyper);
                qualified
                    .iter()
                    .map(|dealer| self.commitments[dealer].eval(&x))
                    .fold(RistrettoPoint::identity(), |acc, p| acc + p)
            })
            .collect();

        Ok(DkgResult {
            eon: self.eon,
            num_keypers: self.num_keypers,
            threshold: self.threshold,
            keyper: self.keyper,
            secret_key_share,
            public_key,
            public_key_shares,
        })
    }
}

#[cfg(test)]
mod test {
    use assert_matches::assert_matches;
    use rand::rngs::OsRng;

    use super::*;

    const EON: u64 = 5;

    fn setup(n: u64, threshold: u64) -> (Vec<PureDkg>, Vec<PolyCommitmentMsg>, Vec<PolyEvalMsg>) {
        let mut dkgs: Vec<PureDkg> = (0..n).map(|i| PureDkg::new(EON, n, threshold, i)).collect();
        let mut commitments = vec![];
        let mut evals = vec![];
        for dkg in dkgs.iter_mut() {
            let (commitment, dealt) = dkg.start_phase1_dealing(&mut OsRng).unwrap();
            commitments.push(commitment);
            evals.extend(dealt);
        }
        (dkgs, commitments, evals)
    }

    fn deliver_commitments(dkgs: &mut [PureDkg], commitments: &[PolyCommitmentMsg]) {
        for dkg in dkgs.iter_mut() {
            for c in commitments {
                if c.sender != dkg.keyper {
                    dkg.handle_poly_commitment(c.clone()).unwrap();
                }
            }
        }
    }

    fn run_to_end(dkgs: &mut [PureDkg]) {
        let accusations: Vec<AccusationMsg> = dkgs
            .iter_mut()
            .flat_map(|d| d.start_phase2_accusing().unwrap())
            .collect();
        for dkg in dkgs.iter_mut() {
            for a in &accusations {
                if a.accuser != dkg.keyper {
                    dkg.handle_accusation(a.clone()).unwrap();
                }
            }
        }
        let apologies: Vec<ApologyMsg> = dkgs
            .iter_mut()
            .flat_map(|d| d.start_phase3_apologizing().unwrap())
            .collect();
        for dkg in dkgs.iter_mut() {
            for a in &apologies {
                dkg.handle_apology(a.clone()).unwrap();
            }
            dkg.finalize();
        }
    }

    #[test]
    fn test_honest_run_agrees_on_public_key() {
        let (mut dkgs, commitments, evals) = setup(3, 2);
        deliver_commitments(&mut dkgs, &commitments);
        for eval in evals {
            dkgs[eval.receiver as usize].handle_poly_eval(eval).unwrap();
        }
        run_to_end(&mut dkgs);

        let results: Vec<DkgResult> = dkgs.iter().map(|d| d.compute_result().unwrap()).collect();
        for result in &results {
            assert_eq!(result.public_key, results[0].public_key);
            assert_eq!(result.public_key_shares, results[0].public_key_shares);
        }
        for (i, result) in results.iter().enumerate() {
            assert_eq!(
                RistrettoPoint::mul_base(&result.secret_key_share),
                result.public_key_shares[i]
            );
        }
    }

    #[test]
    fn test_missing_eval_is_accused_and_apology_repairs_it() {
        let (mut dkgs, commitments, evals) = setup(3, 2);
        deliver_commitments(&mut dkgs, &commitments);
        for eval in evals {
            // keyper 1 never receives the share of keyper 0
            if eval.sender == 0 && eval.receiver == 1 {
                continue;
            }
            dkgs[eval.receiver as usize].handle_poly_eval(eval).unwrap();
        }

        let accusations = dkgs[1].start_phase2_accusing().unwrap();
        assert_eq!(
            accusations,
            vec![AccusationMsg {
                eon: EON,
                accuser: 1,
                accused: 0
            }]
        );
        dkgs[0].start_phase2_accusing().unwrap();
        dkgs[2].start_phase2_accusing().unwrap();
        dkgs[0].handle_accusation(accusations[0].clone()).unwrap();
        dkgs[2].handle_accusation(accusations[0].clone()).unwrap();

        let apologies = dkgs[0].start_phase3_apologizing().unwrap();
        assert_eq!(apologies.len(), 1);
        dkgs[1].start_phase3_apologizing().unwrap();
        dkgs[2].start_phase3_apologizing().unwrap();
        for dkg in dkgs.iter_mut() {
            dkg.handle_apology(apologies[0].clone()).unwrap();
            dkg.finalize();
        }

        let key = dkgs[0].compute_result().unwrap().public_key;
        assert_eq!(dkgs[1].compute_result().unwrap().public_key, key);
        assert_eq!(dkgs[1].qualified_dealers(), vec![0, 1, 2]);
    }

    #[test]
    fn test_unanswered_accusation_disqualifies_dealer() {
        let (mut dkgs, commitments, evals) = setup(3, 2);
        deliver_commitments(&mut dkgs, &commitments);
        for eval in evals {
            if eval.sender == 2 {
                continue;
            }
            dkgs[eval.receiver as usize].handle_poly_eval(eval).unwrap();
        }
        for dkg in dkgs.iter_mut() {
            dkg.start_phase2_accusing().unwrap();
        }
        for accuser in [0, 1] {
            dkgs[2]
                .handle_accusation(AccusationMsg {
                    eon: EON,
                    accuser,
                    accused: 2,
                })
                .unwrap();
        }
        // keyper 2 goes silent and never apologizes
        dkgs[0].start_phase3_apologizing().unwrap();
        dkgs[0].finalize();

        assert_eq!(dkgs[0].qualified_dealers(), vec![0, 1]);
        assert!(dkgs[0].compute_result().is_ok());
    }

    #[test]
    fn test_not_enough_dealers() {
        let mut dkg = PureDkg::new(EON, 3, 2, 0);
        dkg.start_phase1_dealing(&mut OsRng).unwrap();
        dkg.start_phase2_accusing().unwrap();
        dkg.start_phase3_apologizing().unwrap();
        dkg.finalize();
        assert_matches!(
            dkg.compute_result(),
            Err(PureDkgError::NotEnoughDealers { needed: 2, got: 1 })
        );
    }

    #[test]
    fn test_rejects_duplicates_and_wrong_phase() {
        let (mut dkgs, commitments, _) = setup(2, 1);
        let theirs = commitments[1].clone();
        dkgs[0].handle_poly_commitment(theirs.clone()).unwrap();
        assert_matches!(
            dkgs[0].handle_poly_commitment(theirs.clone()),
            Err(PureDkgError::Duplicate(1))
        );
        assert_matches!(
            dkgs[0].handle_accusation(AccusationMsg {
                eon: EON,
                accuser: 1,
                accused: 0
            }),
            Err(PureDkgError::WrongPhase(Phase::Dealing))
        );
        assert_matches!(
            dkgs[0].start_phase1_dealing(&mut OsRng),
            Err(PureDkgError::WrongPhase(Phase::Dealing))
        );
    }

    #[test]
    fn test_rejects_wrong_degree_and_eon() {
        let (mut dkgs, _, _) = setup(3, 2);
        let bad_degree = PolyCommitmentMsg {
            eon: EON,
            sender: 1,
            gammas: Gammas::from_coefficients(&[Scalar::ONE]),
        };
        assert_matches!(
            dkgs[0].handle_poly_commitment(bad_degree),
            Err(PureDkgError::WrongDegree { expected: 1, got: 0 })
        );
        let wrong_eon = PolyEvalMsg {
            eon: EON + 1,
            sender: 1,
            receiver: 0,
            eval: Scalar::ONE,
        };
        assert_matches!(
            dkgs[0].handle_poly_eval(wrong_eon),
            Err(PureDkgError::WrongEon { .. })
        );
    }
}
