//! Validation of DKG protocol messages into their event form.

use thiserror::Error;

use crate::crypto::address::ensure_unique_addresses;
use crate::crypto::{Address, AddressError};
use crate::dkg::{Gammas, GammasError};
use crate::events::marshal::scalar_from_bytes;
use crate::events::{Accusation, Apology, PolyCommitment, PolyEval};
use crate::shmsg;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MessageError {
    #[error(transparent)]
    InvalidAddress(#[from] AddressError),
    #[error("duplicate address {0}")]
    DuplicateAddress(Address),
    #[error("number of {what} {left} does not match number of evals {right}")]
    LengthMismatch {
        what: &'static str,
        left: usize,
        right: usize,
    },
    #[error(transparent)]
    InvalidGammas(#[from] GammasError),
    #[error("apology eval {0} is not a canonical scalar")]
    InvalidEval(usize),
}

pub type Result<T> = std::result::Result<T, MessageError>;

fn parse_addresses(raw: &[Vec<u8>]) -> Result<Vec<Address>> {
    let addresses = raw
        .iter()
        .map(|bytes| Address::from_slice(bytes))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    ensure_unique_addresses(&addresses).map_err(MessageError::DuplicateAddress)?;
    Ok(addresses)
}

pub fn parse_poly_eval(msg: &shmsg::PolyEval, sender: Address) -> Result<PolyEval> {
    if msg.receivers.len() != msg.encrypted_evals.len() {
        return Err(MessageError::LengthMismatch {
            what: "receivers",
            left: msg.receivers.len(),
            right: msg.encrypted_evals.len(),
        });
    }
    Ok(PolyEval {
        height: 0,
        eon: msg.eon,
        sender,
        receivers: parse_addresses(&msg.receivers)?,
        encrypted_evals: msg.encrypted_evals.clone(),
    })
}

pub fn parse_poly_commitment(msg: &shmsg::PolyCommitment, sender: Address) -> Result<PolyCommitment> {
    Ok(PolyCommitment {
        height: 0,
        eon: msg.eon,
        sender,
        gammas: Gammas::from_bytes_list(&msg.gammas)?,
    })
}

pub fn parse_accusation(msg: &shmsg::Accusation, sender: Address) -> Result<Accusation> {
    Ok(Accusation {
        height: 0,
        eon: msg.eon,
        sender,
        accused: parse_addresses(&msg.accused)?,
    })
}

pub fn parse_apology(msg: &shmsg::Apology, sender: Address) -> Result<Apology> {
    if msg.accusers.len() != msg.poly_evals.len() {
        return Err(MessageError::LengthMismatch {
            what: "accusers",
            left: msg.accusers.len(),
            right: msg.poly_evals.len(),
        });
    }
    let poly_evals = msg
        .poly_evals
        .iter()
        .enumerate()
        .map(|(i, bytes)| scalar_from_bytes(bytes).map_err(|_| MessageError::InvalidEval(i)))
        .collect::<Result<Vec<_>>>()?;
    Ok(Apology {
        height: 0,
        eon: msg.eon,
        sender,
        accusers: parse_addresses(&msg.accusers)?,
        poly_evals,
    })
}

#[cfg(test)]
mod test {
    use assert_matches::assert_matches;
    use curve25519_dalek::scalar::Scalar;

    use super::*;

    fn addr(b: u8) -> Address {
        Address::new([b; 20])
    }

    #[test]
    fn test_poly_eval_lengths_must_match() {
        let msg = shmsg::PolyEval {
            eon: 1,
            receivers: vec![addr(1).to_vec(), addr(2).to_vec()],
            encrypted_evals: vec![vec![1]],
        };
        assert_matches!(
            parse_poly_eval(&msg, addr(3)),
            Err(MessageError::LengthMismatch { left: 2, right: 1, .. })
        );
    }

    #[test]
    fn test_receivers_must_be_unique() {
        let msg = shmsg::PolyEval {
            eon: 1,
            receivers: vec![addr(1).to_vec(), addr(1).to_vec()],
            encrypted_evals: vec![vec![1], vec![2]],
        };
        assert_matches!(
            parse_poly_eval(&msg, addr(3)),
            Err(MessageError::DuplicateAddress(_))
        );
    }

    #[test]
    fn test_accusation_address_length() {
        let msg = shmsg::Accusation {
            eon: 1,
            accused: vec![vec![0; 21]],
        };
        assert_matches!(
            parse_accusation(&msg, addr(3)),
            Err(MessageError::InvalidAddress(AddressError::InvalidLength(21)))
        );
    }

    #[test]
    fn test_apology_evals() {
        let msg = shmsg::Apology {
            eon: 2,
            accusers: vec![addr(1).to_vec()],
            poly_evals: vec![Scalar::from(5u64).to_bytes().to_vec()],
        };
        let apology = parse_apology(&msg, addr(2)).unwrap();
        assert_eq!(apology.poly_evals, vec![Scalar::from(5u64)]);

        let bad = shmsg::Apology {
            poly_evals: vec![vec![0xff; 32]],
            ..msg
        };
        assert_matches!(parse_apology(&bad, addr(2)), Err(MessageError::InvalidEval(0)));
    }

    #[test]
    fn test_poly_commitment_points() {
        let gammas = Gammas::from_coefficients(&[Scalar::from(1u64), Scalar::from(2u64)]);
        let msg = shmsg::PolyCommitment {
            eon: 1,
            gammas: gammas.to_bytes_list(),
        };
        assert_eq!(parse_poly_commitment(&msg, addr(1)).unwrap().gammas, gammas);

        let bad = shmsg::PolyCommitment {
            eon: 1,
            gammas: vec![vec![0xff; 32]],
        };
        assert_matches!(
            parse_poly_commitment(&bad, addr(1)),
            Err(MessageError::InvalidGammas(GammasError::InvalidPoint(0)))
        );
    }
}
