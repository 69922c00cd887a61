use curve25519_dalek::ristretto::{CompressedRistretto, RistrettoPoint};
use curve25519_dalek::scalar::Scalar;
use curve25519_dalek::traits::Identity;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::utilities::{from_hex, to_hex};

const POINT_LENGTH: usize = 32;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GammasError {
    #[error("gamma {index} has invalid length {length}")]
    InvalidLength { index: usize, length: usize },
    #[error("gamma {0} is not a valid curve point")]
    InvalidPoint(usize),
    #[error("invalid gammas hex encoding")]
    InvalidHex,
}

/// Commitments `g^{a_k}` to the coefficients of a dealer's polynomial.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gammas(Vec<RistrettoPoint>);

impl Gammas {
    pub fn new(points: Vec<RistrettoPoint>) -> Self {
        Gammas(points)
    }

    pub fn from_coefficients(coefficients: &[Scalar]) -> Self {
        Gammas(
            coefficients
                .iter()
                .map(RistrettoPoint::mul_base)
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Degree of the committed polynomial.
    pub fn degree(&self) -> usize {
        self.0.len().saturating_sub(1)
    }

    pub fn points(&self) -> &[RistrettoPoint] {
        &self.0
    }

    /// Commitment to the constant term, i.e. the dealer's contribution to the eon public key.
    pub fn constant_term(&self) -> RistrettoPoint {
        self.0.first().copied().unwrap_or_else(RistrettoPoint::identity)
    }

    /// `g^{p(x)}` evaluated with Horner's rule.
    pub fn eval(&self, x: &Scalar) -> RistrettoPoint {
        let mut result = RistrettoPoint::identity();
        for gamma in self.0.iter().rev() {
            result = result * x + gamma;
        }
        result
    }

    /// Checks that `eval` is the dealer's polynomial evaluated at `x`.
    pub fn verify_eval(&self, x: &Scalar, eval: &Scalar) -> bool {
        RistrettoPoint::mul_base(eval) == self.eval(x)
    }

    pub fn to_bytes_list(&self) -> Vec<Vec<u8>> {
        self.0
            .iter()
            .map(|p| p.compress().as_bytes().to_vec())
            .collect()
    }

    pub fn from_bytes_list(list: &[Vec<u8>]) -> Result<Self, GammasError> {
        list.iter()
            .enumerate()
            .map(|(index, bytes)| decompress(index, bytes))
            .collect::<Result<Vec<_>, _>>()
            .map(Gammas)
    }

    /// Concatenated compressed points.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_bytes_list().concat()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, GammasError> {
        if bytes.len() % POINT_LENGTH != 0 {
            return Err(GammasError::InvalidLength {
                index: bytes.len() / POINT_LENGTH,
                length: bytes.len() % POINT_LENGTH,
            });
        }
        bytes
            .chunks(POINT_LENGTH)
            .enumerate()
            .map(|(index, chunk)| decompress(index, chunk))
            .collect::<Result<Vec<_>, _>>()
            .map(Gammas)
    }

    /// Lower-case hex of [`Gammas::to_bytes`].
    pub fn to_hex(&self) -> String {
        to_hex(self.to_bytes())
    }

    pub fn from_hex(s: &str) -> Result<Self, GammasError> {
        let bytes = from_hex(s).map_err(|_| GammasError::InvalidHex)?;
        Self::from_bytes(&bytes)
    }
}

fn decompress(index: usize, bytes: &[u8]) -> Result<RistrettoPoint, GammasError> {
    let compressed = CompressedRistretto::from_slice(bytes).map_err(|_| {
        GammasError::InvalidLength {
            index,
            length: bytes.len(),
        }
    })?;
    compressed
        .decompress()
        .ok_or(GammasError::InvalidPoint(index))
}

/// Scalar used as evaluation point for keyper `index` (indices start at zero).
pub fn keyper_x(index: u64) -> Scalar {
    Scalar::from(index + 1)
}

#[cfg(test)]
mod test {
    use assert_matches::assert_matches;

    use super::*;

    fn polynomial() -> Vec<Scalar> {
        vec![Scalar::from(7u64), Scalar::from(3u64), Scalar::from(5u64)]
    }

    fn evaluate(coefficients: &[Scalar], x: &Scalar) -> Scalar {
        coefficients
            .iter()
            .rev()
            .fold(Scalar::ZERO, |acc, c| acc * x + c)
    }

    #[test]
    fn test_verify_eval() {
        let coefficients = polynomial();
        let gammas = Gammas::from_coefficients(&coefficients);
        let x = keyper_x(2);

        assert_eq!(gammas.degree(), 2);
        assert!(gammas.verify_eval(&x, &evaluate(&coefficients, &x)));
        assert!(!gammas.verify_eval(&x, &Scalar::from(1u64)));
    }

    #[test]
    fn test_hex_encoding_is_lowercase_and_reversible() {
        let gammas = Gammas::from_coefficients(&polynomial());
        let encoded = gammas.to_hex();
        assert_eq!(encoded, encoded.to_lowercase());
        assert_eq!(encoded.len(), 3 * 64);
        assert_eq!(Gammas::from_hex(&encoded).unwrap(), gammas);
    }

    #[test]
    fn test_rejects_invalid_points() {
        assert_matches!(
            Gammas::from_bytes_list(&[vec![0xff; 32]]),
            Err(GammasError::InvalidPoint(0))
        );
        assert_matches!(
            Gammas::from_bytes_list(&[vec![0; 31]]),
            Err(GammasError::InvalidLength { index: 0, length: 31 })
        );
        assert_matches!(Gammas::from_bytes(&[0; 33]), Err(GammasError::InvalidLength { .. }));
    }
}
