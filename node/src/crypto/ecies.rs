//! Hybrid encryption to a secp256k1 public key.
//!
//! Layout of a ciphertext:
//! `ephemeral public key (65 bytes, uncompressed) || nonce (12 bytes) || AES-256-GCM output`.
//! The AES key is derived with HKDF-SHA256 from the ECDH shared secret, salted
//! with the ephemeral public key.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use hkdf::Hkdf;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::{PublicKey, SecretKey};
use rand::{CryptoRng, RngCore};
use sha2::Sha256;
use thiserror::Error;

const EPHEMERAL_KEY_LENGTH: usize = 65;
const NONCE_LENGTH: usize = 12;
const KDF_INFO: &[u8] = b"shuttermint-ecies-v1";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum EciesError {
    #[error("ciphertext too short ({0} bytes)")]
    TooShort(usize),
    #[error("invalid ephemeral public key")]
    InvalidEphemeralKey,
    #[error("key derivation failed")]
    KeyDerivation,
    #[error("encryption failed")]
    Encryption,
    #[error("decryption failed")]
    Decryption,
}

pub type Result<T> = std::result::Result<T, EciesError>;

fn derive_cipher(shared_secret: &[u8], ephemeral_key: &[u8]) -> Result<Aes256Gcm> {
    let hkdf = Hkdf::<Sha256>::new(Some(ephemeral_key), shared_secret);
    let mut key = [0u8; 32];
    hkdf.expand(KDF_INFO, &mut key)
        .map_err(|_| EciesError::KeyDerivation)?;
    Aes256Gcm::new_from_slice(&key).map_err(|_| EciesError::KeyDerivation)
}

pub fn encrypt<R: RngCore + CryptoRng>(
    rng: &mut R,
    recipient: &PublicKey,
    plaintext: &[u8],
) -> Result<Vec<u8>> {
    let ephemeral = SecretKey::random(&mut *rng);
    let ephemeral_public = ephemeral.public_key().to_encoded_point(false);
    let shared = k256::ecdh::diffie_hellman(ephemeral.to_nonzero_scalar(), recipient.as_affine());
    let cipher = derive_cipher(
        shared.raw_secret_bytes().as_slice(),
        ephemeral_public.as_bytes(),
    )?;

    let mut nonce = [0u8; NONCE_LENGTH];
    rng.fill_bytes(&mut nonce);
    let sealed = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|_| EciesError::Encryption)?;

    let mut out = Vec::with_capacity(EPHEMERAL_KEY_LENGTH + NONCE_LENGTH + sealed.len());
    out.extend_from_slice(ephemeral_public.as_bytes());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&sealed);
    Ok(out)
}

pub fn decrypt(secret: &SecretKey, ciphertext: &[u8]) -> Result<Vec<u8>> {
    if ciphertext.len() < EPHEMERAL_KEY_LENGTH + NONCE_LENGTH {
        return Err(EciesError::TooShort(ciphertext.len()));
    }
    let (ephemeral_bytes, rest) = ciphertext.split_at(EPHEMERAL_KEY_LENGTH);
    let (nonce, sealed) = rest.split_at(NONCE_LENGTH);

    let ephemeral =
        PublicKey::from_sec1_bytes(ephemeral_bytes).map_err(|_| EciesError::InvalidEphemeralKey)?;
    let shared = k256::ecdh::diffie_hellman(secret.to_nonzero_scalar(), ephemeral.as_affine());
    let cipher = derive_cipher(shared.raw_secret_bytes().as_slice(), ephemeral_bytes)?;
    cipher
        .decrypt(Nonce::from_slice(nonce), sealed)
        .map_err(|_| EciesError::Decryption)
}

#[cfg(test)]
mod test {
    use assert_matches::assert_matches;
    use rand::rngs::OsRng;

    use super::*;

    #[test]
    fn test_encrypt_decrypt() {
        let secret = SecretKey::random(&mut OsRng);
        let ciphertext = encrypt(&mut OsRng, &secret.public_key(), b"poly eval").unwrap();
        assert_eq!(decrypt(&secret, &ciphertext).unwrap(), b"poly eval");
    }

    #[test]
    fn test_wrong_key_fails() {
        let secret = SecretKey::random(&mut OsRng);
        let other = SecretKey::random(&mut OsRng);
        let ciphertext = encrypt(&mut OsRng, &secret.public_key(), b"poly eval").unwrap();
        assert_matches!(decrypt(&other, &ciphertext), Err(EciesError::Decryption));
    }

    #[test]
    fn test_truncated_ciphertext() {
        let secret = SecretKey::random(&mut OsRng);
        assert_matches!(decrypt(&secret, &[4u8; 20]), Err(EciesError::TooShort(20)));
    }
}
