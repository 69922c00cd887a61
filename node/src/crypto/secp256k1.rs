use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use rand::rngs::OsRng;

use crate::crypto::{Address, KeyPair, KeyPairError};
use crate::utilities::{from_hex, to_hex, Hasher};

/// `r || s || v` with `v` in `{0, 1}`.
pub const SIGNATURE_LENGTH: usize = 65;

/// secp256k1 key of a keyper. Used both for signing shuttermint messages and,
/// as a separate instance, for decrypting poly evals.
#[derive(Clone)]
pub struct KeyperKeypair {
    signing_key: SigningKey,
}

impl KeyperKeypair {
    pub fn from_signing_key(signing_key: SigningKey) -> Self {
        Self { signing_key }
    }

    pub fn from_hex(secret: &str) -> Result<Self, KeyPairError> {
        let bytes = from_hex(secret).map_err(|_| KeyPairError::PrivateKey)?;
        let signing_key =
            SigningKey::from_slice(&bytes).map_err(|_| KeyPairError::PrivateKey)?;
        Ok(Self { signing_key })
    }

    pub fn to_hex(&self) -> String {
        to_hex(self.signing_key.to_bytes())
    }

    pub fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }

    pub fn verifying_key(&self) -> &VerifyingKey {
        self.signing_key.verifying_key()
    }

    pub fn secret_key(&self) -> k256::SecretKey {
        k256::SecretKey::from(&self.signing_key)
    }

    pub fn public_key(&self) -> k256::PublicKey {
        k256::PublicKey::from(self.signing_key.verifying_key())
    }

    pub fn address(&self) -> Address {
        Address::from_verifying_key(self.verifying_key())
    }

    pub fn sign_prehash(&self, digest: &[u8; 32]) -> Result<[u8; SIGNATURE_LENGTH], KeyPairError> {
        let (signature, recovery_id) = self
            .signing_key
            .sign_prehash_recoverable(digest)
            .map_err(|_| KeyPairError::Signature)?;
        let mut out = [0u8; SIGNATURE_LENGTH];
        out[..64].copy_from_slice(signature.to_bytes().as_slice());
        out[64] = recovery_id.to_byte();
        Ok(out)
    }
}

impl std::fmt::Debug for KeyperKeypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyperKeypair")
            .field("address", &self.address())
            .finish()
    }
}

/// Recovers the address of the key that produced `signature` over `digest`.
pub fn recover_address(digest: &[u8; 32], signature: &[u8]) -> Result<Address, KeyPairError> {
    if signature.len() != SIGNATURE_LENGTH {
        return Err(KeyPairError::SliceLength);
    }
    let inner = Signature::from_slice(&signature[..64]).map_err(|_| KeyPairError::Signature)?;
    let recovery_id = RecoveryId::from_byte(signature[64]).ok_or(KeyPairError::Signature)?;
    let key = VerifyingKey::recover_from_prehash(digest, &inner, recovery_id)
        .map_err(|_| KeyPairError::Signature)?;
    Ok(Address::from_verifying_key(&key))
}

impl KeyPair for KeyperKeypair {
    type Signature = [u8; SIGNATURE_LENGTH];

    fn verify<M: AsRef<[u8]>>(
        &self,
        message: M,
        signature: &Self::Signature,
    ) -> Result<(), KeyPairError> {
        let digest = Hasher::keccak_256(message.as_ref());
        if recover_address(&digest, signature)? == self.address() {
            Ok(())
        } else {
            Err(KeyPairError::Signature)
        }
    }

    fn sign<M: AsRef<[u8]>>(&self, message: M) -> Result<Self::Signature, KeyPairError> {
        self.sign_prehash(&Hasher::keccak_256(message.as_ref()))
    }

    fn generate() -> Result<Self, KeyPairError> {
        Ok(Self {
            signing_key: SigningKey::random(&mut OsRng),
        })
    }
}

#[cfg(test)]
mod test {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn test_sign_and_recover() {
        let keypair = KeyperKeypair::generate().unwrap();
        let signature = keypair.sign(b"block seen 42").unwrap();

        assert!(keypair.verify(b"block seen 42", &signature).is_ok());
        assert_matches!(
            keypair.verify(b"block seen 43", &signature),
            Err(KeyPairError::Signature)
        );

        let digest = Hasher::keccak_256(b"block seen 42");
        assert_eq!(recover_address(&digest, &signature).unwrap(), keypair.address());
    }

    #[test]
    fn test_hex_round_trip_keeps_address() {
        let keypair = KeyperKeypair::generate().unwrap();
        let restored = KeyperKeypair::from_hex(&keypair.to_hex()).unwrap();
        assert_eq!(restored.address(), keypair.address());
    }

    #[test]
    fn test_known_address() {
        // secret key 1 is the generator point
        let keypair = KeyperKeypair::from_hex(
            "0000000000000000000000000000000000000000000000000000000000000001",
        )
        .unwrap();
        assert_eq!(
            keypair.address().to_checksum(),
            "0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf"
        );
    }

    #[test]
    fn test_recover_rejects_bad_length() {
        assert_matches!(
            recover_address(&[0u8; 32], &[0u8; 64]),
            Err(KeyPairError::SliceLength)
        );
    }
}
