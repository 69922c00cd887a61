use std::fmt::{Debug, Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::crypto::KeyPairError;
use crate::utilities::to_hex;

const fn no_validator_key() -> [u8; 32] {
    let tag = b"novalidator";
    let mut key = [0u8; 32];
    let mut i = 0;
    while i < tag.len() {
        key[i] = tag[i];
        i += 1;
    }
    key
}

/// Artificial key holding the voting power of keypers that haven't checked in yet.
pub const NON_EXISTENT_VALIDATOR: ValidatorPubkey = ValidatorPubkey(no_validator_key());

/// Raw 32 byte ed25519 public key of a consensus validator.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ValidatorPubkey([u8; 32]);

impl ValidatorPubkey {
    pub fn new(bytes: &[u8]) -> Result<Self, KeyPairError> {
        let raw: [u8; 32] = bytes.try_into().map_err(|_| KeyPairError::SliceLength)?;
        Ok(Self(raw))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl Display for ValidatorPubkey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "ed25519:{}", to_hex(self.0))
    }
}

impl Debug for ValidatorPubkey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(self, f)
    }
}

#[cfg(test)]
mod test {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn test_sentinel_layout() {
        let bytes = NON_EXISTENT_VALIDATOR.as_bytes();
        assert_eq!(&bytes[..11], b"novalidator");
        assert!(bytes[11..].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_requires_32_bytes() {
        assert_matches!(ValidatorPubkey::new(&[1; 31]), Err(KeyPairError::SliceLength));
        let key = ValidatorPubkey::new(&[0xab; 32]).unwrap();
        assert_eq!(key.to_string(), format!("ed25519:{}", "ab".repeat(32)));
    }
}
