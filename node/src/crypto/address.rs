use std::fmt::{Debug, Display, Formatter};
use std::str::FromStr;

use k256::ecdsa::VerifyingKey;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::utilities::{from_hex, to_hex, Hasher};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("address has invalid length ({0} instead of 20 bytes)")]
    InvalidLength(usize),
    #[error("invalid hex address: {0}")]
    InvalidHex(String),
    #[error("address is not in checksummed form: {0}")]
    NotChecksummed(String),
}

/// Ethereum style 20-byte account identifier.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address([u8; 20]);

impl Address {
    pub const LENGTH: usize = 20;

    pub fn new(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, AddressError> {
        let raw: [u8; 20] = bytes
            .try_into()
            .map_err(|_| AddressError::InvalidLength(bytes.len()))?;
        Ok(Self(raw))
    }

    /// Last 20 bytes of the keccak hash of the uncompressed public key (without its prefix byte).
    pub fn from_verifying_key(key: &VerifyingKey) -> Self {
        let point = key.to_encoded_point(false);
        let hash = Hasher::keccak_256(&point.as_bytes()[1..]);
        let mut raw = [0u8; 20];
        raw.copy_from_slice(&hash[12..]);
        Self(raw)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }

    /// EIP-55 mixed-case hex encoding.
    pub fn to_checksum(&self) -> String {
        let lower = to_hex(self.0);
        let hash = Hasher::keccak_256(lower.as_bytes());
        let mut out = String::with_capacity(2 + lower.len());
        out.push_str("0x");
        for (i, c) in lower.chars().enumerate() {
            let shift = if i % 2 == 0 { 4 } else { 0 };
            let nibble = (hash[i / 2] >> shift) & 0x0f;
            if c.is_ascii_alphabetic() && nibble >= 8 {
                out.push(c.to_ascii_uppercase());
            } else {
                out.push(c);
            }
        }
        out
    }

    /// Parses an address and requires the exact EIP-55 checksummed spelling.
    pub fn parse_checksummed(s: &str) -> Result<Self, AddressError> {
        let address = s.parse::<Address>()?;
        if address.to_checksum() != s {
            return Err(AddressError::NotChecksummed(s.to_string()));
        }
        Ok(address)
    }
}

impl FromStr for Address {
    type Err = AddressError;

    /// Case-insensitive parse, `0x` prefix optional.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        if digits.len() != 2 * Self::LENGTH {
            return Err(AddressError::InvalidHex(s.to_string()));
        }
        let bytes = from_hex(digits).map_err(|_| AddressError::InvalidHex(s.to_string()))?;
        Self::from_slice(&bytes)
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_checksum())
    }
}

impl Debug for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_checksum())
    }
}

/// Returns the position of `address` in `addresses`.
pub fn find_address_index(addresses: &[Address], address: &Address) -> Option<usize> {
    addresses.iter().position(|a| a == address)
}

/// Fails with the first address that occurs twice.
pub fn ensure_unique_addresses(addresses: &[Address]) -> Result<(), Address> {
    let mut seen = std::collections::BTreeSet::new();
    for address in addresses {
        if !seen.insert(*address) {
            return Err(*address);
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use assert_matches::assert_matches;

    use super::*;

    const CHECKSUMMED: &str = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed";

    #[test]
    fn test_eip55_checksum() {
        let address = CHECKSUMMED.to_lowercase().parse::<Address>().unwrap();
        assert_eq!(address.to_checksum(), CHECKSUMMED);
        assert_eq!(address.to_string(), CHECKSUMMED);
    }

    #[test]
    fn test_parse_checksummed_requires_exact_case() {
        assert!(Address::parse_checksummed(CHECKSUMMED).is_ok());
        assert_matches!(
            Address::parse_checksummed(&CHECKSUMMED.to_lowercase()),
            Err(AddressError::NotChecksummed(_))
        );
    }

    #[test]
    fn test_invalid_lengths() {
        assert_matches!(
            Address::from_slice(&[1u8; 19]),
            Err(AddressError::InvalidLength(19))
        );
        assert_matches!("0x1234".parse::<Address>(), Err(AddressError::InvalidHex(_)));
    }

    #[test]
    fn test_unique_addresses() {
        let a = Address::new([1; 20]);
        let b = Address::new([2; 20]);
        assert!(ensure_unique_addresses(&[a, b]).is_ok());
        assert_eq!(ensure_unique_addresses(&[a, b, a]), Err(a));
        assert_eq!(find_address_index(&[a, b], &b), Some(1));
    }
}
