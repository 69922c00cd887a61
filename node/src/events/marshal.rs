//! Textual encodings of attribute values.

use curve25519_dalek::scalar::Scalar;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::PublicKey;

use crate::crypto::Address;
use crate::dkg::Gammas;
use crate::events::{EventError, Result};
use crate::utilities::encoding::{from_base64url, to_base64url, to_hex_prefixed};
use crate::utilities::from_hex;

const UNCOMPRESSED_KEY_LENGTH: usize = 65;

pub(crate) fn encode_uint(value: u64) -> String {
    value.to_string()
}

pub(crate) fn decode_uint(value: &str) -> Result<u64> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(EventError::InvalidUint(value.to_string()));
    }
    value
        .parse::<u64>()
        .map_err(|_| EventError::InvalidUint(value.to_string()))
}

pub(crate) fn encode_address(address: &Address) -> String {
    address.to_checksum()
}

pub(crate) fn decode_address(value: &str) -> Result<Address> {
    Address::parse_checksummed(value).map_err(|_| EventError::InvalidAddress(value.to_string()))
}

pub(crate) fn encode_addresses(addresses: &[Address]) -> String {
    addresses
        .iter()
        .map(encode_address)
        .collect::<Vec<_>>()
        .join(",")
}

pub(crate) fn decode_addresses(value: &str) -> Result<Vec<Address>> {
    if value.is_empty() {
        return Ok(vec![]);
    }
    value.split(',').map(decode_address).collect()
}

pub(crate) fn encode_byte_sequence<T: AsRef<[u8]>>(values: &[T]) -> String {
    values
        .iter()
        .map(to_hex_prefixed)
        .collect::<Vec<_>>()
        .join(",")
}

pub(crate) fn decode_byte_sequence(value: &str) -> Result<Vec<Vec<u8>>> {
    if value.is_empty() {
        return Ok(vec![]);
    }
    value
        .split(',')
        .map(|item| {
            let digits = item
                .strip_prefix("0x")
                .filter(|digits| !digits.starts_with("0x"))
                .ok_or_else(|| EventError::InvalidHex(item.to_string()))?;
            from_hex(digits).map_err(|_| EventError::InvalidHex(item.to_string()))
        })
        .collect()
}

/// base64url (no padding) of the 65 byte uncompressed key.
pub(crate) fn encode_public_key(key: &PublicKey) -> String {
    to_base64url(key.to_encoded_point(false).as_bytes())
}

pub(crate) fn decode_public_key(value: &str) -> Result<PublicKey> {
    let bytes = from_base64url(value).map_err(|_| EventError::InvalidPublicKey)?;
    if bytes.len() != UNCOMPRESSED_KEY_LENGTH {
        return Err(EventError::InvalidPublicKey);
    }
    PublicKey::from_sec1_bytes(&bytes).map_err(|_| EventError::InvalidPublicKey)
}

pub(crate) fn encode_gammas(gammas: &Gammas) -> String {
    gammas.to_hex()
}

pub(crate) fn decode_gammas(value: &str) -> Result<Gammas> {
    Ok(Gammas::from_hex(value)?)
}

pub(crate) fn encode_scalars(scalars: &[Scalar]) -> String {
    let bytes: Vec<[u8; 32]> = scalars.iter().map(Scalar::to_bytes).collect();
    encode_byte_sequence(&bytes)
}

pub(crate) fn decode_scalars(value: &str) -> Result<Vec<Scalar>> {
    decode_byte_sequence(value)?
        .iter()
        .map(|bytes| scalar_from_bytes(bytes))
        .collect()
}

/// Scalars travel as their canonical 32 byte little endian encoding.
pub(crate) fn scalar_from_bytes(bytes: &[u8]) -> Result<Scalar> {
    let raw: [u8; 32] = bytes.try_into().map_err(|_| EventError::InvalidScalar)?;
    Option::from(Scalar::from_canonical_bytes(raw)).ok_or(EventError::InvalidScalar)
}

#[cfg(test)]
mod test {
    use assert_matches::assert_matches;
    use k256::SecretKey;
    use rand::rngs::OsRng;

    use super::*;

    #[test]
    fn test_uint() {
        assert_eq!(decode_uint(&encode_uint(u64::MAX)).unwrap(), u64::MAX);
        assert_matches!(decode_uint("+1"), Err(EventError::InvalidUint(_)));
        assert_matches!(decode_uint(""), Err(EventError::InvalidUint(_)));
        assert_matches!(decode_uint("-1"), Err(EventError::InvalidUint(_)));
    }

    #[test]
    fn test_addresses_require_checksum() {
        let address: Address = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed".parse().unwrap();
        let encoded = encode_addresses(&[address, Address::new([0x11; 20])]);
        assert_eq!(
            decode_addresses(&encoded).unwrap(),
            vec![address, Address::new([0x11; 20])]
        );

        let lower = "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed";
        assert_matches!(decode_address(lower), Err(EventError::InvalidAddress(_)));
        assert!(decode_addresses("").unwrap().is_empty());
    }

    #[test]
    fn test_byte_sequence() {
        let values = vec![vec![0xde, 0xad], vec![], vec![0x01]];
        let encoded = encode_byte_sequence(&values);
        assert_eq!(encoded, "0xdead,0x,0x01");
        assert_eq!(decode_byte_sequence(&encoded).unwrap(), values);
        assert!(decode_byte_sequence("").unwrap().is_empty());
        assert_matches!(decode_byte_sequence("dead"), Err(EventError::InvalidHex(_)));
        assert_matches!(decode_byte_sequence("0x0xdead"), Err(EventError::InvalidHex(_)));
        assert_matches!(decode_byte_sequence("0x01,0x0x"), Err(EventError::InvalidHex(_)));
    }

    #[test]
    fn test_public_key() {
        let key = SecretKey::random(&mut OsRng).public_key();
        let encoded = encode_public_key(&key);
        assert_eq!(decode_public_key(&encoded).unwrap(), key);

        let compressed = to_base64url(key.to_encoded_point(true).as_bytes());
        assert_matches!(decode_public_key(&compressed), Err(EventError::InvalidPublicKey));
    }

    #[test]
    fn test_scalars_must_be_canonical() {
        let scalars = vec![Scalar::from(7u64), Scalar::ZERO];
        assert_eq!(decode_scalars(&encode_scalars(&scalars)).unwrap(), scalars);

        let too_big = encode_byte_sequence(&[[0xffu8; 32]]);
        assert_matches!(decode_scalars(&too_big), Err(EventError::InvalidScalar));
    }
}
