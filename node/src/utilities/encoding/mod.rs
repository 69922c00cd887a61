use base64::Engine;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Leading byte of every blob produced by [`encode`].
pub const FORMAT_VERSION: u8 = 1;

#[derive(Error, Debug)]
pub enum EncodingError {
    #[error("Empty input")]
    Empty,
    #[error("Unsupported format version: {0}")]
    UnsupportedVersion(u8),
    #[error("Bincode error: {0}")]
    Bincode(#[from] bincode::Error),
    #[error("Invalid hex string")]
    InvalidHex,
    #[error("Invalid base64 string: {0}")]
    InvalidBase64(#[from] base64::DecodeError),
}

pub type Result<T> = std::result::Result<T, EncodingError>;

/// Binary layout shared by snapshots, observer blobs and scheduled messages:
/// a version byte followed by the bincode encoding of `message`.
pub fn encode<M: Serialize>(message: &M) -> Result<Vec<u8>> {
    let mut out = vec![FORMAT_VERSION];
    bincode::serialize_into(&mut out, message)?;
    Ok(out)
}

pub fn decode<M: DeserializeOwned>(bytes: &[u8]) -> Result<M> {
    match bytes.split_first() {
        None => Err(EncodingError::Empty),
        Some((&FORMAT_VERSION, rest)) => Ok(bincode::deserialize(rest)?),
        Some((version, _)) => Err(EncodingError::UnsupportedVersion(*version)),
    }
}

pub fn to_hex<T: AsRef<[u8]>>(data: T) -> String {
    array_bytes::bytes2hex("", data.as_ref())
}

pub fn to_hex_prefixed<T: AsRef<[u8]>>(data: T) -> String {
    array_bytes::bytes2hex("0x", data.as_ref())
}

/// Accepts input with or without a `0x` prefix.
pub fn from_hex<T: AsRef<[u8]>>(data: T) -> Result<Vec<u8>> {
    array_bytes::hex2bytes(data.as_ref()).map_err(|_| EncodingError::InvalidHex)
}

pub fn to_base64url<T: AsRef<[u8]>>(data: T) -> String {
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(data)
}

pub fn from_base64url<T: AsRef<[u8]>>(data: T) -> Result<Vec<u8>> {
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.decode(data)?)
}

pub fn to_base64<T: AsRef<[u8]>>(data: T) -> String {
    base64::engine::general_purpose::STANDARD.encode(data)
}

#[cfg(test)]
mod test {
    use std::collections::BTreeMap;

    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn test_versioned_blob_starts_with_version_byte() {
        let mut map = BTreeMap::new();
        map.insert(2u64, "b".to_string());
        map.insert(1u64, "a".to_string());

        let bytes = encode(&map).unwrap();
        assert_eq!(bytes[0], FORMAT_VERSION);

        let decoded: BTreeMap<u64, String> = decode(&bytes).unwrap();
        assert_eq!(decoded, map);
    }

    #[test]
    fn test_unknown_version_rejected() {
        let mut bytes = encode(&7u64).unwrap();
        bytes[0] = 99;
        assert_matches!(
            decode::<u64>(&bytes),
            Err(EncodingError::UnsupportedVersion(99))
        );
        assert_matches!(decode::<u64>(&[]), Err(EncodingError::Empty));
    }

    #[test]
    fn test_hex_accepts_prefix() {
        assert_eq!(from_hex("0x0aff").unwrap(), vec![0x0a, 0xff]);
        assert_eq!(from_hex("0aff").unwrap(), vec![0x0a, 0xff]);
        assert_eq!(to_hex_prefixed([0x0a, 0xff]), "0x0aff");
        assert_matches!(from_hex("0xzz"), Err(EncodingError::InvalidHex));
    }

    #[test]
    fn test_base64url_has_no_padding() {
        let encoded = to_base64url([0xfb, 0xff]);
        assert_eq!(encoded, "-_8");
        assert_eq!(from_base64url(&encoded).unwrap(), vec![0xfb, 0xff]);
    }
}
