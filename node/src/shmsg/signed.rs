use prost::Message as _;
use thiserror::Error;

use crate::crypto::{recover_address, Address, KeyPairError, KeyperKeypair, SIGNATURE_LENGTH};
use crate::shmsg::MessageWithNonce;
use crate::utilities::encoding::{from_base64url, to_base64url};
use crate::utilities::Hasher;

/// Domain separator mixed into the digest of every signed message.
const HASH_PREFIX: &[u8] = b"\x19shutter-signed-message\n";

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("transaction is not valid base64url")]
    InvalidBase64,
    #[error("signed message too short ({0} bytes)")]
    TooShort(usize),
    #[error("bad signature: {0}")]
    Signature(#[from] KeyPairError),
    #[error("cannot decode protobuf payload: {0}")]
    Protobuf(#[from] prost::DecodeError),
    #[error("message has no payload")]
    MissingMessage,
}

pub type Result<T> = std::result::Result<T, CodecError>;

fn digest(payload: &[u8]) -> [u8; 32] {
    Hasher::keccak_256_concat(&[HASH_PREFIX, payload])
}

/// Produces `signature || payload` where payload is the protobuf encoding of `msg`.
pub fn sign_message(msg: &MessageWithNonce, keypair: &KeyperKeypair) -> Result<Vec<u8>> {
    let payload = msg.encode_to_vec();
    let signature = keypair.sign_prehash(&digest(&payload))?;
    let mut signed = Vec::with_capacity(SIGNATURE_LENGTH + payload.len());
    signed.extend_from_slice(&signature);
    signed.extend_from_slice(&payload);
    Ok(signed)
}

fn split(signed: &[u8]) -> Result<(&[u8], &[u8])> {
    if signed.len() < SIGNATURE_LENGTH {
        return Err(CodecError::TooShort(signed.len()));
    }
    Ok(signed.split_at(SIGNATURE_LENGTH))
}

pub fn get_signer(signed: &[u8]) -> Result<Address> {
    let (signature, payload) = split(signed)?;
    Ok(recover_address(&digest(payload), signature)?)
}

pub fn get_message(signed: &[u8]) -> Result<MessageWithNonce> {
    let (_, payload) = split(signed)?;
    let msg = MessageWithNonce::decode(payload)?;
    match &msg.msg {
        Some(inner) if inner.payload.is_some() => Ok(msg),
        _ => Err(CodecError::MissingMessage),
    }
}

/// Outer transaction encoding: base64url without padding.
pub fn encode_tx(signed: &[u8]) -> Vec<u8> {
    to_base64url(signed).into_bytes()
}

/// Decodes a raw transaction and recovers its sender.
pub fn decode_tx(tx: &[u8]) -> Result<(Address, MessageWithNonce)> {
    let signed = from_base64url(tx).map_err(|_| CodecError::InvalidBase64)?;
    let signer = get_signer(&signed)?;
    let msg = get_message(&signed)?;
    Ok((signer, msg))
}

#[cfg(test)]
mod test {
    use assert_matches::assert_matches;

    use super::*;
    use crate::crypto::KeyPair;
    use crate::shmsg::Message;

    fn with_nonce(msg: Message, nonce: u64) -> MessageWithNonce {
        MessageWithNonce {
            msg: Some(msg),
            chain_id: b"shutter-test".to_vec(),
            random_nonce: nonce,
        }
    }

    #[test]
    fn test_sign_decode_recovers_sender() {
        let keypair = KeyperKeypair::generate().unwrap();
        let msg = with_nonce(Message::block_seen(42), 7);

        let tx = encode_tx(&sign_message(&msg, &keypair).unwrap());
        let (sender, decoded) = decode_tx(&tx).unwrap();

        assert_eq!(sender, keypair.address());
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_tampered_payload_changes_signer() {
        let keypair = KeyperKeypair::generate().unwrap();
        let msg = with_nonce(Message::block_seen(42), 7);
        let mut signed = sign_message(&msg, &keypair).unwrap();
        let last = signed.len() - 1;
        signed[last] ^= 0x01;

        match get_signer(&signed) {
            Ok(sender) => assert_ne!(sender, keypair.address()),
            Err(err) => assert_matches!(err, CodecError::Signature(_)),
        }
    }

    #[test]
    fn test_rejects_garbage() {
        assert_matches!(decode_tx(b"not base64 !"), Err(CodecError::InvalidBase64));
        assert_matches!(
            decode_tx(to_base64url([1u8; 10]).as_bytes()),
            Err(CodecError::TooShort(10))
        );
    }

    #[test]
    fn test_missing_payload_rejected() {
        let keypair = KeyperKeypair::generate().unwrap();
        let msg = MessageWithNonce {
            msg: None,
            chain_id: b"shutter-test".to_vec(),
            random_nonce: 1,
        };
        let signed = sign_message(&msg, &keypair).unwrap();
        assert_matches!(get_message(&signed), Err(CodecError::MissingMessage));
    }
}
