//! Messages keypers submit to the shuttermint chain.
//!
//! The structs are protobuf messages (hand-written `prost` derives) so that the
//! wire format stays compatible with other keyper implementations. They also
//! derive serde so they can be stored as scheduled outbound messages.

pub mod signed;

use k256::elliptic_curve::sec1::ToEncodedPoint;
use serde::{Deserialize, Serialize};

pub use signed::{decode_tx, encode_tx, get_message, get_signer, sign_message, CodecError};

use crate::crypto::Address;

#[derive(Clone, PartialEq, Serialize, Deserialize, ::prost::Message)]
pub struct BatchConfig {
    #[prost(uint64, tag = "1")]
    pub activation_block_number: u64,
    #[prost(bytes = "vec", repeated, tag = "2")]
    pub keypers: Vec<Vec<u8>>,
    #[prost(uint64, tag = "3")]
    pub threshold: u64,
    #[prost(uint64, tag = "5")]
    pub keyper_config_index: u64,
}

#[derive(Clone, PartialEq, Serialize, Deserialize, ::prost::Message)]
pub struct BlockSeen {
    #[prost(uint64, tag = "1")]
    pub block_number: u64,
}

#[derive(Clone, PartialEq, Serialize, Deserialize, ::prost::Message)]
pub struct CheckIn {
    /// Raw ed25519 key, 32 bytes.
    #[prost(bytes = "vec", tag = "1")]
    pub validator_public_key: Vec<u8>,
    /// Compressed secp256k1 key, 33 bytes.
    #[prost(bytes = "vec", tag = "2")]
    pub encryption_public_key: Vec<u8>,
}

#[derive(Clone, PartialEq, Serialize, Deserialize, ::prost::Message)]
pub struct PolyEval {
    #[prost(uint64, tag = "1")]
    pub eon: u64,
    #[prost(bytes = "vec", repeated, tag = "2")]
    pub receivers: Vec<Vec<u8>>,
    #[prost(bytes = "vec", repeated, tag = "3")]
    pub encrypted_evals: Vec<Vec<u8>>,
}

#[derive(Clone, PartialEq, Serialize, Deserialize, ::prost::Message)]
pub struct PolyCommitment {
    #[prost(uint64, tag = "1")]
    pub eon: u64,
    #[prost(bytes = "vec", repeated, tag = "2")]
    pub gammas: Vec<Vec<u8>>,
}

#[derive(Clone, PartialEq, Serialize, Deserialize, ::prost::Message)]
pub struct Accusation {
    #[prost(uint64, tag = "1")]
    pub eon: u64,
    #[prost(bytes = "vec", repeated, tag = "2")]
    pub accused: Vec<Vec<u8>>,
}

#[derive(Clone, PartialEq, Serialize, Deserialize, ::prost::Message)]
pub struct Apology {
    #[prost(uint64, tag = "1")]
    pub eon: u64,
    #[prost(bytes = "vec", repeated, tag = "2")]
    pub accusers: Vec<Vec<u8>>,
    #[prost(bytes = "vec", repeated, tag = "3")]
    pub poly_evals: Vec<Vec<u8>>,
}

#[derive(Clone, PartialEq, Serialize, Deserialize, ::prost::Message)]
pub struct DkgResult {
    #[prost(bool, tag = "1")]
    pub success: bool,
    #[prost(uint64, tag = "2")]
    pub eon: u64,
}

#[derive(Clone, PartialEq, Serialize, Deserialize, ::prost::Message)]
pub struct Message {
    #[prost(oneof = "message::Payload", tags = "4, 7, 9, 10, 11, 12, 14, 15")]
    pub payload: Option<message::Payload>,
}

pub mod message {
    use serde::{Deserialize, Serialize};

    #[derive(Clone, PartialEq, Serialize, Deserialize, ::prost::Oneof)]
    pub enum Payload {
        #[prost(message, tag = "4")]
        BatchConfig(super::BatchConfig),
        #[prost(message, tag = "7")]
        CheckIn(super::CheckIn),
        #[prost(message, tag = "9")]
        PolyEval(super::PolyEval),
        #[prost(message, tag = "10")]
        PolyCommitment(super::PolyCommitment),
        #[prost(message, tag = "11")]
        Accusation(super::Accusation),
        #[prost(message, tag = "12")]
        Apology(super::Apology),
        #[prost(message, tag = "14")]
        BlockSeen(super::BlockSeen),
        #[prost(message, tag = "15")]
        DkgResult(super::DkgResult),
    }
}

/// The signed part of a transaction.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MessageWithNonce {
    #[prost(message, optional, tag = "1")]
    pub msg: Option<Message>,
    #[prost(bytes = "vec", tag = "2")]
    pub chain_id: Vec<u8>,
    #[prost(uint64, tag = "3")]
    pub random_nonce: u64,
}

fn address_bytes(addresses: &[Address]) -> Vec<Vec<u8>> {
    addresses.iter().map(Address::to_vec).collect()
}

impl Message {
    fn with(payload: message::Payload) -> Self {
        Self {
            payload: Some(payload),
        }
    }

    pub fn batch_config(
        keyper_config_index: u64,
        activation_block_number: u64,
        keypers: &[Address],
        threshold: u64,
    ) -> Self {
        Self::with(message::Payload::BatchConfig(BatchConfig {
            activation_block_number,
            keypers: address_bytes(keypers),
            threshold,
            keyper_config_index,
        }))
    }

    pub fn block_seen(block_number: u64) -> Self {
        Self::with(message::Payload::BlockSeen(BlockSeen { block_number }))
    }

    pub fn check_in(validator_public_key: &[u8], encryption_public_key: &k256::PublicKey) -> Self {
        Self::with(message::Payload::CheckIn(CheckIn {
            validator_public_key: validator_public_key.to_vec(),
            encryption_public_key: encryption_public_key
                .to_encoded_point(true)
                .as_bytes()
                .to_vec(),
        }))
    }

    pub fn poly_eval(eon: u64, receivers: &[Address], encrypted_evals: Vec<Vec<u8>>) -> Self {
        Self::with(message::Payload::PolyEval(PolyEval {
            eon,
            receivers: address_bytes(receivers),
            encrypted_evals,
        }))
    }

    pub fn poly_commitment(eon: u64, gammas: Vec<Vec<u8>>) -> Self {
        Self::with(message::Payload::PolyCommitment(PolyCommitment { eon, gammas }))
    }

    pub fn accusation(eon: u64, accused: &[Address]) -> Self {
        Self::with(message::Payload::Accusation(Accusation {
            eon,
            accused: address_bytes(accused),
        }))
    }

    pub fn apology(eon: u64, accusers: &[Address], poly_evals: Vec<Vec<u8>>) -> Self {
        Self::with(message::Payload::Apology(Apology {
            eon,
            accusers: address_bytes(accusers),
            poly_evals,
        }))
    }

    pub fn dkg_result(eon: u64, success: bool) -> Self {
        Self::with(message::Payload::DkgResult(DkgResult { success, eon }))
    }

    /// Short human readable summary, used as the description of scheduled messages.
    pub fn describe(&self) -> String {
        use message::Payload;
        match &self.payload {
            None => "empty message".to_string(),
            Some(Payload::BatchConfig(m)) => format!(
                "new batch config (activation-block-number={}, config-index={})",
                m.activation_block_number, m.keyper_config_index
            ),
            Some(Payload::CheckIn(m)) => format!(
                "check-in (validator-pub-key={})",
                crate::utilities::to_hex(&m.validator_public_key)
            ),
            Some(Payload::PolyEval(m)) => format!("poly eval (eon={})", m.eon),
            Some(Payload::PolyCommitment(m)) => format!("poly commitment (eon={})", m.eon),
            Some(Payload::Accusation(m)) => {
                format!("accusations (eon={}, count={})", m.eon, m.accused.len())
            }
            Some(Payload::Apology(m)) => {
                format!("apologies (eon={}, count={})", m.eon, m.accusers.len())
            }
            Some(Payload::BlockSeen(m)) => format!("block seen (block-number={})", m.block_number),
            Some(Payload::DkgResult(m)) => format!("reporting DKG result (eon={})", m.eon),
        }
    }
}
