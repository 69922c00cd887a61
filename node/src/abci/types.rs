//! # ABCI Types
//!
//! Requests and responses exchanged with the consensus engine. Only the fields
//! the shuttermint application reads or fills in are modelled.

use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::crypto::ValidatorPubkey;

pub const CODE_OK: u32 = 0;
pub const CODE_ERR: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventAttribute {
    pub key: String,
    pub value: String,
    #[serde(default)]
    pub index: bool,
}

/// Typed, ordered list of key/value attributes attached to a block or transaction result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub attributes: Vec<EventAttribute>,
}

impl Event {
    pub fn new<K: Into<String>>(kind: K, attributes: Vec<EventAttribute>) -> Self {
        Self {
            kind: kind.into(),
            attributes,
        }
    }

    pub fn attribute<K: Into<String>, V: Into<String>>(key: K, value: V) -> EventAttribute {
        EventAttribute {
            key: key.into(),
            value: value.into(),
            index: false,
        }
    }

    pub fn indexed_attribute<K: Into<String>, V: Into<String>>(key: K, value: V) -> EventAttribute {
        EventAttribute {
            index: true,
            ..Self::attribute(key, value)
        }
    }
}

impl Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Event({}, {} attributes)", self.kind, self.attributes.len())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorUpdate {
    pub pub_key: ValidatorPubkey,
    pub power: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestInfo;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseInfo {
    pub last_block_height: i64,
    pub last_block_app_hash: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestInitChain {
    pub chain_id: String,
    pub app_state_bytes: Vec<u8>,
    pub validators: Vec<ValidatorUpdate>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseInitChain;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestQuery {
    pub path: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseQuery {
    pub code: u32,
    pub log: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestCheckTx {
    pub tx: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseCheckTx {
    pub code: u32,
    pub log: String,
    pub gas_wanted: i64,
}

impl ResponseCheckTx {
    pub fn ok() -> Self {
        Self {
            code: CODE_OK,
            log: String::new(),
            gas_wanted: 1,
        }
    }

    pub fn rejected<S: Into<String>>(log: S) -> Self {
        Self {
            code: CODE_ERR,
            log: log.into(),
            gas_wanted: 0,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.code == CODE_OK
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestBeginBlock {
    pub height: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseBeginBlock {
    pub events: Vec<Event>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestPrepareProposal {
    pub txs: Vec<Vec<u8>>,
    pub max_tx_bytes: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponsePrepareProposal {
    pub txs: Vec<Vec<u8>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestProcessProposal {
    pub txs: Vec<Vec<u8>>,
    pub height: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProposalStatus {
    Accept,
    Reject,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseProcessProposal {
    pub status: ProposalStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestDeliverTx {
    pub tx: Vec<u8>,
}

/// Result of a delivered transaction. Also the shape of `txs_results` entries
/// in the block results RPC.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseDeliverTx {
    #[serde(default)]
    pub code: u32,
    #[serde(default)]
    pub log: String,
    #[serde(default, deserialize_with = "crate::abci::types::null_as_empty")]
    pub events: Vec<Event>,
}

impl ResponseDeliverTx {
    pub fn ok(events: Vec<Event>) -> Self {
        Self {
            code: CODE_OK,
            log: String::new(),
            events,
        }
    }

    pub fn rejected<S: Into<String>>(log: S) -> Self {
        Self {
            code: CODE_ERR,
            log: log.into(),
            events: vec![],
        }
    }

    pub fn is_ok(&self) -> bool {
        self.code == CODE_OK
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestEndBlock {
    pub height: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseEndBlock {
    pub validator_updates: Vec<ValidatorUpdate>,
    pub events: Vec<Event>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseCommit;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseListSnapshots;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseOfferSnapshot;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseLoadSnapshotChunk;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseApplySnapshotChunk;

/// The consensus engine reports missing lists as `null`.
pub(crate) fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}
