//! JSON-RPC access to the consensus engine.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::abci::{Event, EventAttribute};
use crate::utilities::encoding::to_base64;

#[derive(Error, Debug)]
pub enum RpcError {
    #[error("Query failed: {0}")]
    Internal(#[from] reqwest::Error),
    #[error("Unexpected response: {status} {body}")]
    UnexpectedResponse {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("RPC error {code}: {message} {data}")]
    Remote {
        code: i64,
        message: String,
        data: String,
    },
    #[error("Response without result")]
    MissingResult,
}

pub type Result<T> = std::result::Result<T, RpcError>;

/// Outcome of a single delivered transaction.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TxResult {
    pub code: u32,
    pub log: String,
    pub events: Vec<Event>,
}

/// The events of one committed block, in execution order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BlockResults {
    pub height: i64,
    pub begin_block_events: Vec<Event>,
    pub tx_results: Vec<TxResult>,
    pub end_block_events: Vec<Event>,
}

impl BlockResults {
    /// Begin block events, then the events of every transaction, then end block events.
    pub fn events(&self) -> impl Iterator<Item = &Event> {
        self.begin_block_events
            .iter()
            .chain(self.tx_results.iter().flat_map(|tx| tx.events.iter()))
            .chain(self.end_block_events.iter())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BroadcastResult {
    pub height: i64,
    pub check_code: u32,
    pub check_log: String,
    pub deliver_code: u32,
    pub deliver_log: String,
}

/// Source of committed blocks for the observer.
#[async_trait]
pub trait BlockSource: Send + Sync {
    async fn chain_id(&self) -> Result<String>;

    /// Height of the latest committed block, 0 for an empty chain.
    async fn last_committed_height(&self) -> Result<i64>;

    async fn block_results(&self, height: i64) -> Result<BlockResults>;
}

/// Accepts both JSON numbers and the quoted integers the engine emits.
fn string_int<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: std::str::FromStr + TryFrom<i64>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(i64),
        Text(String),
    }
    let invalid = || <D::Error as serde::de::Error>::custom("invalid integer");
    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => T::try_from(n).map_err(|_| invalid()),
        Raw::Text(s) => s.parse().map_err(|_| invalid()),
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Serialize)]
struct RpcRequest<'a, P: Serialize> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: P,
}

#[derive(Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Deserialize)]
struct RpcErrorBody {
    code: i64,
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: String,
}

#[derive(Deserialize)]
struct StatusResponse {
    node_info: NodeInfo,
    sync_info: SyncInfo,
}

#[derive(Deserialize)]
struct NodeInfo {
    network: String,
}

#[derive(Deserialize)]
struct SyncInfo {
    #[serde(deserialize_with = "string_int")]
    latest_block_height: i64,
}

#[derive(Deserialize)]
struct RpcAttribute {
    key: String,
    #[serde(default, deserialize_with = "null_as_default")]
    value: String,
    #[serde(default)]
    index: bool,
}

#[derive(Deserialize)]
struct RpcEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, deserialize_with = "null_as_default")]
    attributes: Vec<RpcAttribute>,
}

impl From<RpcEvent> for Event {
    fn from(event: RpcEvent) -> Self {
        Event {
            kind: event.kind,
            attributes: event
                .attributes
                .into_iter()
                .map(|a| EventAttribute {
                    key: a.key,
                    value: a.value,
                    index: a.index,
                })
                .collect(),
        }
    }
}

#[derive(Deserialize)]
struct RpcTxResult {
    #[serde(default)]
    code: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    log: String,
    #[serde(default, deserialize_with = "null_as_default")]
    events: Vec<RpcEvent>,
}

impl From<RpcTxResult> for TxResult {
    fn from(tx: RpcTxResult) -> Self {
        TxResult {
            code: tx.code,
            log: tx.log,
            events: tx.events.into_iter().map(Event::from).collect(),
        }
    }
}

#[derive(Deserialize)]
struct BlockResultsResponse {
    #[serde(deserialize_with = "string_int")]
    height: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    txs_results: Vec<RpcTxResult>,
    #[serde(default, deserialize_with = "null_as_default")]
    begin_block_events: Vec<RpcEvent>,
    #[serde(default, deserialize_with = "null_as_default")]
    end_block_events: Vec<RpcEvent>,
}

impl From<BlockResultsResponse> for BlockResults {
    fn from(response: BlockResultsResponse) -> Self {
        BlockResults {
            height: response.height,
            begin_block_events: response
                .begin_block_events
                .into_iter()
                .map(Event::from)
                .collect(),
            tx_results: response
                .txs_results
                .into_iter()
                .map(TxResult::from)
                .collect(),
            end_block_events: response
                .end_block_events
                .into_iter()
                .map(Event::from)
                .collect(),
        }
    }
}

#[derive(Deserialize)]
struct BroadcastTxCommitResponse {
    check_tx: RpcTxResult,
    #[serde(alias = "tx_result")]
    deliver_tx: RpcTxResult,
    #[serde(deserialize_with = "string_int")]
    height: i64,
}

#[derive(Clone)]
pub struct ShuttermintClient {
    pub(crate) client: reqwest::Client,
    pub(crate) url: String,
}

impl ShuttermintClient {
    pub fn new(url: String) -> Self {
        let client = reqwest::Client::new();
        Self { client, url }
    }

    pub async fn status_height(&self) -> Result<(String, i64)> {
        let status: StatusResponse = self.call("status", serde_json::json!({})).await?;
        Ok((
            status.node_info.network,
            status.sync_info.latest_block_height,
        ))
    }

    /// `tx` is the transaction as it goes into a block.
    pub async fn broadcast_tx_commit(&self, tx: &[u8]) -> Result<BroadcastResult> {
        let params = serde_json::json!({ "tx": to_base64(tx) });
        let response: BroadcastTxCommitResponse =
            self.call("broadcast_tx_commit", params).await?;
        Ok(BroadcastResult {
            height: response.height,
            check_code: response.check_tx.code,
            check_log: response.check_tx.log,
            deliver_code: response.deliver_tx.code,
            deliver_log: response.deliver_tx.log,
        })
    }

    async fn call<P: Serialize, T: DeserializeOwned>(&self, method: &str, params: P) -> Result<T> {
        log::trace!("Calling {} on {}", method, self.url);
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: 1,
            method,
            params,
        };
        let response = self.client.post(&self.url).json(&request).send().await?;
        if !response.status().is_success() {
            return Err(RpcError::UnexpectedResponse {
                status: response.status(),
                body: response.text().await?,
            });
        }
        let body = response.json::<RpcResponse<T>>().await?;
        if let Some(error) = body.error {
            return Err(RpcError::Remote {
                code: error.code,
                message: error.message,
                data: error.data,
            });
        }
        body.result.ok_or(RpcError::MissingResult)
    }
}

#[async_trait]
impl BlockSource for ShuttermintClient {
    async fn chain_id(&self) -> Result<String> {
        Ok(self.status_height().await?.0)
    }

    async fn last_committed_height(&self) -> Result<i64> {
        Ok(self.status_height().await?.1)
    }

    async fn block_results(&self, height: i64) -> Result<BlockResults> {
        let params = serde_json::json!({ "height": height.to_string() });
        let response: BlockResultsResponse = self.call("block_results", params).await?;
        Ok(response.into())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_block_results() {
        let json = r#"{
            "height": "12",
            "txs_results": [
                {"code": 0, "log": "", "events": [
                    {"type": "shutter.check-in", "attributes": [
                        {"key": "Sender", "value": "0xabc", "index": false},
                        {"key": "EncryptionPublicKey", "value": "", "index": false}
                    ]}
                ]},
                {"code": 1, "log": "sender is not a keyper", "events": null}
            ],
            "begin_block_events": null,
            "end_block_events": [{"type": "shutter.batch-config-started", "attributes": [
                {"key": "KeyperConfigIndex", "value": "1"}
            ]}]
        }"#;
        let response: BlockResultsResponse = serde_json::from_str(json).unwrap();
        let results = BlockResults::from(response);
        assert_eq!(results.height, 12);
        assert!(results.begin_block_events.is_empty());
        assert_eq!(results.tx_results.len(), 2);
        assert_eq!(results.tx_results[1].code, 1);

        let kinds: Vec<&str> = results.events().map(|e| e.kind.as_str()).collect();
        assert_eq!(
            kinds,
            vec!["shutter.check-in", "shutter.batch-config-started"]
        );
        assert_eq!(results.tx_results[0].events[0].attributes[0].value, "0xabc");
    }

    #[test]
    fn test_parse_status() {
        let json = r#"{
            "node_info": {"network": "shutter-chain", "moniker": "x"},
            "sync_info": {"latest_block_height": "0", "catching_up": false}
        }"#;
        let status: StatusResponse = serde_json::from_str(json).unwrap();
        assert_eq!(status.node_info.network, "shutter-chain");
        assert_eq!(status.sync_info.latest_block_height, 0);
    }

    #[test]
    fn test_parse_rpc_error() {
        let json = r#"{"jsonrpc": "2.0", "id": 1, "error": {"code": -32603, "message": "Internal error", "data": "height 9 must be less than or equal to the current blockchain height 3"}}"#;
        let response: RpcResponse<BlockResultsResponse> = serde_json::from_str(json).unwrap();
        assert!(response.result.is_none());
        assert_eq!(response.error.unwrap().code, -32603);
    }
}
