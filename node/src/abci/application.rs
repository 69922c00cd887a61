use thiserror::Error;

use crate::abci::types::{
    ProposalStatus, RequestBeginBlock, RequestCheckTx, RequestDeliverTx, RequestEndBlock,
    RequestInfo, RequestInitChain, RequestPrepareProposal, RequestProcessProposal, RequestQuery,
    ResponseApplySnapshotChunk, ResponseBeginBlock, ResponseCheckTx, ResponseCommit,
    ResponseDeliverTx, ResponseEndBlock, ResponseInfo, ResponseInitChain, ResponseListSnapshots,
    ResponseLoadSnapshotChunk, ResponseOfferSnapshot, ResponsePrepareProposal,
    ResponseProcessProposal, ResponseQuery, CODE_ERR,
};

#[derive(Error, Debug)]
pub enum ApplicationError {
    #[error("ApplicationError::InvalidGenesis: {0}")]
    InvalidGenesis(String),
    #[error("ApplicationError::NonEmptyState: init_chain called on non-empty state")]
    NonEmptyState,
    #[error("ApplicationError::GeneralError: {0}")]
    GeneralError(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, ApplicationError>;

/// Cosmos style ABCI application.
///
/// Notes:
/// A) The consensus engine calls these serially, one block at a time.
/// B) Implementations must be deterministic: no clocks, no randomness, no unordered iteration.
/// C) Only `init_chain` may fail. Every other error becomes a rejected transaction.
pub trait Application {
    fn info(&self, request: RequestInfo) -> ResponseInfo;

    /// Called once on a fresh chain. An error here is fatal for the node.
    fn init_chain(&mut self, request: RequestInitChain) -> Result<ResponseInitChain>;

    /// Mempool admission check. Rejected transactions are never gossiped.
    fn check_tx(&mut self, request: RequestCheckTx) -> ResponseCheckTx;

    fn begin_block(&mut self, request: RequestBeginBlock) -> ResponseBeginBlock;

    /// Keeps the longest prefix of the candidate transactions that fits into `max_tx_bytes`.
    fn prepare_proposal(&mut self, request: RequestPrepareProposal) -> ResponsePrepareProposal {
        let mut total_bytes: i64 = 0;
        let mut txs = Vec::with_capacity(request.txs.len());
        for tx in request.txs {
            total_bytes += tx.len() as i64;
            if total_bytes > request.max_tx_bytes {
                break;
            }
            txs.push(tx);
        }
        ResponsePrepareProposal { txs }
    }

    fn process_proposal(&mut self, request: RequestProcessProposal) -> ResponseProcessProposal {
        log::trace!("Accepting proposal with {} txs", request.txs.len());
        ResponseProcessProposal {
            status: ProposalStatus::Accept,
        }
    }

    fn deliver_tx(&mut self, request: RequestDeliverTx) -> ResponseDeliverTx;

    fn end_block(&mut self, request: RequestEndBlock) -> ResponseEndBlock;

    fn commit(&mut self) -> ResponseCommit;

    fn query(&self, request: RequestQuery) -> ResponseQuery {
        log::debug!("Rejecting query for path {}", request.path);
        ResponseQuery {
            code: CODE_ERR,
            log: "query not implemented".to_string(),
        }
    }

    fn list_snapshots(&self) -> ResponseListSnapshots {
        ResponseListSnapshots
    }

    fn offer_snapshot(&mut self) -> ResponseOfferSnapshot {
        ResponseOfferSnapshot
    }

    fn load_snapshot_chunk(&self) -> ResponseLoadSnapshotChunk {
        ResponseLoadSnapshotChunk
    }

    fn apply_snapshot_chunk(&mut self) -> ResponseApplySnapshotChunk {
        ResponseApplySnapshotChunk
    }
}
