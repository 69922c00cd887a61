//! Follows the shuttermint chain block by block and keeps the keyper database in sync.
//!
//! Every block is handled in a single database transaction: the sync position, the
//! mirror, the DKG records and the messages the block caused are committed together.
//! A failed block leaves nothing behind and is retried on the next poll, except for
//! blocks arriving out of order, which stop the observer.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Mutex;

use crate::crypto::ecies::EciesError;
use crate::dkg::PureDkgError;
use crate::events::make_event;
use crate::keyper::rpc::{BlockResults, BlockSource, RpcError};
use crate::keyper::shutdown::Shutdown;
use crate::keyper::state::ShuttermintState;
use crate::keyper::KeyperConfig;
use crate::storage::{ObserverDb, Queries, StorageError};

#[derive(Error, Debug)]
pub enum ObserverError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Shuttermint RPC error: {0}")]
    Rpc(#[from] RpcError),
    #[error("DKG error: {0}")]
    Dkg(#[from] PureDkgError),
    #[error("Cannot encrypt poly eval: {0}")]
    Ecies(#[from] EciesError),
    #[error("No keyper with index {0}")]
    UnknownKeyperIndex(u64),
}

pub type Result<T> = std::result::Result<T, ObserverError>;

pub struct Observer<B> {
    source: B,
    db: Arc<Mutex<ObserverDb>>,
    config: KeyperConfig,
    /// Loaded lazily and dropped whenever a block fails.
    state: Option<ShuttermintState>,
}

impl<B: BlockSource> Observer<B> {
    pub fn new(source: B, db: Arc<Mutex<ObserverDb>>, config: KeyperConfig) -> Self {
        Observer {
            source,
            db,
            config,
            state: None,
        }
    }

    /// Handles every committed block the database hasn't seen yet. Returns the
    /// number of blocks handled.
    pub async fn sync(&mut self) -> Result<usize> {
        let last_committed = self.source.last_committed_height().await?;
        if last_committed == 0 {
            log::debug!("Shuttermint chain is empty, nothing to sync");
            return Ok(0);
        }

        let db = self.db.clone();
        let current = db.lock().await.queries().current_block()?;
        if current >= last_committed {
            return Ok(0);
        }
        log::debug!(
            "Syncing shuttermint blocks {}..={}",
            current + 1,
            last_committed
        );

        let mut handled = 0;
        for height in current + 1..=last_committed {
            let block = self.source.block_results(height).await?;
            let mut db = db.lock().await;
            self.handle_block(&mut db, last_committed, &block)?;
            handled += 1;
        }
        Ok(handled)
    }

    fn handle_block(
        &mut self,
        db: &mut ObserverDb,
        last_committed: i64,
        block: &BlockResults,
    ) -> Result<()> {
        let tx = db.transaction()?;
        let queries = Queries::new(&tx);
        queries.bump_current_block(block.height)?;
        queries.set_last_committed_height(last_committed)?;

        let mut state = match self.state.take() {
            Some(state) => state,
            None => ShuttermintState::load(&queries)?,
        };

        state.shift_phases(&self.config, &queries, block.height)?;
        for event in block.events() {
            match make_event(event, block.height) {
                Ok(event) => state.handle_event(&self.config, &queries, &event)?,
                Err(err) => log::warn!(
                    "Skipping malformed event {} at height {}: {}",
                    event,
                    block.height,
                    err
                ),
            }
        }
        state.shift_phases(&self.config, &queries, block.height)?;
        state.send_poly_evals(&queries)?;
        state.save(&queries)?;

        tx.commit().map_err(StorageError::from)?;
        self.state = Some(state);
        Ok(())
    }

    /// Polls the chain until shutdown. Returns an error if the database and the chain
    /// disagree on the block order.
    pub async fn run(mut self, mut shutdown: Shutdown) -> anyhow::Result<()> {
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    log::info!("Shuttermint observer stopped");
                    return Ok(());
                }
                _ = ticker.tick() => {
                    match self.sync().await {
                        Ok(0) => {}
                        Ok(handled) => log::debug!("Handled {} shuttermint blocks", handled),
                        Err(err @ ObserverError::Storage(StorageError::OutOfOrder { .. })) => {
                            log::error!("Shuttermint observer stopped: {err}");
                            return Err(err.into());
                        }
                        Err(err) => log::error!("Failed to sync shuttermint state: {err}"),
                    }
                }
            }
        }
    }
}
