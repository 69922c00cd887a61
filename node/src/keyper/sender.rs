//! Sends the messages the observer schedules.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::OnceCell;

use crate::crypto::KeyperKeypair;
use crate::keyper::rpc::{RpcError, ShuttermintClient};
use crate::keyper::shutdown::Shutdown;
use crate::shmsg::{encode_tx, sign_message, CodecError, Message, MessageWithNonce};
use crate::storage::{ObserverDb, StorageError};

#[derive(Error, Debug)]
pub enum SenderError {
    #[error("Transport error: {0}")]
    Transport(#[from] RpcError),
    #[error("Cannot sign message: {0}")]
    Codec(#[from] CodecError),
    #[error("Message rejected (code {code}): {log}")]
    Remote { code: u32, log: String },
}

impl SenderError {
    /// Rejected messages would be rejected again.
    pub fn is_retriable(&self) -> bool {
        matches!(self, SenderError::Transport(_))
    }
}

pub type Result<T> = std::result::Result<T, SenderError>;

#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send_message(&self, msg: &Message) -> Result<()>;
}

pub struct RpcMessageSender {
    client: ShuttermintClient,
    keypair: KeyperKeypair,
    chain_id: OnceCell<String>,
}

impl RpcMessageSender {
    pub fn new(client: ShuttermintClient, keypair: KeyperKeypair) -> Self {
        RpcMessageSender {
            client,
            keypair,
            chain_id: OnceCell::new(),
        }
    }

    async fn chain_id(&self) -> Result<&str> {
        let chain_id = self
            .chain_id
            .get_or_try_init(|| async {
                let (chain_id, _) = self.client.status_height().await?;
                log::info!("Sending messages to chain {}", chain_id);
                Ok::<_, SenderError>(chain_id)
            })
            .await?;
        Ok(chain_id.as_str())
    }
}

#[async_trait]
impl MessageSender for RpcMessageSender {
    async fn send_message(&self, msg: &Message) -> Result<()> {
        let with_nonce = MessageWithNonce {
            msg: Some(msg.clone()),
            chain_id: self.chain_id().await?.as_bytes().to_vec(),
            random_nonce: rand::random(),
        };
        let tx = encode_tx(&sign_message(&with_nonce, &self.keypair)?);
        let result = self.client.broadcast_tx_commit(&tx).await?;
        if result.check_code != 0 {
            return Err(SenderError::Remote {
                code: result.check_code,
                log: result.check_log,
            });
        }
        if result.deliver_code != 0 {
            return Err(SenderError::Remote {
                code: result.deliver_code,
                log: result.deliver_log,
            });
        }
        log::debug!("Message {} included at height {}", msg.describe(), result.height);
        Ok(())
    }
}

/// Collects sent messages instead of broadcasting them.
#[derive(Clone, Default)]
pub struct RecordingSender {
    sent: Arc<Mutex<Vec<Message>>>,
}

impl RecordingSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Message> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl MessageSender for RecordingSender {
    async fn send_message(&self, msg: &Message) -> Result<()> {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(msg.clone());
        }
        Ok(())
    }
}

/// Sends every scheduled message once, in schedule order.
///
/// Sent and rejected messages are removed. The first retriable failure stops the pass
/// and leaves that message and all later ones in place. Returns the number of removed rows.
/// The database is only locked to read the schedule and to remove rows, never while a
/// message is in flight.
pub async fn drain_scheduled<S: MessageSender + ?Sized>(
    db: &tokio::sync::Mutex<ObserverDb>,
    sender: &S,
) -> std::result::Result<usize, StorageError> {
    let scheduled = db.lock().await.queries().scheduled_messages()?;
    let mut removed = 0;
    for message in scheduled {
        match sender.send_message(&message.msg).await {
            Ok(()) => {
                log::info!("Sent message {}: {}", message.id, message.description);
            }
            Err(err) if err.is_retriable() => {
                log::warn!(
                    "Failed to send message {} ({}), will retry: {}",
                    message.id,
                    message.description,
                    err
                );
                break;
            }
            Err(err) => {
                log::error!(
                    "Message {} ({}) was rejected, dropping it: {}",
                    message.id,
                    message.description,
                    err
                );
            }
        }
        db.lock().await.queries().delete_scheduled_message(message.id)?;
        removed += 1;
    }
    Ok(removed)
}

/// Drains the scheduled messages every `interval` until shutdown.
pub async fn run_sender<S: MessageSender>(
    db: Arc<tokio::sync::Mutex<ObserverDb>>,
    sender: S,
    interval: Duration,
    mut shutdown: Shutdown,
) -> anyhow::Result<()> {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                log::info!("Message sender stopped");
                return Ok(());
            }
            _ = ticker.tick() => {
                if let Err(err) = drain_scheduled(&db, &sender).await {
                    log::error!("Failed to drain scheduled messages: {err}");
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::storage::sqlite::test_utils::open_temp_db;

    /// Fails the n-th call with the given error, succeeds otherwise.
    struct FlakySender {
        calls: AtomicUsize,
        fail_at: usize,
        retriable: bool,
        inner: RecordingSender,
    }

    #[async_trait]
    impl MessageSender for FlakySender {
        async fn send_message(&self, msg: &Message) -> Result<()> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call == self.fail_at {
                if self.retriable {
                    return Err(SenderError::Transport(RpcError::MissingResult));
                }
                return Err(SenderError::Remote {
                    code: 1,
                    log: "nonce already used".to_string(),
                });
            }
            self.inner.send_message(msg).await
        }
    }

    /// Opens a database with three scheduled messages.
    fn scheduled_db(dir: &tempfile::TempDir) -> tokio::sync::Mutex<ObserverDb> {
        let db = open_temp_db(dir);
        let queries = db.queries();
        queries.schedule_message(&Message::block_seen(1)).unwrap();
        queries.schedule_message(&Message::block_seen(2)).unwrap();
        queries.schedule_message(&Message::block_seen(3)).unwrap();
        tokio::sync::Mutex::new(db)
    }

    /// Records whether the database was free while each message was sent.
    struct LockCheckingSender {
        db: Arc<tokio::sync::Mutex<ObserverDb>>,
        db_free: Mutex<Vec<bool>>,
    }

    #[async_trait]
    impl MessageSender for LockCheckingSender {
        async fn send_message(&self, _msg: &Message) -> Result<()> {
            let free = self.db.try_lock().is_ok();
            if let Ok(mut db_free) = self.db_free.lock() {
                db_free.push(free);
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_drain_sends_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let db = scheduled_db(&dir);
        let sender = RecordingSender::new();

        assert_eq!(drain_scheduled(&db, &sender).await.unwrap(), 3);
        assert_eq!(
            sender.sent(),
            vec![
                Message::block_seen(1),
                Message::block_seen(2),
                Message::block_seen(3)
            ]
        );
        assert!(db.lock().await.queries().scheduled_messages().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_retriable_failure_keeps_rows() {
        let dir = tempfile::tempdir().unwrap();
        let db = scheduled_db(&dir);
        let sender = FlakySender {
            calls: AtomicUsize::new(0),
            fail_at: 1,
            retriable: true,
            inner: RecordingSender::new(),
        };

        assert_eq!(drain_scheduled(&db, &sender).await.unwrap(), 1);
        let left: Vec<Message> = db
            .lock()
            .await
            .queries()
            .scheduled_messages()
            .unwrap()
            .into_iter()
            .map(|m| m.msg)
            .collect();
        assert_eq!(left, vec![Message::block_seen(2), Message::block_seen(3)]);

        assert_eq!(drain_scheduled(&db, &sender).await.unwrap(), 2);
        assert_eq!(sender.inner.sent().len(), 3);
    }

    #[tokio::test]
    async fn test_rejected_message_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let db = scheduled_db(&dir);
        let sender = FlakySender {
            calls: AtomicUsize::new(0),
            fail_at: 0,
            retriable: false,
            inner: RecordingSender::new(),
        };

        assert_eq!(drain_scheduled(&db, &sender).await.unwrap(), 3);
        assert_eq!(
            sender.inner.sent(),
            vec![Message::block_seen(2), Message::block_seen(3)]
        );
    }

    #[tokio::test]
    async fn test_db_is_unlocked_while_sending() {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(scheduled_db(&dir));
        let sender = LockCheckingSender {
            db: db.clone(),
            db_free: Mutex::new(vec![]),
        };

        assert_eq!(drain_scheduled(&db, &sender).await.unwrap(), 3);
        assert_eq!(*sender.db_free.lock().unwrap(), vec![true, true, true]);
        assert!(db.lock().await.queries().scheduled_messages().unwrap().is_empty());
    }

    #[test]
    fn test_retriable_errors() {
        assert!(SenderError::Transport(RpcError::MissingResult).is_retriable());
        assert!(!SenderError::Remote {
            code: 1,
            log: String::new()
        }
        .is_retriable());
    }
}
