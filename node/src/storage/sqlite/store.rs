use curve25519_dalek::scalar::Scalar;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::PublicKey;
use rusqlite::params;

use crate::crypto::Address;
use crate::dkg::DkgResult;
use crate::keyper::state::{ActiveDkg, ObservedConfig, ObservedEon};
use crate::shmsg::Message;
use crate::storage::sqlite::query::Queries;
use crate::storage::sqlite::{Result, StorageError};
use crate::utilities::encoding::encode;

/// A dealt share waiting for the receiver's encryption key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingPolyEval {
    pub eon: u64,
    pub receiver: Address,
    pub eval: Scalar,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ScheduledMessage {
    pub id: i64,
    pub description: String,
    pub msg: Message,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredDkgResult {
    pub eon: u64,
    pub success: bool,
    pub error: Option<String>,
    pub pure_result: Option<DkgResult>,
}

fn join_addresses(addresses: &[Address]) -> String {
    addresses
        .iter()
        .map(Address::to_checksum)
        .collect::<Vec<_>>()
        .join(",")
}

impl<'a> Queries<'a> {
    /// Moves the sync marker to `height`, which must directly follow the current block.
    pub fn bump_current_block(&self, height: i64) -> Result<()> {
        let current = self.current_block()?;
        if height != current + 1 {
            return Err(StorageError::OutOfOrder {
                current,
                got: height,
            });
        }
        let mut stmt = self
            .conn
            .prepare_cached("UPDATE sync_meta SET current_block = ?1 WHERE id = 0")?;
        stmt.execute(params![height])?;
        Ok(())
    }

    pub fn set_last_committed_height(&self, height: i64) -> Result<()> {
        let mut stmt = self
            .conn
            .prepare_cached("UPDATE sync_meta SET last_committed_height = ?1 WHERE id = 0")?;
        stmt.execute(params![height])?;
        Ok(())
    }

    pub fn set_last_batch_config_sent(&self, keyper_config_index: u64) -> Result<()> {
        let mut stmt = self.conn.prepare_cached(
            "INSERT OR REPLACE INTO meta (key, value) VALUES ('last_batch_config_sent', ?1)",
        )?;
        stmt.execute(params![keyper_config_index.to_string()])?;
        Ok(())
    }

    pub fn insert_batch_config(&self, config: &ObservedConfig) -> Result<()> {
        log::debug!(
            "Storing batch config {} (activation block {})",
            config.keyper_config_index,
            config.activation_block_number
        );
        let mut stmt = self.conn.prepare_cached(
            "INSERT INTO batch_configs
             (keyper_config_index, height, activation_block_number, threshold, keypers, started)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;
        stmt.execute(params![
            config.keyper_config_index as i64,
            config.height,
            config.activation_block_number as i64,
            config.threshold as i64,
            join_addresses(&config.keypers),
            config.started,
        ])?;
        Ok(())
    }

    pub fn set_batch_config_started(&self, keyper_config_index: u64) -> Result<()> {
        let mut stmt = self.conn.prepare_cached(
            "UPDATE batch_configs SET started = 1 WHERE keyper_config_index = ?1",
        )?;
        stmt.execute(params![keyper_config_index as i64])?;
        Ok(())
    }

    pub fn insert_eon(&self, eon: &ObservedEon) -> Result<()> {
        let mut stmt = self.conn.prepare_cached(
            "INSERT INTO eons (eon, height, activation_block_number, keyper_config_index)
             VALUES (?1, ?2, ?3, ?4)",
        )?;
        stmt.execute(params![
            eon.eon as i64,
            eon.height,
            eon.activation_block_number as i64,
            eon.keyper_config_index as i64,
        ])?;
        Ok(())
    }

    /// Later check-ins of the same keyper replace the key.
    pub fn insert_encryption_key(&self, address: &Address, key: &PublicKey) -> Result<()> {
        let mut stmt = self.conn.prepare_cached(
            "INSERT OR REPLACE INTO encryption_keys (address, encryption_public_key) VALUES (?1, ?2)",
        )?;
        stmt.execute(params![
            address.to_checksum(),
            key.to_encoded_point(true).as_bytes()
        ])?;
        Ok(())
    }

    pub fn put_dkg_record(&self, dkg: &ActiveDkg) -> Result<()> {
        let mut stmt = self
            .conn
            .prepare_cached("INSERT OR REPLACE INTO dkg_records (eon, record) VALUES (?1, ?2)")?;
        stmt.execute(params![dkg.eon as i64, encode(dkg)?])?;
        Ok(())
    }

    pub fn delete_dkg_record(&self, eon: u64) -> Result<()> {
        let mut stmt = self
            .conn
            .prepare_cached("DELETE FROM dkg_records WHERE eon = ?1")?;
        stmt.execute(params![eon as i64])?;
        Ok(())
    }

    pub fn insert_dkg_result(&self, result: &StoredDkgResult) -> Result<()> {
        let pure_result = result.pure_result.as_ref().map(encode).transpose()?;
        let mut stmt = self.conn.prepare_cached(
            "INSERT OR REPLACE INTO dkg_results (eon, success, error, pure_result)
             VALUES (?1, ?2, ?3, ?4)",
        )?;
        stmt.execute(params![
            result.eon as i64,
            result.success,
            result.error,
            pure_result,
        ])?;
        Ok(())
    }

    pub fn insert_eon_public_key(&self, eon: u64, key: &[u8]) -> Result<()> {
        let mut stmt = self.conn.prepare_cached(
            "INSERT OR REPLACE INTO eon_public_keys (eon, eon_public_key) VALUES (?1, ?2)",
        )?;
        stmt.execute(params![eon as i64, key])?;
        Ok(())
    }

    pub fn insert_pending_poly_eval(&self, eval: &PendingPolyEval) -> Result<()> {
        let mut stmt = self.conn.prepare_cached(
            "INSERT OR REPLACE INTO pending_poly_evals (eon, receiver_address, eval)
             VALUES (?1, ?2, ?3)",
        )?;
        stmt.execute(params![
            eval.eon as i64,
            eval.receiver.to_checksum(),
            eval.eval.as_bytes().as_slice(),
        ])?;
        Ok(())
    }

    pub fn delete_pending_poly_eval(&self, eon: u64, receiver: &Address) -> Result<()> {
        let mut stmt = self.conn.prepare_cached(
            "DELETE FROM pending_poly_evals WHERE eon = ?1 AND receiver_address = ?2",
        )?;
        stmt.execute(params![eon as i64, receiver.to_checksum()])?;
        Ok(())
    }

    pub fn delete_pending_poly_evals_for_eon(&self, eon: u64) -> Result<usize> {
        let mut stmt = self
            .conn
            .prepare_cached("DELETE FROM pending_poly_evals WHERE eon = ?1")?;
        Ok(stmt.execute(params![eon as i64])?)
    }

    /// Queues `msg` for the sender. Returns the row id.
    pub fn schedule_message(&self, msg: &Message) -> Result<i64> {
        let description = msg.describe();
        log::info!("Scheduling message: {}", description);
        let mut stmt = self.conn.prepare_cached(
            "INSERT INTO scheduled_messages (description, msg) VALUES (?1, ?2)",
        )?;
        stmt.execute(params![description, encode(msg)?])?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn delete_scheduled_message(&self, id: i64) -> Result<()> {
        let mut stmt = self
            .conn
            .prepare_cached("DELETE FROM scheduled_messages WHERE id = ?1")?;
        stmt.execute(params![id])?;
        Ok(())
    }

    pub fn delete_scheduled_messages_by_description(&self, description: &str) -> Result<usize> {
        let mut stmt = self
            .conn
            .prepare_cached("DELETE FROM scheduled_messages WHERE description = ?1")?;
        Ok(stmt.execute(params![description])?)
    }
}
