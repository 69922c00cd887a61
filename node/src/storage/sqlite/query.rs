use curve25519_dalek::scalar::Scalar;
use k256::PublicKey;
use rusqlite::{params, Connection, OptionalExtension};

use crate::crypto::Address;
use crate::keyper::state::{ActiveDkg, ObservedConfig, ObservedEon};
use crate::shmsg::Message;
use crate::storage::sqlite::store::{PendingPolyEval, ScheduledMessage, StoredDkgResult};
use crate::storage::sqlite::{Result, StorageError};
use crate::utilities::encoding::decode;

/// Typed access to the observer tables. Works on a plain connection or a transaction.
pub struct Queries<'a> {
    pub(crate) conn: &'a Connection,
}

pub(crate) fn parse_address(table: &'static str, value: &str) -> Result<Address> {
    value
        .parse::<Address>()
        .map_err(|_| StorageError::InvalidValue {
            table,
            value: value.to_string(),
        })
}

pub(crate) fn parse_addresses(table: &'static str, value: &str) -> Result<Vec<Address>> {
    if value.is_empty() {
        return Ok(vec![]);
    }
    value.split(',').map(|a| parse_address(table, a)).collect()
}

fn parse_scalar(table: &'static str, bytes: &[u8]) -> Result<Scalar> {
    let invalid = || StorageError::InvalidValue {
        table,
        value: format!("{} byte scalar", bytes.len()),
    };
    let raw: [u8; 32] = bytes.try_into().map_err(|_| invalid())?;
    Option::from(Scalar::from_canonical_bytes(raw)).ok_or_else(invalid)
}

impl<'a> Queries<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Queries { conn }
    }

    pub fn connection(&self) -> &Connection {
        self.conn
    }

    pub fn schema_version(&self) -> Result<Option<String>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT value FROM meta WHERE key = 'schema_version'")?;
        Ok(stmt.query_row(params![], |row| row.get(0)).optional()?)
    }

    /// Index of the last keyper config this keyper voted for.
    pub fn last_batch_config_sent(&self) -> Result<Option<u64>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT value FROM meta WHERE key = 'last_batch_config_sent'")?;
        let value: Option<String> = stmt.query_row(params![], |row| row.get(0)).optional()?;
        value
            .map(|v| {
                v.parse().map_err(|_| StorageError::InvalidValue {
                    table: "meta",
                    value: v.clone(),
                })
            })
            .transpose()
    }

    /// Height of the last block the observer has handled, 0 before the first one.
    pub fn current_block(&self) -> Result<i64> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT current_block FROM sync_meta WHERE id = 0")?;
        Ok(stmt.query_row(params![], |row| row.get(0))?)
    }

    pub fn last_committed_height(&self) -> Result<i64> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT last_committed_height FROM sync_meta WHERE id = 0")?;
        Ok(stmt.query_row(params![], |row| row.get(0))?)
    }

    pub fn batch_configs(&self) -> Result<Vec<ObservedConfig>> {
        log::trace!("Loading batch configs");
        let mut stmt = self.conn.prepare_cached(
            "SELECT keyper_config_index, height, activation_block_number, threshold, keypers, started
             FROM batch_configs ORDER BY keyper_config_index",
        )?;
        let rows = stmt
            .query_map(params![], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, bool>(5)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(index, height, activation, threshold, keypers, started)| {
                Ok(ObservedConfig {
                    keyper_config_index: index as u64,
                    height,
                    activation_block_number: activation as u64,
                    threshold: threshold as u64,
                    keypers: parse_addresses("batch_configs", &keypers)?,
                    started,
                })
            })
            .collect()
    }

    pub fn eons(&self) -> Result<Vec<ObservedEon>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT eon, height, activation_block_number, keyper_config_index FROM eons ORDER BY eon",
        )?;
        let eons = stmt
            .query_map(params![], |row| {
                Ok(ObservedEon {
                    eon: row.get::<_, i64>(0)? as u64,
                    height: row.get(1)?,
                    activation_block_number: row.get::<_, i64>(2)? as u64,
                    keyper_config_index: row.get::<_, i64>(3)? as u64,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(eons)
    }

    pub fn encryption_keys(&self) -> Result<Vec<(Address, PublicKey)>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT address, encryption_public_key FROM encryption_keys")?;
        let rows = stmt
            .query_map(params![], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(address, key)| {
                let address = parse_address("encryption_keys", &address)?;
                let key =
                    PublicKey::from_sec1_bytes(&key).map_err(|_| StorageError::InvalidValue {
                        table: "encryption_keys",
                        value: address.to_string(),
                    })?;
                Ok((address, key))
            })
            .collect()
    }

    pub fn dkg_records(&self) -> Result<Vec<ActiveDkg>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT record FROM dkg_records ORDER BY eon")?;
        let blobs = stmt
            .query_map(params![], |row| row.get::<_, Vec<u8>>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        blobs
            .iter()
            .map(|blob| Ok(decode::<ActiveDkg>(blob)?))
            .collect()
    }

    pub fn pending_poly_evals(&self) -> Result<Vec<PendingPolyEval>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT eon, receiver_address, eval FROM pending_poly_evals
             ORDER BY eon, receiver_address",
        )?;
        let rows = stmt
            .query_map(params![], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Vec<u8>>(2)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(eon, receiver, eval)| {
                Ok(PendingPolyEval {
                    eon: eon as u64,
                    receiver: parse_address("pending_poly_evals", &receiver)?,
                    eval: parse_scalar("pending_poly_evals", &eval)?,
                })
            })
            .collect()
    }

    /// Outbound messages in the order they were scheduled.
    pub fn scheduled_messages(&self) -> Result<Vec<ScheduledMessage>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT id, description, msg FROM scheduled_messages ORDER BY id")?;
        let rows = stmt
            .query_map(params![], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Vec<u8>>(2)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, description, msg)| {
                Ok(ScheduledMessage {
                    id,
                    description,
                    msg: decode::<Message>(&msg)?,
                })
            })
            .collect()
    }

    pub fn dkg_result(&self, eon: u64) -> Result<Option<StoredDkgResult>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT success, error, pure_result FROM dkg_results WHERE eon = ?1",
        )?;
        let row = stmt
            .query_row(params![eon as i64], |row| {
                Ok((
                    row.get::<_, bool>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, Option<Vec<u8>>>(2)?,
                ))
            })
            .optional()?;

        let Some((success, error, pure_result)) = row else {
            return Ok(None);
        };
        let pure_result = pure_result.map(|blob| decode(&blob)).transpose()?;
        Ok(Some(StoredDkgResult {
            eon,
            success,
            error,
            pure_result,
        }))
    }

    /// Compressed Ristretto encoding of the eon public key.
    pub fn eon_public_key(&self, eon: u64) -> Result<Option<Vec<u8>>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT eon_public_key FROM eon_public_keys WHERE eon = ?1")?;
        Ok(stmt
            .query_row(params![eon as i64], |row| row.get(0))
            .optional()?)
    }
}
