use rusqlite::{Connection, OpenFlags, Transaction};
use thiserror::Error;

use crate::config::StorageConfiguration;
use crate::storage::sqlite::query::Queries;
use crate::utilities::encoding::EncodingError;

pub mod query;
pub mod store;

mod migrations {
    use refinery::embed_migrations;

    embed_migrations!("migrations");
}

/// Schema version written by the migrations. Any other version is refused on open.
pub const SCHEMA_VERSION: &str = "1";

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Migration error: {0}")]
    Migration(#[from] refinery::Error),
    #[error("Encoding error: {0}")]
    Encoding(#[from] EncodingError),
    #[error("Database has schema version {found:?}, expected {expected}")]
    SchemaVersion {
        expected: &'static str,
        found: Option<String>,
    },
    #[error("Block {got} is not the successor of the current block {current}")]
    OutOfOrder { current: i64, got: i64 },
    #[error("Invalid stored value in {table}: {value}")]
    InvalidValue { table: &'static str, value: String },
}

pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Debug)]
pub struct ObserverDb {
    connection: Connection,
}

impl ObserverDb {
    pub fn open(db_conf: &StorageConfiguration) -> Result<Self> {
        let mut flags = OpenFlags::default();
        if !db_conf.create_if_not_exists {
            flags.remove(OpenFlags::SQLITE_OPEN_CREATE);
        }

        log::info!("Starting db backend with path: {}", db_conf.sqlite_path);
        let mut connection = Connection::open_with_flags(&db_conf.sqlite_path, flags)?;
        Self::run_migrations(&mut connection)?;
        Self::check_schema_version(&connection)?;
        Ok(ObserverDb { connection })
    }

    pub fn run_migrations(connection: &mut Connection) -> Result<()> {
        log::info!("Running database migrations");
        match migrations::migrations::runner().run(connection) {
            Ok(report) => {
                log::info!(
                    "Database migrations completed: {:?}",
                    report.applied_migrations()
                );
                Ok(())
            }
            Err(err) => {
                log::error!("Database migrations failed: {}", err);
                Err(err.into())
            }
        }
    }

    fn check_schema_version(connection: &Connection) -> Result<()> {
        let found = Queries::new(connection).schema_version()?;
        if found.as_deref() != Some(SCHEMA_VERSION) {
            return Err(StorageError::SchemaVersion {
                expected: SCHEMA_VERSION,
                found,
            });
        }
        Ok(())
    }

    /// Read access outside of a transaction.
    pub fn queries(&self) -> Queries<'_> {
        Queries::new(&self.connection)
    }

    /// Starts a transaction. It rolls back unless committed.
    pub fn transaction(&mut self) -> Result<Transaction<'_>> {
        Ok(self.connection.transaction()?)
    }
}


#[cfg(test)]
mod test {
    use assert_matches::assert_matches;

    use super::test_utils::open_temp_db;
    use super::*;

    #[test]
    fn test_fresh_database() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_temp_db(&dir);
        assert_eq!(db.queries().current_block().unwrap(), 0);
        assert_eq!(db.queries().last_committed_height().unwrap(), -1);
        assert_eq!(
            db.queries().schema_version().unwrap().as_deref(),
            Some(SCHEMA_VERSION)
        );
    }

    #[test]
    fn test_reopen_keeps_data() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut db = open_temp_db(&dir);
            let tx = db.transaction().unwrap();
            Queries::new(&tx).bump_current_block(1).unwrap();
            tx.commit().unwrap();
        }
        let db = open_temp_db(&dir);
        assert_eq!(db.queries().current_block().unwrap(), 1);
    }

    #[test]
    fn test_missing_database_without_create() {
        let dir = tempfile::tempdir().unwrap();
        let conf = StorageConfiguration {
            sqlite_path: dir.path().join("missing.sqlite").display().to_string(),
            create_if_not_exists: false,
        };
        assert_matches!(ObserverDb::open(&conf), Err(StorageError::Sqlite(_)));
    }

    #[test]
    fn test_schema_version_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keyper.sqlite");
        {
            let db = open_temp_db(&dir);
            db.queries()
                .connection()
                .execute("UPDATE meta SET value = '2' WHERE key = 'schema_version'", [])
                .unwrap();
        }
        let conf = StorageConfiguration {
            sqlite_path: path.display().to_string(),
            create_if_not_exists: false,
        };
        assert_matches!(
            ObserverDb::open(&conf),
            Err(StorageError::SchemaVersion { found: Some(v), .. }) if v == "2"
        );
    }

    #[test]
    fn test_uncommitted_transaction_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        let mut db = open_temp_db(&dir);
        {
            let tx = db.transaction().unwrap();
            Queries::new(&tx).bump_current_block(1).unwrap();
        }
        assert_eq!(db.queries().current_block().unwrap(), 0);
    }
}
