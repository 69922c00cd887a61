//! Transactional storage of the keyper observer.

pub mod sqlite;

pub use sqlite::query::Queries;
pub use sqlite::store::{PendingPolyEval, ScheduledMessage, StoredDkgResult};
pub use sqlite::{ObserverDb, StorageError, SCHEMA_VERSION};
