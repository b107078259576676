//! Persistence layer: entity, command and report subscription repositories.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │       DataStore                          │
//! │  - init / close lifecycle                │
//! │  - Entity / Command / ReportSubscription │
//! │    repositories                          │
//! └─────────────────────────────────────────┘
//!          ↓                    ↑
//!    (serialize)          (deserialize + Filter)
//!          ↓                    ↑
//! ┌─────────────────────────────────────────┐
//! │       Collections (SQLite tables)        │
//! │  - key TEXT → JSON record                │
//! │  - one write transaction per mutation    │
//! └─────────────────────────────────────────┘
//! ```
//!
//! Each repository call runs in its own transaction. Nothing composes two
//! calls into one atomic unit, and entity existence is not checked when
//! commands or subscriptions are written.

use serde::Deserialize;
use std::fmt;
use std::sync::Arc;

mod filter;
mod models;
mod sqlite;

pub use filter::{CommandFilter, Filter, MatchAll, ReportSubscriptionFilter};
pub use models::{Command, CommandStatus, Entity, ReportSubscription, ReportType};
pub use sqlite::SqliteDataStore;

/// Storage failure taxonomy shared by every repository.
#[derive(Debug, Clone, PartialEq)]
pub enum DataStoreError {
    /// Storage could not be opened, or the store was already closed.
    ConnectionFailed(String),
    /// The named collection has not been created (`init` was not run).
    CollectionMissing(&'static str),
    RecordNotFound,
    DuplicateRecord,
    /// A stored or supplied record is not valid for its collection.
    InvalidData(String),
    TransactionFailed(String),
    /// The command already reached a terminal status.
    AlreadyResolved,
}

impl fmt::Display for DataStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataStoreError::ConnectionFailed(detail) => {
                write!(f, "datastore connection failed: {}", detail)
            }
            DataStoreError::CollectionMissing(name) => {
                write!(f, "collection '{}' does not exist", name)
            }
            DataStoreError::RecordNotFound => write!(f, "record was not found"),
            DataStoreError::DuplicateRecord => write!(f, "record already exists"),
            DataStoreError::InvalidData(detail) => write!(f, "data is invalid: {}", detail),
            DataStoreError::TransactionFailed(detail) => {
                write!(f, "transaction failed: {}", detail)
            }
            DataStoreError::AlreadyResolved => write!(f, "command is already resolved"),
        }
    }
}

impl std::error::Error for DataStoreError {}

impl From<rusqlite::Error> for DataStoreError {
    fn from(e: rusqlite::Error) -> Self {
        DataStoreError::TransactionFailed(e.to_string())
    }
}

impl From<serde_json::Error> for DataStoreError {
    fn from(e: serde_json::Error) -> Self {
        DataStoreError::InvalidData(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DataStoreError>;

pub trait EntityRepository {
    fn get_entity_by_id(&self, id: &str) -> Result<Entity>;
    /// Every stored entity, in key order.
    fn list_entities(&self) -> Result<Vec<Entity>>;
    fn add_entity(&self, entity: &Entity) -> Result<()>;
    fn delete_entity(&self, id: &str) -> Result<()>;
}

pub trait CommandRepository {
    fn get_command_by_id(&self, id: &str) -> Result<Command>;
    fn list_commands(&self, filter: &dyn Filter<Command>) -> Result<Vec<Command>>;
    fn add_command(&self, command: &Command) -> Result<()>;
    /// Moves a pending command to `status` and stamps `resolved_at`.
    ///
    /// Fails with `AlreadyResolved` for a terminal command and with
    /// `InvalidData` when `status` is `Pending`.
    fn resolve_command(&self, id: &str, status: CommandStatus) -> Result<Command>;
    fn delete_command(&self, id: &str) -> Result<()>;
}

pub trait ReportSubscriptionRepository {
    fn get_report_subscription_by_id(&self, id: u64) -> Result<ReportSubscription>;
    fn list_report_subscriptions(
        &self,
        filter: &dyn Filter<ReportSubscription>,
    ) -> Result<Vec<ReportSubscription>>;
    /// Stores the subscription under the next sequence value and returns it
    /// with `id` assigned.
    fn add_report_subscription(
        &self,
        subscription: ReportSubscription,
    ) -> Result<ReportSubscription>;
    fn delete_report_subscription(&self, id: u64) -> Result<()>;
    fn activate_report_subscription(&self, id: u64) -> Result<ReportSubscription>;
    fn deactivate_report_subscription(&self, id: u64) -> Result<ReportSubscription>;
}

/// All three repositories behind one storage handle.
pub trait DataStore:
    EntityRepository + CommandRepository + ReportSubscriptionRepository + Send + Sync
{
    /// Creates any missing collection. Safe to call on every start.
    fn init(&self) -> Result<()>;

    /// Releases the storage handle. Later calls fail with `ConnectionFailed`.
    fn close(&self) -> Result<()>;
}

/// Datastore configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DataStoreConfig {
    #[serde(default = "default_datastore_type")]
    pub datastore_type: String,
    /// Database name; stored at `{name}.db`. `:memory:` keeps it in memory.
    #[serde(default = "default_database_name")]
    pub name: String,
}

fn default_datastore_type() -> String {
    SqliteDataStore::NAME.to_string()
}

fn default_database_name() -> String {
    "esrdb".to_string()
}

impl Default for DataStoreConfig {
    fn default() -> Self {
        Self {
            datastore_type: default_datastore_type(),
            name: default_database_name(),
        }
    }
}

impl DataStoreConfig {
    pub fn is_in_memory(&self) -> bool {
        self.name == ":memory:"
    }

    pub fn path(&self) -> String {
        format!("{}.db", self.name)
    }
}

/// Opens the datastore selected by `config.datastore_type`.
///
/// The returned store is not initialized; call [`DataStore::init`].
pub fn open_datastore(config: &DataStoreConfig) -> anyhow::Result<Arc<dyn DataStore>> {
    match config.datastore_type.as_str() {
        SqliteDataStore::NAME => {
            let store = if config.is_in_memory() {
                SqliteDataStore::open_in_memory()?
            } else {
                SqliteDataStore::open(config.path())?
            };
            Ok(Arc::new(store))
        }
        other => anyhow::bail!("unknown datastore type: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_unknown_datastore_type() {
        let config = DataStoreConfig {
            datastore_type: "bbolt".to_string(),
            name: ":memory:".to_string(),
        };
        let err = open_datastore(&config).err().expect("unknown type should fail");
        assert!(err.to_string().contains("bbolt"));
    }

    #[test]
    fn test_open_in_memory_datastore() {
        let config = DataStoreConfig {
            datastore_type: "sqlite".to_string(),
            name: ":memory:".to_string(),
        };
        let store = open_datastore(&config).unwrap();
        store.init().unwrap();
        assert!(store.list_entities().unwrap().is_empty());
    }

    #[test]
    fn test_default_path() {
        let config = DataStoreConfig::default();
        assert_eq!(config.path(), "esrdb.db");
        assert!(!config.is_in_memory());
    }
}
