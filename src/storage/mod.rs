//! Storage module for persisting harvested catalog data
//!
//! This module handles all database operations, including:
//! - SQLite database initialization and schema management
//! - Idempotent collection upserts keyed by the source collection key
//! - Wholesale replacement of a collection's section tree
//! - Per-collection row tables with duplicate removal
//! - Fetch run tracking

mod schema;
mod sqlite;
mod traits;

pub use sqlite::{init_database, SqliteStorage};
pub use traits::{Storage, StorageError, StorageResult};

use crate::model::Collection;
use crate::HarvestError;

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Storage handle shared between traversals
pub type SharedStorage = Arc<Mutex<dyn Storage>>;

/// Initializes or opens a storage database
pub fn open_storage(path: &Path) -> Result<SqliteStorage, HarvestError> {
    SqliteStorage::new(path)
}

/// Wraps a storage backend for sharing between traversals
pub fn share<S: Storage + 'static>(storage: S) -> SharedStorage {
    Arc::new(Mutex::new(storage))
}

/// Locks shared storage, mapping a poisoned lock to a storage error
pub fn lock_storage(storage: &SharedStorage) -> Result<MutexGuard<'_, dyn Storage + 'static>, HarvestError> {
    storage
        .lock()
        .map_err(|e| HarvestError::Storage(format!("Failed to lock storage: {}", e)))
}

/// Represents a stored collection
#[derive(Debug, Clone)]
pub struct CollectionRecord {
    pub id: i64,
    pub collection: Collection,
    /// Local audit timestamp of the first observation
    pub created_at: String,
    /// Local audit timestamp of the latest observation
    pub updated_at: String,
}

/// Represents a fetch run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub status: RunStatus,
}

impl RunRecord {
    /// Identifier of this run's directory in the staging area
    pub fn traversal_id(&self) -> String {
        crate::staging::StagingArea::traversal_id(self.id)
    }
}

/// Status of a fetch run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}
