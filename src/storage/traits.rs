//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::model::{Collection, ExtractedRow, Section};
use crate::storage::{CollectionRecord, RunRecord, RunStatus};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// Collection upserts and section replacement are the only writes the
/// traversals perform on catalog entities; both are idempotent.
pub trait Storage: Send {
    // ===== Run Management =====

    /// Creates a new fetch run and returns its ID
    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64>;

    /// Gets a run by ID
    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord>;

    /// Gets the most recent run, optionally restricted to one status
    fn get_latest_run(&self, status: Option<RunStatus>) -> StorageResult<Option<RunRecord>>;

    /// Updates the status of a run
    fn update_run_status(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()>;

    /// Marks a run as completed with a finish timestamp
    fn complete_run(&mut self, run_id: i64) -> StorageResult<()>;

    /// Counts runs in a given status
    fn count_runs_by_status(&self, status: RunStatus) -> StorageResult<u64>;

    // ===== Collections =====

    /// Inserts a collection or updates the existing row with the same key
    ///
    /// Attributes that are `None` on the observation keep their stored value.
    /// Returns the row ID.
    fn upsert_collection(&mut self, collection: &Collection) -> StorageResult<i64>;

    /// Upserts a batch of collections in one transaction, in order
    ///
    /// A key that appears twice ends up with the later observation's values.
    fn upsert_collections(&mut self, collections: &[Collection]) -> StorageResult<usize>;

    /// Gets a collection by its source key
    fn get_collection(&self, key: &str) -> StorageResult<Option<CollectionRecord>>;

    /// Lists all collections ordered by key
    fn list_collections(&self) -> StorageResult<Vec<CollectionRecord>>;

    fn count_collections(&self) -> StorageResult<u64>;

    // ===== Section Trees =====

    /// Replaces the whole section tree of a collection
    ///
    /// Creates the collection row if it does not exist yet. The old tree is
    /// removed and the new one written in a single transaction. Returns the
    /// number of sections written.
    fn replace_sections(&mut self, key: &str, sections: &[Section]) -> StorageResult<usize>;

    /// Loads the section tree of a collection (empty if none is stored)
    fn get_sections(&self, key: &str) -> StorageResult<Vec<Section>>;

    /// Counts sections across all collections
    fn count_sections(&self) -> StorageResult<u64>;

    // ===== Row Tables =====

    /// Appends rows to a named table, skipping rows already present
    ///
    /// Returns the number of rows actually inserted.
    fn append_rows(&mut self, table: &str, rows: &[ExtractedRow]) -> StorageResult<usize>;

    /// Reads every row of a table in insertion order
    fn get_rows(&self, table: &str) -> StorageResult<Vec<ExtractedRow>>;

    fn count_rows(&self, table: &str) -> StorageResult<u64>;

    /// Lists row tables with their row counts, ordered by name
    fn list_row_tables(&self) -> StorageResult<Vec<(String, u64)>>;
}
