//! Catalog Harvest: acquisition engine for remote record-collection catalogs
//!
//! This crate pulls a catalog of record collections from a paginated search
//! API, enriches individual collections with their browse taxonomy, and walks
//! a document viewer page by page to extract per-page index tables. Everything
//! lands in a SQLite store.

pub mod catalog;
pub mod config;
pub mod fetch;
pub mod model;
pub mod output;
pub mod staging;
pub mod state;
pub mod storage;
pub mod taxonomy;
pub mod walker;

use thiserror::Error;

/// Main error type for catalog harvest operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Rate limit exceeded on page {page_index} after {retries} retries ({reason})")]
    RateLimitExceeded {
        page_index: u32,
        retries: u32,
        reason: String,
    },

    #[error("Result count probe failed after {retries} retries: {source}")]
    ProbeFailed {
        retries: u32,
        source: fetch::SearchError,
    },

    #[error("Browse failed for collection {collection_key} at path [{path}]: {source}")]
    Browse {
        collection_key: String,
        path: String,
        source: taxonomy::BrowseError,
    },

    #[error("Not a record viewer page: {location}")]
    InvalidPage { location: String },

    #[error(
        "Extraction failed on page {page} ({image}) during {step} after {attempts} attempts: {fault}"
    )]
    Extraction {
        page: u32,
        image: String,
        step: state::ExtractionStep,
        attempts: u32,
        fault: walker::SessionFault,
    },

    #[error("Document session error: {0}")]
    Session(walker::SessionFault),

    #[error("Invalid walker transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: state::WalkerState,
        to: state::WalkerState,
    },

    #[error("Traversal stopped before {at}")]
    Cancelled { at: String },

    #[error("Failed to decode {context}: {message}")]
    Decode { context: String, message: String },

    #[error("Staging error: {0}")]
    Staging(#[from] staging::StagingError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Storage error: {0}")]
    StorageError(#[from] storage::StorageError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl HarvestError {
    /// Returns true if the traversal stopped because a stop was requested
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for catalog harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use model::{Collection, CollectionFeature, ExtractedRow, Section};
pub use state::{ExtractionStep, WalkerState};
