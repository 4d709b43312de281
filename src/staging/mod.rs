//! Append-only on-disk store of raw search responses
//!
//! Each fetch traversal gets its own directory under the staging root, and
//! every page is written exactly once as
//! `<root>/<traversal-id>/page-<index:05>.json`. Staged pages are kept after
//! merging so a traversal can be replayed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors from reading or writing the staging area
#[derive(Debug, Error)]
pub enum StagingError {
    #[error("Staged page already exists: {}", .0.display())]
    AlreadyExists(PathBuf),

    #[error("Traversal not found in staging area: {0}")]
    TraversalNotFound(String),

    #[error("IO error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to decode staged page {}: {message}", .path.display())]
    Decode { path: PathBuf, message: String },
}

/// Immutable raw capture of one search response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagedPage {
    /// Zero-based page index within the traversal
    pub page_index: u32,

    /// Pagination token sent with the request (empty for the first page)
    pub request_token: String,

    /// Pagination token the response handed back for the next page
    pub next_token: String,

    pub captured_at: DateTime<Utc>,

    /// Response body exactly as decoded from the wire
    pub body: serde_json::Value,
}

/// Directory-backed staging area
#[derive(Debug, Clone)]
pub struct StagingArea {
    root: PathBuf,
}

impl StagingArea {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Traversal identifier derived from a fetch run id
    pub fn traversal_id(run_id: i64) -> String {
        format!("run-{}", run_id)
    }

    pub fn traversal_dir(&self, traversal_id: &str) -> PathBuf {
        self.root.join(traversal_id)
    }

    pub fn page_path(&self, traversal_id: &str, page_index: u32) -> PathBuf {
        self.traversal_dir(traversal_id)
            .join(format!("page-{:05}.json", page_index))
    }

    /// Writes a page, refusing to overwrite an existing capture
    pub fn write_page(&self, traversal_id: &str, page: &StagedPage) -> Result<PathBuf, StagingError> {
        let dir = self.traversal_dir(traversal_id);
        fs::create_dir_all(&dir).map_err(|source| StagingError::Io {
            path: dir.clone(),
            source,
        })?;

        let path = self.page_path(traversal_id, page.page_index);
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|source| {
                if source.kind() == std::io::ErrorKind::AlreadyExists {
                    StagingError::AlreadyExists(path.clone())
                } else {
                    StagingError::Io {
                        path: path.clone(),
                        source,
                    }
                }
            })?;

        let encoded = serde_json::to_vec_pretty(page).map_err(|e| StagingError::Decode {
            path: path.clone(),
            message: e.to_string(),
        })?;
        file.write_all(&encoded)
            .and_then(|_| file.flush())
            .map_err(|source| StagingError::Io {
                path: path.clone(),
                source,
            })?;

        Ok(path)
    }

    /// Reads one staged page
    pub fn read_page(&self, traversal_id: &str, page_index: u32) -> Result<StagedPage, StagingError> {
        read_page_file(&self.page_path(traversal_id, page_index))
    }

    /// Reads every staged page of a traversal in increasing page index
    pub fn read_pages(&self, traversal_id: &str) -> Result<Vec<StagedPage>, StagingError> {
        let dir = self.traversal_dir(traversal_id);
        if !dir.is_dir() {
            return Err(StagingError::TraversalNotFound(traversal_id.to_string()));
        }

        let entries = fs::read_dir(&dir).map_err(|source| StagingError::Io {
            path: dir.clone(),
            source,
        })?;

        let mut pages = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| StagingError::Io {
                path: dir.clone(),
                source,
            })?;
            let path = entry.path();
            if is_page_file(&path) {
                pages.push(read_page_file(&path)?);
            }
        }

        pages.sort_by_key(|page| page.page_index);
        Ok(pages)
    }

    /// Lists traversal identifiers present in the staging area
    pub fn list_traversals(&self) -> Result<Vec<String>, StagingError> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }

        let entries = fs::read_dir(&self.root).map_err(|source| StagingError::Io {
            path: self.root.clone(),
            source,
        })?;

        let mut traversals = Vec::new();
        for entry in entries.flatten() {
            if entry.path().is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    traversals.push(name.to_string());
                }
            }
        }
        traversals.sort();
        Ok(traversals)
    }
}

fn is_page_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.starts_with("page-") && name.ends_with(".json"))
        .unwrap_or(false)
}

fn read_page_file(path: &Path) -> Result<StagedPage, StagingError> {
    let content = fs::read(path).map_err(|source| StagingError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&content).map_err(|e| StagingError::Decode {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}
