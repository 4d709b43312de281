//! Merging staged search pages into the collection store

use crate::catalog::entry::{CatalogEntry, CatalogPage};
use crate::model::Collection;
use crate::staging::StagingArea;
use crate::storage::{lock_storage, RunStatus, SharedStorage};
use crate::{HarvestError, Result};
use std::collections::HashSet;

/// Counts from one merge pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub traversal_id: String,
    pub pages: usize,
    pub entries: usize,
    pub distinct_keys: usize,
    /// Entries that could not be decoded or had no key
    pub skipped: usize,
}

/// Upserts the entries of staged pages into storage
pub struct CatalogMerger {
    staging: StagingArea,
    storage: SharedStorage,
}

impl CatalogMerger {
    pub fn new(staging: StagingArea, storage: SharedStorage) -> Self {
        Self { staging, storage }
    }

    /// Merges every staged page of a traversal in increasing page index
    ///
    /// Each page is written in its own transaction. When a key appears more
    /// than once, the later page's values win. Running the same merge twice
    /// leaves the collection set unchanged.
    pub fn merge(&self, traversal_id: &str) -> Result<MergeReport> {
        let pages = self.staging.read_pages(traversal_id)?;
        tracing::info!("Merging {} staged pages from {}", pages.len(), traversal_id);

        let mut report = MergeReport {
            traversal_id: traversal_id.to_string(),
            ..MergeReport::default()
        };
        let mut keys = HashSet::new();

        for page in pages {
            let decoded: CatalogPage =
                serde_json::from_value(page.body).map_err(|e| HarvestError::Decode {
                    context: format!("staged page {} of {}", page.page_index, traversal_id),
                    message: e.to_string(),
                })?;

            let mut collections: Vec<Collection> = Vec::with_capacity(decoded.grid_data.len());
            for raw in decoded.grid_data {
                report.entries += 1;
                match serde_json::from_value::<CatalogEntry>(raw) {
                    Ok(entry) => match entry.into_collection() {
                        Some(collection) => {
                            keys.insert(collection.key.clone());
                            collections.push(collection);
                        }
                        None => {
                            tracing::warn!("Skipping entry without key on page {}", page.page_index);
                            report.skipped += 1;
                        }
                    },
                    Err(e) => {
                        tracing::warn!(
                            "Skipping undecodable entry on page {}: {}",
                            page.page_index,
                            e
                        );
                        report.skipped += 1;
                    }
                }
            }

            lock_storage(&self.storage)?.upsert_collections(&collections)?;
            tracing::debug!(
                "Page {}: {} collections upserted",
                page.page_index,
                collections.len()
            );
            report.pages += 1;
        }

        report.distinct_keys = keys.len();
        tracing::info!(
            "Merged {} entries ({} distinct collections, {} skipped)",
            report.entries,
            report.distinct_keys,
            report.skipped
        );
        Ok(report)
    }

    /// Merges the most recent completed fetch run, if any
    pub fn merge_latest(&self) -> Result<Option<MergeReport>> {
        let latest = lock_storage(&self.storage)?.get_latest_run(Some(RunStatus::Completed))?;
        match latest {
            Some(run) => self.merge(&run.traversal_id()).map(Some),
            None => {
                tracing::info!("No completed fetch run to merge");
                Ok(None)
            }
        }
    }
}
