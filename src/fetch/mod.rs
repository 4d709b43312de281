//! Bulk catalog fetching
//!
//! This module handles the paginated side of the harvest:
//! - Randomized backoff waits and retry escalation
//! - The search endpoint client and its wire format
//! - Page-token pagination with staging of every raw page
//! - Run tracking around a whole traversal

mod backoff;
mod client;
mod paginator;

pub use backoff::{pick_duration, BackoffPolicy, BackoffScheduler};
pub use client::{
    build_http_client, HttpSearchClient, RequestPaging, SearchApi, SearchError, SearchReply,
    SearchRequest,
};
pub use paginator::{page_count, PageCursor, PaginatedFetcher};

use crate::config::validate_page_size;
use crate::staging::StagingArea;
use crate::storage::{lock_storage, RunStatus, SharedStorage};
use crate::Result;

/// Summary of a completed fetch traversal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchReport {
    pub run_id: i64,
    pub traversal_id: String,
    pub total_results: u64,
    pub pages: u32,
}

/// Runs a full fetch traversal under a tracked run
///
/// The run is marked completed after the last page is staged, and failed if
/// the traversal stops on any fault.
pub async fn fetch_catalog<A: SearchApi>(
    fetcher: &mut PaginatedFetcher<A>,
    storage: &SharedStorage,
    config_hash: &str,
    page_size: u32,
) -> Result<FetchReport> {
    validate_page_size(page_size)?;
    let run_id = lock_storage(storage)?.create_run(config_hash)?;
    let traversal_id = StagingArea::traversal_id(run_id);
    tracing::info!("Starting fetch run {} ({})", run_id, traversal_id);

    match run_traversal(fetcher, &traversal_id, page_size).await {
        Ok((total_results, pages)) => {
            lock_storage(storage)?.complete_run(run_id)?;
            tracing::info!("Fetch run {} complete: {} pages staged", run_id, pages);
            Ok(FetchReport {
                run_id,
                traversal_id,
                total_results,
                pages,
            })
        }
        Err(e) => {
            tracing::error!("Fetch run {} failed: {}", run_id, e);
            if let Err(status_err) = mark_failed(storage, run_id) {
                tracing::error!("Could not mark run {} failed: {}", run_id, status_err);
            }
            Err(e)
        }
    }
}

fn mark_failed(storage: &SharedStorage, run_id: i64) -> Result<()> {
    lock_storage(storage)?.update_run_status(run_id, RunStatus::Failed)?;
    Ok(())
}

async fn run_traversal<A: SearchApi>(
    fetcher: &mut PaginatedFetcher<A>,
    traversal_id: &str,
    page_size: u32,
) -> Result<(u64, u32)> {
    let mut cursor = fetcher.start(traversal_id, page_size).await?;
    let total_results = cursor.total_results();
    let mut pages = 0;
    while cursor.next_page().await?.is_some() {
        pages += 1;
    }
    Ok((total_results, pages))
}
