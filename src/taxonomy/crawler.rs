//! Recursive browse-taxonomy crawler
//!
//! Expands a collection's browse tree depth-first by calling the browse
//! endpoint with the accumulated path of section values. The whole tree is
//! buffered in memory and only written once the crawl has finished, as a
//! wholesale replacement of the stored tree.

use crate::fetch::BackoffScheduler;
use crate::model::{count_nodes, tree_depth, Collection, Section};
use crate::storage::{lock_storage, SharedStorage};
use crate::taxonomy::client::{BrowseApi, BrowseError, BrowseLevel};
use crate::{HarvestError, Result};
use std::future::Future;
use std::pin::Pin;
use tokio_util::sync::CancellationToken;

type ExpandFuture<'a> = Pin<Box<dyn Future<Output = Result<Vec<Section>>> + Send + 'a>>;

/// Result of crawling one collection's taxonomy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlOutcome {
    pub collection_key: String,
    pub sections: Vec<Section>,
    /// Browse calls that returned a level, retries not included
    pub requests: u32,
    /// Total nodes in the tree
    pub nodes: usize,
    /// Depth of the tree (0 for an empty tree)
    pub depth: usize,
    /// Branches left unexpanded because they reached the depth cap
    pub depth_limit_reached: u32,
}

#[derive(Debug, Default)]
struct CrawlStats {
    requests: u32,
    depth_limit_reached: u32,
}

/// Builds and attaches Section trees for collections
pub struct TaxonomyCrawler<B> {
    api: B,
    backoff: BackoffScheduler,
    storage: SharedStorage,
    max_depth: usize,
    cancel: CancellationToken,
}

impl<B: BrowseApi> TaxonomyCrawler<B> {
    /// Creates a crawler that never builds trees deeper than `max_depth` levels
    pub fn new(api: B, backoff: BackoffScheduler, storage: SharedStorage, max_depth: u32) -> Self {
        Self {
            api,
            backoff,
            storage,
            max_depth: max_depth as usize,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Crawls the full browse tree of a collection without touching storage
    pub async fn crawl(&mut self, collection_key: &str) -> Result<CrawlOutcome> {
        tracing::info!("Crawling taxonomy of collection {}", collection_key);

        let mut stats = CrawlStats::default();
        let sections = self.expand(collection_key, Vec::new(), &mut stats).await?;

        let outcome = CrawlOutcome {
            collection_key: collection_key.to_string(),
            nodes: count_nodes(&sections),
            depth: tree_depth(&sections),
            requests: stats.requests,
            depth_limit_reached: stats.depth_limit_reached,
            sections,
        };

        tracing::info!(
            "Collection {}: {} sections, depth {}, {} browse requests",
            collection_key,
            outcome.nodes,
            outcome.depth,
            outcome.requests
        );
        if outcome.depth_limit_reached > 0 {
            tracing::warn!(
                "Collection {}: {} branches stopped at depth cap {}",
                collection_key,
                outcome.depth_limit_reached,
                self.max_depth
            );
        }

        Ok(outcome)
    }

    /// Replaces the stored tree of a collection in one transaction
    pub fn attach(&self, collection_key: &str, sections: &[Section]) -> Result<usize> {
        let written = lock_storage(&self.storage)?.replace_sections(collection_key, sections)?;
        tracing::debug!("Attached {} sections to {}", written, collection_key);
        Ok(written)
    }

    /// Crawls a collection and replaces its stored tree
    ///
    /// A crawl that fails part way leaves the stored tree unchanged.
    pub async fn crawl_and_attach(&mut self, collection_key: &str) -> Result<CrawlOutcome> {
        let outcome = self.crawl(collection_key).await?;
        self.attach(collection_key, &outcome.sections)?;
        Ok(outcome)
    }

    /// Fetches collection metadata and upserts it
    ///
    /// Creates the collection if it is not stored yet. Attributes the info
    /// endpoint does not report keep their stored values.
    pub async fn enrich(&mut self, collection_key: &str) -> Result<Collection> {
        self.backoff.pause().await;

        let info = match self.api.collection_info(collection_key).await {
            Ok(info) => info,
            Err(e) if e.is_retryable() => {
                tracing::warn!("Collection info for {} throttled: {}", collection_key, e);
                self.backoff.escalate().await;
                self.api.collection_info(collection_key).await.map_err(|source| {
                    tracing::error!("Collection info for {} failed after 1 retry", collection_key);
                    browse_failure(collection_key, &[], source)
                })?
            }
            Err(source) => return Err(browse_failure(collection_key, &[], source)),
        };

        let mut collection = info.into_collection();
        if collection.key != collection_key {
            tracing::warn!(
                "Info endpoint answered for {} when asked for {}",
                collection.key,
                collection_key
            );
            collection.key = collection_key.to_string();
        }

        lock_storage(&self.storage)?.upsert_collection(&collection)?;
        tracing::info!("Stored details of collection {}", collection_key);
        Ok(collection)
    }

    /// Expands the level below `path` and every level beneath it
    ///
    /// Sections created here sit at depth `path.len() + 1`. Their children are
    /// only requested while that depth is below the cap.
    fn expand<'a>(
        &'a mut self,
        collection_key: &'a str,
        path: Vec<String>,
        stats: &'a mut CrawlStats,
    ) -> ExpandFuture<'a> {
        Box::pin(async move {
            if self.cancel.is_cancelled() {
                return Err(HarvestError::Cancelled {
                    at: format!("browse of {} at [{}]", collection_key, path.join("/")),
                });
            }

            let level = self.browse_with_retry(collection_key, &path).await?;
            stats.requests += 1;

            let depth = path.len() + 1;
            let mut sections = Vec::with_capacity(level.entries.len());

            for entry in level.entries {
                let mut section =
                    Section::new(entry.value, entry.label).with_description(entry.description);

                if level.has_child_levels {
                    if depth < self.max_depth {
                        let mut child_path = path.clone();
                        child_path.push(section.value.clone());
                        section.children = self.expand(collection_key, child_path, stats).await?;
                        section.has_children = !section.children.is_empty();
                    } else {
                        tracing::debug!(
                            "Depth cap reached below [{}/{}] of {}",
                            path.join("/"),
                            section.value,
                            collection_key
                        );
                        section.has_children = true;
                        stats.depth_limit_reached += 1;
                    }
                }

                sections.push(section);
            }

            Ok(sections)
        })
    }

    async fn browse_with_retry(&mut self, collection_key: &str, path: &[String]) -> Result<BrowseLevel> {
        self.backoff.pause().await;

        match self.api.browse(collection_key, path).await {
            Ok(level) => Ok(level),
            Err(e) if e.is_retryable() => {
                tracing::warn!(
                    "Browse of {} at [{}] throttled: {}",
                    collection_key,
                    path.join("/"),
                    e
                );
                self.backoff.escalate().await;
                match self.api.browse(collection_key, path).await {
                    Ok(level) => {
                        tracing::info!(
                            "Browse of {} at [{}] succeeded after 1 retry",
                            collection_key,
                            path.join("/")
                        );
                        Ok(level)
                    }
                    Err(source) => {
                        tracing::error!(
                            "Browse of {} at [{}] failed after 1 retry",
                            collection_key,
                            path.join("/")
                        );
                        Err(browse_failure(collection_key, path, source))
                    }
                }
            }
            Err(source) => Err(browse_failure(collection_key, path, source)),
        }
    }
}

fn browse_failure(collection_key: &str, path: &[String], source: BrowseError) -> HarvestError {
    HarvestError::Browse {
        collection_key: collection_key.to_string(),
        path: path.join("/"),
        source,
    }
}
