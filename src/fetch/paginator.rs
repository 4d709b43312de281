//! Page-token pagination over the search endpoint
//!
//! A traversal first probes the endpoint with a page size of 1 to learn the
//! total result count, then requests `ceil(total / page_size)` pages in order.
//! Each request carries the paging token returned by the previous page, and
//! each raw response is written to the staging area before it is yielded.

use crate::config::{validate_page_size, SearchConfig};
use crate::fetch::backoff::BackoffScheduler;
use crate::fetch::client::{SearchApi, SearchError, SearchReply, SearchRequest};
use crate::staging::{StagedPage, StagingArea};
use crate::{HarvestError, Result};
use chrono::Utc;
use tokio_util::sync::CancellationToken;

/// Number of pages needed to cover `total` results
pub fn page_count(total: u64, page_size: u32) -> u32 {
    if page_size == 0 {
        return 0;
    }
    let pages = total.div_ceil(page_size as u64);
    u32::try_from(pages).unwrap_or(u32::MAX)
}

/// Walks the search endpoint end to end, staging every page
pub struct PaginatedFetcher<A> {
    api: A,
    backoff: BackoffScheduler,
    staging: StagingArea,
    search: SearchConfig,
    cancel: CancellationToken,
}

impl<A: SearchApi> PaginatedFetcher<A> {
    pub fn new(api: A, backoff: BackoffScheduler, staging: StagingArea, search: SearchConfig) -> Self {
        Self {
            api,
            backoff,
            staging,
            search,
            cancel: CancellationToken::new(),
        }
    }

    /// Stops the traversal before the next page once the token is cancelled
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn staging(&self) -> &StagingArea {
        &self.staging
    }

    /// Probes the result count and returns a cursor positioned at page 0
    pub async fn start(&mut self, traversal_id: &str, page_size: u32) -> Result<PageCursor<'_, A>> {
        validate_page_size(page_size)?;
        let total_results = self.probe().await?;
        let total_pages = page_count(total_results, page_size);

        tracing::info!(
            "{} results reported, fetching {} pages of {} into {}",
            total_results,
            total_pages,
            page_size,
            traversal_id
        );

        Ok(PageCursor {
            fetcher: self,
            traversal_id: traversal_id.to_string(),
            page_size,
            total_results,
            total_pages,
            next_index: 0,
            token: String::new(),
            finished: total_pages == 0,
        })
    }

    /// Fetches every page of a traversal
    pub async fn fetch_all(&mut self, traversal_id: &str, page_size: u32) -> Result<Vec<StagedPage>> {
        let mut cursor = self.start(traversal_id, page_size).await?;
        let mut pages = Vec::with_capacity(cursor.total_pages() as usize);
        while let Some(page) = cursor.next_page().await? {
            pages.push(page);
        }
        Ok(pages)
    }

    async fn probe(&mut self) -> Result<u64> {
        self.backoff.pause().await;
        let request = SearchRequest::new(&self.search, 1, 1, "");

        match self.send_with_retry(&request, "result count probe").await {
            Ok(reply) => reply.total_results.ok_or_else(|| HarvestError::Decode {
                context: "result count probe".to_string(),
                message: "response has no TotalResults".to_string(),
            }),
            Err(SearchError::Decode(message)) => Err(HarvestError::Decode {
                context: "result count probe".to_string(),
                message,
            }),
            Err(source) => Err(HarvestError::ProbeFailed { retries: 1, source }),
        }
    }

    /// Sends a request, retrying once after an escalated wait
    async fn send_with_retry(
        &mut self,
        request: &SearchRequest,
        what: &str,
    ) -> std::result::Result<SearchReply, SearchError> {
        match self.api.search(request).await {
            Ok(reply) => Ok(reply),
            Err(e) if e.is_retryable() => {
                tracing::warn!("Rate limit hit on {}: {}", what, e);
                self.backoff.escalate().await;
                match self.api.search(request).await {
                    Ok(reply) => {
                        tracing::info!("{} succeeded after 1 retry", what);
                        Ok(reply)
                    }
                    Err(e) => {
                        tracing::error!("{} failed after 1 retry: {}", what, e);
                        Err(e)
                    }
                }
            }
            Err(e) => Err(e),
        }
    }
}

/// Lazy cursor over the pages of one traversal
///
/// Yields pages in increasing index order. After the last page, or after any
/// fault, it yields `None` forever; restarting means starting a new traversal.
pub struct PageCursor<'a, A> {
    fetcher: &'a mut PaginatedFetcher<A>,
    traversal_id: String,
    page_size: u32,
    total_results: u64,
    total_pages: u32,
    next_index: u32,
    token: String,
    finished: bool,
}

impl<A: SearchApi> PageCursor<'_, A> {
    pub fn total_results(&self) -> u64 {
        self.total_results
    }

    pub fn total_pages(&self) -> u32 {
        self.total_pages
    }

    pub fn traversal_id(&self) -> &str {
        &self.traversal_id
    }

    /// Fetches, stages and returns the next page
    pub async fn next_page(&mut self) -> Result<Option<StagedPage>> {
        if self.finished || self.next_index >= self.total_pages {
            self.finished = true;
            return Ok(None);
        }

        let page_index = self.next_index;
        if self.fetcher.cancel.is_cancelled() {
            self.finished = true;
            return Err(HarvestError::Cancelled {
                at: format!("page {}", page_index),
            });
        }

        self.fetcher.backoff.pause().await;

        let request_token = std::mem::take(&mut self.token);
        let request = SearchRequest::new(
            &self.fetcher.search,
            page_index + 1,
            self.page_size,
            request_token.clone(),
        );
        tracing::info!("Fetching page {} of {}", page_index + 1, self.total_pages);

        let what = format!("page {}", page_index);
        let reply = match self.fetcher.send_with_retry(&request, &what).await {
            Ok(reply) => reply,
            Err(e) => {
                self.finished = true;
                return Err(match e {
                    SearchError::Decode(message) => HarvestError::Decode {
                        context: what,
                        message,
                    },
                    other => HarvestError::RateLimitExceeded {
                        page_index,
                        retries: 1,
                        reason: other.to_string(),
                    },
                });
            }
        };

        let page = StagedPage {
            page_index,
            request_token,
            next_token: reply.next_token.clone(),
            captured_at: Utc::now(),
            body: reply.body,
        };

        if let Err(e) = self.fetcher.staging.write_page(&self.traversal_id, &page) {
            self.finished = true;
            return Err(e.into());
        }

        self.token = reply.next_token;
        self.next_index += 1;
        Ok(Some(page))
    }
}
