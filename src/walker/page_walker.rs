//! Page walker state machine
//!
//! Drives a document session through a linear sequence of record pages:
//!
//! ```text
//! AwaitingOperatorStart -> OnRecordPage -> ExtractingIndex -> ExtractingNavigation
//!                              ^                                     |
//!                              +------------- next page -------------+--> Done
//! ```
//!
//! When image saving is on, each page image is saved through the viewer's
//! download tool before its index is read, unless the stored collection
//! details say saving is not allowed.
//!
//! Any unrecovered fault moves the walker to `Failed`; a stop request honored
//! between pages moves it to `Stopped`. Each page's rows are committed before
//! advancing, so a failure never loses pages that were already stored.

use crate::config::WalkerConfig;
use crate::model::normalize_table_name;
use crate::state::{ExtractionStep, WalkerState};
use crate::storage::{lock_storage, SharedStorage};
use crate::walker::operator::OperatorSignal;
use crate::walker::rows::{
    assemble_rows, collection_key_from_location, image_id_from_location, parse_counter, Breadcrumb,
    IndexTable, PageNavigation,
};
use crate::walker::session::{DocumentSession, Role, SessionFault};
use crate::{HarvestError, Result};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Tunables of a walk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkerSettings {
    /// Retries allowed per extraction step, on top of the first attempt
    pub retry_budget: u32,
    /// Fixed delay before each retry
    pub retry_delay: Duration,
    /// Substring every record page location contains
    pub record_viewer_pattern: String,
    /// Class the index toggle carries while the panel is shown
    pub index_active_class: String,
    /// Stop after this many pages
    pub max_pages: Option<u32>,
    /// Save each page image before reading its index
    pub save_images: bool,
}

impl WalkerSettings {
    pub fn from_config(config: &WalkerConfig) -> Self {
        Self {
            retry_budget: config.retry_budget,
            retry_delay: Duration::from_millis(config.retry_delay_ms),
            record_viewer_pattern: config.record_viewer_pattern.clone(),
            index_active_class: config.index_active_class.clone(),
            max_pages: config.max_pages,
            save_images: config.save_images,
        }
    }
}

impl Default for WalkerSettings {
    fn default() -> Self {
        Self::from_config(&WalkerConfig::default())
    }
}

/// Progress of a walk, kept up to date as pages are committed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WalkReport {
    /// Pages whose rows were committed
    pub pages: u32,
    pub rows_extracted: usize,
    /// Rows that were new to their table
    pub rows_inserted: usize,
    /// Row tables written to, in first-use order
    pub tables: Vec<String>,
    /// Transient faults absorbed by a retry
    pub retries: u32,
    /// Breadcrumb levels focused to sample their displayed title
    pub breadcrumb_focus_clicks: u32,
    pub images_saved: u32,
    /// Pages whose image was not saved because the collection forbids it
    pub images_withheld: u32,
}

enum Advance {
    Next,
    Done,
}

/// Walks record pages and stores one row batch per page
pub struct PageWalker<S> {
    session: S,
    storage: SharedStorage,
    settings: WalkerSettings,
    state: WalkerState,
    cancel: CancellationToken,
    report: WalkReport,
}

impl<S: DocumentSession> PageWalker<S> {
    pub fn new(session: S, storage: SharedStorage, settings: WalkerSettings) -> Self {
        Self {
            session,
            storage,
            settings,
            state: WalkerState::AwaitingOperatorStart,
            cancel: CancellationToken::new(),
            report: WalkReport::default(),
        }
    }

    /// Stops the walk before the next page once the token is cancelled
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn state(&self) -> WalkerState {
        self.state
    }

    /// Progress so far, including after a failed walk
    pub fn report(&self) -> &WalkReport {
        &self.report
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    /// Releases the session, e.g. to close it
    pub fn into_session(self) -> S {
        self.session
    }

    /// Runs the walk to completion
    ///
    /// Returns the report when the last page is reached. On a fault the
    /// walker ends in `Failed` (or `Stopped` when cancelled) and the rows of
    /// every completed page stay committed.
    pub async fn run<O: OperatorSignal + ?Sized>(&mut self, operator: &mut O) -> Result<WalkReport> {
        let result = self.drive(operator).await;

        match result {
            Ok(()) => {
                tracing::info!(
                    "Walk complete: {} pages, {} rows extracted ({} new)",
                    self.report.pages,
                    self.report.rows_extracted,
                    self.report.rows_inserted
                );
                Ok(self.report.clone())
            }
            Err(e) => {
                let end = if e.is_cancelled() {
                    WalkerState::Stopped
                } else {
                    WalkerState::Failed
                };
                if self.state.can_transition_to(end) {
                    self.state = end;
                }
                tracing::error!(
                    "Walk ended in {} after {} committed pages: {}",
                    self.state,
                    self.report.pages,
                    e
                );
                Err(e)
            }
        }
    }

    async fn drive<O: OperatorSignal + ?Sized>(&mut self, operator: &mut O) -> Result<()> {
        if self.state != WalkerState::AwaitingOperatorStart {
            return Err(HarvestError::InvalidTransition {
                from: self.state,
                to: WalkerState::OnRecordPage,
            });
        }

        tracing::info!("Waiting for operator to position the session");
        operator.wait_for_start().await?;
        self.transition(WalkerState::OnRecordPage)?;

        loop {
            match self.walk_page().await? {
                Advance::Next => self.transition(WalkerState::OnRecordPage)?,
                Advance::Done => {
                    self.transition(WalkerState::Done)?;
                    return Ok(());
                }
            }
        }
    }

    fn transition(&mut self, next: WalkerState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(HarvestError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        tracing::trace!("Walker {} -> {}", self.state, next);
        self.state = next;
        Ok(())
    }

    /// Processes the page the session is on, from validation to advance
    async fn walk_page(&mut self) -> Result<Advance> {
        let ordinal = self.report.pages + 1;
        if self.cancel.is_cancelled() {
            return Err(HarvestError::Cancelled {
                at: format!("page {}", ordinal),
            });
        }

        let location = self
            .session
            .current_location()
            .await
            .map_err(HarvestError::Session)?;
        if !location.contains(&self.settings.record_viewer_pattern) {
            return Err(HarvestError::InvalidPage { location });
        }
        let image = image_id_from_location(&location);
        tracing::info!("Page {}: image {}", ordinal, image);

        if self.settings.save_images {
            if self.image_saving_allowed(&location)? {
                self.save_image(ordinal, &image).await?;
            } else {
                self.report.images_withheld += 1;
                tracing::debug!("Collection forbids saving images, skipping {}", image);
            }
        }

        self.transition(WalkerState::ExtractingIndex)?;
        let table = self.extract_index(ordinal, &image).await?;

        self.transition(WalkerState::ExtractingNavigation)?;
        let navigation = self.extract_navigation(ordinal, &image).await?;

        self.commit(&table, &navigation, &image, &location)?;

        if let Some(max) = self.settings.max_pages {
            if self.report.pages >= max {
                tracing::info!("Reached page limit of {}", max);
                return Ok(Advance::Done);
            }
        }

        self.advance().await
    }

    fn commit(
        &mut self,
        table: &IndexTable,
        navigation: &PageNavigation,
        image: &str,
        page_link: &str,
    ) -> Result<()> {
        let rows = assemble_rows(table, navigation, image, page_link);
        let table_name = normalize_table_name(&navigation.collection_title);

        let inserted = lock_storage(&self.storage)?.append_rows(&table_name, &rows)?;
        tracing::info!(
            "Page {} of {}: {} rows into {} ({} new)",
            navigation.page_number,
            navigation.page_total,
            rows.len(),
            table_name,
            inserted
        );

        self.report.pages += 1;
        self.report.rows_extracted += rows.len();
        self.report.rows_inserted += inserted;
        if !self.report.tables.contains(&table_name) {
            self.report.tables.push(table_name);
        }
        Ok(())
    }

    async fn advance(&mut self) -> Result<Advance> {
        let next = match self.session.find(Role::NextPage).await {
            Ok(next) => next,
            Err(SessionFault::MissingElement(_)) => {
                tracing::info!("No next-page control, sequence finished");
                return Ok(Advance::Done);
            }
            Err(fault) => return Err(HarvestError::Session(fault)),
        };

        if !self
            .session
            .is_enabled(&next)
            .await
            .map_err(HarvestError::Session)?
        {
            tracing::info!("Next-page control disabled, sequence finished");
            return Ok(Advance::Done);
        }

        self.session
            .click(&next)
            .await
            .map_err(HarvestError::Session)?;
        Ok(Advance::Next)
    }

    /// Saving is allowed unless the collection's stored details forbid it
    fn image_saving_allowed(&self, location: &str) -> Result<bool> {
        let Some(key) = collection_key_from_location(location) else {
            return Ok(true);
        };
        let record = lock_storage(&self.storage)?.get_collection(&key)?;
        Ok(record.and_then(|r| r.collection.can_save_image) != Some(false))
    }

    async fn save_image(&mut self, ordinal: u32, image: &str) -> Result<()> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.click_download().await {
                Ok(()) => {
                    self.note_success(ExtractionStep::ImageSave, attempt);
                    self.report.images_saved += 1;
                    tracing::debug!("Saved image {}", image);
                    return Ok(());
                }
                Err(fault) => {
                    self.absorb(ExtractionStep::ImageSave, fault, attempt, ordinal, image)
                        .await?
                }
            }
        }
    }

    /// Opens the tool popout and triggers the download tool
    async fn click_download(&mut self) -> std::result::Result<(), SessionFault> {
        let tools = self.session.find(Role::ImageTools).await?;
        self.session.click(&tools).await?;
        let download = self.session.find(Role::DownloadImage).await?;
        self.session.click(&download).await
    }

    async fn extract_index(&mut self, ordinal: u32, image: &str) -> Result<IndexTable> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.read_index().await {
                Ok(table) => {
                    self.note_success(ExtractionStep::Index, attempt);
                    return Ok(table);
                }
                Err(fault) => {
                    self.absorb(ExtractionStep::Index, fault, attempt, ordinal, image)
                        .await?
                }
            }
        }
    }

    async fn extract_navigation(&mut self, ordinal: u32, image: &str) -> Result<PageNavigation> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.read_navigation().await {
                Ok(navigation) => {
                    self.note_success(ExtractionStep::Navigation, attempt);
                    return Ok(navigation);
                }
                Err(fault) => {
                    self.absorb(ExtractionStep::Navigation, fault, attempt, ordinal, image)
                        .await?
                }
            }
        }
    }

    fn note_success(&self, step: ExtractionStep, attempt: u32) {
        if attempt > 1 {
            tracing::info!("{} succeeded after {} retries", step, attempt - 1);
        }
    }

    /// Prepares the next attempt after a fault, or escalates it
    ///
    /// Empty reads wait out the retry delay. Stale and missing elements reload
    /// the session first.
    async fn absorb(
        &mut self,
        step: ExtractionStep,
        fault: SessionFault,
        attempt: u32,
        ordinal: u32,
        image: &str,
    ) -> Result<()> {
        if !fault.is_transient() || attempt > self.settings.retry_budget {
            tracing::error!(
                "{} failed after {} retries on page {}: {}",
                step,
                attempt - 1,
                ordinal,
                fault
            );
            return Err(HarvestError::Extraction {
                page: ordinal,
                image: image.to_string(),
                step,
                attempts: attempt,
                fault,
            });
        }

        if self.cancel.is_cancelled() {
            return Err(HarvestError::Cancelled {
                at: format!("{} retry on page {}", step, ordinal),
            });
        }

        self.report.retries += 1;
        tracing::warn!(
            "{} on page {}: {} (retry {}/{})",
            step,
            ordinal,
            fault,
            attempt,
            self.settings.retry_budget
        );

        if fault != SessionFault::EmptyRead {
            if let Err(reload_fault) = self.session.reload().await {
                return Err(HarvestError::Extraction {
                    page: ordinal,
                    image: image.to_string(),
                    step,
                    attempts: attempt,
                    fault: reload_fault,
                });
            }
        }

        if !self.settings.retry_delay.is_zero() {
            tokio::time::sleep(self.settings.retry_delay).await;
        }
        Ok(())
    }

    /// Shows the index panel and reads it
    async fn read_index(&mut self) -> std::result::Result<IndexTable, SessionFault> {
        let toggle = self.session.find(Role::IndexToggle).await?;
        let class = self
            .session
            .read_attribute(&toggle, "class")
            .await?
            .unwrap_or_default();

        // An already active panel is toggled off and on to refresh it
        if class
            .split_whitespace()
            .any(|c| c == self.settings.index_active_class)
        {
            self.session.click(&toggle).await?;
        }
        self.session.click(&toggle).await?;

        let rows = self.session.find_all(Role::IndexRow).await?;
        let Some((header, body)) = rows.split_first() else {
            return Err(SessionFault::EmptyRead);
        };
        if body.is_empty() {
            return Err(SessionFault::EmptyRead);
        }

        let columns = self.read_cells(header).await?;
        let mut values = Vec::with_capacity(body.len());
        for row in body {
            values.push(self.read_cells(row).await?);
        }

        Ok(IndexTable {
            columns,
            rows: values,
        })
    }

    async fn read_cells(&mut self, row: &S::Element) -> std::result::Result<Vec<String>, SessionFault> {
        let cells = self.session.find_all_within(row, Role::IndexCell).await?;
        let mut texts = Vec::with_capacity(cells.len());
        for cell in &cells {
            texts.push(self.session.read_text(cell).await?.trim().to_string());
        }
        Ok(texts)
    }

    /// Reads counters, the collection link and the breadcrumb trail
    async fn read_navigation(&mut self) -> std::result::Result<PageNavigation, SessionFault> {
        let page_input = self.session.find(Role::PageNumber).await?;
        let raw_page = match self.session.read_attribute(&page_input, "value").await? {
            Some(value) => value,
            None => self.session.read_text(&page_input).await?,
        };
        let page_number = parse_counter(Role::PageNumber, &raw_page)?;

        let total = self.session.find(Role::PageTotal).await?;
        let raw_total = self.session.read_text(&total).await?;
        let page_total = parse_counter(Role::PageTotal, &raw_total)?;

        let link = self.session.find(Role::CollectionLink).await?;
        let collection_title = self.session.read_text(&link).await?.trim().to_string();
        let collection_link = self
            .session
            .read_attribute(&link, "href")
            .await?
            .unwrap_or_default();

        let crumbs = self.session.find_all(Role::Breadcrumb).await?;
        let mut breadcrumbs = Vec::with_capacity(crumbs.len());
        for (level, crumb) in crumbs.iter().enumerate() {
            let value = self
                .session
                .read_attribute(crumb, "value")
                .await?
                .unwrap_or_default();

            // The displayed title of a level only shows while it has focus
            self.session.click(crumb).await?;
            self.report.breadcrumb_focus_clicks += 1;
            tracing::debug!("Focused breadcrumb level {} ({})", level, value);

            let title = match self.session.read_attribute(crumb, "title").await? {
                Some(title) if !title.trim().is_empty() => title,
                _ => self.session.read_text(crumb).await?,
            };
            breadcrumbs.push(Breadcrumb {
                value: value.trim().to_string(),
                title: title.trim().to_string(),
            });
        }

        Ok(PageNavigation {
            page_number,
            page_total,
            collection_title,
            collection_link,
            breadcrumbs,
        })
    }
}
