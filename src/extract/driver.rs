//! Pagination driver
//!
//! Pulls pages from a `PageFetcher` one at a time and decides when to stop.
//! The driver is the only owner of the current cursor.

use super::fetcher::PageFetcher;
use super::types::{
    apply_hooks, ExtractProgress, PageLimits, RecordFilter, RecordTransform, ResourceState,
    StopReason,
};
use super::BatchSource;
use crate::error::Result;
use crate::pagination::PageCursor;
use crate::types::RecordBatch;
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Drives a paginated endpoint until a stop condition is met
pub struct PaginationDriver {
    name: String,
    fetcher: PageFetcher,
    limits: PageLimits,
    filter: Option<RecordFilter>,
    transform: Option<RecordTransform>,
    /// Next cursor to fetch; `None` once stopped
    cursor: Option<PageCursor>,
    visited: HashSet<PageCursor>,
    fetched: u64,
    progress: ExtractProgress,
}

impl PaginationDriver {
    /// Create a driver starting at the paginator's first cursor
    pub fn new(name: impl Into<String>, fetcher: PageFetcher, limits: PageLimits) -> Self {
        let cursor = fetcher.first_cursor();
        Self {
            name: name.into(),
            fetcher,
            limits,
            filter: None,
            transform: None,
            cursor: Some(cursor),
            visited: HashSet::new(),
            fetched: 0,
            progress: ExtractProgress::default(),
        }
    }

    /// Set a record filter
    #[must_use]
    pub fn with_filter(mut self, filter: Option<RecordFilter>) -> Self {
        self.filter = filter;
        self
    }

    /// Set a record transform
    #[must_use]
    pub fn with_transform(mut self, transform: Option<RecordTransform>) -> Self {
        self.transform = transform;
        self
    }

    /// Fetch the next non-empty batch, or `None` once stopped
    pub async fn next_batch(&mut self) -> Result<Option<RecordBatch>> {
        loop {
            if self.progress.state.is_terminal() {
                return Ok(None);
            }

            if self
                .limits
                .max_items
                .is_some_and(|max| self.progress.items >= max)
            {
                self.finish(StopReason::ItemLimit);
                return Ok(None);
            }

            if self
                .limits
                .max_pages
                .is_some_and(|max| self.progress.pages >= max)
            {
                self.cursor = None;
                self.finish(StopReason::Truncated);
                return Ok(None);
            }

            let Some(cursor) = self.cursor.take() else {
                self.finish(StopReason::Exhausted);
                return Ok(None);
            };

            match self.fetch_page(cursor).await {
                Ok(Some(batch)) => return Ok(Some(batch)),
                Ok(None) => continue,
                Err(e) => {
                    self.progress.state = ResourceState::Failed;
                    return Err(e);
                }
            }
        }
    }

    /// Fetch one page; `Ok(None)` when it produced no records to yield
    async fn fetch_page(&mut self, cursor: PageCursor) -> Result<Option<RecordBatch>> {
        let page_number = self.progress.pages + 1;
        self.progress.state = ResourceState::Fetching(page_number);
        self.visited.insert(cursor.clone());

        let page = self.fetcher.fetch(&cursor, self.fetched).await?;
        self.progress.pages = page_number;
        self.fetched += page.records.len() as u64;

        debug!(
            resource = %self.name,
            page = page_number,
            records = page.records.len(),
            "Fetched page"
        );

        if page.records.is_empty() {
            self.finish(StopReason::EmptyPage);
            return Ok(None);
        }

        let mut records = apply_hooks(page.records, self.filter.as_ref(), self.transform.as_ref())?;

        let mut stop = match page.next {
            None => Some(StopReason::Exhausted),
            Some(next) if self.visited.contains(&next) => {
                warn!(
                    resource = %self.name,
                    cursor = %next,
                    "Paginator proposed an already fetched cursor, stopping"
                );
                Some(StopReason::CursorRepeated)
            }
            Some(_) if self.limits.max_pages.is_some_and(|max| page_number >= max) => {
                warn!(
                    resource = %self.name,
                    max_pages = page_number,
                    "Page limit reached with more pages available"
                );
                Some(StopReason::Truncated)
            }
            Some(next) => {
                self.cursor = Some(next);
                None
            }
        };

        if let Some(max) = self.limits.max_items {
            let remaining = max.saturating_sub(self.progress.items);
            if records.len() > remaining || (records.len() == remaining && stop.is_none()) {
                records.truncate(remaining);
                self.cursor = None;
                stop = Some(StopReason::ItemLimit);
            }
        }

        self.progress.items += records.len();
        if let Some(reason) = stop {
            self.finish(reason);
        }

        if records.is_empty() {
            return Ok(None);
        }
        Ok(Some(RecordBatch::new(records)))
    }

    fn finish(&mut self, reason: StopReason) {
        if self.progress.state.is_terminal() {
            return;
        }
        self.progress.state = ResourceState::Completed(reason);
        info!(
            resource = %self.name,
            pages = self.progress.pages,
            items = self.progress.items,
            reason = %reason,
            "Extraction finished"
        );
    }

    /// Current progress
    pub fn progress(&self) -> ExtractProgress {
        self.progress
    }

    /// Lazy stream of batches
    pub fn into_stream(self) -> BoxStream<'static, Result<RecordBatch>> {
        super::into_stream(self)
    }
}

#[async_trait]
impl BatchSource for PaginationDriver {
    async fn next_batch(&mut self) -> Result<Option<RecordBatch>> {
        PaginationDriver::next_batch(self).await
    }

    fn progress(&self) -> ExtractProgress {
        self.progress
    }
}
