//! Extraction module
//!
//! Bounded, cursor-driven reads from HTTP APIs.
//!
//! # Overview
//!
//! The extract module provides:
//! - `PageFetcher` - one GET per page, returns records and the next cursor
//! - `PaginationDriver` - advances the cursor until a stop condition
//! - `DetailDriver` - id list first, then one request per id
//! - `BatchSource` - the pull interface both drivers implement

mod detail;
mod driver;
mod fetcher;
mod types;

pub use detail::{DetailDriver, IdSource};
pub use driver::PaginationDriver;
pub use fetcher::PageFetcher;
pub use types::{
    apply_hooks, AuthRequirement, Endpoint, ExtractProgress, FetchedPage, PageLimits,
    RecordFilter, RecordTransform, ResourceState, StopReason,
};

use crate::error::Result;
use crate::types::RecordBatch;
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};

/// Pull-based source of record batches
#[async_trait]
pub trait BatchSource: Send {
    /// Next non-empty batch, or `None` when the source is exhausted
    async fn next_batch(&mut self) -> Result<Option<RecordBatch>>;

    /// Pages fetched, items yielded and current state
    fn progress(&self) -> ExtractProgress;
}

/// Turn a batch source into a lazy stream; nothing is fetched until polled
pub fn into_stream<S>(source: S) -> BoxStream<'static, Result<RecordBatch>>
where
    S: BatchSource + 'static,
{
    stream::try_unfold(source, |mut source| async move {
        Ok(source.next_batch().await?.map(|batch| (batch, source)))
    })
    .boxed()
}
