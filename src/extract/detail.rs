//! Id-then-detail driver
//!
//! Resolves a list of ids first, truncates it to the item limit, then
//! requests one detail document per id.

use super::fetcher::{check_credentials, get_json_body};
use super::types::{
    apply_hooks, Endpoint, ExtractProgress, PageLimits, RecordFilter, RecordTransform,
    ResourceState, StopReason,
};
use super::BatchSource;
use crate::decode::{into_records, value_to_string, JsonDecoder, RecordDecoder};
use crate::error::{Error, Result};
use crate::http::HttpClient;
use crate::types::RecordBatch;
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::sync::Arc;
use tracing::{debug, info};

/// Where the id list comes from
#[derive(Debug, Clone)]
pub enum IdSource {
    /// One GET; ids are the values at `id_path` (or the whole body when
    /// `None`), e.g. HN `topstories.json` or PokeAPI `results[*].url`
    Endpoint {
        endpoint: Endpoint,
        id_path: Option<String>,
    },
    /// Inclusive numeric range
    Range { start: u64, end: u64 },
    /// Request the detail endpoint `count` times
    Repeat(usize),
}

/// Drives an id list through a detail endpoint
pub struct DetailDriver {
    name: String,
    client: Arc<HttpClient>,
    ids: IdSource,
    detail: Endpoint,
    limits: PageLimits,
    filter: Option<RecordFilter>,
    transform: Option<RecordTransform>,
    /// Resolved ids; `None` until the first pull
    resolved: Option<Vec<String>>,
    /// Index of the next id to fetch
    position: usize,
    /// The item limit cut the id list short
    ids_truncated: bool,
    progress: ExtractProgress,
}

impl DetailDriver {
    /// Create a detail driver
    ///
    /// `detail` is requested per id: `{id}` in its path is replaced, and an
    /// id that is itself an absolute URL is requested directly.
    pub fn new(
        name: impl Into<String>,
        client: Arc<HttpClient>,
        ids: IdSource,
        detail: Endpoint,
        limits: PageLimits,
    ) -> Result<Self> {
        check_credentials(&client, &detail)?;
        if let IdSource::Endpoint { endpoint, .. } = &ids {
            check_credentials(&client, endpoint)?;
        }

        Ok(Self {
            name: name.into(),
            client,
            ids,
            detail,
            limits,
            filter: None,
            transform: None,
            resolved: None,
            position: 0,
            ids_truncated: false,
            progress: ExtractProgress::default(),
        })
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

    /// Fetch the next detail batch, or `None` once all ids are consumed
    pub async fn next_batch(&mut self) -> Result<Option<RecordBatch>> {
        match self.advance().await {
            Ok(batch) => Ok(batch),
            Err(e) => {
                self.progress.state = ResourceState::Failed;
                Err(e)
            }
        }
    }

    async fn advance(&mut self) -> Result<Option<RecordBatch>> {
        if self.progress.state.is_terminal() {
            return Ok(None);
        }

        if self.resolved.is_none() {
            let ids = self.resolve_ids().await?;
            self.resolved = Some(ids);
        }

        loop {
            let id = match self.resolved.as_ref().and_then(|ids| ids.get(self.position)) {
                Some(id) => id.clone(),
                None => {
                    self.finish();
                    return Ok(None);
                }
            };
            self.position += 1;

            let url = match self.ids {
                IdSource::Repeat(_) => self.detail.url(),
                _ => self.detail.url_for_id(&id),
            };

            let page_number = self.progress.pages + 1;
            self.progress.state = ResourceState::Fetching(page_number);
            let (body, _) =
                get_json_body(&self.client, &url, self.detail.params.clone(), self.detail.auth)
                    .await?;
            self.progress.pages = page_number;

            // Deleted items come back as a literal `null`
            let records = into_records(JsonDecoder::new().decode(&body)?)?;
            if records.is_empty() {
                debug!(resource = %self.name, id = %id, "Detail body is empty, skipping");
                continue;
            }

            let records =
                apply_hooks(records, self.filter.as_ref(), self.transform.as_ref())?;
            if records.is_empty() {
                continue;
            }

            self.progress.items += records.len();
            return Ok(Some(RecordBatch::new(records)));
        }
    }

    /// Resolve and truncate the id list before any detail request
    async fn resolve_ids(&mut self) -> Result<Vec<String>> {
        let mut ids = match &self.ids {
            IdSource::Endpoint { endpoint, id_path } => {
                let (body, _) = get_json_body(
                    &self.client,
                    &endpoint.url(),
                    endpoint.params.clone(),
                    endpoint.auth,
                )
                .await?;
                self.progress.pages += 1;

                let decoder = match id_path {
                    Some(path) => JsonDecoder::with_path(path.as_str()),
                    None => JsonDecoder::new(),
                };
                decoder
                    .decode(&body)?
                    .iter()
                    .map(|value| {
                        value_to_string(value).ok_or_else(|| {
                            Error::malformed(format!("Id list entry {value} is not a scalar"))
                        })
                    })
                    .collect::<Result<Vec<_>>>()?
            }
            IdSource::Range { start, end } => (*start..=*end).map(|id| id.to_string()).collect(),
            IdSource::Repeat(count) => vec![String::new(); *count],
        };

        if let Some(max) = self.limits.max_items {
            if ids.len() > max {
                ids.truncate(max);
                self.ids_truncated = true;
            }
        }

        debug!(resource = %self.name, ids = ids.len(), "Resolved id list");
        Ok(ids)
    }

    fn finish(&mut self) {
        let reason = if self.ids_truncated {
            StopReason::ItemLimit
        } else {
            StopReason::Exhausted
        };
        self.progress.state = ResourceState::Completed(reason);
        info!(
            resource = %self.name,
            requests = self.progress.pages,
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
impl BatchSource for DetailDriver {
    async fn next_batch(&mut self) -> Result<Option<RecordBatch>> {
        DetailDriver::next_batch(self).await
    }

    fn progress(&self) -> ExtractProgress {
        self.progress
    }
}
