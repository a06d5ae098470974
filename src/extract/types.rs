//! Extraction types
//!
//! Endpoint descriptors, limits, record hooks and the per-resource state
//! machine.

use crate::error::Result;
use crate::pagination::PageCursor;
use crate::types::Record;
use reqwest::header::HeaderMap;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use url::Url;

// ============================================================================
// Endpoint Descriptor
// ============================================================================

/// Whether an endpoint sends credentials
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthRequirement {
    /// Never send credentials
    #[default]
    None,
    /// Send credentials when configured (GitHub token)
    Optional,
    /// Credentials must be configured (Stripe key)
    Required,
}

/// A parameterized GET endpoint, immutable for the run
#[derive(Debug, Clone)]
pub struct Endpoint {
    /// Scheme and host, optionally with a path prefix
    pub base_url: String,
    /// Path below the base URL; may contain an `{id}` placeholder
    pub path: String,
    /// Static query parameters, sent in order
    pub params: Vec<(String, String)>,
    /// Credential requirement
    pub auth: AuthRequirement,
}

impl Endpoint {
    /// Create an endpoint without parameters or auth
    pub fn new(base_url: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            path: path.into(),
            params: Vec::new(),
            auth: AuthRequirement::None,
        }
    }

    /// Add a static query parameter
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.params.push((key.into(), value.to_string()));
        self
    }

    /// Set the credential requirement
    #[must_use]
    pub fn with_auth(mut self, auth: AuthRequirement) -> Self {
        self.auth = auth;
        self
    }

    /// `base_url + path`
    pub fn url(&self) -> String {
        join_path(&self.base_url, &self.path)
    }

    /// URL with `{id}` replaced; absolute-URL ids are returned as is
    pub fn url_for_id(&self, id: &str) -> String {
        if is_absolute(id) {
            return id.to_string();
        }
        join_path(&self.base_url, &self.path.replace("{id}", id))
    }

    /// Resolve a next link, joining relative links onto the base URL
    pub fn resolve_link(&self, link: &str) -> Result<String> {
        if is_absolute(link) {
            return Ok(link.to_string());
        }
        Ok(Url::parse(&self.base_url)?.join(link)?.to_string())
    }
}

fn is_absolute(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

fn join_path(base: &str, path: &str) -> String {
    if is_absolute(path) {
        return path.to_string();
    }
    let path = path.trim_start_matches('/');
    if path.is_empty() {
        return base.to_string();
    }
    format!("{}/{}", base.trim_end_matches('/'), path)
}

// ============================================================================
// Fetched Page
// ============================================================================

/// Result of one page request
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Decoded response body
    pub body: Value,
    /// Response headers
    pub headers: HeaderMap,
    /// Records selected from the body
    pub records: Vec<Record>,
    /// Cursor proposed by the paginator
    pub next: Option<PageCursor>,
}

// ============================================================================
// Limits
// ============================================================================

/// Bounds applied by the drivers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageLimits {
    /// Maximum number of page requests
    pub max_pages: Option<u32>,
    /// Maximum number of records yielded
    pub max_items: Option<usize>,
}

impl PageLimits {
    /// No limits
    pub fn none() -> Self {
        Self::default()
    }

    /// Set the page limit
    #[must_use]
    pub fn with_max_pages(mut self, max_pages: Option<u32>) -> Self {
        self.max_pages = max_pages;
        self
    }

    /// Set the item limit
    #[must_use]
    pub fn with_max_items(mut self, max_items: Option<usize>) -> Self {
        self.max_items = max_items;
        self
    }

    /// Overlay another set of limits; its values win where set
    #[must_use]
    pub fn overridden_by(self, other: PageLimits) -> Self {
        Self {
            max_pages: other.max_pages.or(self.max_pages),
            max_items: other.max_items.or(self.max_items),
        }
    }
}

// ============================================================================
// Record Hooks
// ============================================================================

/// Keeps a record when it returns true
pub type RecordFilter = Arc<dyn Fn(&Record) -> bool + Send + Sync>;

/// Reshapes a record; `Ok(None)` drops it
pub type RecordTransform = Arc<dyn Fn(Record) -> Result<Option<Record>> + Send + Sync>;

/// Apply an optional filter then an optional transform to a page's records
pub fn apply_hooks(
    records: Vec<Record>,
    filter: Option<&RecordFilter>,
    transform: Option<&RecordTransform>,
) -> Result<Vec<Record>> {
    let mut out = Vec::with_capacity(records.len());
    for record in records {
        if let Some(filter) = filter {
            if !filter(&record) {
                continue;
            }
        }
        match transform {
            Some(transform) => {
                if let Some(record) = transform(record)? {
                    out.push(record);
                }
            }
            None => out.push(record),
        }
    }
    Ok(out)
}

// ============================================================================
// State Machine
// ============================================================================

/// Why a resource stopped fetching
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The paginator proposed no further cursor
    Exhausted,
    /// A page came back without records
    EmptyPage,
    /// The page limit was reached with more pages available
    Truncated,
    /// The item limit was reached
    ItemLimit,
    /// The proposed cursor had already been fetched
    CursorRepeated,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StopReason::Exhausted => "exhausted",
            StopReason::EmptyPage => "empty_page",
            StopReason::Truncated => "truncated",
            StopReason::ItemLimit => "item_limit",
            StopReason::CursorRepeated => "cursor_repeated",
        };
        f.write_str(s)
    }
}

/// Per-resource extraction state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResourceState {
    #[default]
    NotStarted,
    /// Page `n` (1-based) is being fetched
    Fetching(u32),
    /// No more requests will be made
    Completed(StopReason),
    Failed,
}

impl ResourceState {
    /// Whether the driver will not issue further requests
    pub fn is_terminal(&self) -> bool {
        matches!(self, ResourceState::Completed(_) | ResourceState::Failed)
    }

    /// Stop reason, once completed
    pub fn stop_reason(&self) -> Option<StopReason> {
        match self {
            ResourceState::Completed(reason) => Some(*reason),
            _ => None,
        }
    }
}

/// Snapshot of a driver's progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExtractProgress {
    /// Requests issued
    pub pages: u32,
    /// Records yielded
    pub items: usize,
    pub state: ResourceState,
}
