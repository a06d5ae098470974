//! Pagination types and traits
//!
//! Defines the cursor model and the `Paginator` trait used by all strategies.
//! Paginators are pure: they propose the next cursor from a response and
//! never hold iteration state. The driver owns the current cursor.

use crate::decode::{extract_path, value_to_string};
use reqwest::header::HeaderMap;
use serde_json::Value;
use std::fmt;

/// Position in a paginated listing
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PageCursor {
    /// The first request, sent with the endpoint's static parameters only
    First,
    /// Absolute (or base-relative) URL of the next page, requested verbatim
    NextLink(String),
    /// Opaque continuation token sent as a query parameter
    Token(String),
    /// Page number pagination
    Page { page: u32, per_page: Option<u32> },
    /// Offset/limit pagination
    Offset { offset: u64, limit: u32 },
}

impl fmt::Display for PageCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageCursor::First => f.write_str("first"),
            PageCursor::NextLink(url) => write!(f, "link {url}"),
            PageCursor::Token(token) => write!(f, "token {token}"),
            PageCursor::Page { page, .. } => write!(f, "page {page}"),
            PageCursor::Offset { offset, limit } => write!(f, "offset {offset} limit {limit}"),
        }
    }
}

/// What a paginator sees of one fetched page
#[derive(Debug, Clone, Copy)]
pub struct PageResponse<'a> {
    /// Decoded response body
    pub body: &'a Value,
    /// Response headers
    pub headers: &'a HeaderMap,
    /// Records selected from this page
    pub records_count: usize,
    /// Records fetched so far, this page included
    pub total_fetched: u64,
}

/// Core trait for pagination strategies
pub trait Paginator: Send + Sync {
    /// Cursor of the first request
    fn first_cursor(&self) -> PageCursor {
        PageCursor::First
    }

    /// Query parameters that select `cursor`, appended after the static ones
    fn cursor_params(&self, cursor: &PageCursor) -> Vec<(String, String)>;

    /// Propose the cursor after `current`, or `None` when the listing is done
    fn next_cursor(&self, current: &PageCursor, page: &PageResponse<'_>) -> Option<PageCursor>;
}

/// Stop conditions for pagination
#[derive(Debug, Clone, Default)]
pub enum StopCondition {
    /// Stop when page is empty (no records)
    #[default]
    EmptyPage,

    /// Stop when a field has a specific value (Stripe `has_more == false`)
    Field {
        /// Path to the field
        path: String,
        /// Value that means "no more pages"
        value: Value,
    },

    /// Stop when the fetched record count reaches a total count field
    TotalCount {
        /// Path to total count field
        path: String,
    },

    /// Stop when the page number reaches a total pages field
    TotalPages {
        /// Path to total pages field
        path: String,
    },
}

impl StopCondition {
    /// Create a field-based stop condition
    pub fn field(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Field {
            path: path.into(),
            value: value.into(),
        }
    }

    /// Create a total count stop condition
    pub fn total_count(path: impl Into<String>) -> Self {
        Self::TotalCount { path: path.into() }
    }

    /// Create a total pages stop condition
    pub fn total_pages(path: impl Into<String>) -> Self {
        Self::TotalPages { path: path.into() }
    }

    /// Whether the listing is finished after `page`
    pub fn should_stop(&self, current: &PageCursor, page: &PageResponse<'_>) -> bool {
        match self {
            StopCondition::EmptyPage => page.records_count == 0,
            StopCondition::Field { path, value } => {
                extract_path(page.body, path).is_some_and(|found| found == value)
            }
            StopCondition::TotalCount { path } => extract_number(page.body, path)
                .is_some_and(|total| page.total_fetched >= total),
            StopCondition::TotalPages { path } => {
                let current_page = match current {
                    PageCursor::Page { page, .. } => u64::from(*page),
                    _ => return false,
                };
                extract_number(page.body, path).is_some_and(|total| current_page >= total)
            }
        }
    }
}

fn extract_number(body: &Value, path: &str) -> Option<u64> {
    extract_path(body, path)
        .and_then(value_to_string)
        .and_then(|s| s.parse().ok())
}
