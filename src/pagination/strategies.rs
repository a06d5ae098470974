//! Pagination strategy implementations
//!
//! Each strategy handles a specific pagination pattern.

use super::types::{PageCursor, PageResponse, Paginator, StopCondition};
use crate::decode::{extract_path, value_to_string};

// ============================================================================
// Cursor Pagination
// ============================================================================

/// Cursor-based pagination (e.g., Stripe)
///
/// Uses a token from the response body to select the next page.
/// Common patterns:
/// - `?starting_after=obj_123` with the token at `data[-1].id`
/// - `?cursor=abc123` with the token at `meta.next_cursor`
#[derive(Debug, Clone)]
pub struct CursorPaginator {
    /// Query parameter name for cursor
    pub cursor_param: String,
    /// Path to the cursor in the response body
    pub cursor_path: String,
    /// Stop condition
    pub stop_condition: StopCondition,
}

impl CursorPaginator {
    /// Create a new cursor paginator
    pub fn new(
        cursor_param: impl Into<String>,
        cursor_path: impl Into<String>,
        stop_condition: StopCondition,
    ) -> Self {
        Self {
            cursor_param: cursor_param.into(),
            cursor_path: cursor_path.into(),
            stop_condition,
        }
    }
}

impl Paginator for CursorPaginator {
    fn cursor_params(&self, cursor: &PageCursor) -> Vec<(String, String)> {
        match cursor {
            PageCursor::Token(token) => vec![(self.cursor_param.clone(), token.clone())],
            _ => Vec::new(),
        }
    }

    fn next_cursor(&self, current: &PageCursor, page: &PageResponse<'_>) -> Option<PageCursor> {
        if self.stop_condition.should_stop(current, page) {
            return None;
        }

        extract_path(page.body, &self.cursor_path)
            .and_then(value_to_string)
            .filter(|token| !token.is_empty())
            .map(PageCursor::Token)
    }
}

// ============================================================================
// Offset Pagination
// ============================================================================

/// Offset-based pagination
///
/// Common patterns:
/// - `?offset=100&limit=50`
/// - `?skip=100&take=50`
#[derive(Debug, Clone)]
pub struct OffsetPaginator {
    /// Query parameter name for offset
    pub offset_param: String,
    /// Query parameter name for limit
    pub limit_param: String,
    /// Number of records per page
    pub limit_value: u32,
    /// Stop condition
    pub stop_condition: StopCondition,
}

impl OffsetPaginator {
    /// Create a new offset paginator
    pub fn new(
        offset_param: impl Into<String>,
        limit_param: impl Into<String>,
        limit_value: u32,
        stop_condition: StopCondition,
    ) -> Self {
        Self {
            offset_param: offset_param.into(),
            limit_param: limit_param.into(),
            limit_value,
            stop_condition,
        }
    }
}

impl Paginator for OffsetPaginator {
    fn first_cursor(&self) -> PageCursor {
        PageCursor::Offset {
            offset: 0,
            limit: self.limit_value,
        }
    }

    fn cursor_params(&self, cursor: &PageCursor) -> Vec<(String, String)> {
        match cursor {
            PageCursor::Offset { offset, limit } => vec![
                (self.offset_param.clone(), offset.to_string()),
                (self.limit_param.clone(), limit.to_string()),
            ],
            _ => Vec::new(),
        }
    }

    fn next_cursor(&self, current: &PageCursor, page: &PageResponse<'_>) -> Option<PageCursor> {
        let PageCursor::Offset { offset, limit } = current else {
            return None;
        };

        if self.stop_condition.should_stop(current, page) {
            return None;
        }

        // A short page is the last one
        if page.records_count < *limit as usize {
            return None;
        }

        Some(PageCursor::Offset {
            offset: offset + u64::from(*limit),
            limit: *limit,
        })
    }
}

// ============================================================================
// Page Number Pagination
// ============================================================================

/// Page number pagination
///
/// Common patterns:
/// - `?page=2`
/// - `?page=2&per_page=50`
#[derive(Debug, Clone)]
pub struct PageNumberPaginator {
    /// Query parameter name for page number
    pub page_param: String,
    /// First page number (usually 0 or 1)
    pub start_page: u32,
    /// Optional page size parameter name
    pub page_size_param: Option<String>,
    /// Page size value
    pub page_size: Option<u32>,
    /// Stop condition
    pub stop_condition: StopCondition,
}

impl PageNumberPaginator {
    /// Create a new page number paginator
    pub fn new(page_param: impl Into<String>, start_page: u32) -> Self {
        Self {
            page_param: page_param.into(),
            start_page,
            page_size_param: None,
            page_size: None,
            stop_condition: StopCondition::EmptyPage,
        }
    }

    /// Set page size parameter
    #[must_use]
    pub fn with_page_size(mut self, param: impl Into<String>, size: u32) -> Self {
        self.page_size_param = Some(param.into());
        self.page_size = Some(size);
        self
    }

    /// Set stop condition
    #[must_use]
    pub fn with_stop_condition(mut self, condition: StopCondition) -> Self {
        self.stop_condition = condition;
        self
    }
}

impl Paginator for PageNumberPaginator {
    fn first_cursor(&self) -> PageCursor {
        PageCursor::Page {
            page: self.start_page,
            per_page: self.page_size,
        }
    }

    fn cursor_params(&self, cursor: &PageCursor) -> Vec<(String, String)> {
        let PageCursor::Page { page, per_page } = cursor else {
            return Vec::new();
        };

        let mut params = vec![(self.page_param.clone(), page.to_string())];
        if let (Some(param), Some(size)) = (&self.page_size_param, per_page) {
            params.push((param.clone(), size.to_string()));
        }
        params
    }

    fn next_cursor(&self, current: &PageCursor, page: &PageResponse<'_>) -> Option<PageCursor> {
        let PageCursor::Page {
            page: number,
            per_page,
        } = current
        else {
            return None;
        };

        if self.stop_condition.should_stop(current, page) {
            return None;
        }

        if let Some(size) = per_page {
            if page.records_count < *size as usize {
                return None;
            }
        }

        Some(PageCursor::Page {
            page: number + 1,
            per_page: *per_page,
        })
    }
}

// ============================================================================
// Link Header Pagination
// ============================================================================

/// Link header pagination (RFC 5988)
///
/// Extracts the next page URL from the Link header, as GitHub does.
/// Format: `Link: <https://api.github.com/...?page=2>; rel="next", ...`
#[derive(Debug, Clone)]
pub struct LinkHeaderPaginator {
    /// Rel value to follow (default: "next")
    pub rel: String,
}

impl Default for LinkHeaderPaginator {
    fn default() -> Self {
        Self {
            rel: "next".to_string(),
        }
    }
}

impl LinkHeaderPaginator {
    /// Create a new link header paginator
    pub fn new(rel: impl Into<String>) -> Self {
        Self { rel: rel.into() }
    }
}

impl Paginator for LinkHeaderPaginator {
    fn cursor_params(&self, _cursor: &PageCursor) -> Vec<(String, String)> {
        Vec::new()
    }

    fn next_cursor(&self, _current: &PageCursor, page: &PageResponse<'_>) -> Option<PageCursor> {
        page.headers
            .get(reqwest::header::LINK)
            .and_then(|v| v.to_str().ok())
            .and_then(|header| parse_link_header(header, &self.rel))
            .map(PageCursor::NextLink)
    }
}

/// Parse a Link header and extract the URL for the given rel
pub fn parse_link_header(header: &str, target_rel: &str) -> Option<String> {
    for part in header.split(',') {
        let mut url = None;
        let mut rel = None;

        for segment in part.trim().split(';') {
            let segment = segment.trim();
            if segment.starts_with('<') && segment.ends_with('>') {
                url = Some(&segment[1..segment.len() - 1]);
            } else if let Some(stripped) = segment.strip_prefix("rel=") {
                rel = Some(stripped.trim_matches('"').trim_matches('\''));
            }
        }

        if let (Some(u), Some(r)) = (url, rel) {
            // rel may list several space-separated values
            if r.split_whitespace().any(|value| value == target_rel) {
                return Some(u.to_string());
            }
        }
    }

    None
}

// ============================================================================
// Next URL Pagination
// ============================================================================

/// Next URL pagination (URL in response body)
///
/// Common patterns:
/// - `{ "next": "https://api.example.com/items?page=2" }`
/// - `{ "nextRecordsUrl": "/services/data/v59.0/query/01g-2000" }` (Salesforce)
#[derive(Debug, Clone)]
pub struct NextUrlPaginator {
    /// Path to the next URL in the response body
    pub path: String,
}

impl NextUrlPaginator {
    /// Create a new next URL paginator
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

impl Paginator for NextUrlPaginator {
    fn cursor_params(&self, _cursor: &PageCursor) -> Vec<(String, String)> {
        Vec::new()
    }

    fn next_cursor(&self, _current: &PageCursor, page: &PageResponse<'_>) -> Option<PageCursor> {
        extract_path(page.body, &self.path)
            .and_then(serde_json::Value::as_str)
            .filter(|url| !url.is_empty())
            .map(|url| PageCursor::NextLink(url.to_string()))
    }
}

// ============================================================================
// No Pagination
// ============================================================================

/// No pagination - single request
#[derive(Debug, Clone, Default)]
pub struct NoPaginator;

impl Paginator for NoPaginator {
    fn cursor_params(&self, _cursor: &PageCursor) -> Vec<(String, String)> {
        Vec::new()
    }

    fn next_cursor(&self, _current: &PageCursor, _page: &PageResponse<'_>) -> Option<PageCursor> {
        None
    }
}
