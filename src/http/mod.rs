//! HTTP client module
//!
//! Thin wrapper over reqwest: authentication, optional client-side rate
//! limiting and status classification. No retries.

mod client;
mod rate_limit;

pub use client::{HttpClient, HttpClientConfig, RequestBody, RequestConfig};
pub use rate_limit::{RateLimiter, RateLimiterConfig};
