//! Page fetcher
//!
//! One GET per call against an endpoint, decoded into records plus the
//! paginator's proposal for the next cursor.

use super::types::{AuthRequirement, Endpoint, FetchedPage};
use crate::decode::{into_records, RecordDecoder};
use crate::error::{Error, Result};
use crate::http::{HttpClient, RequestConfig};
use crate::pagination::{PageCursor, PageResponse, Paginator};
use reqwest::header::HeaderMap;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Fetches single pages of one endpoint
pub struct PageFetcher {
    client: Arc<HttpClient>,
    endpoint: Endpoint,
    paginator: Box<dyn Paginator>,
    decoder: Box<dyn RecordDecoder>,
}

impl PageFetcher {
    /// Create a fetcher
    ///
    /// Fails with a config error when the endpoint requires credentials and
    /// the client has none.
    pub fn new(
        client: Arc<HttpClient>,
        endpoint: Endpoint,
        paginator: Box<dyn Paginator>,
        decoder: Box<dyn RecordDecoder>,
    ) -> Result<Self> {
        check_credentials(&client, &endpoint)?;
        Ok(Self {
            client,
            endpoint,
            paginator,
            decoder,
        })
    }

    /// The endpoint this fetcher requests
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Cursor of the first request
    pub fn first_cursor(&self) -> PageCursor {
        self.paginator.first_cursor()
    }

    /// URL and query parameters for a cursor
    pub fn request_for(&self, cursor: &PageCursor) -> Result<(String, Vec<(String, String)>)> {
        match cursor {
            PageCursor::NextLink(link) => Ok((self.endpoint.resolve_link(link)?, Vec::new())),
            other => {
                let mut params = self.endpoint.params.clone();
                params.extend(self.paginator.cursor_params(other));
                Ok((self.endpoint.url(), params))
            }
        }
    }

    /// Fetch the page at `cursor`
    ///
    /// `fetched_before` is the number of records already fetched by the
    /// caller, used by total-count stop conditions.
    pub async fn fetch(&self, cursor: &PageCursor, fetched_before: u64) -> Result<FetchedPage> {
        let (url, params) = self.request_for(cursor)?;
        debug!(cursor = %cursor, url = %url, "Fetching page");

        let (body, headers) =
            get_json_body(&self.client, &url, params, self.endpoint.auth).await?;
        let records = into_records(self.decoder.decode(&body)?)?;

        let response = PageResponse {
            body: &body,
            headers: &headers,
            records_count: records.len(),
            total_fetched: fetched_before + records.len() as u64,
        };
        let next = self.paginator.next_cursor(cursor, &response);

        Ok(FetchedPage {
            body,
            headers,
            records,
            next,
        })
    }
}

impl std::fmt::Debug for PageFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageFetcher")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

/// Reject endpoints that require credentials the client does not have
pub(crate) fn check_credentials(client: &HttpClient, endpoint: &Endpoint) -> Result<()> {
    if endpoint.auth == AuthRequirement::Required && !client.has_credentials() {
        return Err(Error::config(format!(
            "Endpoint {} requires credentials but none are configured",
            endpoint.url()
        )));
    }
    Ok(())
}

/// One GET whose body must be JSON
pub(crate) async fn get_json_body(
    client: &HttpClient,
    url: &str,
    params: Vec<(String, String)>,
    auth: AuthRequirement,
) -> Result<(Value, HeaderMap)> {
    let mut config = RequestConfig::new().queries(params);
    if auth == AuthRequirement::None {
        config = config.without_auth();
    }

    let response = client.get(url, config).await?;
    let final_url = response.url().to_string();
    let headers = response.headers().clone();
    let text = response.text().await.map_err(Error::Http)?;

    let body = serde_json::from_str(&text).map_err(|e| {
        Error::malformed(format!("Response from {final_url} is not valid JSON: {e}"))
    })?;
    Ok((body, headers))
}
