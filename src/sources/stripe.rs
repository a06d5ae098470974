//! Stripe source
//!
//! List endpoints page with `starting_after` set to the last object's id
//! until `has_more` is false.

use super::{http_client, limit_overrides, BuildFuture, BuiltSource};
use crate::auth::AuthConfig;
use crate::config::PipelineConfig;
use crate::decode::JsonDecoder;
use crate::error::Result;
use crate::extract::{AuthRequirement, Endpoint, PageFetcher, PageLimits, PaginationDriver};
use crate::http::HttpClient;
use crate::pagination::{CursorPaginator, StopCondition};
use crate::resource::{Resource, Source};
use crate::types::WriteMode;
use std::sync::Arc;

pub const STRIPE_API_URL: &str = "https://api.stripe.com";

/// Objects per page (Stripe maximum)
pub const PAGE_SIZE: u32 = 100;

/// `payments` (payment intents) and `customers`, merged on `id`
pub fn stripe_source(
    client: Arc<HttpClient>,
    base_url: &str,
    overrides: PageLimits,
) -> Result<Source> {
    Ok(Source::new(
        "stripe",
        vec![
            list_resource(client.clone(), base_url, "payments", "/v1/payment_intents", overrides)?,
            list_resource(client, base_url, "customers", "/v1/customers", overrides)?,
        ],
    ))
}

fn list_resource(
    client: Arc<HttpClient>,
    base_url: &str,
    name: &str,
    path: &str,
    limits: PageLimits,
) -> Result<Resource> {
    let endpoint = Endpoint::new(base_url, path)
        .with_param("limit", PAGE_SIZE)
        .with_auth(AuthRequirement::Required);
    let paginator = CursorPaginator::new(
        "starting_after",
        "data[-1].id",
        StopCondition::field("has_more", false),
    );
    let fetcher = PageFetcher::new(
        client,
        endpoint,
        Box::new(paginator),
        Box::new(JsonDecoder::with_path("data")),
    )?;

    Ok(Resource::new(name, PaginationDriver::new(name, fetcher, limits))
        .with_write_mode(WriteMode::Merge)
        .with_primary_key("id"))
}

pub(super) fn build(config: &PipelineConfig) -> BuildFuture<'_> {
    Box::pin(async move {
        let client = http_client(config, AuthConfig::bearer(config.token()))?;
        let source = stripe_source(client, STRIPE_API_URL, limit_overrides(config))?;
        Ok(BuiltSource::new("stripe_data", source))
    })
}
