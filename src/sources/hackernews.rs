//! Hacker News sources
//!
//! The Firebase API lists story ids and serves one item per request; the
//! Algolia search API returns whole stories under `hits`.

use super::{http_client, limit_overrides, pick, BuildFuture, BuiltSource};
use crate::auth::AuthConfig;
use crate::config::PipelineConfig;
use crate::decode::JsonDecoder;
use crate::error::Result;
use crate::extract::{DetailDriver, Endpoint, IdSource, PageFetcher, PageLimits, PaginationDriver};
use crate::http::HttpClient;
use crate::pagination::NoPaginator;
use crate::resource::{Resource, Source};
use crate::types::WriteMode;
use serde_json::Value;
use std::sync::Arc;

pub const FIREBASE_API_URL: &str = "https://hacker-news.firebaseio.com/v0";
pub const ALGOLIA_API_URL: &str = "https://hn.algolia.com/api/v1";

pub const TOP_STORIES_LIMIT: usize = 50;
pub const BEST_STORIES_LIMIT: usize = 30;

const DATASET: &str = "hackernews_data";

const STORY_FIELDS: [&str; 7] = ["id", "title", "url", "score", "by", "time", "type"];

// ============================================================================
// Firebase
// ============================================================================

/// `top_stories` and `best_stories`, one detail request per story id
pub fn firebase_source(
    client: Arc<HttpClient>,
    base_url: &str,
    overrides: PageLimits,
) -> Result<Source> {
    let top = story_driver(
        client.clone(),
        base_url,
        "top_stories",
        "/topstories.json",
        PageLimits::none()
            .with_max_items(Some(TOP_STORIES_LIMIT))
            .overridden_by(overrides),
    )?;
    let best = story_driver(
        client,
        base_url,
        "best_stories",
        "/beststories.json",
        PageLimits::none()
            .with_max_items(Some(BEST_STORIES_LIMIT))
            .overridden_by(overrides),
    )?;

    Ok(Source::new(
        "hackernews",
        vec![
            Resource::new("top_stories", top)
                .with_write_mode(WriteMode::Replace)
                .with_transform(|item| {
                    let mut story = pick(&item, &STORY_FIELDS);
                    let descendants = item.get("descendants").cloned().unwrap_or(Value::from(0));
                    story.insert("descendants".to_string(), descendants);
                    Ok(Some(story))
                }),
            Resource::new("best_stories", best)
                .with_write_mode(WriteMode::Replace)
                .with_transform(|item| Ok(Some(pick(&item, &STORY_FIELDS)))),
        ],
    ))
}

fn story_driver(
    client: Arc<HttpClient>,
    base_url: &str,
    name: &str,
    listing: &str,
    limits: PageLimits,
) -> Result<DetailDriver> {
    DetailDriver::new(
        name,
        client,
        IdSource::Endpoint {
            endpoint: Endpoint::new(base_url, listing),
            id_path: None,
        },
        Endpoint::new(base_url, "/item/{id}.json"),
        limits,
    )
}

// ============================================================================
// Algolia
// ============================================================================

/// `top_stories` (front page) and `best_stories` (over 100 points)
pub fn algolia_source(
    client: Arc<HttpClient>,
    base_url: &str,
    overrides: PageLimits,
) -> Result<Source> {
    let top = Endpoint::new(base_url, "/search")
        .with_param("tags", "front_page")
        .with_param("hitsPerPage", TOP_STORIES_LIMIT);
    let best = Endpoint::new(base_url, "/search")
        .with_param("tags", "story")
        .with_param("numericFilters", "points>100")
        .with_param("hitsPerPage", BEST_STORIES_LIMIT);

    Ok(Source::new(
        "hackernews_rest",
        vec![
            search_resource(client.clone(), "top_stories", top, overrides)?,
            search_resource(client, "best_stories", best, overrides)?,
        ],
    ))
}

fn search_resource(
    client: Arc<HttpClient>,
    name: &str,
    endpoint: Endpoint,
    limits: PageLimits,
) -> Result<Resource> {
    let fetcher = PageFetcher::new(
        client,
        endpoint,
        Box::new(NoPaginator),
        Box::new(JsonDecoder::with_path("hits")),
    )?;
    Ok(Resource::new(name, PaginationDriver::new(name, fetcher, limits))
        .with_write_mode(WriteMode::Replace))
}

// ============================================================================
// Builders
// ============================================================================

pub(super) fn build_firebase(config: &PipelineConfig) -> BuildFuture<'_> {
    Box::pin(async move {
        let client = http_client(config, AuthConfig::None)?;
        let source = firebase_source(client, FIREBASE_API_URL, limit_overrides(config))?;
        Ok(BuiltSource::new(DATASET, source))
    })
}

pub(super) fn build_algolia(config: &PipelineConfig) -> BuildFuture<'_> {
    Box::pin(async move {
        let client = http_client(config, AuthConfig::None)?;
        let source = algolia_source(client, ALGOLIA_API_URL, limit_overrides(config))?;
        Ok(BuiltSource::new(DATASET, source))
    })
}
