//! JokeAPI source

use super::{http_client, limit_overrides, BuildFuture, BuiltSource};
use crate::auth::AuthConfig;
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::extract::{DetailDriver, Endpoint, IdSource, PageLimits};
use crate::http::HttpClient;
use crate::resource::{Resource, Source};
use crate::types::{Record, WriteMode};
use serde_json::Value;
use std::sync::Arc;

pub const JOKE_API_URL: &str = "https://v2.jokeapi.dev";

/// Requests per run
pub const JOKE_COUNT: usize = 10;

/// `programming_jokes`: `count` single-part jokes, appended
pub fn jokes_source(
    client: Arc<HttpClient>,
    base_url: &str,
    count: usize,
    overrides: PageLimits,
) -> Result<Source> {
    let driver = DetailDriver::new(
        "programming_jokes",
        client,
        IdSource::Repeat(count),
        Endpoint::new(base_url, "/joke/Programming").with_param("type", "single"),
        PageLimits::none().overridden_by(overrides),
    )?;

    Ok(Source::new(
        "jokes",
        vec![Resource::new("programming_jokes", driver)
            .with_write_mode(WriteMode::Append)
            .with_filter(|payload| !is_truthy(payload.get("error")))
            .with_transform(|payload| Ok(Some(joke_row(&payload))))],
    ))
}

fn joke_row(payload: &Record) -> Record {
    let field = |key: &str| payload.get(key).cloned().unwrap_or(Value::Null);
    let mut row = Record::new();
    row.insert("id".to_string(), field("id"));
    row.insert("joke".to_string(), field("joke"));
    row.insert("category".to_string(), field("category"));
    row.insert("language".to_string(), field("lang"));
    row.insert("safe".to_string(), field("safe"));
    row
}

fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|n| n != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(a)) => !a.is_empty(),
        Some(Value::Object(o)) => !o.is_empty(),
    }
}

pub(super) fn build(config: &PipelineConfig) -> BuildFuture<'_> {
    Box::pin(async move {
        let client = http_client(config, AuthConfig::None)?;
        let source = jokes_source(client, JOKE_API_URL, JOKE_COUNT, limit_overrides(config))?;
        Ok(BuiltSource::new("jokes_data", source))
    })
}
