//! PokeAPI source
//!
//! `pokemon` requests ids 1 to 151 and flattens each document;
//! `pokemon_types` lists the types and follows each entry's URL.

use super::{http_client, limit_overrides, required, BuildFuture, BuiltSource};
use crate::auth::AuthConfig;
use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use crate::extract::{DetailDriver, Endpoint, IdSource, PageLimits};
use crate::http::HttpClient;
use crate::resource::{Resource, Source};
use crate::types::{Record, WriteMode};
use serde_json::Value;
use std::sync::Arc;

pub const POKE_API_URL: &str = "https://pokeapi.co/api/v2";

/// Last id of the first generation
pub const LAST_POKEMON_ID: u64 = 151;

/// `pokemon` and `pokemon_types`, replaced on `id`
pub fn pokemon_source(
    client: Arc<HttpClient>,
    base_url: &str,
    overrides: PageLimits,
) -> Result<Source> {
    let pokemon = DetailDriver::new(
        "pokemon",
        client.clone(),
        IdSource::Range {
            start: 1,
            end: LAST_POKEMON_ID,
        },
        Endpoint::new(base_url, "/pokemon/{id}"),
        PageLimits::none().overridden_by(overrides),
    )?;

    let types = DetailDriver::new(
        "pokemon_types",
        client,
        IdSource::Endpoint {
            endpoint: Endpoint::new(base_url, "/type"),
            id_path: Some("results[*].url".to_string()),
        },
        Endpoint::new(base_url, "/type/{id}"),
        PageLimits::none().overridden_by(overrides),
    )?;

    Ok(Source::new(
        "pokemon_api",
        vec![
            Resource::new("pokemon", pokemon)
                .with_write_mode(WriteMode::Replace)
                .with_primary_key("id")
                .with_transform(|doc| flatten_pokemon(&doc).map(Some)),
            Resource::new("pokemon_types", types)
                .with_write_mode(WriteMode::Replace)
                .with_primary_key("id")
                .with_transform(|doc| type_summary(&doc).map(Some)),
        ],
    ))
}

/// Scalar fields plus `types` and `abilities` name lists and a `stats` map
fn flatten_pokemon(doc: &Record) -> Result<Record> {
    let mut row = Record::new();
    for field in ["id", "name", "height", "weight", "base_experience"] {
        row.insert(field.to_string(), required(doc, field)?.clone());
    }

    row.insert(
        "types".to_string(),
        Value::Array(nested_names(doc, "types", "type")?),
    );
    row.insert(
        "abilities".to_string(),
        Value::Array(nested_names(doc, "abilities", "ability")?),
    );

    let mut stats = Record::new();
    for entry in entries(doc, "stats")? {
        let name = entry
            .pointer("/stat/name")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::malformed("Pokemon stat has no stat.name"))?;
        let base = entry.get("base_stat").cloned().unwrap_or(Value::Null);
        stats.insert(name.to_string(), base);
    }
    row.insert("stats".to_string(), Value::Object(stats));

    Ok(row)
}

fn type_summary(doc: &Record) -> Result<Record> {
    let mut row = Record::new();
    row.insert("id".to_string(), required(doc, "id")?.clone());
    row.insert("name".to_string(), required(doc, "name")?.clone());
    row.insert(
        "pokemon_count".to_string(),
        Value::from(entries(doc, "pokemon")?.len()),
    );
    Ok(row)
}

fn entries<'a>(doc: &'a Record, field: &str) -> Result<&'a Vec<Value>> {
    required(doc, field)?
        .as_array()
        .ok_or_else(|| Error::malformed(format!("Field '{field}' is not an array")))
}

/// `doc[list][*][inner].name`
fn nested_names(doc: &Record, list: &str, inner: &str) -> Result<Vec<Value>> {
    entries(doc, list)?
        .iter()
        .map(|entry| {
            entry
                .get(inner)
                .and_then(|v| v.get("name"))
                .cloned()
                .ok_or_else(|| Error::malformed(format!("Entry of '{list}' has no {inner}.name")))
        })
        .collect()
}

pub(super) fn build(config: &PipelineConfig) -> BuildFuture<'_> {
    Box::pin(async move {
        let client = http_client(config, AuthConfig::None)?;
        let source = pokemon_source(client, POKE_API_URL, limit_overrides(config))?;
        Ok(BuiltSource::new("pokemon_data", source))
    })
}
