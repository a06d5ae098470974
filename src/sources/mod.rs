//! Built-in pipelines
//!
//! Each pipeline pairs a source (resources built from the shared config)
//! with a default destination, dataset and staged file format.
//!
//! # Overview
//!
//! | name | dataset | destination |
//! |---|---|---|
//! | `github_issues` | `github_data` | duckdb |
//! | `github_reactions` | `github_<owner>_<repo>` | duckdb |
//! | `hackernews` | `hackernews_data` | duckdb |
//! | `hackernews_rest` | `hackernews_data` | duckdb |
//! | `jokes` | `jokes_data` | duckdb |
//! | `pokemon_api` | `pokemon_data` | duckdb |
//! | `salesforce_crm` | `salesforce_data` | bigquery |
//! | `stripe_payments` | `stripe_data` | duckdb |

pub mod github;
pub mod hackernews;
pub mod jokes;
pub mod pokemon;
pub mod salesforce;
pub mod stripe;

use crate::auth::AuthConfig;
use crate::config::PipelineConfig;
use crate::destination::open_destination;
use crate::error::{Error, Result};
use crate::extract::PageLimits;
use crate::http::HttpClient;
use crate::pipeline::{Pipeline, RunOptions, RunResult};
use crate::resource::Source;
use crate::types::{DestinationType, FileFormat, Record};
use futures::future::BoxFuture;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};
use tracing::info;

// ============================================================================
// Registry
// ============================================================================

/// Future returned by a pipeline's source builder
pub type BuildFuture<'a> = BoxFuture<'a, Result<BuiltSource>>;

/// A source ready to run, with the dataset it loads into
#[derive(Debug)]
pub struct BuiltSource {
    pub dataset_name: String,
    pub source: Source,
    /// The builder already applied the `resources` selection
    pub selection_applied: bool,
}

impl BuiltSource {
    /// Wrap a source; the config's resource selection is still to be applied
    pub fn new(dataset_name: impl Into<String>, source: Source) -> Self {
        Self {
            dataset_name: dataset_name.into(),
            source,
            selection_applied: false,
        }
    }

    /// Mark the resource selection as handled by the builder
    #[must_use]
    pub fn selection_applied(mut self) -> Self {
        self.selection_applied = true;
        self
    }
}

/// A built-in pipeline definition
pub struct PipelineDef {
    pub name: &'static str,
    pub description: &'static str,
    /// Environment variable holding the API token
    pub token_env: Option<&'static str>,
    pub destination: DestinationType,
    pub file_format: FileFormat,
    pub build: fn(&PipelineConfig) -> BuildFuture<'_>,
}

impl std::fmt::Debug for PipelineDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineDef")
            .field("name", &self.name)
            .field("token_env", &self.token_env)
            .field("destination", &self.destination)
            .field("file_format", &self.file_format)
            .finish_non_exhaustive()
    }
}

/// Built-in pipelines by name
pub static BUILTIN_PIPELINES: LazyLock<BTreeMap<&'static str, PipelineDef>> =
    LazyLock::new(|| {
        let defs = [
            PipelineDef {
                name: "github_issues",
                description: "GitHub issues, pull requests and commits per repository",
                token_env: Some("GITHUB_TOKEN"),
                destination: DestinationType::Duckdb,
                file_format: FileFormat::Parquet,
                build: github::build_issues,
            },
            PipelineDef {
                name: "github_reactions",
                description: "GitHub issues and pull requests of one repository",
                token_env: Some("GITHUB_TOKEN"),
                destination: DestinationType::Duckdb,
                file_format: FileFormat::Parquet,
                build: github::build_reactions,
            },
            PipelineDef {
                name: "hackernews",
                description: "Hacker News top and best stories (Firebase API)",
                token_env: None,
                destination: DestinationType::Duckdb,
                file_format: FileFormat::Parquet,
                build: hackernews::build_firebase,
            },
            PipelineDef {
                name: "hackernews_rest",
                description: "Hacker News top and best stories (Algolia search API)",
                token_env: None,
                destination: DestinationType::Duckdb,
                file_format: FileFormat::Parquet,
                build: hackernews::build_algolia,
            },
            PipelineDef {
                name: "jokes",
                description: "Programming jokes from JokeAPI",
                token_env: None,
                destination: DestinationType::Duckdb,
                file_format: FileFormat::Parquet,
                build: jokes::build,
            },
            PipelineDef {
                name: "pokemon_api",
                description: "First-generation Pokemon and Pokemon types from PokeAPI",
                token_env: None,
                destination: DestinationType::Duckdb,
                file_format: FileFormat::Parquet,
                build: pokemon::build,
            },
            PipelineDef {
                name: "salesforce_crm",
                description: "Salesforce accounts, opportunities, contacts and leads",
                token_env: None,
                destination: DestinationType::Bigquery,
                file_format: FileFormat::Jsonl,
                build: salesforce::build,
            },
            PipelineDef {
                name: "stripe_payments",
                description: "Stripe payment intents and customers",
                token_env: Some("STRIPE_API_KEY"),
                destination: DestinationType::Duckdb,
                file_format: FileFormat::Parquet,
                build: stripe::build,
            },
        ];
        defs.into_iter().map(|def| (def.name, def)).collect()
    });

/// Look up a built-in pipeline
pub fn get_builtin(name: &str) -> Option<&'static PipelineDef> {
    BUILTIN_PIPELINES.get(name)
}

/// Built-in pipelines, sorted by name
pub fn list_builtin() -> impl Iterator<Item = &'static PipelineDef> {
    BUILTIN_PIPELINES.values()
}

/// Look up a pipeline, listing the available names when it is unknown
pub fn require_builtin(name: &str) -> Result<&'static PipelineDef> {
    get_builtin(name).ok_or_else(|| {
        let available: Vec<&str> = BUILTIN_PIPELINES.keys().copied().collect();
        Error::config(format!(
            "Unknown pipeline '{name}'. Available: {}",
            available.join(", ")
        ))
    })
}

// ============================================================================
// Running
// ============================================================================

/// Build the pipeline's source, open its destination and run it
pub async fn run_pipeline(
    def: &PipelineDef,
    config: &PipelineConfig,
    options: RunOptions,
) -> Result<RunResult> {
    let built = (def.build)(config).await?;
    let mut source = built.source;

    if !built.selection_applied {
        if let Some(names) = &config.resources {
            let names: Vec<&str> = names.iter().map(String::as_str).collect();
            source = source.with_resources(&names)?;
        }
    }
    if let Some(mode) = config.write_disposition {
        source = source.with_write_mode(mode)?;
    }

    let destination_type = config.destination_type.unwrap_or(def.destination);
    let file_format = config.file_format.unwrap_or(def.file_format);
    info!(
        pipeline = def.name,
        destination = %destination_type,
        file_format = file_format.extension(),
        "Opening destination"
    );
    let destination = open_destination(destination_type, config, def.name)?;

    let pipeline = Pipeline::new(def.name, built.dataset_name, destination)
        .with_pipelines_dir(&config.pipelines_dir)
        .with_file_format(file_format)
        .with_keep_packages(config.keep_packages);

    pipeline.run(source, options).await
}

// ============================================================================
// Builder Helpers
// ============================================================================

/// HTTP client from the shared config
pub(crate) fn http_client(config: &PipelineConfig, auth: AuthConfig) -> Result<Arc<HttpClient>> {
    Ok(Arc::new(HttpClient::with_auth(config.http_client_config(), auth)?))
}

/// Limits from the config, applied over each resource's defaults
pub(crate) fn limit_overrides(config: &PipelineConfig) -> PageLimits {
    PageLimits::none()
        .with_max_pages(config.max_pages)
        .with_max_items(config.max_items)
}

/// Copy `fields` from `record`, missing ones as null
pub(crate) fn pick(record: &Record, fields: &[&str]) -> Record {
    fields
        .iter()
        .map(|&field| {
            (
                field.to_string(),
                record.get(field).cloned().unwrap_or(Value::Null),
            )
        })
        .collect()
}

/// A field that must be present
pub(crate) fn required<'a>(record: &'a Record, field: &str) -> Result<&'a Value> {
    record
        .get(field)
        .ok_or_else(|| Error::malformed(format!("Record is missing field '{field}'")))
}

#[cfg(test)]
mod tests;
