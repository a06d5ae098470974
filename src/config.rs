//! Pipeline configuration
//!
//! One explicit value object is built at startup and passed into every
//! pipeline entry point. It is read from an optional YAML file and then
//! overlaid with environment variables, which win over the file.

use crate::error::{Error, Result};
use crate::http::HttpClientConfig;
use crate::types::{DestinationType, FileFormat, OptionStringExt, WriteMode};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

// ============================================================================
// Top-Level Config
// ============================================================================

/// Configuration shared by all built-in pipelines
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// API token for the selected pipeline (GitHub token, Stripe key)
    pub token: Option<String>,

    /// GitHub repositories in `owner/name` form
    pub repos: Vec<String>,

    /// Resource selection; `None` means the pipeline's default set
    pub resources: Option<Vec<String>>,

    /// Destination override
    pub destination_type: Option<DestinationType>,

    /// Page limit applied to every paginated resource
    pub max_pages: Option<u32>,

    /// Item limit applied to every resource
    pub max_items: Option<usize>,

    /// Staged file format override
    pub file_format: Option<FileFormat>,

    /// Write disposition override applied to every resource
    pub write_disposition: Option<WriteMode>,

    /// Root directory for load packages
    pub pipelines_dir: PathBuf,

    /// DuckDB database file; defaults to `<pipeline>.duckdb`
    pub duckdb_path: Option<PathBuf>,

    /// BigQuery destination settings
    pub bigquery: BigQueryConfig,

    /// Salesforce credentials
    pub salesforce: SalesforceConfig,

    /// Repository owner for the `github_reactions` pipeline
    pub github_owner: Option<String>,

    /// Repository name for the `github_reactions` pipeline
    pub github_repo_name: Option<String>,

    /// Client-side rate limit, off when unset
    pub requests_per_second: Option<u32>,

    /// Per-request timeout
    pub http_timeout_secs: u64,

    /// Keep load packages on disk after a successful load
    pub keep_packages: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            token: None,
            repos: vec![DEFAULT_GITHUB_REPO.to_string()],
            resources: None,
            destination_type: None,
            max_pages: None,
            max_items: None,
            file_format: None,
            write_disposition: None,
            pipelines_dir: PathBuf::from(DEFAULT_PIPELINES_DIR),
            duckdb_path: None,
            bigquery: BigQueryConfig::default(),
            salesforce: SalesforceConfig::default(),
            github_owner: None,
            github_repo_name: None,
            requests_per_second: None,
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
            keep_packages: false,
        }
    }
}

const DEFAULT_GITHUB_REPO: &str = "dlt-hub/dlt";
const DEFAULT_PIPELINES_DIR: &str = ".apiload";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

// ============================================================================
// Destination / Source Sections
// ============================================================================

/// BigQuery destination settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BigQueryConfig {
    /// GCP project; defaults to the service account's `project_id`
    pub project: Option<String>,

    /// Dataset location
    pub location: String,

    /// Path to a service account JSON key
    pub credentials_path: Option<PathBuf>,

    /// API root, overridable for tests
    pub api_url: String,
}

impl Default for BigQueryConfig {
    fn default() -> Self {
        Self {
            project: None,
            location: "US".to_string(),
            credentials_path: None,
            api_url: "https://bigquery.googleapis.com".to_string(),
        }
    }
}

/// Salesforce login settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SalesforceConfig {
    pub username: Option<String>,
    pub password: Option<String>,
    pub security_token: Option<String>,

    /// SOAP login host
    pub login_url: String,

    /// REST API version used for queries
    pub api_version: String,
}

impl Default for SalesforceConfig {
    fn default() -> Self {
        Self {
            username: None,
            password: None,
            security_token: None,
            login_url: "https://login.salesforce.com".to_string(),
            api_version: "59.0".to_string(),
        }
    }
}

// ============================================================================
// Loading
// ============================================================================

impl PipelineConfig {
    /// Load from an optional YAML file, then overlay the process environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Parse a YAML config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("Failed to read config '{}': {e}", path.display()))
        })?;
        Self::from_yaml(&content)
    }

    /// Parse YAML config content
    pub fn from_yaml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    /// Overlay values from environment variables
    ///
    /// `lookup` is the variable source; empty values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).none_if_empty();

        if let Some(repos) = get("GITHUB_REPOS") {
            self.repos = split_list(&repos);
        }
        if let Some(resources) = get("GITHUB_RESOURCES") {
            self.resources = Some(split_list(&resources));
        }
        if let Some(v) = get("DESTINATION_TYPE") {
            self.destination_type = Some(v.parse()?);
        }
        if let Some(v) = get("MAX_PAGES") {
            self.max_pages = Some(parse_var("MAX_PAGES", &v)?);
        }
        if let Some(v) = get("MAX_ITEMS") {
            self.max_items = Some(parse_var("MAX_ITEMS", &v)?);
        }
        if let Some(v) = get("LOADER_FILE_FORMAT") {
            self.file_format = Some(v.parse()?);
        }
        if let Some(v) = get("PIPELINES_DIR") {
            self.pipelines_dir = PathBuf::from(v);
        }
        if let Some(v) = get("DUCKDB_PATH") {
            self.duckdb_path = Some(PathBuf::from(v));
        }
        if let Some(v) = get("BIGQUERY_PROJECT") {
            self.bigquery.project = Some(v);
        }
        if let Some(v) = get("BIGQUERY_LOCATION") {
            self.bigquery.location = v;
        }
        if let Some(v) = get("GOOGLE_APPLICATION_CREDENTIALS") {
            self.bigquery.credentials_path = Some(PathBuf::from(v));
        }
        if let Some(v) = get("SALESFORCE_USERNAME") {
            self.salesforce.username = Some(v);
        }
        if let Some(v) = get("SALESFORCE_PASSWORD") {
            self.salesforce.password = Some(v);
        }
        if let Some(v) = get("SALESFORCE_SECURITY_TOKEN") {
            self.salesforce.security_token = Some(v);
        }
        if let Some(v) = get("SALESFORCE_LOGIN_URL") {
            self.salesforce.login_url = v;
        }
        if let Some(v) = get("GITHUB_OWNER") {
            self.github_owner = Some(v);
        }
        if let Some(v) = get("GITHUB_REPO_NAME") {
            self.github_repo_name = Some(v);
        }
        if let Some(v) = get("REQUESTS_PER_SECOND") {
            self.requests_per_second = Some(parse_var("REQUESTS_PER_SECOND", &v)?);
        }
        if let Some(v) = get("HTTP_TIMEOUT_SECS") {
            self.http_timeout_secs = parse_var("HTTP_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = get("KEEP_PACKAGES") {
            self.keep_packages = parse_bool("KEEP_PACKAGES", &v)?;
        }

        Ok(())
    }

    /// Overlay the pipeline's token variable (e.g. `GITHUB_TOKEN`)
    pub fn apply_token_env<F>(&mut self, var: &str, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = lookup(var).none_if_empty() {
            self.token = Some(token);
        }
    }

    /// Token, treating empty strings as unset
    pub fn token(&self) -> Option<&str> {
        self.token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }

    /// HTTP client settings (timeout, optional rate limit)
    pub fn http_client_config(&self) -> HttpClientConfig {
        HttpClientConfig::builder()
            .timeout(Duration::from_secs(self.http_timeout_secs))
            .requests_per_second(self.requests_per_second)
            .build()
    }

    /// DuckDB file for `pipeline_name`, `<pipeline>.duckdb` by default
    pub fn duckdb_path_for(&self, pipeline_name: &str) -> PathBuf {
        self.duckdb_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(format!("{pipeline_name}.duckdb")))
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn parse_var<T: FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::invalid_value(name, format!("cannot parse '{value}'")))
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::invalid_value(
            name,
            format!("expected a boolean, got '{value}'"),
        )),
    }
}
