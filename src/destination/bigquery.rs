//! BigQuery destination
//!
//! Talks to the BigQuery REST API with a service account token. Staged files
//! become multipart load jobs; merge goes through a `<dataset>_staging`
//! table and a query job.

use super::types::{Destination, LoadRecord};
use crate::auth::{AuthConfig, ServiceAccountKey};
use crate::config::BigQueryConfig;
use crate::error::{Error, Result};
use crate::http::{HttpClient, HttpClientConfig, RequestConfig};
use crate::sink::StagedTable;
use crate::types::{FileFormat, WriteMode};
use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info};

/// OAuth scope for the BigQuery API
pub const BIGQUERY_SCOPE: &str = "https://www.googleapis.com/auth/bigquery";

const MULTIPART_BOUNDARY: &str = "apiload_load_job_boundary";

/// BigQuery project used as a destination
pub struct BigQueryDestination {
    client: HttpClient,
    project: String,
    location: String,
    api_url: String,
    poll_interval: Duration,
}

impl BigQueryDestination {
    /// Create a destination over an authenticated client
    pub fn new(client: HttpClient, project: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            client,
            project: project.into(),
            location: location.into(),
            api_url: "https://bigquery.googleapis.com".to_string(),
            poll_interval: Duration::from_secs(1),
        }
    }

    /// Build from config: reads the service account key and sets up JWT auth
    pub fn from_config(config: &BigQueryConfig, http: HttpClientConfig) -> Result<Self> {
        let key_path = config
            .credentials_path
            .as_deref()
            .ok_or_else(|| Error::missing_field("bigquery.credentials_path"))?;
        let key = ServiceAccountKey::from_file(key_path)?;

        let project = config
            .project
            .clone()
            .or_else(|| key.project_id.clone())
            .ok_or_else(|| Error::missing_field("bigquery.project"))?;

        let client = HttpClient::with_auth(http, AuthConfig::service_account(&key, BIGQUERY_SCOPE))?;
        Ok(Self::new(client, project, config.location.clone()).with_api_url(&config.api_url))
    }

    /// Override the API root
    #[must_use]
    pub fn with_api_url(mut self, url: &str) -> Self {
        self.api_url = url.trim_end_matches('/').to_string();
        self
    }

    /// Override the job poll interval
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Project id
    pub fn project(&self) -> &str {
        &self.project
    }

    fn api(&self, path: &str) -> String {
        format!("{}/bigquery/v2/projects/{}{path}", self.api_url, self.project)
    }

    fn table_ref(&self, dataset: &str, table: &str) -> String {
        format!("`{}.{dataset}.{table}`", self.project)
    }

    // ========================================================================
    // Datasets and tables
    // ========================================================================

    async fn create_dataset(&self, dataset: &str) -> Result<()> {
        let body = json!({
            "datasetReference": {"projectId": self.project, "datasetId": dataset},
            "location": self.location,
        });
        let response = self
            .client
            .send(Method::POST, &self.api("/datasets"), RequestConfig::new().json(body))
            .await?;

        match response.status() {
            s if s.is_success() => {
                info!(dataset = %dataset, "Created BigQuery dataset");
                Ok(())
            }
            StatusCode::CONFLICT => Ok(()),
            s => Err(Error::destination(
                "bigquery",
                format!(
                    "Creating dataset {dataset} failed with HTTP {}: {}",
                    s.as_u16(),
                    response.text().await.unwrap_or_default()
                ),
            )),
        }
    }

    /// Table resource, or `None` if the table does not exist
    async fn get_table(&self, dataset: &str, table: &str) -> Result<Option<Value>> {
        let url = self.api(&format!("/datasets/{dataset}/tables/{table}"));
        let response = self.client.send(Method::GET, &url, RequestConfig::new()).await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            s if s.is_success() => Ok(Some(response.json().await?)),
            s => Err(Error::destination(
                "bigquery",
                format!(
                    "Reading table {dataset}.{table} failed with HTTP {}: {}",
                    s.as_u16(),
                    response.text().await.unwrap_or_default()
                ),
            )),
        }
    }

    // ========================================================================
    // Jobs
    // ========================================================================

    /// Upload one file as a load job and wait for it
    async fn load_file(
        &self,
        dataset: &str,
        table: &str,
        format: FileFormat,
        data: Vec<u8>,
        truncate: bool,
    ) -> Result<()> {
        let mut load = json!({
            "destinationTable": {
                "projectId": self.project,
                "datasetId": dataset,
                "tableId": table,
            },
            "sourceFormat": match format {
                FileFormat::Parquet => "PARQUET",
                FileFormat::Jsonl => "NEWLINE_DELIMITED_JSON",
            },
            "autodetect": true,
            "createDisposition": "CREATE_IF_NEEDED",
            "writeDisposition": if truncate { "WRITE_TRUNCATE" } else { "WRITE_APPEND" },
        });
        if !truncate {
            load["schemaUpdateOptions"] = json!(["ALLOW_FIELD_ADDITION"]);
        }
        let job = json!({
            "configuration": {"load": load},
            "jobReference": {"projectId": self.project, "location": self.location},
        });

        let url = format!(
            "{}/upload/bigquery/v2/projects/{}/jobs",
            self.api_url, self.project
        );
        let request = RequestConfig::new()
            .query("uploadType", "multipart")
            .raw(
                format!("multipart/related; boundary={MULTIPART_BOUNDARY}"),
                multipart_body(&job, &data)?,
            );

        let response: Value = self.client.request_json(Method::POST, &url, request).await?;
        self.wait_for_job(&response).await
    }

    /// Run a standard SQL script as a query job and wait for it
    async fn run_query(&self, sql: &str) -> Result<()> {
        debug!(sql = %sql, "Running BigQuery query job");
        let job = json!({
            "configuration": {"query": {"query": sql, "useLegacySql": false}},
            "jobReference": {"projectId": self.project, "location": self.location},
        });
        let response: Value = self
            .client
            .post_json(&self.api("/jobs"), RequestConfig::new().json(job))
            .await?;
        self.wait_for_job(&response).await
    }

    /// Poll a job until it is `DONE`; a job error is a write failure
    async fn wait_for_job(&self, job: &Value) -> Result<()> {
        let job_id = job
            .pointer("/jobReference/jobId")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::malformed("BigQuery job response has no jobReference.jobId"))?
            .to_string();

        let mut current = job.clone();
        loop {
            if let Some(error) = current.pointer("/status/errorResult") {
                let message = error
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error");
                return Err(Error::destination(
                    "bigquery",
                    format!("Job {job_id} failed: {message}"),
                ));
            }
            if current.pointer("/status/state").and_then(Value::as_str) == Some("DONE") {
                debug!(job_id = %job_id, "BigQuery job done");
                return Ok(());
            }

            tokio::time::sleep(self.poll_interval).await;
            current = self
                .client
                .get_json(
                    &self.api(&format!("/jobs/{job_id}")),
                    RequestConfig::new().query("location", self.location.clone()),
                )
                .await?;
        }
    }

    /// Load every staged file into `dataset.table`
    async fn load_files(&self, dataset: &str, table: &StagedTable, truncate_first: bool) -> Result<()> {
        for (i, path) in table.files.iter().enumerate() {
            let data = tokio::fs::read(path).await?;
            self.load_file(dataset, &table.spec.name, table.format, data, truncate_first && i == 0)
                .await?;
        }
        Ok(())
    }

    async fn merge(&self, dataset: &str, table: &StagedTable, key: &str) -> Result<()> {
        let staging_dataset = format!("{dataset}_staging");
        self.create_dataset(&staging_dataset).await?;
        self.load_files(&staging_dataset, table, true).await?;

        let name = &table.spec.name;
        let staging = self
            .get_table(&staging_dataset, name)
            .await?
            .ok_or_else(|| Error::destination("bigquery", format!("Staging table {name} missing")))?;
        let fields = staging
            .pointer("/schema/fields")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let target = self.table_ref(dataset, name);
        let source = self.table_ref(&staging_dataset, name);
        let mut script = vec![format!("CREATE TABLE IF NOT EXISTS {target} LIKE {source};")];
        for field in &fields {
            if let (Some(column), Some(ty)) = (field.get("name").and_then(Value::as_str), column_type(field)) {
                script.push(format!(
                    "ALTER TABLE {target} ADD COLUMN IF NOT EXISTS `{column}` {ty};"
                ));
            }
        }
        let columns = fields
            .iter()
            .filter_map(|f| f.get("name").and_then(Value::as_str))
            .map(|c| format!("`{c}`"))
            .collect::<Vec<_>>()
            .join(", ");
        script.push(format!(
            "DELETE FROM {target} WHERE `{key}` IN (SELECT `{key}` FROM {source});"
        ));
        script.push(format!(
            "INSERT INTO {target} ({columns}) SELECT {columns} FROM {source} \
             QUALIFY ROW_NUMBER() OVER (PARTITION BY `{key}`) = 1;"
        ));

        self.run_query(&script.join("\n")).await
    }
}

impl std::fmt::Debug for BigQueryDestination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BigQueryDestination")
            .field("project", &self.project)
            .field("location", &self.location)
            .field("api_url", &self.api_url)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Destination for BigQueryDestination {
    fn name(&self) -> &'static str {
        "bigquery"
    }

    async fn prepare(&self, dataset: &str) -> Result<()> {
        self.create_dataset(dataset).await
    }

    async fn load_table(&self, dataset: &str, table: &StagedTable) -> Result<usize> {
        let name = &table.spec.name;

        if table.files.is_empty() {
            if table.spec.write_mode == WriteMode::Replace
                && self.get_table(dataset, name).await?.is_some()
            {
                self.run_query(&format!("TRUNCATE TABLE {}", self.table_ref(dataset, name)))
                    .await?;
            }
            return Ok(0);
        }

        match table.spec.write_mode {
            WriteMode::Append => self.load_files(dataset, table, false).await?,
            WriteMode::Replace => self.load_files(dataset, table, true).await?,
            WriteMode::Merge => {
                let key = table.spec.primary_key.as_deref().ok_or_else(|| {
                    Error::config(format!("Table '{name}' uses merge but declares no primary key"))
                })?;
                self.merge(dataset, table, key).await?;
            }
        }
        Ok(table.rows)
    }

    async fn complete_load(&self, dataset: &str, load: &LoadRecord) -> Result<()> {
        let row = json!({
            "load_id": load.load_id,
            "pipeline_name": load.pipeline_name,
            "status": load.status,
            "inserted_at": load.inserted_at.to_rfc3339(),
        });
        let mut data = serde_json::to_vec(&row)?;
        data.push(b'\n');
        self.load_file(dataset, "_loads", FileFormat::Jsonl, data, false).await
    }
}

/// `multipart/related` body: job metadata then file bytes
fn multipart_body(job: &Value, data: &[u8]) -> Result<Vec<u8>> {
    let metadata = serde_json::to_vec(job)?;
    let mut body = Vec::with_capacity(metadata.len() + data.len() + 256);
    body.extend_from_slice(
        format!("--{MULTIPART_BOUNDARY}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n")
            .as_bytes(),
    );
    body.extend_from_slice(&metadata);
    body.extend_from_slice(
        format!("\r\n--{MULTIPART_BOUNDARY}\r\nContent-Type: application/octet-stream\r\n\r\n")
            .as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{MULTIPART_BOUNDARY}--\r\n").as_bytes());
    Ok(body)
}

/// Standard SQL type of a table schema field
fn column_type(field: &Value) -> Option<String> {
    let ty = field.get("type").and_then(Value::as_str)?;
    let base = match ty {
        "STRING" => "STRING".to_string(),
        "INTEGER" | "INT64" => "INT64".to_string(),
        "FLOAT" | "FLOAT64" => "FLOAT64".to_string(),
        "BOOLEAN" | "BOOL" => "BOOL".to_string(),
        "RECORD" | "STRUCT" => {
            let members = field
                .get("fields")
                .and_then(Value::as_array)?
                .iter()
                .map(|f| {
                    let name = f.get("name").and_then(Value::as_str)?;
                    column_type(f).map(|t| format!("`{name}` {t}"))
                })
                .collect::<Option<Vec<_>>>()?;
            format!("STRUCT<{}>", members.join(", "))
        }
        other => other.to_string(),
    };

    if field.get("mode").and_then(Value::as_str) == Some("REPEATED") {
        Some(format!("ARRAY<{base}>"))
    } else {
        Some(base)
    }
}
