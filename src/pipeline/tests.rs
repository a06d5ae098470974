//! Tests for the pipeline module

use super::*;
use crate::decode::JsonDecoder;
use crate::destination::DuckDbDestination;
use crate::error::Error;
use crate::extract::{Endpoint, PageFetcher, PageLimits, PaginationDriver, StopReason};
use crate::http::HttpClient;
use crate::package::LoadPackage;
use crate::pagination::{LinkHeaderPaginator, NoPaginator};
use crate::resource::Resource;
use crate::sink::StagedTable;
use crate::types::WriteMode;
use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::path::Path;
use std::sync::{Arc, Mutex};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Records what the pipeline asked of it
#[derive(Default, Clone)]
struct RecordingDestination {
    calls: Arc<Mutex<Vec<String>>>,
}

impl RecordingDestination {
    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Destination for RecordingDestination {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn prepare(&self, dataset: &str) -> Result<()> {
        self.calls.lock().unwrap().push(format!("prepare {dataset}"));
        Ok(())
    }

    async fn load_table(&self, dataset: &str, table: &StagedTable) -> Result<usize> {
        self.calls.lock().unwrap().push(format!(
            "load {dataset}.{} {} rows {} files",
            table.spec.name,
            table.rows,
            table.files.len()
        ));
        Ok(table.rows)
    }

    async fn complete_load(&self, dataset: &str, load: &LoadRecord) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("complete {dataset} {}", load.status));
        Ok(())
    }
}

fn resource(server: &MockServer, name: &str, limits: PageLimits) -> Resource {
    let fetcher = PageFetcher::new(
        Arc::new(HttpClient::new().unwrap()),
        Endpoint::new(server.uri(), format!("/{name}")),
        Box::new(NoPaginator),
        Box::new(JsonDecoder::with_path("data")),
    )
    .unwrap();
    Resource::new(name, PaginationDriver::new(name, fetcher, limits))
}

async fn mount(server: &MockServer, route: &str, status: u16, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(status).set_body_json(body))
        .mount(server)
        .await;
}

fn package_dirs(pipelines_dir: &Path, pipeline: &str) -> Vec<std::path::PathBuf> {
    let load_dir = pipelines_dir.join(pipeline).join("load");
    match std::fs::read_dir(load_dir) {
        Ok(entries) => entries.map(|e| e.unwrap().path()).collect(),
        Err(_) => Vec::new(),
    }
}

#[tokio::test]
async fn test_run_loads_resources_in_order() {
    let server = MockServer::start().await;
    mount(&server, "/issues", 200, json!({"data": [{"id": 1}, {"id": 2}]})).await;
    mount(&server, "/commits", 200, json!({"data": [{"sha": "a"}]})).await;

    let dir = tempfile::tempdir().unwrap();
    let dest = RecordingDestination::default();
    let pipeline = Pipeline::new("test_pipeline", "data", Box::new(dest.clone()))
        .with_pipelines_dir(dir.path());

    let source = Source::new(
        "test",
        vec![
            resource(&server, "issues", PageLimits::none())
                .with_write_mode(WriteMode::Merge)
                .with_primary_key("id"),
            resource(&server, "commits", PageLimits::none()),
        ],
    );

    let result = pipeline
        .run(source, RunOptions::default().with_partition_key(Some("2024-01".into())))
        .await
        .unwrap();

    assert_eq!(
        dest.calls(),
        vec![
            "prepare data",
            "load data.issues 2 rows 1 files",
            "load data.commits 1 rows 1 files",
            "complete data completed",
        ]
    );
    assert_eq!(result.total_rows(), 3);
    assert_eq!(result.load_ids.len(), 1);
    assert_eq!(result.partition_key.as_deref(), Some("2024-01"));

    let issues = result.table("issues").unwrap();
    assert_eq!(issues.write_mode, WriteMode::Merge);
    assert_eq!(issues.pages, 1);
    assert_eq!(issues.stop_reason, Some(StopReason::Exhausted));

    // Completed packages are removed
    assert!(package_dirs(dir.path(), "test_pipeline").is_empty());

    let summary = result.to_string();
    assert!(summary.contains("3 rows into recording dataset data (partition 2024-01)"));
    assert!(summary.contains("issues (merge, 2 rows, 1 pages, exhausted)"));
}

#[tokio::test]
async fn test_failed_resource_keeps_earlier_tables() {
    let server = MockServer::start().await;
    mount(&server, "/customers", 200, json!({"data": [{"id": "cus_1"}]})).await;
    mount(&server, "/payments", 401, json!({"error": "invalid key"})).await;

    let dir = tempfile::tempdir().unwrap();
    let dest = RecordingDestination::default();
    let pipeline = Pipeline::new("stripe", "stripe_data", Box::new(dest.clone()))
        .with_pipelines_dir(dir.path());

    let source = Source::new(
        "stripe",
        vec![
            resource(&server, "customers", PageLimits::none()),
            resource(&server, "payments", PageLimits::none()),
        ],
    );

    let err = pipeline.run(source, RunOptions::default()).await.unwrap_err();
    assert_eq!(err.status(), Some(401));

    let calls = dest.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[1], "load stripe_data.customers 1 rows 1 files");

    let packages = package_dirs(dir.path(), "stripe");
    assert_eq!(packages.len(), 1);
    let manifest = LoadPackage::read_manifest(&packages[0]).unwrap();
    assert_eq!(manifest.status, crate::package::PackageStatus::Failed);
}

#[tokio::test]
async fn test_missing_primary_key_aborts_run() {
    let server = MockServer::start().await;
    mount(&server, "/issues", 200, json!({"data": [{"id": 1}, {"title": "no id"}]})).await;

    let dir = tempfile::tempdir().unwrap();
    let pipeline = Pipeline::new("gh", "data", Box::new(RecordingDestination::default()))
        .with_pipelines_dir(dir.path());
    let source = Source::new(
        "gh",
        vec![resource(&server, "issues", PageLimits::none())
            .with_write_mode(WriteMode::Merge)
            .with_primary_key("id")],
    );

    let err = pipeline.run(source, RunOptions::default()).await.unwrap_err();
    assert!(matches!(err, Error::MissingPrimaryKey { ref key, .. } if key == "id"));
}

#[tokio::test]
async fn test_keep_packages() {
    let server = MockServer::start().await;
    mount(&server, "/jokes", 200, json!({"data": [{"id": 7}]})).await;

    let dir = tempfile::tempdir().unwrap();
    let pipeline = Pipeline::new("jokes", "jokes_data", Box::new(RecordingDestination::default()))
        .with_pipelines_dir(dir.path())
        .with_file_format(crate::types::FileFormat::Jsonl)
        .with_keep_packages(true);
    let source = Source::new("jokes", vec![resource(&server, "jokes", PageLimits::none())]);

    let result = pipeline.run(source, RunOptions::default()).await.unwrap();

    let packages = package_dirs(dir.path(), "jokes");
    assert_eq!(packages.len(), 1);
    let manifest = LoadPackage::read_manifest(&packages[0]).unwrap();
    assert_eq!(manifest.status, crate::package::PackageStatus::Loaded);
    assert_eq!(manifest.load_id, result.load_ids[0]);
    assert!(packages[0].join("jokes.00000.jsonl").exists());
}

#[tokio::test]
async fn test_truncated_commits_into_duckdb() {
    let server = MockServer::start().await;
    let base = server.uri();
    for page in 1..=3u32 {
        let mock = Mock::given(method("GET")).and(path("/commits"));
        let mock = if page == 1 {
            mock.and(query_param("per_page", "100"))
        } else {
            mock.and(query_param("page", page.to_string()))
        };
        mock.respond_with(
            ResponseTemplate::new(200)
                .insert_header(
                    "link",
                    format!("<{base}/commits?page={}>; rel=\"next\"", page + 1).as_str(),
                )
                .set_body_json(json!([{"sha": format!("s{page}")}])),
        )
        .mount(&server)
        .await;
    }

    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("github.duckdb");
    let pipeline = Pipeline::new(
        "github",
        "github_data",
        Box::new(DuckDbDestination::open(&db_path).unwrap()),
    )
    .with_pipelines_dir(dir.path().join("packages"));

    let fetcher = PageFetcher::new(
        Arc::new(HttpClient::new().unwrap()),
        Endpoint::new(server.uri(), "/commits").with_param("per_page", 100),
        Box::new(LinkHeaderPaginator::default()),
        Box::new(JsonDecoder::new()),
    )
    .unwrap();
    let commits = Resource::new(
        "dlt_commits",
        PaginationDriver::new("dlt_commits", fetcher, PageLimits::none().with_max_pages(Some(2))),
    )
    .with_primary_key("sha");

    let result = pipeline
        .run(Source::new("github", vec![commits]), RunOptions::default())
        .await
        .unwrap();
    let info = result.table("dlt_commits").unwrap();
    assert_eq!(info.pages, 2);
    assert_eq!(info.stop_reason, Some(StopReason::Truncated));
    drop(pipeline);

    let db = DuckDbDestination::open(&db_path).unwrap();
    assert_eq!(db.row_count("github_data", "dlt_commits").unwrap(), 2);
    assert_eq!(db.row_count("github_data", "_loads").unwrap(), 1);
}
