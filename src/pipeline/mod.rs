//! Pipeline module
//!
//! Runs a source's resources one after another into a destination.
//!
//! # Overview
//!
//! A run creates one load package, drains each resource through a
//! `RowSink` and loads the table before moving on, so a failure in a later
//! resource leaves earlier tables loaded. The package is marked `loaded`
//! and removed on success, or marked `failed` and kept for inspection.

mod types;

pub use types::{RunOptions, RunResult, TableLoadInfo};

use crate::destination::{Destination, LoadRecord};
use crate::error::Result;
use crate::extract::BatchSource;
use crate::package::{LoadPackage, PackageStatus};
use crate::resource::Source;
use crate::sink::{RowSink, TableSpec};
use crate::types::FileFormat;
use chrono::Utc;
use std::path::PathBuf;
use tracing::{error, info, warn};

/// A named pipeline bound to a dataset and a destination
pub struct Pipeline {
    name: String,
    dataset_name: String,
    destination: Box<dyn Destination>,
    pipelines_dir: PathBuf,
    file_format: FileFormat,
    keep_packages: bool,
}

impl Pipeline {
    /// Create a pipeline with default package settings
    pub fn new(
        name: impl Into<String>,
        dataset_name: impl Into<String>,
        destination: Box<dyn Destination>,
    ) -> Self {
        Self {
            name: name.into(),
            dataset_name: dataset_name.into(),
            destination,
            pipelines_dir: PathBuf::from(".apiload"),
            file_format: FileFormat::default(),
            keep_packages: false,
        }
    }

    /// Root directory for load packages
    #[must_use]
    pub fn with_pipelines_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.pipelines_dir = dir.into();
        self
    }

    /// Format of staged files
    #[must_use]
    pub fn with_file_format(mut self, format: FileFormat) -> Self {
        self.file_format = format;
        self
    }

    /// Keep the load package after a successful load
    #[must_use]
    pub fn with_keep_packages(mut self, keep: bool) -> Self {
        self.keep_packages = keep;
        self
    }

    /// Pipeline name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Dataset name
    pub fn dataset_name(&self) -> &str {
        &self.dataset_name
    }

    /// The destination
    pub fn destination(&self) -> &dyn Destination {
        self.destination.as_ref()
    }

    /// Extract every resource of `source` and load it
    pub async fn run(&self, source: Source, options: RunOptions) -> Result<RunResult> {
        let started_at = Utc::now();
        info!(
            pipeline = %self.name,
            source = %source.name(),
            dataset = %self.dataset_name,
            destination = self.destination.name(),
            resources = ?source.resource_names(),
            partition_key = ?options.partition_key,
            "Starting pipeline run"
        );

        self.destination.prepare(&self.dataset_name).await?;
        let mut package = LoadPackage::create(
            &self.pipelines_dir,
            &self.name,
            &self.dataset_name,
            self.file_format,
        )?;

        let tables = match self.load_resources(source, &mut package).await {
            Ok(tables) => tables,
            Err(e) => {
                error!(pipeline = %self.name, load_id = %package.load_id(), error = %e, "Pipeline run failed");
                if let Err(mark) = package.mark(PackageStatus::Failed) {
                    warn!(error = %mark, "Could not mark load package as failed");
                }
                return Err(e);
            }
        };

        let load_id = package.load_id().to_string();
        self.destination
            .complete_load(&self.dataset_name, &LoadRecord::completed(&load_id, &self.name))
            .await?;
        package.mark(PackageStatus::Loaded)?;

        if self.keep_packages {
            info!(path = %package.path().display(), "Keeping load package");
        } else {
            package.remove()?;
        }

        let result = RunResult {
            pipeline_name: self.name.clone(),
            destination: self.destination.name().to_string(),
            dataset_name: self.dataset_name.clone(),
            load_ids: vec![load_id],
            partition_key: options.partition_key,
            tables,
            started_at,
            finished_at: Utc::now(),
        };
        info!(
            pipeline = %self.name,
            rows = result.total_rows(),
            tables = result.tables.len(),
            "Pipeline run completed"
        );
        Ok(result)
    }

    async fn load_resources(
        &self,
        source: Source,
        package: &mut LoadPackage,
    ) -> Result<Vec<TableLoadInfo>> {
        let mut tables = Vec::with_capacity(source.len());

        for mut resource in source.into_resources() {
            let spec = TableSpec::new(resource.name(), resource.write_mode(), resource.primary_key());
            let mut sink = RowSink::new(&spec, package)?;

            info!(resource = %resource.name(), write_mode = %spec.write_mode, "Extracting resource");
            while let Some(batch) = resource.next_batch().await? {
                sink.write(batch)?;
            }

            let staged = sink.load(self.destination.as_ref(), &self.dataset_name).await?;
            let progress = resource.progress();
            tables.push(TableLoadInfo {
                table: staged.spec.name,
                write_mode: staged.spec.write_mode,
                rows: staged.rows,
                pages: progress.pages,
                stop_reason: progress.state.stop_reason(),
            });
        }

        Ok(tables)
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("dataset_name", &self.dataset_name)
            .field("destination", &self.destination.name())
            .field("pipelines_dir", &self.pipelines_dir)
            .field("file_format", &self.file_format)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests;
