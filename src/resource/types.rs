//! Resource and source types

use crate::error::{Error, Result};
use crate::extract::{
    BatchSource, DetailDriver, ExtractProgress, PaginationDriver, RecordFilter, RecordTransform,
};
use crate::types::{Record, RecordBatch, WriteMode};
use async_trait::async_trait;
use std::sync::Arc;

// ============================================================================
// Extractor
// ============================================================================

/// The driver behind a resource
pub enum Extractor {
    /// Cursor-driven pages
    Paginated(PaginationDriver),
    /// Id list, then one request per id
    Detail(DetailDriver),
}

impl Extractor {
    fn with_filter(self, filter: RecordFilter) -> Self {
        match self {
            Self::Paginated(driver) => Self::Paginated(driver.with_filter(Some(filter))),
            Self::Detail(driver) => Self::Detail(driver.with_filter(Some(filter))),
        }
    }

    fn with_transform(self, transform: RecordTransform) -> Self {
        match self {
            Self::Paginated(driver) => Self::Paginated(driver.with_transform(Some(transform))),
            Self::Detail(driver) => Self::Detail(driver.with_transform(Some(transform))),
        }
    }
}

impl From<PaginationDriver> for Extractor {
    fn from(driver: PaginationDriver) -> Self {
        Self::Paginated(driver)
    }
}

impl From<DetailDriver> for Extractor {
    fn from(driver: DetailDriver) -> Self {
        Self::Detail(driver)
    }
}

#[async_trait]
impl BatchSource for Extractor {
    async fn next_batch(&mut self) -> Result<Option<RecordBatch>> {
        match self {
            Self::Paginated(driver) => driver.next_batch().await,
            Self::Detail(driver) => driver.next_batch().await,
        }
    }

    fn progress(&self) -> ExtractProgress {
        match self {
            Self::Paginated(driver) => driver.progress(),
            Self::Detail(driver) => driver.progress(),
        }
    }
}

// ============================================================================
// Resource
// ============================================================================

/// One destination table and the extractor that feeds it
pub struct Resource {
    name: String,
    write_mode: WriteMode,
    primary_key: Option<String>,
    extractor: Extractor,
}

impl Resource {
    /// Create an append resource without a primary key
    pub fn new(name: impl Into<String>, extractor: impl Into<Extractor>) -> Self {
        Self {
            name: name.into(),
            write_mode: WriteMode::default(),
            primary_key: None,
            extractor: extractor.into(),
        }
    }

    /// Set the write mode
    #[must_use]
    pub fn with_write_mode(mut self, mode: WriteMode) -> Self {
        self.write_mode = mode;
        self
    }

    /// Set the primary key column
    #[must_use]
    pub fn with_primary_key(mut self, key: impl Into<String>) -> Self {
        self.primary_key = Some(key.into());
        self
    }

    /// Keep only records the predicate accepts
    #[must_use]
    pub fn with_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&Record) -> bool + Send + Sync + 'static,
    {
        self.extractor = self.extractor.with_filter(Arc::new(filter));
        self
    }

    /// Reshape each record; `Ok(None)` drops it
    #[must_use]
    pub fn with_transform<F>(mut self, transform: F) -> Self
    where
        F: Fn(Record) -> Result<Option<Record>> + Send + Sync + 'static,
    {
        self.extractor = self.extractor.with_transform(Arc::new(transform));
        self
    }

    /// Table name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Write mode for the whole run
    pub fn write_mode(&self) -> WriteMode {
        self.write_mode
    }

    /// Primary key column, if any
    pub fn primary_key(&self) -> Option<&str> {
        self.primary_key.as_deref()
    }

    /// Mutable access to the extractor
    pub fn extractor_mut(&mut self) -> &mut Extractor {
        &mut self.extractor
    }
}

impl std::fmt::Debug for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resource")
            .field("name", &self.name)
            .field("write_mode", &self.write_mode)
            .field("primary_key", &self.primary_key)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl BatchSource for Resource {
    async fn next_batch(&mut self) -> Result<Option<RecordBatch>> {
        self.extractor.next_batch().await
    }

    fn progress(&self) -> ExtractProgress {
        self.extractor.progress()
    }
}

// ============================================================================
// Source
// ============================================================================

/// Ordered set of resources loaded by one pipeline
#[derive(Debug)]
pub struct Source {
    name: String,
    resources: Vec<Resource>,
}

impl Source {
    /// Create a source
    pub fn new(name: impl Into<String>, resources: Vec<Resource>) -> Self {
        Self {
            name: name.into(),
            resources,
        }
    }

    /// Source name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resource names in load order
    pub fn resource_names(&self) -> Vec<&str> {
        self.resources.iter().map(Resource::name).collect()
    }

    /// Keep only the named resources, in source order
    ///
    /// Naming a resource the source does not define is a config error.
    pub fn with_resources(mut self, names: &[&str]) -> Result<Self> {
        if let Some(unknown) = names
            .iter()
            .find(|name| !self.resources.iter().any(|r| r.name() == **name))
        {
            return Err(Error::config(format!(
                "Source '{}' has no resource '{unknown}' (available: {})",
                self.name,
                self.resource_names().join(", ")
            )));
        }

        self.resources.retain(|r| names.contains(&r.name()));
        Ok(self)
    }

    /// Set the write mode on every resource
    ///
    /// Merge needs a primary key on each resource.
    pub fn with_write_mode(mut self, mode: WriteMode) -> Result<Self> {
        if mode == WriteMode::Merge {
            if let Some(resource) = self.resources.iter().find(|r| r.primary_key().is_none()) {
                return Err(Error::config(format!(
                    "Resource '{}' cannot merge without a primary key",
                    resource.name()
                )));
            }
        }

        for resource in &mut self.resources {
            resource.write_mode = mode;
        }
        Ok(self)
    }

    /// Number of resources
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// True if no resources are selected
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Consume the source, yielding its resources
    pub fn into_resources(self) -> Vec<Resource> {
        self.resources
    }
}
