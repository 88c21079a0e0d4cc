//! Upstream dependency extractors
//!
//! How upstream table references are found in a query is the extractor's
//! business. This module only defines the seam and the factory that binds an
//! extractor to an acquired client.

use crate::error::FactoryError;
use std::fmt;
use std::sync::Arc;

/// Identifies a table in the warehouse
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableIdentifier {
    /// Project name
    pub project: String,

    /// Dataset name
    pub dataset: String,

    /// Table name
    pub table: String,
}

impl TableIdentifier {
    /// Create a new table identifier
    pub fn new(project: impl Into<String>, dataset: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            dataset: dataset.into(),
            table: table.into(),
        }
    }

    /// Get fully qualified name
    pub fn fqn(&self) -> String {
        format!("{}.{}.{}", self.project, self.dataset, self.table)
    }
}

impl fmt::Display for TableIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.fqn())
    }
}

/// Errors raised by extractor collaborators
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractorError {
    #[error("Initialization failed: {0}")]
    InitError(String),

    #[error("Extraction failed: {0}")]
    ExtractionError(String),
}

/// Finds the tables a query reads from
#[async_trait::async_trait]
pub trait UpstreamExtractor: Send + Sync {
    async fn extract_upstreams(&self, query: &str) -> Result<Vec<TableIdentifier>, ExtractorError>;
}

/// Constructs an extractor bound to a client handle
pub trait ExtractorConstructor<C: ?Sized>: Send + Sync {
    type Extractor: UpstreamExtractor;

    fn construct(&self, client: Arc<C>) -> Result<Self::Extractor, ExtractorError>;
}

/// Produces extractors from client handles
///
/// Pure delegation: the handle goes to the constructor unchanged and a
/// failure comes back as [`FactoryError::ExtractorInit`].
#[derive(Debug, Clone, Default)]
pub struct ExtractorFactory<K> {
    constructor: K,
}

impl<K> ExtractorFactory<K> {
    pub fn new(constructor: K) -> Self {
        Self { constructor }
    }

    pub fn constructor(&self) -> &K {
        &self.constructor
    }

    /// Create an extractor bound to `client`
    pub fn new_extractor<C>(&self, client: Arc<C>) -> Result<K::Extractor, FactoryError>
    where
        C: ?Sized,
        K: ExtractorConstructor<C>,
    {
        self.constructor
            .construct(client)
            .map_err(FactoryError::ExtractorInit)
    }
}
