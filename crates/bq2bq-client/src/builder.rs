//! Warehouse client seam: the handle type and the builder that makes one

use bq2bq_core::ServiceAccountCredential;

/// Errors raised by a warehouse client or while building one
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Query failed: {0}")]
    QueryError(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl ClientError {
    /// Whether the same call may succeed when repeated unchanged
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::AuthenticationError(_) | Self::NetworkError(_))
    }
}

/// An authenticated warehouse client handle
///
/// Handles are shared: the same handle may be in use by several callers at
/// once, so implementations only expose `&self` operations.
#[async_trait::async_trait]
pub trait WarehouseClient: Send + Sync + 'static {
    /// Project the client bills queries to
    fn project_id(&self) -> &str;

    /// Run a trivial query to check the handle is usable
    async fn test_connection(&self) -> Result<(), ClientError>;
}

/// Builds authenticated clients from parsed credentials
///
/// Building usually involves a token exchange over the network and is the
/// expensive step [`crate::ClientCache`] amortizes.
#[async_trait::async_trait]
pub trait ClientBuilder: Send + Sync {
    type Client: WarehouseClient;

    /// Get the builder name (e.g., "BigQuery")
    fn name(&self) -> &'static str;

    /// Build a client for the credential's project
    async fn build(&self, credential: &ServiceAccountCredential) -> Result<Self::Client, ClientError>;
}
