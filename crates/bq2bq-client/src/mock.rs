//! Mock builder and extractor for testing
//!
//! `MockClientBuilder` builds in-memory clients without touching the network.
//! It counts builds and can simulate failures and latency, which is what the
//! cache tests need to observe reuse and rebuild decisions.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use bq2bq_client::{ClientCache, MockClientBuilder};
//!
//! let builder = MockClientBuilder::new();
//! let cache = ClientCache::new(builder.clone());
//! cache.acquire(key.as_bytes()).await?;
//! assert_eq!(builder.build_count(), 1);
//!
//! // Make the next build fail
//! builder.fail_builds(true);
//! ```

use crate::builder::{ClientBuilder, ClientError, WarehouseClient};
use crate::extractor::{ExtractorConstructor, ExtractorError, TableIdentifier, UpstreamExtractor};
use bq2bq_core::ServiceAccountCredential;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// In-memory client produced by [`MockClientBuilder`]
#[derive(Debug)]
pub struct MockClient {
    /// 1-based build sequence number
    pub id: usize,

    /// Project of the credential it was built from
    pub project_id: String,

    /// Digest of the credential it was built from
    pub digest: String,

    fail_connection: bool,
}

#[async_trait::async_trait]
impl WarehouseClient for MockClient {
    fn project_id(&self) -> &str {
        &self.project_id
    }

    async fn test_connection(&self) -> Result<(), ClientError> {
        if self.fail_connection {
            Err(ClientError::NetworkError(
                "Simulated connection failure".to_string(),
            ))
        } else {
            Ok(())
        }
    }
}

/// Mock client builder for testing
///
/// Clones share their counters and switches, so a test can keep one clone
/// while the cache owns another.
#[derive(Debug, Clone, Default)]
pub struct MockClientBuilder {
    builds: Arc<AtomicUsize>,
    attempts: Arc<AtomicUsize>,
    fail_builds: Arc<AtomicBool>,
    fail_connection: bool,
    latency_ms: u64,
}

impl MockClientBuilder {
    /// Create a builder whose builds succeed immediately
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure simulated latency for every build
    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    /// Built clients fail their connection test
    pub fn with_connection_failure(mut self) -> Self {
        self.fail_connection = true;
        self
    }

    /// Toggle build failures; affects every clone
    pub fn fail_builds(&self, fail: bool) {
        self.fail_builds.store(fail, Ordering::SeqCst);
    }

    /// Number of successful builds
    pub fn build_count(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }

    /// Number of build attempts, failed ones included
    pub fn attempt_count(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    async fn simulate_latency(&self) {
        if self.latency_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.latency_ms)).await;
        }
    }
}

#[async_trait::async_trait]
impl ClientBuilder for MockClientBuilder {
    type Client = MockClient;

    fn name(&self) -> &'static str {
        "Mock"
    }

    async fn build(&self, credential: &ServiceAccountCredential) -> Result<MockClient, ClientError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;

        if self.fail_builds.load(Ordering::SeqCst) {
            return Err(ClientError::NetworkError(
                "Simulated token exchange failure".to_string(),
            ));
        }

        let id = self.builds.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(MockClient {
            id,
            project_id: credential.project_id().to_string(),
            digest: credential.digest(),
            fail_connection: self.fail_connection,
        })
    }
}

/// Extractor returning predefined upstreams per query
pub struct MockExtractor<C: ?Sized> {
    client: Arc<C>,
    upstreams: HashMap<String, Vec<TableIdentifier>>,
}

impl<C: ?Sized> MockExtractor<C> {
    /// Client the extractor was bound to
    pub fn client(&self) -> &Arc<C> {
        &self.client
    }
}

#[async_trait::async_trait]
impl<C: ?Sized + Send + Sync> UpstreamExtractor for MockExtractor<C> {
    async fn extract_upstreams(&self, query: &str) -> Result<Vec<TableIdentifier>, ExtractorError> {
        Ok(self.upstreams.get(query).cloned().unwrap_or_default())
    }
}

/// Constructor for [`MockExtractor`]s
#[derive(Debug, Clone, Default)]
pub struct MockExtractorConstructor {
    upstreams: HashMap<String, Vec<TableIdentifier>>,
    failure: Option<String>,
}

impl MockExtractorConstructor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upstreams reported for `query`
    pub fn with_upstreams(mut self, query: impl Into<String>, tables: Vec<TableIdentifier>) -> Self {
        self.upstreams.insert(query.into(), tables);
        self
    }

    /// Every construction fails with `message`
    pub fn with_failure(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }
}

impl<C: ?Sized + Send + Sync> ExtractorConstructor<C> for MockExtractorConstructor {
    type Extractor = MockExtractor<C>;

    fn construct(&self, client: Arc<C>) -> Result<MockExtractor<C>, ExtractorError> {
        if let Some(message) = &self.failure {
            return Err(ExtractorError::InitError(message.clone()));
        }

        Ok(MockExtractor {
            client,
            upstreams: self.upstreams.clone(),
        })
    }
}
