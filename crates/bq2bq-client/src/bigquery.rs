//! BigQuery client builder
//!
//! Turns a parsed service-account credential into an authenticated
//! `gcp-bigquery-client` handle. Building performs the OAuth token exchange,
//! so it is a network round trip and can fail transiently.
//!
//! Tokens are requested for the scopes recorded on the credential
//! (warehouse, storage and drive access for sheet-backed tables), not the
//! SDK's single BigQuery scope.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let builder = BigQueryClientBuilder::new();
//! let cache = ClientCache::new(builder);
//! let client = cache.acquire(service_account_json.as_bytes()).await?;
//! client.test_connection().await?;
//! ```

use crate::builder::{ClientBuilder, ClientError, WarehouseClient};
use bq2bq_core::ServiceAccountCredential;

#[cfg(feature = "bigquery")]
use gcp_bigquery_client::{
    Client as SdkClient,
    auth::Authenticator,
    error::BQError,
    model::query_request::QueryRequest,
    yup_oauth2::{self, authenticator::DefaultAuthenticator},
};
#[cfg(feature = "bigquery")]
use std::sync::Arc;

#[cfg(not(feature = "bigquery"))]
const NOT_COMPILED: &str =
    "BigQuery support not compiled. Rebuild with: cargo build --features bigquery";

/// Authenticated BigQuery client handle
pub struct BigQueryClient {
    /// Project ID
    project_id: String,

    /// BigQuery client (only available with bigquery feature)
    #[cfg(feature = "bigquery")]
    client: SdkClient,
}

impl BigQueryClient {
    /// Underlying SDK client, for collaborators issuing their own requests
    #[cfg(feature = "bigquery")]
    pub fn sdk(&self) -> &SdkClient {
        &self.client
    }
}

impl std::fmt::Debug for BigQueryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BigQueryClient")
            .field("project_id", &self.project_id)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl WarehouseClient for BigQueryClient {
    fn project_id(&self) -> &str {
        &self.project_id
    }

    #[cfg(feature = "bigquery")]
    async fn test_connection(&self) -> Result<(), ClientError> {
        let request = QueryRequest::new("SELECT 1".to_string());

        self.client
            .job()
            .query(&self.project_id, request)
            .await
            .map_err(|e| classify_query_error(e.to_string()))?;

        Ok(())
    }

    #[cfg(not(feature = "bigquery"))]
    async fn test_connection(&self) -> Result<(), ClientError> {
        Err(ClientError::ConfigError(NOT_COMPILED.to_string()))
    }
}

/// Builds [`BigQueryClient`]s from service-account credentials
#[derive(Debug, Clone, Default)]
pub struct BigQueryClientBuilder {
    _private: (),
}

impl BigQueryClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl ClientBuilder for BigQueryClientBuilder {
    type Client = BigQueryClient;

    fn name(&self) -> &'static str {
        "BigQuery"
    }

    #[cfg(feature = "bigquery")]
    async fn build(&self, credential: &ServiceAccountCredential) -> Result<BigQueryClient, ClientError> {
        // The SDK wants its own key type; the fingerprint is the original JSON.
        let sa_key: yup_oauth2::ServiceAccountKey =
            serde_json::from_slice(credential.fingerprint())
                .map_err(|e| ClientError::ConfigError(format!(
                    "Failed to parse service account JSON: {}",
                    e
                )))?;

        let tokens = yup_oauth2::ServiceAccountAuthenticator::builder(sa_key)
            .build()
            .await
            .map_err(|e| ClientError::ConfigError(format!(
                "Failed to set up authenticator for {}: {}",
                credential.client_email(),
                e
            )))?;
        let auth = ScopedAuthenticator::new(tokens, credential);

        // Exchange once up front so a bad key fails here, not on first query
        auth.access_token()
            .await
            .map_err(|e| ClientError::AuthenticationError(format!(
                "Failed to authenticate as {}: {}",
                credential.client_email(),
                e
            )))?;

        let client = SdkClient::from_authenticator(Arc::new(auth))
            .await
            .map_err(|e| ClientError::NetworkError(format!(
                "Failed to create BigQuery client: {}",
                e
            )))?;

        Ok(BigQueryClient {
            project_id: credential.project_id().to_string(),
            client,
        })
    }

    #[cfg(not(feature = "bigquery"))]
    async fn build(&self, credential: &ServiceAccountCredential) -> Result<BigQueryClient, ClientError> {
        let _ = credential;
        Err(ClientError::ConfigError(NOT_COMPILED.to_string()))
    }
}

/// Source of OAuth access tokens for an explicit scope list
#[cfg(feature = "bigquery")]
#[async_trait::async_trait]
trait TokenSource: Clone + Send + Sync + 'static {
    async fn fetch(&self, scopes: &[String]) -> Result<String, BQError>;
}

#[cfg(feature = "bigquery")]
#[async_trait::async_trait]
impl TokenSource for DefaultAuthenticator {
    async fn fetch(&self, scopes: &[String]) -> Result<String, BQError> {
        let token = self.token(scopes).await?;
        token.token().map(str::to_string).ok_or(BQError::NoToken)
    }
}

/// SDK authenticator requesting the credential's scopes on every exchange
#[cfg(feature = "bigquery")]
#[derive(Clone)]
struct ScopedAuthenticator<T> {
    tokens: T,
    scopes: Vec<String>,
}

#[cfg(feature = "bigquery")]
impl<T: TokenSource> ScopedAuthenticator<T> {
    fn new(tokens: T, credential: &ServiceAccountCredential) -> Self {
        Self {
            tokens,
            scopes: credential.scopes().to_vec(),
        }
    }
}

#[cfg(feature = "bigquery")]
#[async_trait::async_trait]
impl<T: TokenSource> Authenticator for ScopedAuthenticator<T> {
    async fn access_token(&self) -> Result<String, BQError> {
        self.tokens.fetch(&self.scopes).await
    }
}

/// Map an SDK error message onto the client error taxonomy
#[cfg_attr(not(feature = "bigquery"), allow(dead_code))]
fn classify_query_error(message: String) -> ClientError {
    if message.contains("Access Denied") || message.contains("Permission") {
        ClientError::PermissionDenied(message)
    } else if message.contains("timed out") || message.contains("connection") {
        ClientError::NetworkError(message)
    } else {
        ClientError::QueryError(message)
    }
}
