//! Warehouse client and upstream extractor factories
//!
//! [`ClientCache`] hands out authenticated warehouse clients for raw
//! service-account JSON, reusing the last built client under a fixed reuse
//! policy. [`ExtractorFactory`] binds an upstream extractor to such a client.
//!
//! ## Features
//!
//! - `bigquery` - build real BigQuery clients with `gcp-bigquery-client`
//!
//! ## Example
//!
//! ```rust,ignore
//! use bq2bq_client::{BigQueryClientBuilder, ClientCache, ExtractorFactory};
//!
//! let cache = ClientCache::new(BigQueryClientBuilder::new());
//! let client = cache.acquire(service_account_json.as_bytes()).await?;
//!
//! let extractors = ExtractorFactory::new(my_constructor);
//! let extractor = extractors.new_extractor(client)?;
//! ```

pub mod builder;
pub mod bigquery;
pub mod cache;
pub mod error;
pub mod extractor;
pub mod mock;

pub use builder::{ClientBuilder, ClientError, WarehouseClient};
pub use bigquery::{BigQueryClient, BigQueryClientBuilder};
pub use cache::{CacheSnapshot, ClientCache};
pub use error::FactoryError;
pub use extractor::{
    ExtractorConstructor, ExtractorError, ExtractorFactory, TableIdentifier, UpstreamExtractor,
};
pub use mock::{MockClient, MockClientBuilder, MockExtractor, MockExtractorConstructor};
