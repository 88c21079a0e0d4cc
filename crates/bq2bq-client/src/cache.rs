//! Credential-aware client cache
//!
//! Holds at most one built client together with the credential it was built
//! from and a count of how often it has been handed out. A call either gets
//! the cached client back or pays for a fresh build, which then replaces the
//! cached entry.
//!
//! ## Locking
//!
//! One async mutex guards the whole decision: parsing, the reuse check, the
//! build and the write all happen while it is held. A slow build therefore
//! stalls every other caller, including those that would have been served
//! from the cache. Builds carry no timeout of their own; callers that need
//! one wrap `acquire` in `tokio::time::timeout`. Dropping the future releases
//! the lock and leaves the entry as it was, since the entry is only written
//! after a build succeeds.

use crate::builder::ClientBuilder;
use crate::error::FactoryError;
use bq2bq_core::{ClientConfig, ServiceAccountCredential};
use std::sync::Arc;
use tokio::sync::Mutex;

/// The single cached slot
struct CachedEntry<C> {
    credential: ServiceAccountCredential,
    client: Arc<C>,
    times_used: usize,
}

/// Point-in-time view of the cached entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSnapshot {
    /// Project of the cached credential
    pub project_id: String,

    /// SHA-256 of the cached credential payload
    pub digest: String,

    /// Hand-outs since the client was built
    pub times_used: usize,
}

/// Caches one warehouse client per credential payload
pub struct ClientCache<B: ClientBuilder> {
    builder: B,
    max_reuse: usize,
    scopes: Vec<String>,
    entry: Mutex<Option<CachedEntry<B::Client>>>,
}

impl<B: ClientBuilder> ClientCache<B> {
    /// Create an empty cache with the default reuse ceiling and scopes
    pub fn new(builder: B) -> Self {
        Self::with_config(builder, &ClientConfig::default())
    }

    /// Create an empty cache from configuration
    pub fn with_config(builder: B, config: &ClientConfig) -> Self {
        Self {
            builder,
            max_reuse: config.max_reuse,
            scopes: config.scopes.clone(),
            entry: Mutex::new(None),
        }
    }

    /// Override the reuse ceiling
    ///
    /// Unlike [`ClientConfig::validate`],
    /// this accepts 0. A stored entry always has a counter of at least 1, so
    /// a ceiling of 0 never matches and every call rebuilds.
    pub fn with_max_reuse(mut self, max_reuse: usize) -> Self {
        self.max_reuse = max_reuse;
        self
    }

    pub fn max_reuse(&self) -> usize {
        self.max_reuse
    }

    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    pub fn builder(&self) -> &B {
        &self.builder
    }

    /// Get a client for the given raw service-account JSON
    ///
    /// Returns the cached handle when it is eligible for reuse, otherwise
    /// builds a new client and caches it with a reuse count of 1. On error
    /// the cached entry is left untouched.
    pub async fn acquire(&self, raw_credential: &[u8]) -> Result<Arc<B::Client>, FactoryError> {
        let mut entry = self.entry.lock().await;

        let credential = ServiceAccountCredential::from_json(raw_credential, self.scopes.as_slice())
            .map_err(FactoryError::Credential)?;

        if let Some(cached) = entry.as_mut() {
            // NOTE: reuse only triggers when the count sits exactly at the
            // ceiling. A matching credential below the ceiling still rebuilds,
            // and a rebuild resets the count to 1, so with a ceiling above 1
            // the cached client is never reused in practice. This looks like it
            // was meant to be `times_used < max_reuse`; kept as is because
            // callers rely on the current behaviour.
            if cached.times_used == self.max_reuse
                && cached.credential.same_fingerprint(&credential)
            {
                cached.times_used += 1;
                tracing::debug!(
                    project_id = cached.credential.project_id(),
                    times_used = cached.times_used,
                    "reusing cached client"
                );
                return Ok(Arc::clone(&cached.client));
            }
        }

        let client = self
            .builder
            .build(&credential)
            .await
            .map_err(FactoryError::ClientConstruction)?;
        let client = Arc::new(client);

        tracing::info!(
            builder = self.builder.name(),
            project_id = credential.project_id(),
            digest = %credential.digest(),
            replaced = entry.is_some(),
            "built new client"
        );

        *entry = Some(CachedEntry {
            credential,
            client: Arc::clone(&client),
            times_used: 1,
        });

        Ok(client)
    }

    /// Describe the cached entry, if any
    pub async fn snapshot(&self) -> Option<CacheSnapshot> {
        self.entry.lock().await.as_ref().map(|cached| CacheSnapshot {
            project_id: cached.credential.project_id().to_string(),
            digest: cached.credential.digest(),
            times_used: cached.times_used,
        })
    }

    /// The cached client handle, if any
    pub async fn cached_client(&self) -> Option<Arc<B::Client>> {
        self.entry
            .lock()
            .await
            .as_ref()
            .map(|cached| Arc::clone(&cached.client))
    }

    /// Drop the cached entry; the next call builds
    pub async fn clear(&self) {
        self.entry.lock().await.take();
    }
}

impl<B: ClientBuilder + Default> Default for ClientCache<B> {
    fn default() -> Self {
        Self::new(B::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockClient, MockClientBuilder};
    use bq2bq_core::DEFAULT_MAX_REUSE;
    use pretty_assertions::assert_eq;

    fn key(project: &str) -> Vec<u8> {
        format!(
            r#"{{"type":"service_account","project_id":"{project}","client_email":"etl@{project}.iam.gserviceaccount.com","private_key":"k"}}"#
        )
        .into_bytes()
    }

    /// Put the cache in the state a long run would leave behind
    async fn seed(
        cache: &ClientCache<MockClientBuilder>,
        raw: &[u8],
        times_used: usize,
    ) -> Arc<MockClient> {
        let credential = ServiceAccountCredential::from_json(raw, cache.scopes()).unwrap();
        let client = Arc::new(cache.builder().build(&credential).await.unwrap());
        *cache.entry.lock().await = Some(CachedEntry {
            credential,
            client: Arc::clone(&client),
            times_used,
        });
        client
    }

    #[tokio::test]
    async fn empty_cache_builds() {
        let builder = MockClientBuilder::new();
        let cache = ClientCache::new(builder.clone());

        assert!(cache.snapshot().await.is_none());
        let client = cache.acquire(&key("a")).await.unwrap();

        assert_eq!(builder.build_count(), 1);
        assert_eq!(client.project_id, "a");
        let snapshot = cache.snapshot().await.unwrap();
        assert_eq!(snapshot.project_id, "a");
        assert_eq!(snapshot.times_used, 1);
    }

    #[tokio::test]
    async fn reuses_at_ceiling_with_same_credential() {
        let builder = MockClientBuilder::new();
        let cache = ClientCache::new(builder.clone());
        let raw = key("a");

        let seeded = seed(&cache, &raw, DEFAULT_MAX_REUSE).await;
        let builds_before = builder.build_count();

        let client = cache.acquire(&raw).await.unwrap();

        assert!(Arc::ptr_eq(&client, &seeded));
        assert_eq!(builder.build_count(), builds_before);
        assert_eq!(cache.snapshot().await.unwrap().times_used, DEFAULT_MAX_REUSE + 1);
    }

    #[tokio::test]
    async fn rebuilds_below_ceiling_with_same_credential() {
        // Literal policy: a matching credential below the ceiling rebuilds.
        let builder = MockClientBuilder::new();
        let cache = ClientCache::new(builder.clone());
        let raw = key("a");

        let seeded = seed(&cache, &raw, DEFAULT_MAX_REUSE - 1).await;
        let client = cache.acquire(&raw).await.unwrap();

        assert!(!Arc::ptr_eq(&client, &seeded));
        assert_eq!(cache.snapshot().await.unwrap().times_used, 1);
    }

    #[tokio::test]
    async fn rebuilds_past_ceiling() {
        let builder = MockClientBuilder::new();
        let cache = ClientCache::new(builder.clone());
        let raw = key("a");

        let seeded = seed(&cache, &raw, DEFAULT_MAX_REUSE + 1).await;
        let client = cache.acquire(&raw).await.unwrap();

        assert!(!Arc::ptr_eq(&client, &seeded));
        assert_eq!(cache.snapshot().await.unwrap().times_used, 1);
    }

    #[tokio::test]
    async fn rebuilds_at_ceiling_with_other_credential() {
        let builder = MockClientBuilder::new();
        let cache = ClientCache::new(builder.clone());

        let seeded = seed(&cache, &key("a"), DEFAULT_MAX_REUSE).await;
        let client = cache.acquire(&key("b")).await.unwrap();

        assert!(!Arc::ptr_eq(&client, &seeded));
        let snapshot = cache.snapshot().await.unwrap();
        assert_eq!(snapshot.project_id, "b");
        assert_eq!(snapshot.times_used, 1);
    }

    #[tokio::test]
    async fn default_ceiling_never_reuses_from_empty() {
        // With the literal policy every rebuild resets the count to 1, so the
        // count never climbs to 5 and each call builds a new client.
        let builder = MockClientBuilder::new();
        let cache = ClientCache::new(builder.clone());
        let raw = key("a");

        for call in 1..=7 {
            let client = cache.acquire(&raw).await.unwrap();
            assert_eq!(client.id, call);
            assert_eq!(cache.snapshot().await.unwrap().times_used, 1);
        }
        assert_eq!(builder.build_count(), 7);
    }

    #[tokio::test]
    async fn ceiling_of_one_alternates() {
        let builder = MockClientBuilder::new();
        let cache = ClientCache::new(builder.clone()).with_max_reuse(1);
        let raw = key("a");

        let first = cache.acquire(&raw).await.unwrap();
        let second = cache.acquire(&raw).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.snapshot().await.unwrap().times_used, 2);

        let third = cache.acquire(&raw).await.unwrap();
        assert!(!Arc::ptr_eq(&second, &third));
        assert_eq!(cache.snapshot().await.unwrap().times_used, 1);
        assert_eq!(builder.build_count(), 2);
    }

    #[tokio::test]
    async fn zero_ceiling_never_reuses() {
        let builder = MockClientBuilder::new();
        let cache = ClientCache::new(builder.clone()).with_max_reuse(0);
        let raw = key("a");

        let first = cache.acquire(&raw).await.unwrap();
        let second = cache.acquire(&raw).await.unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(builder.build_count(), 2);
        assert_eq!(cache.snapshot().await.unwrap().times_used, 1);
    }

    #[tokio::test]
    async fn clear_drops_entry() {
        let cache = ClientCache::new(MockClientBuilder::new());
        cache.acquire(&key("a")).await.unwrap();
        assert!(cache.cached_client().await.is_some());

        cache.clear().await;
        assert!(cache.snapshot().await.is_none());
        assert!(cache.cached_client().await.is_none());
    }

    #[tokio::test]
    async fn config_drives_ceiling_and_scopes() {
        let config = ClientConfig {
            max_reuse: 3,
            scopes: vec!["https://www.googleapis.com/auth/bigquery".to_string()],
        };
        let cache = ClientCache::with_config(MockClientBuilder::new(), &config);

        assert_eq!(cache.max_reuse(), 3);
        assert_eq!(cache.scopes(), config.scopes.as_slice());
    }
}
