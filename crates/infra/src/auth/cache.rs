//! Token cache over a key-value store

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use myinvois_common::cache::{FileStore, KeyValueStore, MemoryStore, SharedStore, DEFAULT_MAX_CAPACITY};
use myinvois_core::TokenCache;
use myinvois_domain::{AuthIdentity, AuthToken, CacheSettings, CacheStore, MyInvoisError, Result};
use tracing::{debug, warn};

/// Backend selected by the `cache` section, or `None` when caching is off
pub fn build_store(settings: &CacheSettings) -> Option<SharedStore> {
    if !settings.enabled {
        return None;
    }
    let store: SharedStore = match &settings.store {
        CacheStore::Memory => Arc::new(MemoryStore::new(DEFAULT_MAX_CAPACITY)),
        CacheStore::File { path } => Arc::new(FileStore::new(path.clone())),
    };
    Some(store)
}

/// Stores tokens as JSON under [`AuthIdentity::cache_key`]
pub struct StoreTokenCache {
    store: SharedStore,
    max_ttl: Option<Duration>,
}

impl StoreTokenCache {
    pub fn new(store: SharedStore) -> Self {
        Self { store, max_ttl: None }
    }

    /// Cap every entry's lifetime (the `cache.ttl` setting)
    pub fn with_max_ttl(mut self, max_ttl: Duration) -> Self {
        self.max_ttl = Some(max_ttl);
        self
    }

    pub fn backend_name(&self) -> &'static str {
        self.store.backend_name()
    }
}

#[async_trait]
impl TokenCache for StoreTokenCache {
    async fn get(&self, identity: &AuthIdentity) -> Result<Option<AuthToken>> {
        let key = identity.cache_key();
        let Some(raw) = self.store.get(&key).await.map_err(MyInvoisError::from)? else {
            return Ok(None);
        };

        match serde_json::from_str::<AuthToken>(&raw) {
            Ok(token) => Ok(Some(token)),
            Err(err) => {
                warn!(key = %key, error = %err, "discarding unreadable cached token");
                if let Err(err) = self.store.delete(&key).await {
                    debug!(key = %key, error = %err, "failed to delete unreadable token");
                }
                Ok(None)
            }
        }
    }

    async fn put(&self, identity: &AuthIdentity, token: &AuthToken, ttl: Duration) -> Result<()> {
        let raw = serde_json::to_string(token)
            .map_err(|err| MyInvoisError::internal(format!("Failed to encode token: {err}")))?;
        let ttl = self.max_ttl.map_or(ttl, |max| ttl.min(max));
        self.store.set(&identity.cache_key(), raw, Some(ttl)).await.map_err(MyInvoisError::from)
    }

    async fn remove(&self, identity: &AuthIdentity) -> Result<()> {
        self.store.delete(&identity.cache_key()).await.map_err(MyInvoisError::from)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use myinvois_domain::{Tin, TokenResponse};

    use super::*;

    fn token(value: &str) -> AuthToken {
        AuthToken::from_response(
            TokenResponse {
                access_token: value.into(),
                token_type: "Bearer".into(),
                expires_in: 3600,
                scope: None,
            },
            Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap(),
        )
    }

    #[tokio::test]
    async fn identities_are_kept_apart() {
        let cache = StoreTokenCache::new(Arc::new(MemoryStore::new(100)));
        let direct = AuthIdentity::direct("client");
        let tin = AuthIdentity::intermediary("client", Tin::parse("C1234567890").unwrap());

        cache.put(&direct, &token("a"), Duration::from_secs(60)).await.unwrap();
        cache.put(&tin, &token("b"), Duration::from_secs(60)).await.unwrap();

        assert_eq!(cache.get(&direct).await.unwrap().unwrap().access_token, "a");
        assert_eq!(cache.get(&tin).await.unwrap().unwrap().access_token, "b");

        cache.remove(&tin).await.unwrap();
        assert!(cache.get(&tin).await.unwrap().is_none());
        assert!(cache.get(&direct).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn corrupt_entry_is_a_miss_and_removed() {
        let store: SharedStore = Arc::new(MemoryStore::new(100));
        let identity = AuthIdentity::direct("client");
        store.set(&identity.cache_key(), "not json".into(), None).await.unwrap();

        let cache = StoreTokenCache::new(store.clone());
        assert!(cache.get(&identity).await.unwrap().is_none());
        assert!(store.get(&identity.cache_key()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn file_backend_survives_new_cache_instance() {
        let dir = tempfile::tempdir().unwrap();
        let settings = CacheSettings {
            store: CacheStore::File { path: dir.path().to_path_buf() },
            ..CacheSettings::default()
        };
        let identity = AuthIdentity::direct("client");

        let first = StoreTokenCache::new(build_store(&settings).unwrap());
        assert_eq!(first.backend_name(), "file");
        first.put(&identity, &token("persisted"), Duration::from_secs(600)).await.unwrap();

        let second = StoreTokenCache::new(build_store(&settings).unwrap());
        assert_eq!(second.get(&identity).await.unwrap().unwrap().access_token, "persisted");
    }

    #[derive(Default)]
    struct RecordingStore {
        ttls: parking_lot::Mutex<Vec<Option<Duration>>>,
    }

    #[async_trait]
    impl KeyValueStore for RecordingStore {
        async fn get(&self, _key: &str) -> myinvois_common::CommonResult<Option<String>> {
            Ok(None)
        }

        async fn set(
            &self,
            _key: &str,
            _value: String,
            ttl: Option<Duration>,
        ) -> myinvois_common::CommonResult<()> {
            self.ttls.lock().push(ttl);
            Ok(())
        }

        async fn delete(&self, _key: &str) -> myinvois_common::CommonResult<()> {
            Ok(())
        }

        fn backend_name(&self) -> &'static str {
            "recording"
        }
    }

    #[tokio::test]
    async fn entry_lifetime_is_capped() {
        let store = Arc::new(RecordingStore::default());
        let cache = StoreTokenCache::new(store.clone()).with_max_ttl(Duration::from_secs(900));
        let identity = AuthIdentity::direct("client");

        cache.put(&identity, &token("long"), Duration::from_secs(3600)).await.unwrap();
        cache.put(&identity, &token("short"), Duration::from_secs(60)).await.unwrap();

        assert_eq!(
            *store.ttls.lock(),
            vec![Some(Duration::from_secs(900)), Some(Duration::from_secs(60))]
        );
    }

    #[test]
    fn disabled_cache_has_no_store() {
        let settings = CacheSettings { enabled: false, ..CacheSettings::default() };
        assert!(build_store(&settings).is_none());
    }
}
