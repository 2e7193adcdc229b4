//! Store abstraction shared by every cache backend

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::CommonResult;

/// Asynchronous string key-value store with optional per-entry TTL
///
/// Implementations must be safe to share between tasks. Reads of an expired
/// entry behave exactly like a miss.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Fetch a live entry
    async fn get(&self, key: &str) -> CommonResult<Option<String>>;

    /// Insert or replace an entry
    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> CommonResult<()>;

    /// Remove an entry; removing a missing key is not an error
    async fn delete(&self, key: &str) -> CommonResult<()>;

    /// Short backend name for logs
    fn backend_name(&self) -> &'static str;
}

/// Shared, dynamically dispatched store handle
pub type SharedStore = Arc<dyn KeyValueStore>;

#[async_trait]
impl<T: KeyValueStore + ?Sized> KeyValueStore for Arc<T> {
    async fn get(&self, key: &str) -> CommonResult<Option<String>> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> CommonResult<()> {
        (**self).set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> CommonResult<()> {
        (**self).delete(key).await
    }

    fn backend_name(&self) -> &'static str {
        (**self).backend_name()
    }
}
