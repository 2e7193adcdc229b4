//! Integration tests for the cache backends through the shared trait object

#![cfg(feature = "runtime")]

use std::sync::Arc;
use std::time::Duration;

use myinvois_common::cache::{FileStore, KeyValueStore, MemoryStore, SharedStore};
use myinvois_common::time::MockClock;

async fn exercise(store: SharedStore) {
    assert_eq!(store.get("myinvois:token:client-a").await.unwrap(), None);

    store
        .set("myinvois:token:client-a", r#"{"access_token":"a"}"#.to_string(), None)
        .await
        .unwrap();
    store
        .set(
            "myinvois:token:client-a:C1234567890",
            r#"{"access_token":"b"}"#.to_string(),
            Some(Duration::from_secs(3600)),
        )
        .await
        .unwrap();

    assert_eq!(
        store.get("myinvois:token:client-a").await.unwrap().as_deref(),
        Some(r#"{"access_token":"a"}"#)
    );
    assert_eq!(
        store.get("myinvois:token:client-a:C1234567890").await.unwrap().as_deref(),
        Some(r#"{"access_token":"b"}"#)
    );

    store.delete("myinvois:token:client-a").await.unwrap();
    assert_eq!(store.get("myinvois:token:client-a").await.unwrap(), None);
    assert!(store.get("myinvois:token:client-a:C1234567890").await.unwrap().is_some());
}

#[tokio::test]
async fn memory_store_keeps_identities_apart() {
    exercise(Arc::new(MemoryStore::default())).await;
}

#[tokio::test]
async fn file_store_keeps_identities_apart() {
    let dir = tempfile::tempdir().unwrap();
    exercise(Arc::new(FileStore::new(dir.path().join("tokens")))).await;
}

#[tokio::test]
async fn file_store_ttl_with_simulated_time() {
    let dir = tempfile::tempdir().unwrap();
    let clock = MockClock::new();
    let store = FileStore::with_clock(dir.path(), Arc::new(clock.clone()));

    store.set("k", "v".into(), Some(Duration::from_secs(3600))).await.unwrap();
    clock.advance(Duration::from_secs(3599));
    assert!(store.get("k").await.unwrap().is_some());

    clock.advance(Duration::from_secs(2));
    assert!(store.get("k").await.unwrap().is_none());
}

#[tokio::test]
async fn concurrent_writers_leave_a_readable_entry() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileStore::new(dir.path()));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.set("shared", format!("v{i}"), None).await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let value = store.get("shared").await.unwrap().unwrap();
    assert!(value.starts_with('v'));
    assert_eq!(store.backend_name(), "file");
}
