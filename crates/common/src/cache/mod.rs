//! Key-value cache backends
//!
//! Token caching goes through the [`KeyValueStore`] trait so the backing
//! store is pluggable. Two backends ship with the crate:
//!
//! - [`MemoryStore`]: process-local, moka-backed, per-entry TTL
//! - [`FileStore`]: one JSON file per key, survives process restarts
//!
//! Values are opaque strings (callers serialise to JSON). A `ttl` of `None`
//! stores the entry until it is deleted.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//!
//! use myinvois_common::cache::{KeyValueStore, MemoryStore};
//!
//! # tokio_test::block_on(async {
//! let store = MemoryStore::new(1_000);
//! store.set("greeting", "hello".to_string(), Some(Duration::from_secs(60))).await?;
//! assert_eq!(store.get("greeting").await?.as_deref(), Some("hello"));
//! # Ok::<(), myinvois_common::CommonError>(())
//! # }).unwrap();
//! ```

pub mod file;
pub mod memory;
pub mod store;

pub use file::FileStore;
pub use memory::{MemoryStore, DEFAULT_MAX_CAPACITY};
pub use store::{KeyValueStore, SharedStore};
