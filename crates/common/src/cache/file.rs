//! File-backed store: one JSON document per key
//!
//! File names are the SHA-256 hex digest of the key so arbitrary keys map to
//! safe paths. Expiry is evaluated against the injected [`Clock`] on read;
//! expired files are removed lazily.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use super::store::KeyValueStore;
use crate::error::{CommonError, CommonResult};
use crate::time::{Clock, SharedClock, SystemClock};

#[derive(Debug, Serialize, Deserialize)]
struct FileEntry {
    key: String,
    value: String,
    /// Milliseconds since the UNIX epoch, `None` for no expiry
    expires_at_ms: Option<u64>,
}

/// Store persisting entries under a directory
#[derive(Clone)]
pub struct FileStore {
    dir: PathBuf,
    clock: SharedClock,
}

impl FileStore {
    /// Create a store rooted at `dir` using the system clock
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self::with_clock(dir, Arc::new(SystemClock))
    }

    /// Create a store with an explicit clock
    pub fn with_clock(dir: impl Into<PathBuf>, clock: SharedClock) -> Self {
        Self { dir: dir.into(), clock }
    }

    /// Directory the entries live in
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let digest = Sha256::digest(key.as_bytes());
        self.dir.join(format!("{}.json", hex::encode(digest)))
    }

    async fn remove_file(path: &Path) -> CommonResult<()> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(CommonError::storage("delete", err.to_string())),
        }
    }
}

impl std::fmt::Debug for FileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStore").field("dir", &self.dir).finish_non_exhaustive()
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> CommonResult<Option<String>> {
        let path = self.path_for(key);
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(CommonError::storage("read", err.to_string())),
        };

        let entry: FileEntry = match serde_json::from_slice(&raw) {
            Ok(entry) => entry,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "discarding corrupt cache file");
                Self::remove_file(&path).await?;
                return Ok(None);
            }
        };

        // Digest collision guard
        if entry.key != key {
            return Ok(None);
        }

        if let Some(expires_at) = entry.expires_at_ms {
            if self.clock.millis_since_epoch() >= expires_at {
                debug!(path = %path.display(), "cache file expired");
                Self::remove_file(&path).await?;
                return Ok(None);
            }
        }

        Ok(Some(entry.value))
    }

    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> CommonResult<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|err| CommonError::storage("create_dir", err.to_string()))?;

        let expires_at_ms = ttl.map(|ttl| {
            self.clock.millis_since_epoch().saturating_add(ttl.as_millis() as u64)
        });
        let entry = FileEntry { key: key.to_string(), value, expires_at_ms };
        let body = serde_json::to_vec(&entry)?;

        // Write then rename so readers never observe a partial file
        let path = self.path_for(key);
        let tmp = path.with_extension(format!("{:016x}.tmp", rand::random::<u64>()));
        tokio::fs::write(&tmp, body)
            .await
            .map_err(|err| CommonError::storage("write", err.to_string()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|err| CommonError::storage("rename", err.to_string()))
    }

    async fn delete(&self, key: &str) -> CommonResult<()> {
        Self::remove_file(&self.path_for(key)).await
    }

    fn backend_name(&self) -> &'static str {
        "file"
    }
}
