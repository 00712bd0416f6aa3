//! A filesystem-backed [`Cache`]: one file per key, sharded into
//! two-character subdirectories to keep any single directory from growing
//! unbounded.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::{CacheError, Result};
use crate::storage::Cache;

/// Stores cache entries as individual files under a root directory.
///
/// The backend treats `key` as opaque and never assumes it's already
/// filesystem-safe: it hex-encodes the key to form the filename, so any
/// key (including the `stale_`-prefixed sidecar keys) maps to a valid
/// path.
#[derive(Debug, Clone)]
pub struct FsCache {
    root: PathBuf,
}

impl FsCache {
    /// Builds a backend rooted at `root`. The directory is not created
    /// until the first write.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let encoded = hex::encode(key.as_bytes());
        let (shard, rest) = encoded.split_at(encoded.len().min(2));
        self.root.join(shard).join(rest)
    }
}

#[async_trait]
impl Cache for FsCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(self.path_for(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_err(key, e)),
        }
    }

    async fn set(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| io_err(key, e))?;
        }
        let tmp = tmp_path(&path);
        tokio::fs::write(&tmp, &bytes).await.map_err(|e| io_err(key, e))?;
        tokio::fs::rename(&tmp, &path).await.map_err(|e| io_err(key, e))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_err(key, e)),
        }
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

fn io_err(key: &str, source: std::io::Error) -> CacheError {
    CacheError::StorageIo { key: key.to_string(), source: Box::new(source) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FsCache::new(dir.path());
        cache.set("k", b"v".to_vec()).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some(b"v".to_vec()));
    }

    #[tokio::test]
    async fn absent_key_is_a_plain_none() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FsCache::new(dir.path());
        assert_eq!(cache.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn delete_removes_entry() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FsCache::new(dir.path());
        cache.set("k", b"v".to_vec()).await.unwrap();
        cache.delete("k").await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn deleting_absent_key_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FsCache::new(dir.path());
        assert!(cache.delete("missing").await.is_ok());
    }

    #[tokio::test]
    async fn overwrite_replaces_value() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FsCache::new(dir.path());
        cache.set("k", b"first".to_vec()).await.unwrap();
        cache.set("k", b"second".to_vec()).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some(b"second".to_vec()));
    }
}
