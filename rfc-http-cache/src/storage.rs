//! The storage contract a backend must implement to sit behind the caching
//! transport. Backends store opaque bytes keyed by the derived cache key;
//! encoding/decoding and freshness live above this layer entirely.

use async_trait::async_trait;

use crate::error::Result;

/// Reserved key prefix under which stale-while-revalidate markers are
/// stored, separate from the entry they shadow.
pub const STALE_MARKER_PREFIX: &str = "stale_";

/// A storage backend for cache entries.
///
/// Implementors need not understand HTTP semantics: they store and
/// retrieve opaque byte strings keyed by an opaque string key. All
/// freshness, encoding, and eviction-by-content-type decisions live in
/// layers above this trait.
#[async_trait]
pub trait Cache: Send + Sync + 'static {
    /// Looks up the bytes stored under `key`. `Ok(None)` is a plain miss;
    /// `Err` indicates the backend itself failed.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Stores `bytes` under `key`, overwriting any previous value.
    async fn set(&self, key: &str, bytes: Vec<u8>) -> Result<()>;

    /// Removes any value stored under `key`. Deleting an absent key is not
    /// an error.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Releases any resources held by the backend (open files, pools).
    /// Called at most once, when the owning cache is being torn down.
    async fn close(&self) -> Result<()>;
}

/// An extension to [`Cache`] for backends that want to track
/// stale-while-revalidate state explicitly rather than relying purely on
/// the stored entry's own timestamps.
///
/// The default implementations store a marker under a `stale_`-prefixed
/// sibling key, so any [`Cache`] implementation gets this behavior for
/// free; a backend may override these methods to do something more
/// direct (e.g. a dedicated column in a database backend).
#[async_trait]
pub trait StaleAwareCache: Cache {
    /// Marks `key` as currently undergoing background revalidation, so a
    /// second concurrent request doesn't spawn a duplicate revalidation.
    async fn mark_stale(&self, key: &str) -> Result<()> {
        self.set(&stale_marker_key(key), Vec::new()).await
    }

    /// Returns true if `key` is currently marked as undergoing background
    /// revalidation.
    async fn is_stale(&self, key: &str) -> Result<bool> {
        Ok(self.get(&stale_marker_key(key)).await?.is_some())
    }

    /// Clears the stale marker for `key`, typically once a background
    /// revalidation completes (successfully or not).
    async fn clear_stale(&self, key: &str) -> Result<()> {
        self.delete(&stale_marker_key(key)).await
    }
}

impl<T: Cache + ?Sized> StaleAwareCache for T {}

/// Builds the sidecar key used to track stale-while-revalidate-in-progress
/// state for `key`.
#[must_use]
pub fn stale_marker_key(key: &str) -> String {
    format!("{STALE_MARKER_PREFIX}{key}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct MapCache(Mutex<HashMap<String, Vec<u8>>>);

    #[async_trait]
    impl Cache for MapCache {
        async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
            Ok(self.0.lock().unwrap().get(key).cloned())
        }

        async fn set(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
            self.0.lock().unwrap().insert(key.to_string(), bytes);
            Ok(())
        }

        async fn delete(&self, key: &str) -> Result<()> {
            self.0.lock().unwrap().remove(key);
            Ok(())
        }

        async fn close(&self) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn stale_marker_round_trips_through_default_impl() {
        let cache = MapCache(Mutex::new(HashMap::new()));
        assert!(!cache.is_stale("k").await.unwrap());
        cache.mark_stale("k").await.unwrap();
        assert!(cache.is_stale("k").await.unwrap());
        assert!(cache.get("k").await.unwrap().is_some());
        cache.clear_stale("k").await.unwrap();
        assert!(!cache.is_stale("k").await.unwrap());
    }

    #[tokio::test]
    async fn stale_marker_key_does_not_collide_with_entry_key() {
        let cache = MapCache(Mutex::new(HashMap::new()));
        cache.set("k", b"entry".to_vec()).await.unwrap();
        cache.mark_stale("k").await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some(b"entry".to_vec()));
        assert_eq!(cache.get(&stale_marker_key("k")).await.unwrap(), Some(Vec::new()));
    }
}
