//! Instrumentation hooks wrapping a [`Cache`] backend: every operation is
//! logged at `debug` with its key and outcome. A wider metrics backend
//! (counters/histograms) can be plugged in via [`MetricsSink`]; the
//! default sink only logs, since the core has no opinion on which metrics
//! system an embedding application uses.

use std::time::Instant;

use async_trait::async_trait;

use crate::error::Result;
use crate::storage::Cache;

/// Observes cache operations. Implementations typically forward into
/// whatever metrics system the embedding application already uses;
/// `rfc-http-cache` itself never depends on one directly.
pub trait MetricsSink: Send + Sync + 'static {
    /// Called after a `get`, with whether it was a hit and how long it
    /// took.
    fn observe_get(&self, hit: bool, elapsed: std::time::Duration);
    /// Called after a `set`, with whether it succeeded and how long it
    /// took.
    fn observe_set(&self, ok: bool, elapsed: std::time::Duration);
    /// Called after a `delete`.
    fn observe_delete(&self, ok: bool, elapsed: std::time::Duration);
}

/// A [`MetricsSink`] that only emits `log` records, for applications that
/// have not wired in a dedicated metrics backend.
#[derive(Debug, Default)]
pub struct LoggingSink;

impl MetricsSink for LoggingSink {
    fn observe_get(&self, hit: bool, elapsed: std::time::Duration) {
        log::debug!("cache get: hit={hit} elapsed={elapsed:?}");
    }

    fn observe_set(&self, ok: bool, elapsed: std::time::Duration) {
        log::debug!("cache set: ok={ok} elapsed={elapsed:?}");
    }

    fn observe_delete(&self, ok: bool, elapsed: std::time::Duration) {
        log::debug!("cache delete: ok={ok} elapsed={elapsed:?}");
    }
}

/// A [`Cache`] adapter that reports every operation to a [`MetricsSink`],
/// otherwise delegating unchanged. Typically the outermost wrapper, so it
/// observes whatever compression/encryption layers add to each call's
/// latency.
pub struct InstrumentedCache<C, S = LoggingSink> {
    inner: C,
    sink: S,
}

impl<C: Cache> InstrumentedCache<C, LoggingSink> {
    /// Wraps `inner`, logging every operation via [`LoggingSink`].
    pub fn new(inner: C) -> Self {
        Self { inner, sink: LoggingSink }
    }
}

impl<C: Cache, S: MetricsSink> InstrumentedCache<C, S> {
    /// Wraps `inner`, reporting every operation to `sink`.
    pub fn with_sink(inner: C, sink: S) -> Self {
        Self { inner, sink }
    }
}

#[async_trait]
impl<C: Cache, S: MetricsSink> Cache for InstrumentedCache<C, S> {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let start = Instant::now();
        let result = self.inner.get(key).await;
        self.sink.observe_get(matches!(result, Ok(Some(_))), start.elapsed());
        result
    }

    async fn set(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        let start = Instant::now();
        let result = self.inner.set(key, bytes).await;
        self.sink.observe_set(result.is_ok(), start.elapsed());
        result
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let start = Instant::now();
        let result = self.inner.delete(key).await;
        self.sink.observe_delete(result.is_ok(), start.elapsed());
        result
    }

    async fn close(&self) -> Result<()> {
        self.inner.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
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

    #[derive(Default)]
    struct CountingSink {
        hits: AtomicUsize,
        misses: AtomicUsize,
    }

    impl MetricsSink for CountingSink {
        fn observe_get(&self, hit: bool, _elapsed: std::time::Duration) {
            if hit {
                self.hits.fetch_add(1, Ordering::SeqCst);
            } else {
                self.misses.fetch_add(1, Ordering::SeqCst);
            }
        }
        fn observe_set(&self, _ok: bool, _elapsed: std::time::Duration) {}
        fn observe_delete(&self, _ok: bool, _elapsed: std::time::Duration) {}
    }

    #[tokio::test]
    async fn reports_hits_and_misses() {
        let cache =
            InstrumentedCache::with_sink(MapCache(Mutex::new(HashMap::new())), CountingSink::default());
        cache.get("missing").await.unwrap();
        cache.set("k", b"v".to_vec()).await.unwrap();
        cache.get("k").await.unwrap();
        assert_eq!(cache.sink.hits.load(Ordering::SeqCst), 1);
        assert_eq!(cache.sink.misses.load(Ordering::SeqCst), 1);
    }
}
