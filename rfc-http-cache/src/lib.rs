#![forbid(unsafe_code)]
#![deny(missing_debug_implementations, unused_qualifications)]
//! An RFC 9111 (HTTP Caching) and RFC 5861 (stale-while-revalidate /
//! stale-if-error) compliant caching core.
//!
//! This crate implements the caching decisions — freshness evaluation,
//! conditional revalidation, key derivation, and invalidation — without
//! depending on any particular HTTP client or storage backend. Clients
//! plug in an async fetch function; storage backends implement [`Cache`].
//! `rfc-http-cache-reqwest` wires this core into `reqwest` via
//! `reqwest-middleware`.
//!
//! ## Basic usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use rfc_http_cache::{CachingTransport, HttpCacheOptions, MemoryCache};
//!
//! # async fn run() -> rfc_http_cache::Result<()> {
//! let cache = Arc::new(MemoryCache::new());
//! let transport = CachingTransport::new(
//!     cache,
//!     |request| async move {
//!         // issue `request` against the real network here
//!         unimplemented!()
//!     },
//!     HttpCacheOptions::default(),
//! );
//! let request = http::Request::builder()
//!     .uri("https://example.com/")
//!     .body(Vec::new())
//!     .unwrap();
//! let response = transport.run(request).await?;
//! # let _ = response;
//! # Ok(())
//! # }
//! ```

pub mod backends;
pub mod codec;
pub mod directives;
pub mod error;
pub mod freshness;
pub mod key;
pub mod revalidate;
pub mod storage;
pub mod transport;
pub mod wrappers;

pub use codec::Entry;
pub use error::{CacheError, Result};
pub use freshness::Classification;
pub use storage::{Cache, StaleAwareCache};
pub use transport::{CachingTransport, FetchError, HttpCacheOptions};

#[cfg(feature = "manager-memory")]
pub use backends::memory::MemoryCache;
#[cfg(feature = "manager-fs")]
pub use backends::fs::FsCache;
