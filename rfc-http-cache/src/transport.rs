//! The central caching state machine (§4.7): given a request and an async
//! fetch function, decides whether to serve from storage, revalidate, or
//! fetch, and keeps the backend up to date.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use http::{Method, Request};

use crate::codec::{self, Entry};
use crate::directives::{self, DirectiveSet};
use crate::error::{CacheError, Result};
use crate::freshness::{self, Classification};
use crate::key;
use crate::revalidate::{self, Outcome as RevalidateOutcome};
use crate::storage::{Cache, StaleAwareCache};

/// `X-From-Cache` — set on any response whose body originated from
/// storage.
pub const X_FROM_CACHE: &str = "x-from-cache";
/// `X-Cache-Freshness` — `fresh` / `stale` / `stale-while-revalidate`.
pub const X_CACHE_FRESHNESS: &str = "x-cache-freshness";
/// `X-Stale` — set when a stale response was served.
pub const X_STALE: &str = "x-stale";
/// `X-Revalidated` — set after a successful 304-validated hit.
pub const X_REVALIDATED: &str = "x-revalidated";

const UNCONDITIONALLY_CACHEABLE: &[u16] =
    &[200, 203, 204, 206, 300, 301, 404, 405, 410, 414, 501];

/// Per-transport configuration, corresponding to the external
/// configuration surface.
#[derive(Clone)]
pub struct HttpCacheOptions {
    /// Request header names (in order) folded into the cache key,
    /// enabling per-subject isolation (e.g. `Authorization`).
    pub cache_key_headers: Vec<String>,
    /// Whether to add `X-From-Cache` and friends to responses.
    pub mark_cached_responses: bool,
    /// Suppress RFC 9111 `Warning` header emission.
    pub disable_warning_header: bool,
    /// True for shared (public) cache semantics.
    pub is_public_cache: bool,
    /// User predicate extending cacheability beyond the built-in rules.
    pub should_cache: Option<Arc<dyn Fn(&Request<Vec<u8>>, &Entry) -> bool + Send + Sync>>,
    /// Never serve a 5xx entry from cache even if stale-if-error would
    /// otherwise allow it.
    pub skip_server_errors_from_cache: bool,
    /// Bound on background stale-while-revalidate tasks.
    pub async_revalidate_timeout: Duration,
    /// Honor a bare `Cache-Control: private` directive even when this
    /// instance is itself configured as a private (non-shared) cache.
    /// Default false: a private-cache instance caches `private` responses
    /// freely, since `private` only restricts *shared* caches per RFC
    /// 9111 §5.2.2.7.
    pub respect_private_in_private_mode: bool,
}

impl Default for HttpCacheOptions {
    fn default() -> Self {
        Self {
            cache_key_headers: Vec::new(),
            mark_cached_responses: true,
            disable_warning_header: false,
            is_public_cache: false,
            should_cache: None,
            skip_server_errors_from_cache: false,
            async_revalidate_timeout: Duration::from_secs(30),
            respect_private_in_private_mode: false,
        }
    }
}

impl std::fmt::Debug for HttpCacheOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpCacheOptions")
            .field("cache_key_headers", &self.cache_key_headers)
            .field("mark_cached_responses", &self.mark_cached_responses)
            .field("disable_warning_header", &self.disable_warning_header)
            .field("is_public_cache", &self.is_public_cache)
            .field("skip_server_errors_from_cache", &self.skip_server_errors_from_cache)
            .field("async_revalidate_timeout", &self.async_revalidate_timeout)
            .field("respect_private_in_private_mode", &self.respect_private_in_private_mode)
            .finish_non_exhaustive()
    }
}

/// The error type a caller's fetch function may return; wrapped into
/// [`CacheError::Network`] by the transport.
pub type FetchError = Box<dyn std::error::Error + Send + Sync>;

/// Caches responses from an async fetch function `F` against a [`Cache`]
/// backend. `F` is kept abstract so this crate never depends on a
/// particular HTTP client; `rfc-http-cache-reqwest` supplies the
/// reqwest-shaped adapter.
///
/// Always used behind an `Arc` (construct with [`CachingTransport::new`],
/// which returns one): background stale-while-revalidate tasks need a
/// handle that outlives the triggering request.
pub struct CachingTransport<C, F> {
    cache: Arc<C>,
    fetch: F,
    options: HttpCacheOptions,
}

impl<C, F, Fut> CachingTransport<C, F>
where
    C: Cache + 'static,
    F: Fn(Request<Vec<u8>>) -> Fut + Send + Sync + Clone + 'static,
    Fut: Future<Output = std::result::Result<Entry, FetchError>> + Send + 'static,
{
    /// Builds a transport over `cache`, issuing uncached/conditional
    /// requests via `fetch`.
    pub fn new(cache: Arc<C>, fetch: F, options: HttpCacheOptions) -> Arc<Self> {
        Arc::new(Self { cache, fetch, options })
    }

    async fn do_fetch(&self, request: Request<Vec<u8>>) -> Result<Entry> {
        (self.fetch)(request).await.map_err(CacheError::Network)
    }

    /// Executes `request` through the cache, per the six-step state
    /// machine in §4.7.
    pub async fn run(self: &Arc<Self>, request: Request<Vec<u8>>) -> Result<Entry> {
        let directives = directives::request_directives(request.headers());

        if !is_get_or_head(&request) {
            return self.handle_unsafe_method(request).await;
        }

        if directives.no_store {
            return self.full_fetch(request, &directives).await;
        }

        let base_key = key::derive_base(request.method().as_str(), &request.uri().to_string())?;
        let vary_headers = self.vary_header_values(&request);
        let lookup_key = if vary_headers.is_empty() {
            base_key.clone()
        } else {
            let canonical = key::canonicalize_url(&request.uri().to_string())?;
            key::derive(request.method().as_str(), &canonical, &vary_headers)
        };

        let Some(stored_bytes) = self.cache.get(&lookup_key).await? else {
            return self.full_fetch(request, &directives).await;
        };

        let stored = codec::decode(&stored_bytes, &lookup_key)?;

        if !self.vary_matches(&request, &stored) {
            return self.full_fetch(request, &directives).await;
        }

        if request.headers().contains_key(http::header::AUTHORIZATION)
            && self.options.is_public_cache
            && !shared_cache_permits_authorization(&stored)
        {
            return self.full_fetch(request, &directives).await;
        }

        let now = SystemTime::now();
        match freshness::classify(&stored, &directives, now, self.options.is_public_cache) {
            Classification::Fresh => Ok(self.mark_fresh(stored, now)),
            Classification::Transparent => {
                self.conditional_revalidate(request, lookup_key, stored, &directives).await
            }
            Classification::Stale(flags) if flags.usable_within_max_stale => {
                Ok(self.mark_stale_served(stored, "110 - \"Response is Stale\""))
            }
            Classification::Stale(flags) if flags.within_stale_while_revalidate_window => {
                let served = self.mark_stale_while_revalidate(stored.clone());
                self.spawn_swr(request, lookup_key);
                Ok(served)
            }
            Classification::Stale(_) => {
                self.conditional_revalidate(request, lookup_key, stored, &directives).await
            }
        }
    }

    async fn conditional_revalidate(
        &self,
        request: Request<Vec<u8>>,
        key: String,
        stored: Entry,
        directives: &DirectiveSet,
    ) -> Result<Entry> {
        let response_directives = directives::response_directives(
            &stored.to_header_map().unwrap_or_default(),
        );
        let may_serve_stale = !self.options.skip_server_errors_from_cache
            && within_stale_if_error(&stored, &response_directives, SystemTime::now());

        let method = request.method().clone();
        let request_has_authorization = request.headers().contains_key(http::header::AUTHORIZATION);
        let conditional = revalidate::build_conditional_request(request, &stored)?;
        let fetched = match self.do_fetch(conditional).await {
            Ok(entry) => entry,
            Err(error) => {
                if may_serve_stale && error.is_network_class() {
                    return Ok(self
                        .mark_stale_served(stored, "111 - \"Revalidation Failed\""));
                }
                return Err(error);
            }
        };

        match revalidate::interpret(stored, fetched, may_serve_stale, SystemTime::now()) {
            RevalidateOutcome::Updated { entry, replaced } => {
                let should_store = !replaced
                    || self.should_store(&method, directives, &entry, request_has_authorization);
                if should_store {
                    let stripped = Entry {
                        headers: codec::strip_hop_by_hop(entry.headers.clone()),
                        ..entry.clone()
                    };
                    if let Ok(bytes) = codec::encode(&stripped) {
                        self.cache.set(&key, bytes).await.ok();
                    }
                } else {
                    self.cache.delete(&key).await.ok();
                }
                let mut out = entry;
                if self.options.mark_cached_responses {
                    out.set_header(X_FROM_CACHE, "1");
                    if !replaced {
                        out.set_header(X_REVALIDATED, "1");
                    }
                }
                Ok(out)
            }
            RevalidateOutcome::ServeStale { entry } => {
                Ok(self.mark_stale_served(entry, "111 - \"Revalidation Failed\""))
            }
            RevalidateOutcome::Passthrough { entry } => Ok(entry),
        }
    }

    async fn full_fetch(&self, request: Request<Vec<u8>>, directives: &DirectiveSet) -> Result<Entry> {
        let request_time = SystemTime::now();
        let method = request.method().clone();
        let uri = request.uri().clone();
        let vary_request_headers = request.headers().clone();

        let base_key = key::derive_base(method.as_str(), &uri.to_string())?;

        let result = self.do_fetch(request).await;
        let fetched = match result {
            Ok(entry) => entry,
            Err(error) => {
                if error.is_network_class() {
                    if let Some(bytes) = self.cache.get(&base_key).await.ok().flatten() {
                        if let Ok(stored) = codec::decode(&bytes, &base_key) {
                            let response_directives = directives::response_directives(
                                &stored.to_header_map().unwrap_or_default(),
                            );
                            if within_stale_if_error(&stored, &response_directives, SystemTime::now())
                            {
                                return Ok(self.mark_stale_served(
                                    stored,
                                    "111 - \"Revalidation Failed\"",
                                ));
                            }
                        }
                    }
                }
                return Err(error);
            }
        };

        let mut fetched = fetched;
        fetched.stamp_times(request_time, SystemTime::now());
        stamp_vary_values(&mut fetched, &vary_request_headers);

        let request_has_authorization =
            vary_request_headers.contains_key(http::header::AUTHORIZATION);
        if self.should_store(&method, directives, &fetched, request_has_authorization) {
            let vary_headers = self.vary_header_values_from_entry(&fetched);
            let storage_key = if vary_headers.is_empty() {
                base_key
            } else {
                let canonical = key::canonicalize_url(&uri.to_string())?;
                key::derive(method.as_str(), &canonical, &vary_headers)
            };
            let stripped = Entry {
                headers: codec::strip_hop_by_hop(fetched.headers.clone()),
                ..fetched.clone()
            };
            if let Ok(bytes) = codec::encode(&stripped) {
                self.cache.set(&storage_key, bytes).await.ok();
            }
        }

        if self.options.mark_cached_responses {
            fetched.remove_header(X_FROM_CACHE);
        }
        Ok(fetched)
    }

    async fn handle_unsafe_method(&self, request: Request<Vec<u8>>) -> Result<Entry> {
        let uri = request.uri().clone();
        let response = self.do_fetch(request).await?;
        if (200..400).contains(&response.status) {
            self.invalidate(&uri, &response).await;
        }
        Ok(response)
    }

    async fn invalidate(&self, request_uri: &http::Uri, response: &Entry) {
        if let Ok(key) = key::derive_base("GET", &request_uri.to_string()) {
            self.cache.delete(&key).await.ok();
        }
        let origin = origin_of(request_uri);
        for header in ["location", "content-location"] {
            if let Some(value) = response.header(header) {
                if let Ok(resolved) = resolve_against(request_uri, value) {
                    if origin_of(&resolved) == origin {
                        if let Ok(key) = key::derive_base("GET", &resolved.to_string()) {
                            self.cache.delete(&key).await.ok();
                        }
                    }
                }
            }
        }
    }

    fn should_store(
        &self,
        method: &Method,
        directives: &DirectiveSet,
        response: &Entry,
        request_has_authorization: bool,
    ) -> bool {
        if directives.no_store {
            return false;
        }
        let response_directives =
            directives::response_directives(&response.to_header_map().unwrap_or_default());
        if response_directives.no_store {
            return false;
        }
        if self.options.is_public_cache
            && request_has_authorization
            && !shared_cache_permits_authorization(response)
        {
            return false;
        }
        let private_forbids_storage = response_directives.private
            && if self.options.is_public_cache {
                true
            } else {
                self.options.respect_private_in_private_mode
            };
        if private_forbids_storage {
            return false;
        }
        if !matches!(method, &Method::GET | &Method::HEAD) {
            return false;
        }
        if let Some(predicate) = &self.options.should_cache {
            let dummy = Request::builder().method(method.clone()).body(Vec::new());
            if let Ok(dummy) = dummy {
                if predicate(&dummy, response) {
                    return true;
                }
            }
        }
        if UNCONDITIONALLY_CACHEABLE.contains(&response.status) {
            return true;
        }
        response_directives.max_age.is_some()
            || response_directives.s_maxage.is_some()
            || response.header("expires").is_some()
    }

    fn vary_header_values(&self, request: &Request<Vec<u8>>) -> Vec<(String, String)> {
        self.options
            .cache_key_headers
            .iter()
            .filter_map(|name| {
                request
                    .headers()
                    .get(name)
                    .and_then(|v| v.to_str().ok())
                    .map(|v| (name.clone(), v.to_string()))
            })
            .collect()
    }

    fn vary_header_values_from_entry(&self, entry: &Entry) -> Vec<(String, String)> {
        self.options
            .cache_key_headers
            .iter()
            .filter_map(|name| entry.header(name).map(|v| (name.clone(), v.to_string())))
            .collect()
    }

    fn vary_matches(&self, request: &Request<Vec<u8>>, stored: &Entry) -> bool {
        let Some(vary) = stored.header("vary") else {
            return true;
        };
        if vary.trim() == "*" {
            return false;
        }
        vary.split(',').all(|name| {
            let name = name.trim();
            if name.is_empty() {
                return true;
            }
            let current = request.headers().get(name).and_then(|v| v.to_str().ok());
            let recorded = stored.header(&format!("x-vary-{}", name.to_ascii_lowercase()));
            current == recorded
        })
    }

    fn mark_fresh(&self, mut entry: Entry, now: SystemTime) -> Entry {
        if self.options.mark_cached_responses {
            entry.set_header(X_FROM_CACHE, "1");
            entry.set_header(X_CACHE_FRESHNESS, "fresh");
            if let Some(age) = current_age_secs(&entry, now) {
                entry.set_header("age", age.to_string());
            }
        }
        entry
    }

    fn mark_stale_served(&self, mut entry: Entry, warning: &str) -> Entry {
        if self.options.mark_cached_responses {
            entry.set_header(X_FROM_CACHE, "1");
            entry.set_header(X_STALE, "1");
        }
        if !self.options.disable_warning_header {
            entry.append_header("warning", warning);
        }
        entry
    }

    fn mark_stale_while_revalidate(&self, mut entry: Entry) -> Entry {
        if self.options.mark_cached_responses {
            entry.set_header(X_FROM_CACHE, "1");
            entry.set_header(X_CACHE_FRESHNESS, "stale-while-revalidate");
        }
        if !self.options.disable_warning_header {
            entry.append_header("warning", "110 - \"Response is Stale\"");
        }
        entry
    }

    /// Spawns a detached background revalidation of `key`, bound by
    /// [`HttpCacheOptions::async_revalidate_timeout`]. A concurrent
    /// trigger for the same key is suppressed via the stale marker so a
    /// burst of requests against one hot, stale entry produces a single
    /// background fetch.
    fn spawn_swr(self: &Arc<Self>, request: Request<Vec<u8>>, key: String) {
        let this = Arc::clone(self);
        let vary_request_headers = request.headers().clone();
        tokio::spawn(async move {
            match this.cache.is_stale(&key).await {
                Ok(true) => return,
                Ok(false) => {}
                Err(error) => {
                    log::warn!("failed to check stale marker for {key}: {error}");
                }
            }
            if this.cache.mark_stale(&key).await.is_err() {
                log::warn!("failed to set stale marker for {key}");
            }
            let timeout = this.options.async_revalidate_timeout;
            let fetch_result = tokio::time::timeout(timeout, this.do_fetch(request)).await;
            match fetch_result {
                Ok(Ok(mut entry)) => {
                    entry.stamp_times(SystemTime::now(), SystemTime::now());
                    stamp_vary_values(&mut entry, &vary_request_headers);
                    let stripped = Entry {
                        headers: codec::strip_hop_by_hop(entry.headers.clone()),
                        ..entry
                    };
                    if let Ok(bytes) = codec::encode(&stripped) {
                        if let Err(error) = this.cache.set(&key, bytes).await {
                            log::warn!("background revalidation write failed for {key}: {error}");
                        }
                    }
                }
                Ok(Err(error)) => {
                    log::warn!("background revalidation fetch failed for {key}: {error}");
                }
                Err(_) => {
                    log::warn!("background revalidation for {key} exceeded its timeout");
                }
            }
            this.cache.clear_stale(&key).await.ok();
        });
    }
}

fn is_get_or_head(request: &Request<Vec<u8>>) -> bool {
    matches!(*request.method(), Method::GET | Method::HEAD)
}

fn shared_cache_permits_authorization(entry: &Entry) -> bool {
    let directives =
        directives::response_directives(&entry.to_header_map().unwrap_or_default());
    directives.public || directives.must_revalidate || directives.s_maxage.is_some()
}

fn within_stale_if_error(entry: &Entry, response: &DirectiveSet, now: SystemTime) -> bool {
    let Some(window) = response.stale_if_error else { return false };
    match freshness::classify(entry, &DirectiveSet::default(), now, false) {
        Classification::Stale(flags) => flags.excess_age_secs <= window,
        _ => false,
    }
}

fn current_age_secs(entry: &Entry, now: SystemTime) -> Option<u64> {
    let response_time =
        entry.header(codec::X_RESPONSE_TIME).and_then(|v| httpdate::parse_http_date(v).ok())?;
    let age_header = entry.header("age").and_then(|v| v.parse::<u64>().ok()).unwrap_or(0);
    let resident = now.duration_since(response_time).unwrap_or_default().as_secs();
    Some(age_header + resident)
}

/// Records the request header values named by a response's own `Vary`
/// header, so a later lookup can tell whether the subject actually varied
/// (§4.7 step 3). Independent of [`HttpCacheOptions::cache_key_headers`],
/// which isolates storage *keys* rather than validating a shared one.
fn stamp_vary_values(entry: &mut Entry, request_headers: &http::HeaderMap) {
    let Some(vary) = entry.header("vary").map(str::to_string) else { return };
    let names: Vec<String> = vary
        .split(',')
        .map(|s| s.trim().to_ascii_lowercase())
        .filter(|s| !s.is_empty())
        .collect();
    for name in names {
        let bookkeeping = format!("x-vary-{name}");
        match request_headers.get(&name).and_then(|v| v.to_str().ok()) {
            Some(value) => entry.set_header(&bookkeeping, value),
            None => entry.remove_header(&bookkeeping),
        }
    }
}

fn origin_of(uri: &http::Uri) -> (String, String, u16) {
    let scheme = uri.scheme_str().unwrap_or("").to_string();
    let host = uri.host().unwrap_or("").to_ascii_lowercase();
    let port = uri.port_u16().unwrap_or(if scheme == "https" { 443 } else { 80 });
    (scheme, host, port)
}

fn resolve_against(base: &http::Uri, target: &str) -> std::result::Result<http::Uri, http::uri::InvalidUri> {
    if target.starts_with('/') {
        let authority = base.authority().map(|a| a.as_str()).unwrap_or("");
        let scheme = base.scheme_str().unwrap_or("http");
        format!("{scheme}://{authority}{target}").parse()
    } else {
        target.parse()
    }
}
