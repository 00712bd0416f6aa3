#![forbid(unsafe_code)]
#![deny(missing_debug_implementations, unused_qualifications)]
//! Wires [`rfc_http_cache::CachingTransport`] into `reqwest` through
//! `reqwest-middleware`.
//!
//! ```no_run
//! use std::sync::Arc;
//! use reqwest::Client;
//! use reqwest_middleware::ClientBuilder;
//! use rfc_http_cache::{HttpCacheOptions, MemoryCache};
//! use rfc_http_cache_reqwest::{Cache, CachingConfig};
//!
//! # async fn run() -> reqwest_middleware::Result<()> {
//! let client = ClientBuilder::new(Client::new())
//!     .with(Cache(CachingConfig {
//!         cache: Arc::new(MemoryCache::new()),
//!         client: Client::new(),
//!         options: HttpCacheOptions::default(),
//!     }))
//!     .build();
//!
//! let response = client.get("https://example.com/").send().await?;
//! println!("status: {}", response.status());
//! # Ok(())
//! # }
//! ```
//!
//! This middleware is terminal: it performs the network round trip itself
//! (through its own cloned [`reqwest::Client`]) rather than delegating to
//! the `next` handler in the chain, because a stale-while-revalidate
//! background fetch must be able to outlive the request that triggered it,
//! and `reqwest_middleware::Next` is borrowed for the lifetime of a single
//! `handle` call. Register other middleware that should see every outbound
//! request (auth, tracing) *below* this one in the builder chain, or have
//! it operate on the client passed into [`CachingConfig::client`] instead.

use std::fmt;
use std::sync::Arc;

use anyhow::anyhow;
use http::Extensions;
use reqwest::{Request, Response, ResponseBuilderExt};
use reqwest_middleware::{Error, Next};
use url::Url;

use rfc_http_cache::{
    Cache as CacheBackend, CacheError, CachingTransport, Entry, FetchError, HttpCacheOptions,
};

/// Everything a [`Cache`] middleware needs: the storage backend, the
/// `reqwest::Client` used for actual network fetches, and the caching
/// policy.
pub struct CachingConfig<C> {
    /// Storage backend.
    pub cache: Arc<C>,
    /// Client used to perform real network requests (both foreground
    /// fetches and background stale-while-revalidate fetches).
    pub client: reqwest::Client,
    /// Caching behavior.
    pub options: HttpCacheOptions,
}

impl<C: fmt::Debug> fmt::Debug for CachingConfig<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachingConfig")
            .field("cache", &self.cache)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// `reqwest-middleware` adapter. Wraps a [`CachingConfig`].
#[derive(Debug)]
pub struct Cache<C: CacheBackend>(pub CachingConfig<C>);

#[async_trait::async_trait]
impl<C: CacheBackend + 'static> reqwest_middleware::Middleware for Cache<C> {
    async fn handle(
        &self,
        req: Request,
        _extensions: &mut Extensions,
        _next: Next<'_>,
    ) -> std::result::Result<Response, Error> {
        let url = req.url().clone();
        let core_request = to_core_request(&req).map_err(Error::Middleware)?;

        let client = self.0.client.clone();
        let transport = CachingTransport::new(
            self.0.cache.clone(),
            move |request| {
                let client = client.clone();
                async move { fetch(&client, request).await }
            },
            self.0.options.clone(),
        );

        let entry = transport.run(core_request).await.map_err(cache_error)?;
        to_reqwest_response(entry, url).map_err(Error::Middleware)
    }
}

async fn fetch(
    client: &reqwest::Client,
    request: http::Request<Vec<u8>>,
) -> std::result::Result<Entry, FetchError> {
    let (parts, body) = request.into_parts();
    let url = Url::parse(&parts.uri.to_string())?;
    let mut builder = client.request(parts.method, url);
    for (name, value) in parts.headers.iter() {
        builder = builder.header(name, value);
    }
    if !body.is_empty() {
        builder = builder.body(body);
    }
    let response = builder.send().await?;
    let status = response.status().as_u16();
    let headers = response
        .headers()
        .iter()
        .map(|(name, value)| {
            (name.as_str().to_string(), value.to_str().unwrap_or_default().to_string())
        })
        .collect();
    let body = response.bytes().await?.to_vec();
    Ok(Entry { status, headers, body })
}

fn to_core_request(
    req: &Request,
) -> std::result::Result<http::Request<Vec<u8>>, anyhow::Error> {
    let mut builder = http::Request::builder().method(req.method().clone()).uri(req.url().as_str());
    for (name, value) in req.headers() {
        builder = builder.header(name, value);
    }
    let body = req.body().and_then(|b| b.as_bytes()).map(<[u8]>::to_vec).unwrap_or_default();
    builder.body(body).map_err(anyhow::Error::from)
}

fn to_reqwest_response(entry: Entry, url: Url) -> std::result::Result<Response, anyhow::Error> {
    let mut builder = http::Response::builder().status(entry.status).url(url);
    for (name, value) in &entry.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    let response = builder.body(entry.body)?;
    Ok(Response::from(response))
}

fn cache_error(e: CacheError) -> Error {
    Error::Middleware(anyhow!(e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rfc_http_cache::MemoryCache;
    use reqwest_middleware::ClientBuilder;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn caches_a_max_age_response_across_two_requests() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/hello"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("cache-control", "max-age=3600")
                    .set_body_string("world"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let cache = Arc::new(MemoryCache::new());
        let client = ClientBuilder::new(reqwest::Client::new())
            .with(Cache(CachingConfig {
                cache,
                client: reqwest::Client::new(),
                options: HttpCacheOptions::default(),
            }))
            .build();

        let url = format!("{}/hello", server.uri());
        let first = client.get(&url).send().await.unwrap();
        assert_eq!(first.status(), 200);
        assert_eq!(first.text().await.unwrap(), "world");

        let second = client.get(&url).send().await.unwrap();
        assert_eq!(second.text().await.unwrap(), "world");

        server.verify().await;
    }
}
