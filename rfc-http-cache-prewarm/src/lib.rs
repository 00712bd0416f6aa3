#![forbid(unsafe_code)]
#![deny(missing_debug_implementations, unused_qualifications)]
//! Given a URL list or a sitemap, issues GET requests through a
//! cache-backed `reqwest_middleware` client to populate the cache ahead of
//! real traffic, with bounded concurrency and per-URL progress reporting.

pub mod sitemap;

use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest_middleware::ClientWithMiddleware;

pub use sitemap::{fetch_urls_from_sitemap, SitemapError};

/// Per-URL outcome of a prewarm run.
#[derive(Debug, Clone)]
pub struct PrewarmResult {
    /// The URL requested.
    pub url: String,
    /// True if the request completed with a non-error HTTP status.
    pub success: bool,
    /// The HTTP status, if a response was received at all.
    pub status: Option<u16>,
    /// Wall-clock time for this single request.
    pub duration: Duration,
    /// Response body size in bytes.
    pub bytes: u64,
    /// Whether `X-From-Cache` was set on the response.
    pub cache_hit: bool,
    /// Error message, if the request failed.
    pub error: Option<String>,
}

/// Totals across an entire prewarm run.
#[derive(Debug, Clone, Default)]
pub struct PrewarmStats {
    /// URLs attempted.
    pub total: usize,
    /// Requests that completed with a non-error status.
    pub successes: usize,
    /// Requests that errored or returned an error status.
    pub failures: usize,
    /// Requests served from cache.
    pub cache_hits: usize,
    /// Sum of response body bytes across all requests.
    pub total_bytes: u64,
    /// Sum of per-request durations (not wall-clock, since requests run
    /// concurrently).
    pub total_duration: Duration,
    /// Error messages from failed requests, in completion order.
    pub errors: Vec<String>,
}

impl PrewarmStats {
    fn record(&mut self, result: &PrewarmResult) {
        self.total += 1;
        if result.success {
            self.successes += 1;
        } else {
            self.failures += 1;
        }
        if result.cache_hit {
            self.cache_hits += 1;
        }
        self.total_bytes += result.bytes;
        self.total_duration += result.duration;
        if let Some(error) = &result.error {
            self.errors.push(error.clone());
        }
    }
}

/// Configuration for a prewarm run.
#[derive(Debug, Clone)]
pub struct PrewarmOptions {
    /// Maximum number of requests in flight at once.
    pub concurrency: usize,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// `User-Agent` header to send, if any.
    pub user_agent: Option<String>,
    /// Add `Cache-Control: no-cache` to every request, forcing
    /// revalidation of any entry already cached.
    pub force_refresh: bool,
}

impl Default for PrewarmOptions {
    fn default() -> Self {
        Self {
            concurrency: 8,
            request_timeout: Duration::from_secs(30),
            user_agent: None,
            force_refresh: false,
        }
    }
}

/// Issues a GET for every URL in `urls` through `client`, honoring
/// `options.concurrency` via a bounded worker pool, and returns aggregate
/// stats. `progress`, if given, is invoked once per completed request (it
/// may be called concurrently from different workers).
pub async fn run(
    client: ClientWithMiddleware,
    urls: Vec<String>,
    options: PrewarmOptions,
    progress: Option<Arc<dyn Fn(&PrewarmResult) + Send + Sync>>,
) -> PrewarmStats {
    let semaphore = Arc::new(tokio::sync::Semaphore::new(options.concurrency.max(1)));
    let mut tasks = Vec::with_capacity(urls.len());

    for url in urls {
        let semaphore = Arc::clone(&semaphore);
        let client = client.clone();
        let options = options.clone();
        tasks.push(tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore is never closed");
            fetch_one(&client, url, &options).await
        }));
    }

    let mut stats = PrewarmStats::default();
    for task in tasks {
        let result = match task.await {
            Ok(result) => result,
            Err(join_error) => PrewarmResult {
                url: String::new(),
                success: false,
                status: None,
                duration: Duration::default(),
                bytes: 0,
                cache_hit: false,
                error: Some(join_error.to_string()),
            },
        };
        if let Some(progress) = &progress {
            progress(&result);
        }
        stats.record(&result);
    }
    stats
}

async fn fetch_one(
    client: &ClientWithMiddleware,
    url: String,
    options: &PrewarmOptions,
) -> PrewarmResult {
    let started = Instant::now();
    let mut builder = client.get(&url).timeout(options.request_timeout);
    if let Some(user_agent) = &options.user_agent {
        builder = builder.header(reqwest::header::USER_AGENT, user_agent.clone());
    }
    if options.force_refresh {
        builder = builder.header(reqwest::header::CACHE_CONTROL, "no-cache");
    }

    match builder.send().await {
        Ok(response) => {
            let status = response.status().as_u16();
            let cache_hit = response
                .headers()
                .get(rfc_http_cache::transport::X_FROM_CACHE)
                .is_some();
            match response.bytes().await {
                Ok(body) => PrewarmResult {
                    url,
                    success: (200..400).contains(&status),
                    status: Some(status),
                    duration: started.elapsed(),
                    bytes: body.len() as u64,
                    cache_hit,
                    error: None,
                },
                Err(error) => PrewarmResult {
                    url,
                    success: false,
                    status: Some(status),
                    duration: started.elapsed(),
                    bytes: 0,
                    cache_hit,
                    error: Some(error.to_string()),
                },
            }
        }
        Err(error) => PrewarmResult {
            url,
            success: false,
            status: None,
            duration: started.elapsed(),
            bytes: 0,
            cache_hit: false,
            error: Some(error.to_string()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest_middleware::ClientBuilder;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn runs_every_url_and_aggregates_stats() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let client = ClientBuilder::new(reqwest::Client::new()).build();
        let urls = vec![
            format!("{}/a", server.uri()),
            format!("{}/b", server.uri()),
            format!("{}/c", server.uri()),
        ];

        let progress_count = Arc::new(AtomicUsize::new(0));
        let counted = progress_count.clone();
        let stats = run(
            client,
            urls,
            PrewarmOptions { concurrency: 2, ..PrewarmOptions::default() },
            Some(Arc::new(move |_: &PrewarmResult| {
                counted.fetch_add(1, Ordering::SeqCst);
            })),
        )
        .await;

        assert_eq!(stats.total, 3);
        assert_eq!(stats.successes, 3);
        assert_eq!(stats.failures, 0);
        assert_eq!(progress_count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn unreachable_host_is_recorded_as_a_failure() {
        let client = ClientBuilder::new(reqwest::Client::new()).build();
        let stats = run(
            client,
            vec!["http://127.0.0.1:1/nope".to_string()],
            PrewarmOptions::default(),
            None,
        )
        .await;
        assert_eq!(stats.total, 1);
        assert_eq!(stats.failures, 1);
        assert_eq!(stats.errors.len(), 1);
    }
}
