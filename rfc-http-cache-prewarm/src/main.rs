//! CLI front end for [`rfc_http_cache_prewarm`]. Reads either a
//! newline-delimited URL list from a file or a sitemap URL, prewarms a
//! `MemoryCache`-backed client against every URL, and prints aggregate
//! stats.
//!
//! ```text
//! rfc-http-cache-prewarm urls.txt
//! rfc-http-cache-prewarm --sitemap https://example.com/sitemap.xml
//! ```

use std::process::ExitCode;
use std::sync::Arc;

use reqwest_middleware::ClientBuilder;
use rfc_http_cache::{HttpCacheOptions, MemoryCache};
use rfc_http_cache_prewarm::{self as prewarm, PrewarmOptions};
use rfc_http_cache_reqwest::{Cache, CachingConfig};

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let Some(first) = args.next() else {
        eprintln!("usage: rfc-http-cache-prewarm <url-file> | --sitemap <url>");
        return ExitCode::FAILURE;
    };

    let urls = if first == "--sitemap" {
        let Some(sitemap_url) = args.next() else {
            eprintln!("--sitemap requires a URL argument");
            return ExitCode::FAILURE;
        };
        let fetcher = reqwest::Client::new();
        match prewarm::fetch_urls_from_sitemap(&fetcher, &sitemap_url).await {
            Ok(urls) => urls,
            Err(error) => {
                eprintln!("failed to read sitemap: {error}");
                return ExitCode::FAILURE;
            }
        }
    } else {
        match std::fs::read_to_string(&first) {
            Ok(contents) => contents
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with('#'))
                .map(str::to_string)
                .collect(),
            Err(error) => {
                eprintln!("failed to read {first}: {error}");
                return ExitCode::FAILURE;
            }
        }
    };

    if urls.is_empty() {
        eprintln!("no URLs to prewarm");
        return ExitCode::FAILURE;
    }

    let cache = Arc::new(MemoryCache::new());
    let client = ClientBuilder::new(reqwest::Client::new())
        .with(Cache(CachingConfig {
            cache,
            client: reqwest::Client::new(),
            options: HttpCacheOptions::default(),
        }))
        .build();

    let total = urls.len();
    let stats = prewarm::run(
        client,
        urls,
        PrewarmOptions::default(),
        Some(Arc::new(|result: &prewarm::PrewarmResult| {
            log::info!(
                "{} -> {:?} ({} bytes, cache_hit={})",
                result.url,
                result.status,
                result.bytes,
                result.cache_hit
            );
        })),
    )
    .await;

    println!(
        "prewarmed {total} URLs: {} ok, {} failed, {} cache hits, {} bytes total",
        stats.successes, stats.failures, stats.cache_hits, stats.total_bytes
    );
    for error in &stats.errors {
        eprintln!("error: {error}");
    }

    if stats.failures > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
