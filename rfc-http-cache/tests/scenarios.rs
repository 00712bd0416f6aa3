//! End-to-end scenarios against the public API: each test drives
//! [`CachingTransport`] through a fake network closure and a real
//! [`MemoryCache`], the way a caller wires the crate up in practice.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use http::Request;
use rfc_http_cache::transport::{X_CACHE_FRESHNESS, X_FROM_CACHE, X_STALE};
use rfc_http_cache::{codec, key, Cache, CachingTransport, Entry, HttpCacheOptions, MemoryCache};

fn get(uri: &str) -> Request<Vec<u8>> {
    Request::builder().method("GET").uri(uri).body(Vec::new()).unwrap()
}

fn entry(status: u16, headers: &[(&str, &str)], body: &[u8]) -> Entry {
    Entry {
        status,
        headers: headers.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
        body: body.to_vec(),
    }
}

/// Stores `entry` directly, stamped as if its response arrived `age` ago.
async fn seed(cache: &MemoryCache, key: &str, mut entry: Entry, age: Duration) {
    let response_time = SystemTime::now() - age;
    entry.stamp_times(response_time, response_time);
    cache.set(key, codec::encode(&entry).unwrap()).await.unwrap();
}

async fn wait_until<F: Fn() -> bool>(condition: F, timeout: Duration) {
    let deadline = tokio::time::Instant::now() + timeout;
    while !condition() {
        if tokio::time::Instant::now() >= deadline {
            panic!("condition not met within {timeout:?}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Polls an async condition (here, reading back the cache) until it's true
/// or `timeout` elapses.
async fn wait_until_async<F, Fut>(mut condition: F, timeout: Duration)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while !condition().await {
        if tokio::time::Instant::now() >= deadline {
            panic!("condition not met within {timeout:?}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn scenario_a_fresh_hit_carries_an_age_and_no_warning() {
    let cache = Arc::new(MemoryCache::new());
    let transport = CachingTransport::new(
        cache,
        |_req| async move { Ok(entry(200, &[("cache-control", "max-age=3600")], b"hello")) },
        HttpCacheOptions::default(),
    );

    let first = transport.run(get("http://example.com/x")).await.unwrap();
    assert!(first.header(X_FROM_CACHE).is_none());
    assert_eq!(first.body, b"hello");

    let second = transport.run(get("http://example.com/x")).await.unwrap();
    assert_eq!(second.header(X_FROM_CACHE), Some("1"));
    assert_eq!(second.body, b"hello");
    assert!(second.header("age").is_some());
    assert!(second.header("warning").is_none());
}

#[tokio::test]
async fn scenario_b_stale_while_revalidate_serves_immediately_then_refreshes() {
    let cache = Arc::new(MemoryCache::new());
    let base_key = key::derive_base("GET", "http://example.com/swr").unwrap();
    seed(
        &cache,
        &base_key,
        entry(200, &[("cache-control", "max-age=1, stale-while-revalidate=10")], b"stale-body"),
        Duration::from_secs(2),
    )
    .await;

    let calls = Arc::new(AtomicUsize::new(0));
    let calls2 = calls.clone();
    let transport = CachingTransport::new(
        cache.clone(),
        move |_req| {
            let calls2 = calls2.clone();
            async move {
                calls2.fetch_add(1, Ordering::SeqCst);
                Ok(entry(
                    200,
                    &[("cache-control", "max-age=1, stale-while-revalidate=10")],
                    b"fresh-body",
                ))
            }
        },
        HttpCacheOptions::default(),
    );

    let served = transport.run(get("http://example.com/swr")).await.unwrap();
    assert_eq!(served.body, b"stale-body");
    assert_eq!(served.header(X_FROM_CACHE), Some("1"));
    assert_eq!(served.header(X_CACHE_FRESHNESS), Some("stale-while-revalidate"));
    assert!(served.header("warning").unwrap().starts_with("110"));

    wait_until(|| calls.load(Ordering::SeqCst) == 1, Duration::from_secs(2)).await;

    wait_until_async(
        || async {
            let Some(bytes) = cache.get(&base_key).await.unwrap() else { return false };
            codec::decode(&bytes, &base_key).unwrap().body == b"fresh-body"
        },
        Duration::from_secs(2),
    )
    .await;
}

#[tokio::test]
async fn scenario_c_stale_if_error_serves_the_last_good_body_on_server_error() {
    let cache = Arc::new(MemoryCache::new());
    let base_key = key::derive_base("GET", "http://example.com/sie").unwrap();
    seed(
        &cache,
        &base_key,
        entry(200, &[("cache-control", "max-age=1, stale-if-error=10")], b"ok"),
        Duration::from_secs(2),
    )
    .await;

    let transport = CachingTransport::new(
        cache,
        |_req| async move { Ok(entry(500, &[], b"")) },
        HttpCacheOptions::default(),
    );

    let served = transport.run(get("http://example.com/sie")).await.unwrap();
    assert_eq!(served.status, 200);
    assert_eq!(served.body, b"ok");
    assert_eq!(served.header(X_STALE), Some("1"));
    assert!(served.header("warning").unwrap().starts_with("111"));
}

#[tokio::test]
async fn scenario_d_post_invalidates_request_uri_and_location_target() {
    let cache = Arc::new(MemoryCache::new());
    let resource_key = key::derive_base("GET", "http://example.com/resource").unwrap();
    let created_key = key::derive_base("GET", "http://example.com/resource/42").unwrap();
    cache
        .set(&resource_key, codec::encode(&entry(200, &[], b"cached")).unwrap())
        .await
        .unwrap();
    cache
        .set(&created_key, codec::encode(&entry(200, &[], b"also cached")).unwrap())
        .await
        .unwrap();

    let transport = CachingTransport::new(
        cache.clone(),
        |_req| async move {
            Ok(entry(200, &[("location", "/resource/42")], b"created"))
        },
        HttpCacheOptions::default(),
    );

    let post = Request::builder()
        .method("POST")
        .uri("http://example.com/resource")
        .body(Vec::new())
        .unwrap();
    transport.run(post).await.unwrap();

    assert_eq!(cache.get(&resource_key).await.unwrap(), None);
    assert_eq!(cache.get(&created_key).await.unwrap(), None);
}

#[tokio::test]
async fn scenario_e_cache_key_headers_isolate_per_subject_entries() {
    let cache = Arc::new(MemoryCache::new());
    let calls = Arc::new(AtomicUsize::new(0));
    let calls2 = calls.clone();
    let options = HttpCacheOptions {
        cache_key_headers: vec!["authorization".to_string()],
        ..HttpCacheOptions::default()
    };
    let transport = CachingTransport::new(
        cache,
        move |req| {
            let calls2 = calls2.clone();
            async move {
                calls2.fetch_add(1, Ordering::SeqCst);
                let who = req
                    .headers()
                    .get(http::header::AUTHORIZATION)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("anon")
                    .to_string();
                Ok(entry(200, &[("cache-control", "max-age=3600")], who.as_bytes()))
            }
        },
        options,
    );

    let request_for = |token: &str| {
        Request::builder()
            .method("GET")
            .uri("http://example.com/profile")
            .header(http::header::AUTHORIZATION, token)
            .body(Vec::new())
            .unwrap()
    };

    let a1 = transport.run(request_for("Bearer A")).await.unwrap();
    assert_eq!(a1.body, b"Bearer A");

    let b1 = transport.run(request_for("Bearer B")).await.unwrap();
    assert_eq!(b1.body, b"Bearer B");
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    let a2 = transport.run(request_for("Bearer A")).await.unwrap();
    assert_eq!(a2.body, b"Bearer A");
    assert_eq!(a2.header(X_FROM_CACHE), Some("1"));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn invariant_no_store_response_never_reaches_the_backend() {
    let cache = Arc::new(MemoryCache::new());
    let transport = CachingTransport::new(
        cache.clone(),
        |_req| async move { Ok(entry(200, &[("cache-control", "no-store")], b"secret")) },
        HttpCacheOptions::default(),
    );
    transport.run(get("http://example.com/secret")).await.unwrap();
    assert!(cache.is_empty().await);
}

#[tokio::test]
async fn invariant_shared_cache_refuses_authorization_without_public_directive() {
    let cache = Arc::new(MemoryCache::new());
    let options = HttpCacheOptions { is_public_cache: true, ..HttpCacheOptions::default() };
    let calls = Arc::new(AtomicUsize::new(0));
    let calls2 = calls.clone();
    let transport = CachingTransport::new(
        cache,
        move |_req| {
            let calls2 = calls2.clone();
            async move {
                calls2.fetch_add(1, Ordering::SeqCst);
                Ok(entry(200, &[("cache-control", "max-age=3600")], b"private"))
            }
        },
        options,
    );
    let req = Request::builder()
        .method("GET")
        .uri("http://example.com/me")
        .header(http::header::AUTHORIZATION, "Bearer token")
        .body(Vec::new())
        .unwrap();
    transport.run(req.clone()).await.unwrap();
    transport.run(req).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}
