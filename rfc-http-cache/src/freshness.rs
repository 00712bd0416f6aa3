//! Determines whether a stored entry is fresh, stale, or must be treated
//! transparently, per RFC 9111 §4.2 layered with the stale-while-revalidate
//! / stale-if-error extensions (RFC 5861) the wrapped age/lifetime crate
//! does not itself understand.

use std::time::{Duration, SystemTime};

use http_cache_semantics::{BeforeRequest, CacheOptions, CachePolicy};

use crate::codec::Entry;
use crate::directives::{self, DirectiveSet, MaxStale};

/// The outcome of evaluating a stored entry's freshness against the
/// current request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// The entry may be served as-is, no network contact required.
    Fresh,
    /// The entry is beyond its freshness lifetime. `flags` narrows what
    /// may be done about it.
    Stale(StaleFlags),
    /// The request (e.g. `no-cache`) or response forces revalidation
    /// regardless of age.
    Transparent,
}

/// Sub-flags describing what options a stale entry affords, per §4.4.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StaleFlags {
    /// The request's `max-stale` tolerates this much excess age.
    pub usable_within_max_stale: bool,
    /// The response's `stale-while-revalidate` window still covers this
    /// excess age: serve stale now, refresh in the background.
    pub within_stale_while_revalidate_window: bool,
    /// The response's `stale-if-error` window still covers this excess
    /// age: on a failed revalidation, the stale copy may stand in.
    pub within_stale_if_error_window: bool,
    /// The response (or, in shared-cache mode, `proxy-revalidate`) forbids
    /// serving this stale copy without revalidating first.
    pub must_revalidate: bool,
    /// How many seconds past the freshness lifetime the entry currently
    /// sits.
    pub excess_age_secs: u64,
}

/// Evaluates the freshness of a stored `entry` against the current request
/// directives, current wall-clock time, and whether this instance is
/// acting as a shared (public) cache.
#[must_use]
pub fn classify(
    entry: &Entry,
    request_directives: &DirectiveSet,
    now: SystemTime,
    is_shared: bool,
) -> Classification {
    if request_directives.no_cache {
        return Classification::Transparent;
    }

    let response_directives = directives::response_directives(
        &entry.to_header_map().unwrap_or_default(),
    );

    let (policy, response_time) = match build_policy(entry, is_shared) {
        Some(p) => p,
        None => return Classification::Transparent,
    };
    // Lifetime doesn't depend on `now`; evaluating it at the moment the
    // response was stored gives the max-age/s-maxage/heuristic duration
    // without the already-elapsed age folded in.
    let lifetime = policy.time_to_live(response_time);
    let current_age = policy.age(now);

    match policy.before_request(&dummy_request(), now) {
        BeforeRequest::Fresh(_) => {
            let min_fresh = Duration::from_secs(
                request_directives.min_fresh.unwrap_or(0),
            );
            if current_age + min_fresh < lifetime {
                Classification::Fresh
            } else {
                let excess = (current_age + min_fresh)
                    .saturating_sub(lifetime)
                    .as_secs();
                classify_stale(excess, request_directives, &response_directives, is_shared)
            }
        }
        BeforeRequest::Stale { .. } => {
            let excess = current_age.saturating_sub(lifetime).as_secs();
            classify_stale(excess, request_directives, &response_directives, is_shared)
        }
    }
}

fn classify_stale(
    excess_age_secs: u64,
    request: &DirectiveSet,
    response: &DirectiveSet,
    is_shared: bool,
) -> Classification {
    let usable_within_max_stale = match request.max_stale {
        Some(MaxStale::Unbounded) => true,
        Some(MaxStale::Seconds(n)) => excess_age_secs <= n,
        None => false,
    };
    let within_stale_while_revalidate_window = response
        .stale_while_revalidate
        .is_some_and(|n| excess_age_secs <= n);
    let within_stale_if_error_window =
        response.stale_if_error.is_some_and(|n| excess_age_secs <= n);
    let must_revalidate = response.must_revalidate
        || (is_shared && response.proxy_revalidate);

    Classification::Stale(StaleFlags {
        usable_within_max_stale,
        within_stale_while_revalidate_window,
        within_stale_if_error_window,
        must_revalidate,
        excess_age_secs,
    })
}

fn build_policy(entry: &Entry, is_shared: bool) -> Option<(CachePolicy, SystemTime)> {
    let response_time = parse_stamp(entry, crate::codec::X_RESPONSE_TIME)?;
    let request = dummy_request();
    let mut response = http::Response::builder().status(entry.status).body(()).ok()?;
    *response.headers_mut() = entry.to_header_map().ok()?;
    let options = CacheOptions {
        shared: is_shared,
        ..Default::default()
    };
    let policy = CachePolicy::new_options(&request, &response, response_time, options);
    Some((policy, response_time))
}

fn parse_stamp(entry: &Entry, header: &str) -> Option<SystemTime> {
    entry.header(header).and_then(|v| httpdate::parse_http_date(v).ok())
}

fn dummy_request() -> http::Request<()> {
    http::Request::builder().method("GET").uri("/").body(()).unwrap()
}
