//! Builds conditional requests against a stale stored entry and interprets
//! the origin's response, per RFC 9111 §4.3 and the stale-if-error
//! extension (RFC 5861 §4).

use std::time::SystemTime;

use http::{HeaderValue, Request};

use crate::codec::Entry;
use crate::error::{CacheError, Result};

/// What the caller should do after a revalidation attempt.
#[derive(Debug)]
pub enum Outcome {
    /// A 304 merged into the stored entry, or a fresh 2xx replacing it
    /// outright. Either way, `entry` is what should now be stored and
    /// returned; `replaced` distinguishes the two cases for storage
    /// decisions upstream.
    Updated {
        /// The entry to store and to return to the caller.
        entry: Entry,
        /// True if the origin sent a new body (2xx); false if only
        /// headers were merged (304).
        replaced: bool,
    },
    /// The origin could not be revalidated, but the stale entry is
    /// eligible to stand in (`stale-if-error` or equivalent policy).
    ServeStale {
        /// The stale entry to serve, annotated by the caller with
        /// `Warning: 111` and `X-Stale: 1`.
        entry: Entry,
    },
    /// The origin returned a non-304, non-5xx-fallback-eligible response;
    /// pass it through as a cache miss.
    Passthrough {
        /// The entry straight from the origin.
        entry: Entry,
    },
}

/// Builds the conditional revalidation request for `stored`, adding
/// `If-None-Match` / `If-Modified-Since` from whatever validators the
/// stored entry carries, on top of `base`.
pub fn build_conditional_request(
    base: Request<Vec<u8>>,
    stored: &Entry,
) -> Result<Request<Vec<u8>>> {
    let (mut parts, body) = base.into_parts();
    if let Some(etag) = stored.header("etag") {
        parts.headers.insert(
            http::header::IF_NONE_MATCH,
            HeaderValue::from_str(etag).map_err(CacheError::from)?,
        );
    }
    if let Some(last_modified) = stored.header("last-modified") {
        parts.headers.insert(
            http::header::IF_MODIFIED_SINCE,
            HeaderValue::from_str(last_modified).map_err(CacheError::from)?,
        );
    }
    Ok(Request::from_parts(parts, body))
}

/// Interprets the origin's response to a conditional request against
/// `stored`, per §4.6. `may_serve_stale_on_error` is true when the stored
/// entry still falls within its `stale-if-error` window (or an equivalent
/// operator policy) so a 5xx can fall back to the stale copy.
pub fn interpret(
    stored: Entry,
    response: Entry,
    may_serve_stale_on_error: bool,
    now: SystemTime,
) -> Outcome {
    if response.status / 100 == 5 {
        if may_serve_stale_on_error {
            return Outcome::ServeStale { entry: annotate_revalidation_failed(stored) };
        }
        return Outcome::Passthrough { entry: response };
    }

    if response.status == 304 {
        let mut merged = stored;
        merge_not_modified(&mut merged, &response);
        merged.stamp_times(now, now);
        return Outcome::Updated { entry: merged, replaced: false };
    }

    if (200..300).contains(&response.status) {
        let mut replaced = response;
        replaced.stamp_times(now, now);
        return Outcome::Updated { entry: replaced, replaced: true };
    }

    Outcome::Passthrough { entry: response }
}

/// Merges the headers of a 304 response into the stored entry per RFC 9111
/// §4.3.4: every header present in the 304 replaces the stored header of
/// the same name, except the body-framing headers, which the origin's
/// (empty) 304 body has nothing meaningful to say about.
fn merge_not_modified(stored: &mut Entry, not_modified: &Entry) {
    const PRESERVE: &[&str] = &["content-length", "content-encoding", "content-type"];
    let grouped = group_by_name(&not_modified.headers);
    for (name, values) in grouped {
        if PRESERVE.iter().any(|p| p.eq_ignore_ascii_case(&name)) {
            continue;
        }
        if name.eq_ignore_ascii_case("warning") {
            // 1xx warnings describe transport-local conditions that no
            // longer apply once a fresher response has been validated.
            let all_1xx = values
                .iter()
                .all(|v| v.chars().take(1).collect::<String>() == "1");
            if all_1xx {
                continue;
            }
        }
        stored.remove_header(&name);
        for value in values {
            stored.append_header(&name, value);
        }
    }
}

fn group_by_name(headers: &[(String, String)]) -> Vec<(String, Vec<String>)> {
    let mut order: Vec<String> = Vec::new();
    let mut map: std::collections::HashMap<String, Vec<String>> =
        std::collections::HashMap::new();
    for (name, value) in headers {
        let lower = name.to_ascii_lowercase();
        if !map.contains_key(&lower) {
            order.push(lower.clone());
        }
        map.entry(lower).or_default().push(value.clone());
    }
    order
        .into_iter()
        .map(|name| {
            let values = map.remove(&name).unwrap_or_default();
            (name, values)
        })
        .collect()
}

fn annotate_revalidation_failed(mut entry: Entry) -> Entry {
    entry.remove_header("warning");
    entry.append_header("warning", "111 - \"Revalidation Failed\"");
    entry
}
