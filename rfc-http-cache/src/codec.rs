//! Encodes/decodes an HTTP response into a self-describing byte stream for
//! storage, stripping hop-by-hop headers and preserving header order and
//! duplicates exactly.

use std::time::SystemTime;

use http::HeaderMap;
use serde::{Deserialize, Serialize};

use crate::error::{CacheError, Result};

/// Bookkeeping header recording when the originating request started.
pub const X_REQUEST_TIME: &str = "x-request-time";
/// Bookkeeping header recording when the response was received.
pub const X_RESPONSE_TIME: &str = "x-response-time";

const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// A self-contained, storable HTTP response: status, ordered headers
/// (duplicates preserved), and body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Entry {
    /// HTTP status code.
    pub status: u16,
    /// Ordered `(name, value)` header pairs, duplicates preserved.
    pub headers: Vec<(String, String)>,
    /// Response body bytes.
    pub body: Vec<u8>,
}

impl Entry {
    /// Returns the first value of the named header (case-insensitive), if
    /// present.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns all values of the named header, in stored order.
    pub fn header_all<'a>(
        &'a self,
        name: &'a str,
    ) -> impl Iterator<Item = &'a str> + 'a {
        self.headers
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Replaces all occurrences of a header with a single new value,
    /// appending it if absent. Used for the 304-merge (§4.6) where a
    /// header "of the same name" is replaced wholesale.
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.headers.push((name.to_string(), value.into()));
    }

    /// Appends a header value without removing existing ones with the
    /// same name (used for stacking distinct `Warning` entries).
    pub fn append_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.push((name.to_string(), value.into()));
    }

    /// Removes all occurrences of a header.
    pub fn remove_header(&mut self, name: &str) {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
    }

    /// Converts the stored headers into an [`http::HeaderMap`].
    pub fn to_header_map(&self) -> Result<HeaderMap> {
        let mut map = HeaderMap::new();
        for (name, value) in &self.headers {
            let name: http::HeaderName = name.parse()?;
            let value: http::HeaderValue = value.parse()?;
            map.append(name, value);
        }
        Ok(map)
    }

    /// Stamps the request/response bookkeeping timestamps used by the
    /// freshness evaluator, at second precision.
    pub fn stamp_times(
        &mut self,
        request_time: SystemTime,
        response_time: SystemTime,
    ) {
        self.set_header(X_REQUEST_TIME, httpdate::fmt_http_date(request_time));
        self.set_header(
            X_RESPONSE_TIME,
            httpdate::fmt_http_date(response_time),
        );
    }
}

/// Returns true if `name` is hop-by-hop and must be stripped before
/// storage, per RFC 9111 / RFC 9110 §7.6.1: the fixed list plus any header
/// named in a `Connection` header.
#[must_use]
pub fn is_hop_by_hop(name: &str, connection_extras: &[String]) -> bool {
    let lower = name.to_ascii_lowercase();
    HOP_BY_HOP.contains(&lower.as_str())
        || connection_extras.iter().any(|h| h.eq_ignore_ascii_case(&lower))
}

/// Strips hop-by-hop headers (the fixed list, plus any named in a
/// `Connection` header) from a raw header list, returning the remainder in
/// order.
#[must_use]
pub fn strip_hop_by_hop(
    headers: Vec<(String, String)>,
) -> Vec<(String, String)> {
    let connection_extras: Vec<String> = headers
        .iter()
        .filter(|(k, _)| k.eq_ignore_ascii_case("connection"))
        .flat_map(|(_, v)| v.split(',').map(|s| s.trim().to_string()))
        .collect();
    headers
        .into_iter()
        .filter(|(k, _)| !is_hop_by_hop(k, &connection_extras))
        .collect()
}

/// Serializes an [`Entry`] to bytes for handing to a [`crate::Cache`]
/// backend.
pub fn encode(entry: &Entry) -> Result<Vec<u8>> {
    postcard::to_allocvec(entry).map_err(|source| CacheError::DecodeCorrupt {
        key: String::new(),
        source,
    })
}

/// Deserializes bytes previously produced by [`encode`] back into an
/// [`Entry`]. `key` is used only to annotate a decode failure.
pub fn decode(bytes: &[u8], key: &str) -> Result<Entry> {
    postcard::from_bytes(bytes).map_err(|source| CacheError::DecodeCorrupt {
        key: key.to_string(),
        source,
    })
}
