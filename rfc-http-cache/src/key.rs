//! Derives the opaque storage key for a request, per §4.5: a SHA-256 hash
//! of the method, a canonicalized URL, and any `Vary`-selected request
//! header values, so the key itself never leaks readable URLs or header
//! content to a storage backend.

use sha2::{Digest, Sha256};
use url::Url;

use crate::error::{CacheError, Result};

/// Canonicalizes a URL for cache-key purposes: lowercases the scheme and
/// host, drops a default port for the scheme, and leaves path, query, and
/// fragment untouched (the fragment is never sent to an origin, but we
/// keep it out of the key by using [`Url::as_str`] without it below).
pub fn canonicalize_url(raw: &str) -> Result<String> {
    let mut url = Url::parse(raw).map_err(CacheError::InvalidUrl)?;
    url.set_fragment(None);

    let scheme = url.scheme().to_ascii_lowercase();
    let is_default_port = matches!(
        (scheme.as_str(), url.port()),
        ("http", Some(80)) | ("https", Some(443))
    );
    if is_default_port {
        let _ = url.set_port(None);
    }

    if let Some(host) = url.host_str() {
        let lower = host.to_ascii_lowercase();
        if lower != host {
            url.set_host(Some(&lower)).map_err(CacheError::InvalidUrl)?;
        }
    }
    if url.scheme() != scheme {
        let _ = url.set_scheme(&scheme);
    }

    Ok(url.as_str().to_string())
}

/// Derives the opaque cache key for a request.
///
/// `method` and `url` identify the request; `vary_headers` carries the
/// already-resolved `(name, value)` pairs for whatever headers a prior
/// response's `Vary` told us to key on (empty for a first-time lookup,
/// where the caller hashes on method+URL alone and lets a `Vary` mismatch
/// be caught after retrieval).
#[must_use]
pub fn derive(method: &str, canonical_url: &str, vary_headers: &[(String, String)]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(method.to_ascii_uppercase().as_bytes());
    hasher.update(b"\0");
    hasher.update(canonical_url.as_bytes());
    for (name, value) in vary_headers {
        hasher.update(b"\0");
        hasher.update(name.to_ascii_lowercase().as_bytes());
        hasher.update(b"=");
        hasher.update(value.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Derives the base cache key (no `Vary` header values folded in yet),
/// used for the initial storage lookup before a stored entry's own `Vary`
/// header is known.
pub fn derive_base(method: &str, raw_url: &str) -> Result<String> {
    let canonical = canonicalize_url(raw_url)?;
    Ok(derive(method, &canonical, &[]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalizes_scheme_and_host_case() {
        let a = canonicalize_url("HTTP://Example.COM/path").unwrap();
        let b = canonicalize_url("http://example.com/path").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn strips_default_port_but_keeps_nondefault() {
        let a = canonicalize_url("http://example.com:80/x").unwrap();
        let b = canonicalize_url("http://example.com/x").unwrap();
        assert_eq!(a, b);
        let c = canonicalize_url("http://example.com:8080/x").unwrap();
        assert!(c.contains("8080"));
    }

    #[test]
    fn strips_fragment_but_keeps_query() {
        let url = canonicalize_url("http://example.com/x?q=1#frag").unwrap();
        assert!(url.contains("q=1"));
        assert!(!url.contains("frag"));
    }

    #[test]
    fn same_request_produces_same_key() {
        let a = derive_base("GET", "http://example.com/x").unwrap();
        let b = derive_base("get", "http://EXAMPLE.com/x").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn different_methods_produce_different_keys() {
        let a = derive_base("GET", "http://example.com/x").unwrap();
        let b = derive_base("POST", "http://example.com/x").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn vary_header_values_change_the_key() {
        let url = canonicalize_url("http://example.com/x").unwrap();
        let a = derive("GET", &url, &[("accept-encoding".into(), "gzip".into())]);
        let b = derive("GET", &url, &[("accept-encoding".into(), "br".into())]);
        assert_ne!(a, b);
    }

    #[test]
    fn key_is_not_a_readable_url() {
        let key = derive_base("GET", "http://example.com/secret-path").unwrap();
        assert!(!key.contains("secret-path"));
        assert_eq!(key.len(), 64);
    }
}
