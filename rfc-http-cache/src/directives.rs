//! Parses `Cache-Control` (and `Pragma` fallback) headers into a structured
//! [`DirectiveSet`], per RFC 9111 §5.2.

use std::collections::HashMap;

use http::HeaderMap;

/// Either a bounded number of seconds or "unbounded" (a bare `max-stale`
/// with no value, meaning any staleness is acceptable).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaxStale {
    /// A specific number of seconds of staleness is tolerable.
    Seconds(u64),
    /// Any staleness is tolerable.
    Unbounded,
}

/// A parsed set of `Cache-Control` directives. Unknown tokens are retained
/// opaquely but never influence behavior.
#[derive(Debug, Clone, Default)]
pub struct DirectiveSet {
    /// `no-cache` (request or response).
    pub no_cache: bool,
    /// `no-store`.
    pub no_store: bool,
    /// `public`.
    pub public: bool,
    /// `private`.
    pub private: bool,
    /// `must-revalidate`.
    pub must_revalidate: bool,
    /// `proxy-revalidate`.
    pub proxy_revalidate: bool,
    /// `max-age=N`.
    pub max_age: Option<u64>,
    /// `s-maxage=N`.
    pub s_maxage: Option<u64>,
    /// `max-stale` or `max-stale=N`.
    pub max_stale: Option<MaxStale>,
    /// `min-fresh=N`.
    pub min_fresh: Option<u64>,
    /// `stale-while-revalidate=N`.
    pub stale_while_revalidate: Option<u64>,
    /// `stale-if-error=N`.
    pub stale_if_error: Option<u64>,
    /// `only-if-cached`.
    pub only_if_cached: bool,
    /// `immutable`.
    pub immutable: bool,
    /// Any directive not recognized above, retained verbatim (lowercased
    /// name, raw value).
    pub extensions: HashMap<String, Option<String>>,
}

fn parse_non_negative(raw: &str) -> Option<u64> {
    raw.trim().parse::<u64>().ok()
}

/// Parses a raw `Cache-Control` header value (possibly comma-separated,
/// possibly repeated) into a [`DirectiveSet`]. Token matching is
/// case-insensitive.
#[must_use]
pub fn parse_cache_control<'a>(
    values: impl Iterator<Item = &'a str>,
) -> DirectiveSet {
    let mut set = DirectiveSet::default();
    for value in values {
        for token in split_directives(value) {
            let (name, arg) = match token.split_once('=') {
                Some((n, v)) => (n.trim(), Some(unquote(v.trim()))),
                None => (token.trim(), None),
            };
            let lower = name.to_ascii_lowercase();
            match lower.as_str() {
                "no-cache" => set.no_cache = true,
                "no-store" => set.no_store = true,
                "public" => set.public = true,
                "private" => set.private = true,
                "must-revalidate" => set.must_revalidate = true,
                "proxy-revalidate" => set.proxy_revalidate = true,
                "immutable" => set.immutable = true,
                "only-if-cached" => set.only_if_cached = true,
                "max-age" => {
                    set.max_age = arg.as_deref().and_then(parse_non_negative);
                }
                "s-maxage" => {
                    set.s_maxage =
                        arg.as_deref().and_then(parse_non_negative);
                }
                "min-fresh" => {
                    set.min_fresh =
                        arg.as_deref().and_then(parse_non_negative);
                }
                "stale-while-revalidate" => {
                    set.stale_while_revalidate =
                        arg.as_deref().and_then(parse_non_negative);
                }
                "stale-if-error" => {
                    set.stale_if_error =
                        arg.as_deref().and_then(parse_non_negative);
                }
                "max-stale" => {
                    set.max_stale = Some(match arg.as_deref() {
                        Some(v) => parse_non_negative(v)
                            .map(MaxStale::Seconds)
                            .unwrap_or(MaxStale::Unbounded),
                        None => MaxStale::Unbounded,
                    });
                }
                "" => {}
                other => {
                    set.extensions.insert(other.to_string(), arg);
                }
            }
        }
    }
    set
}

/// Splits a `Cache-Control` header value on top-level commas, respecting
/// double-quoted values that may themselves contain commas.
fn split_directives(value: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;
    for (i, ch) in value.char_indices() {
        match ch {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                out.push(&value[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    out.push(&value[start..]);
    out
}

fn unquote(value: &str) -> String {
    value.trim_matches('"').to_string()
}

/// Parses the directives carried by a request: `Cache-Control`, falling
/// back to `Pragma: no-cache` when no `Cache-Control` header is present at
/// all (HTTP/1.0 compatibility, RFC 9111 §5.4).
#[must_use]
pub fn request_directives(headers: &HeaderMap) -> DirectiveSet {
    let cc_values: Vec<&str> = headers
        .get_all(http::header::CACHE_CONTROL)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect();
    if cc_values.is_empty() {
        if let Some(pragma) =
            headers.get(http::header::PRAGMA).and_then(|v| v.to_str().ok())
        {
            if pragma
                .split(',')
                .any(|tok| tok.trim().eq_ignore_ascii_case("no-cache"))
            {
                let mut set = DirectiveSet::default();
                set.no_cache = true;
                return set;
            }
        }
        return DirectiveSet::default();
    }
    parse_cache_control(cc_values.into_iter())
}

/// Parses the directives carried by a response's `Cache-Control` header.
#[must_use]
pub fn response_directives(headers: &HeaderMap) -> DirectiveSet {
    parse_cache_control(
        headers
            .get_all(http::header::CACHE_CONTROL)
            .iter()
            .filter_map(|v| v.to_str().ok()),
    )
}

/// Reads the `Age` header per RFC 9111 §5.1: if multiple occurrences exist,
/// use the first and log a warning; if the value is negative or
/// non-numeric, ignore the header entirely.
#[must_use]
pub fn parse_age_header(headers: &HeaderMap) -> Option<u64> {
    let mut values = headers.get_all(http::header::AGE).iter();
    let first = values.next()?;
    if values.next().is_some() {
        log::warn!("multiple Age headers present; using the first occurrence");
    }
    first.to_str().ok().and_then(parse_non_negative)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_basic_directives() {
        let set = parse_cache_control(
            ["max-age=60, must-revalidate, private"].into_iter(),
        );
        assert_eq!(set.max_age, Some(60));
        assert!(set.must_revalidate);
        assert!(set.private);
    }

    #[test]
    fn parses_bare_max_stale_as_unbounded() {
        let set = parse_cache_control(["max-stale"].into_iter());
        assert_eq!(set.max_stale, Some(MaxStale::Unbounded));
    }

    #[test]
    fn parses_bounded_max_stale() {
        let set = parse_cache_control(["max-stale=30"].into_iter());
        assert_eq!(set.max_stale, Some(MaxStale::Seconds(30)));
    }

    #[test]
    fn unknown_tokens_are_retained_but_inert() {
        let set = parse_cache_control(["foo=bar, no-store"].into_iter());
        assert!(set.no_store);
        assert_eq!(set.extensions.get("foo"), Some(&Some("bar".to_string())));
    }

    #[test]
    fn quoted_values_with_commas_split_correctly() {
        let set =
            parse_cache_control([r#"no-cache="set-cookie", max-age=5"#].into_iter());
        assert!(set.no_cache);
        assert_eq!(set.max_age, Some(5));
    }

    #[test]
    fn pragma_no_cache_fallback_without_cache_control() {
        let mut headers = HeaderMap::new();
        headers.insert(http::header::PRAGMA, "no-cache".parse().unwrap());
        let set = request_directives(&headers);
        assert!(set.no_cache);
    }

    #[test]
    fn cache_control_takes_precedence_over_pragma() {
        let mut headers = HeaderMap::new();
        headers.insert(http::header::PRAGMA, "no-cache".parse().unwrap());
        headers
            .insert(http::header::CACHE_CONTROL, "max-age=10".parse().unwrap());
        let set = request_directives(&headers);
        assert!(!set.no_cache);
        assert_eq!(set.max_age, Some(10));
    }

    #[test]
    fn age_header_first_wins() {
        let mut headers = HeaderMap::new();
        headers.append(http::header::AGE, "5".parse().unwrap());
        headers.append(http::header::AGE, "100".parse().unwrap());
        assert_eq!(parse_age_header(&headers), Some(5));
    }

    #[test]
    fn age_header_negative_is_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(http::header::AGE, "-5".parse().unwrap());
        assert_eq!(parse_age_header(&headers), None);
    }
}
