use thiserror::Error;

/// A `Result` typedef to use with [`CacheError`].
pub type Result<T> = std::result::Result<T, CacheError>;

/// The error taxonomy for the cache core, per the error handling design:
/// storage-absent is not an error (it is `Ok(None)`), everything else below
/// is a distinct, loggable failure domain.
#[derive(Error, Debug)]
pub enum CacheError {
    /// The backend's `Get`/`Set`/`Delete` failed. Logged at `warn`; the
    /// transport treats this as a miss on read and a best-effort failure on
    /// write, never surfacing it to the caller.
    #[error("cache storage I/O failed for key {key}: {source}")]
    StorageIo {
        /// The cache key the operation was acting on.
        key: String,
        #[source]
        /// The underlying backend error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Stored bytes failed to decode back into a response. The entry is
    /// left intact for operator inspection.
    #[error("stored entry for key {key} failed to decode: {source}")]
    DecodeCorrupt {
        /// The cache key whose value could not be parsed.
        key: String,
        #[source]
        /// The underlying decode error.
        source: postcard::Error,
    },

    /// The network round trip failed (connection error, timeout, or an
    /// open circuit breaker).
    #[error("network request failed: {0}")]
    Network(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The circuit breaker is open and rejected the request before it
    /// reached the network. A distinct network-class error so
    /// `stale-if-error` can still apply.
    #[error("circuit breaker is open")]
    CircuitOpen,

    /// A 5xx response was returned while revalidating a stale entry and no
    /// stale-if-error fallback applied.
    #[error("revalidation received server error status {status}")]
    RevalidationServerError {
        /// The status code the origin returned.
        status: u16,
    },

    /// Decryption failed in the secure wrapper (tamper or wrong
    /// passphrase). Treated as a cache miss by the caller.
    #[error("failed to decrypt stored entry for key {key}")]
    DecryptionFailure {
        /// The cache key whose value failed to decrypt.
        key: String,
    },

    /// A malformed request or response prevented cache-key derivation or
    /// policy construction (e.g. an unparsable header value).
    #[error("malformed HTTP message: {0}")]
    Malformed(String),

    /// Error constructing or inspecting an `http` type.
    #[error(transparent)]
    Http(#[from] http::Error),

    /// Error converting a header value to a string.
    #[error(transparent)]
    HeaderToStr(#[from] http::header::ToStrError),

    /// Error parsing a header value.
    #[error(transparent)]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),

    /// Error parsing a header name.
    #[error(transparent)]
    InvalidHeaderName(#[from] http::header::InvalidHeaderName),

    /// Error parsing a URL.
    #[error(transparent)]
    InvalidUrl(#[from] url::ParseError),
}

impl CacheError {
    /// True for error kinds that are eligible for `stale-if-error` /
    /// `Warning: 111` fallback per the propagation policy.
    #[must_use]
    pub fn is_network_class(&self) -> bool {
        matches!(
            self,
            CacheError::Network(_)
                | CacheError::CircuitOpen
                | CacheError::RevalidationServerError { .. }
        )
    }
}
