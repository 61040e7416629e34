//! Error types for the revalidating cache.

use std::fmt;

/// Result type for cache operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the revalidating cache.
///
/// `Error` is `Clone` because a single fetch failure is handed to every caller
/// that joined the same in-flight fetch.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// The user-supplied fetcher failed (or panicked).
    ///
    /// Propagated to every waiter of the single-flight execution that produced it.
    /// The cached entry, if any, is left untouched and stays servable.
    ///
    /// **Recovery:** Retry the `get`; a stale value keeps being served meanwhile.
    FetchError(String),

    /// Invalid policy configuration.
    ///
    /// Raised at `get` time, before any fetch is attempted:
    /// - Negative, NaN or infinite `revalidate` seconds
    /// - Hard expiry shorter than the revalidation window
    /// - Empty, oversized or too many tags
    PolicyError(String),

    /// Invalid call arguments (e.g. an empty cache key).
    ValidationError(String),

    /// Serialization failed when converting a fetched value to cache bytes.
    SerializationError(String),

    /// Deserialization failed when converting cache bytes to a value.
    ///
    /// Usually means the key was cached with a different type.
    ///
    /// **Recovery:** The entry is purged and refetched on the next read.
    DeserializationError(String),

    /// Invalid cache entry: corrupted envelope or bad magic.
    InvalidCacheEntry(String),

    /// Schema version mismatch between code and cached data.
    VersionMismatch {
        /// Expected schema version (from compiled code)
        expected: u32,
        /// Found schema version (from cached entry)
        found: u32,
    },

    /// Configuration error while building a cache.
    ///
    /// Common causes:
    /// - Malformed JSON config
    /// - Unparseable environment variable
    ConfigError(String),

    /// Generic error with custom message.
    Other(String),
}

impl Error {
    /// Whether the error came from decoding a cached payload.
    ///
    /// Such entries are evicted and recomputed instead of surfacing the error.
    pub fn is_decode_error(&self) -> bool {
        matches!(
            self,
            Error::DeserializationError(_)
                | Error::InvalidCacheEntry(_)
                | Error::VersionMismatch { .. }
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::FetchError(msg) => write!(f, "Fetch error: {}", msg),
            Error::PolicyError(msg) => write!(f, "Policy error: {}", msg),
            Error::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            Error::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
            Error::DeserializationError(msg) => write!(f, "Deserialization error: {}", msg),
            Error::InvalidCacheEntry(msg) => write!(f, "Invalid cache entry: {}", msg),
            Error::VersionMismatch { expected, found } => {
                write!(
                    f,
                    "Cache version mismatch: expected {}, found {}",
                    expected, found
                )
            }
            Error::ConfigError(msg) => write!(f, "Config error: {}", msg),
            Error::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

// ============================================================================
// Conversions from other error types
// ============================================================================

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        if e.is_syntax() || e.is_data() || e.is_eof() {
            Error::ConfigError(e.to_string())
        } else {
            Error::Other(e.to_string())
        }
    }
}

impl From<String> for Error {
    fn from(e: String) -> Self {
        Error::Other(e)
    }
}

impl From<&str> for Error {
    fn from(e: &str) -> Self {
        Error::Other(e.to_string())
    }
}
