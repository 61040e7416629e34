//! Postcard payload encoding with versioned envelopes.
//!
//! Entries store their values as bytes so one cache instance can hold values of
//! any `Serialize + DeserializeOwned` type. Each payload is wrapped as:
//!
//! ```text
//! ┌─────────────────┬──────────────────┬──────────────────────────┐
//! │  MAGIC (4 bytes)│ VERSION (varint) │POSTCARD PAYLOAD (N bytes)│
//! └─────────────────┴──────────────────┴──────────────────────────┘
//!   "RKIT"              u32                 postcard encoding of T
//! ```
//!
//! A payload that fails validation (bad magic, other schema version, or a
//! different type than the caller asks for) is never served: the cache purges
//! the entry and refetches.
//!
//! # Example
//!
//! ```rust
//! use revalidate_kit::serialization::{serialize_for_cache, deserialize_from_cache};
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Serialize, Deserialize, PartialEq, Debug)]
//! struct Post {
//!     id: u64,
//!     title: String,
//! }
//!
//! # fn main() -> revalidate_kit::Result<()> {
//! let post = Post { id: 1, title: "Hello".to_string() };
//! let bytes = serialize_for_cache(&post)?;
//! let decoded: Post = deserialize_from_cache(&bytes)?;
//! assert_eq!(post, decoded);
//! # Ok(())
//! # }
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Magic header for revalidate-kit payloads: b"RKIT"
pub const CACHE_MAGIC: [u8; 4] = *b"RKIT";

/// Current schema version.
///
/// Increment when the envelope layout changes; entries written under another
/// version are evicted and refetched on read.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// Versioned envelope for cached payloads.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CacheEnvelope<T> {
    /// Magic header: must be b"RKIT"
    pub magic: [u8; 4],
    /// Schema version: must match CURRENT_SCHEMA_VERSION
    pub version: u32,
    /// The actual cached value
    pub payload: T,
}

impl<T> CacheEnvelope<T> {
    /// Create a new envelope with current magic and version.
    pub fn new(payload: T) -> Self {
        Self {
            magic: CACHE_MAGIC,
            version: CURRENT_SCHEMA_VERSION,
            payload,
        }
    }
}

/// Serialize a value with envelope for cache storage.
///
/// # Errors
///
/// Returns `Error::SerializationError` if Postcard serialization fails.
pub fn serialize_for_cache<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let envelope = CacheEnvelope::new(value);
    postcard::to_allocvec(&envelope).map_err(|e| {
        log::error!("Cache serialization failed: {}", e);
        Error::SerializationError(e.to_string())
    })
}

/// Deserialize a value from cache storage with validation.
///
/// # Errors
///
/// - `Error::InvalidCacheEntry`: Invalid magic header
/// - `Error::VersionMismatch`: Schema version mismatch
/// - `Error::DeserializationError`: Corrupted payload or a different type
pub fn deserialize_from_cache<'de, T: Deserialize<'de>>(bytes: &'de [u8]) -> Result<T> {
    let envelope: CacheEnvelope<T> = postcard::from_bytes(bytes).map_err(|e| {
        log::warn!("Cache deserialization failed: {}", e);
        Error::DeserializationError(e.to_string())
    })?;

    if envelope.magic != CACHE_MAGIC {
        log::warn!(
            "Invalid cache entry: expected magic {:?}, got {:?}",
            CACHE_MAGIC,
            envelope.magic
        );
        return Err(Error::InvalidCacheEntry(format!(
            "Invalid magic: expected {:?}, got {:?}",
            CACHE_MAGIC, envelope.magic
        )));
    }

    if envelope.version != CURRENT_SCHEMA_VERSION {
        log::warn!(
            "Cache version mismatch: expected {}, got {}",
            CURRENT_SCHEMA_VERSION,
            envelope.version
        );
        return Err(Error::VersionMismatch {
            expected: CURRENT_SCHEMA_VERSION,
            found: envelope.version,
        });
    }

    Ok(envelope.payload)
}
