//! Cache key utilities.
//!
//! Keys are opaque strings. Path-shaped keys (`/blog/hello`) get the matching
//! rules `revalidate_path` uses.

/// Route-path helpers for cache keys.
pub struct CacheKeyBuilder;

impl CacheKeyBuilder {
    /// Normalize a route path: leading slash, no trailing slash, no empty segments.
    ///
    /// ```
    /// use revalidate_kit::key::CacheKeyBuilder;
    ///
    /// assert_eq!(CacheKeyBuilder::path("blog//hello/"), "/blog/hello");
    /// assert_eq!(CacheKeyBuilder::path(""), "/");
    /// ```
    pub fn path(path: &str) -> String {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        format!("/{}", segments.join("/"))
    }

    /// Whether `key` is the route `path` itself.
    pub fn is_path(key: &str, path: &str) -> bool {
        key.starts_with('/') && Self::path(key) == Self::path(path)
    }

    /// Whether `key` is the route `path` or nested below it (segment-wise).
    ///
    /// `/blog` covers `/blog` and `/blog/hello` but not `/blogroll`.
    pub fn is_under_path(key: &str, path: &str) -> bool {
        if !key.starts_with('/') {
            return false;
        }

        let key = Self::path(key);
        let path = Self::path(path);
        if path == "/" {
            return true;
        }

        key == path
            || key
                .strip_prefix(path.as_str())
                .is_some_and(|rest| rest.starts_with('/'))
    }
}
