//! Error types for the cache engine
//!
//! Provides unified error handling using thiserror. Fetch failures are not
//! represented here: they belong to the caller's own error type and are
//! handed back untouched.

use thiserror::Error;

// == Cache Error Enum ==
/// Errors raised while building or starting a cache.
///
/// All of these surface at startup. Nothing on the request path produces a
/// `CacheError`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// A configuration value was rejected
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Active eviction was requested with no Tokio runtime to host the task
    #[error("Active eviction requires a running Tokio runtime")]
    RuntimeUnavailable,
}

// == Result Type Alias ==
/// Convenience Result type for the cache engine.
pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CacheError::InvalidConfig("success_ttl must be greater than zero".into());
        assert_eq!(
            err.to_string(),
            "Invalid configuration: success_ttl must be greater than zero"
        );
        assert_eq!(
            CacheError::RuntimeUnavailable.to_string(),
            "Active eviction requires a running Tokio runtime"
        );
    }
}
