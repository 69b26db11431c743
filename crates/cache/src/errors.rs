//! Error types for the artifact cache subsystem
//!
//! Protocol-level failures (bad checksum, wrong key, truncated payload,
//! network faults) are soft: backends convert them into an error-typed
//! [`crate::result::CacheResult`] so a broken cache never aborts a build.
//! Only local environment faults, such as being unable to create the fetch
//! destination, escape as `Err` from cache operations.

use std::path::PathBuf;

use crate::keys::RuleKey;

/// Result type for cache operations
pub type Result<T> = std::result::Result<T, CacheError>;

/// Error type for artifact cache operations
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// I/O errors during cache operations
    #[error("{operation} failed for '{path}': {source}")]
    Io {
        path: PathBuf,
        operation: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// Network error talking to a remote cache
    #[error("network error for '{endpoint}': {message}")]
    Network { endpoint: String, message: String },

    /// Unexpected HTTP status from a remote cache
    #[error("unexpected HTTP status {status} from '{endpoint}'")]
    HttpStatus { endpoint: String, status: u16 },

    /// Malformed artifact envelope
    #[error("malformed artifact envelope: {reason}")]
    Envelope { reason: String },

    /// Artifact served for a rule key it does not claim
    #[error("artifact does not claim rule key {rule_key}")]
    KeyMismatch { rule_key: RuleKey },

    /// Payload bytes did not hash to the declared digest
    #[error("payload digest mismatch: expected {expected}, actual {actual}")]
    DigestMismatch { expected: String, actual: String },

    /// Fewer payload bytes arrived than the envelope declared
    #[error("payload truncated: declared {declared} bytes, received {received}")]
    Truncated { declared: u64, received: u64 },

    /// More payload bytes arrived than the envelope declared
    #[error("payload overrun: declared {declared} bytes, received {received}")]
    Overrun { declared: u64, received: u64 },

    /// A stored cache entry failed validation and was evicted
    #[error("corrupt cache entry for rule key {rule_key}: {reason}")]
    CorruptEntry { rule_key: RuleKey, reason: String },

    /// An asynchronous store did not run to completion
    #[error("store task failed: {message}")]
    StoreFailed { message: String },

    /// Closing one or more cache backends failed
    #[error("failed to close cache backend(s): {message}")]
    CloseFailed { message: String },

    /// Invalid rule key text
    #[error("invalid rule key '{value}': {reason}")]
    InvalidRuleKey { value: String, reason: String },

    /// Artifact info construction with no rule keys
    #[error("artifact info requires at least one rule key")]
    EmptyRuleKeys,

    /// Configuration errors
    #[error("cache configuration error: {message}")]
    Configuration { message: String },
}

// Helper methods for creating errors with context
impl CacheError {
    /// Create an I/O error with path context
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, operation: &'static str, source: std::io::Error) -> Self {
        CacheError::Io {
            path: path.into(),
            operation,
            source,
        }
    }

    /// Create a network error
    #[must_use]
    pub fn network(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        CacheError::Network {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    /// Create an envelope error
    #[must_use]
    pub fn envelope(reason: impl Into<String>) -> Self {
        CacheError::Envelope {
            reason: reason.into(),
        }
    }

    /// Create a configuration error
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        CacheError::Configuration {
            message: message.into(),
        }
    }

    /// Whether this error indicates a broken local environment rather than
    /// a cache-protocol problem.
    ///
    /// Environment faults propagate out of `fetch` as `Err`; everything
    /// else is reported as an error-typed `CacheResult`.
    #[must_use]
    pub fn is_environment_fault(&self) -> bool {
        matches!(self, CacheError::Io { .. })
    }
}

impl From<CacheError> for quarry_core::Error {
    fn from(error: CacheError) -> Self {
        match error {
            CacheError::Io {
                path,
                operation,
                source,
            } => quarry_core::Error::FileSystem {
                path,
                operation: operation.to_string(),
                source,
            },
            CacheError::Network { endpoint, message } => {
                quarry_core::Error::Network { endpoint, message }
            }
            CacheError::HttpStatus { endpoint, status } => quarry_core::Error::Network {
                endpoint,
                message: format!("unexpected HTTP status {status}"),
            },
            other => quarry_core::Error::Configuration {
                message: other.to_string(),
            },
        }
    }
}
