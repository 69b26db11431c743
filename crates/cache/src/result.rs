//! Per-call cache lookup results

use std::collections::BTreeMap;

/// Outcome class of a single cache lookup
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheResultType {
    /// The artifact was not present; expected, not an error
    Miss,
    /// The artifact was fetched and verified
    Hit,
    /// A protocol violation or transport fault, distinct from absence
    Error,
}

impl CacheResultType {
    /// Only a hit counts as success
    #[must_use]
    pub fn is_success(self) -> bool {
        self == CacheResultType::Hit
    }
}

/// Result of a single fetch against one cache backend
///
/// A hit always carries the artifact's metadata map (possibly empty) and
/// its payload size; misses and errors never leave bytes at the fetch
/// destination.
#[derive(Clone, Debug)]
pub struct CacheResult {
    result_type: CacheResultType,
    cache_name: Option<String>,
    error_message: Option<String>,
    metadata: BTreeMap<String, String>,
    artifact_size: Option<u64>,
}

impl CacheResult {
    /// An ordinary miss
    #[must_use]
    pub fn miss() -> Self {
        Self {
            result_type: CacheResultType::Miss,
            cache_name: None,
            error_message: None,
            metadata: BTreeMap::new(),
            artifact_size: None,
        }
    }

    /// A verified hit served by `cache_name`
    #[must_use]
    pub fn hit(
        cache_name: impl Into<String>,
        metadata: BTreeMap<String, String>,
        artifact_size: u64,
    ) -> Self {
        Self {
            result_type: CacheResultType::Hit,
            cache_name: Some(cache_name.into()),
            error_message: None,
            metadata,
            artifact_size: Some(artifact_size),
        }
    }

    /// A protocol or transport failure reported by `cache_name`
    #[must_use]
    pub fn error(cache_name: impl Into<String>, error_message: impl Into<String>) -> Self {
        Self {
            result_type: CacheResultType::Error,
            cache_name: Some(cache_name.into()),
            error_message: Some(error_message.into()),
            metadata: BTreeMap::new(),
            artifact_size: None,
        }
    }

    #[must_use]
    pub fn result_type(&self) -> CacheResultType {
        self.result_type
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.result_type.is_success()
    }

    /// Name of the backend that produced this result, if any
    #[must_use]
    pub fn cache_name(&self) -> Option<&str> {
        self.cache_name.as_deref()
    }

    /// Diagnostic text for error results
    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// Artifact metadata; populated on hits
    #[must_use]
    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    /// Payload size in bytes; defined on hits
    #[must_use]
    pub fn artifact_size(&self) -> Option<u64> {
        self.artifact_size
    }
}
