//! The cache abstraction every backend implements

use async_trait::async_trait;
use tokio::task::JoinHandle;

use crate::artifact::ArtifactInfo;
use crate::errors::{CacheError, Result};
use crate::keys::RuleKey;
use crate::mode::CacheReadMode;
use crate::paths::{BorrowablePath, LazyPath};
use crate::result::CacheResult;

/// One artifact cache backend
///
/// This is the sole integration point the build engine consumes: `fetch`
/// before executing a rule, `store` after. Backends must be callable from
/// within a Tokio runtime; `store` spawns onto it.
#[async_trait]
pub trait ArtifactCache: Send + Sync {
    /// Display name used in diagnostics
    fn name(&self) -> &str;

    /// Look up an artifact, writing it to `output` on a hit
    ///
    /// Ordinary absence is a miss, and every protocol-level failure (bad
    /// checksum, key mismatch, network fault) is reported as an error-typed
    /// [`CacheResult`]. Only local environment faults the caller cannot
    /// recover from, such as being unable to create the destination file,
    /// return `Err`.
    async fn fetch(&self, rule_key: &RuleKey, output: &LazyPath) -> Result<CacheResult>;

    /// Store an artifact without blocking the caller
    ///
    /// The write happens on a background task; completion or failure is
    /// observable through the returned handle and is never silently
    /// dropped. Backends perform the write unconditionally — excluding
    /// non-writable backends from *explicit* stores is the composition
    /// layer's job, so that hit promotion can bypass the read mode.
    fn store(&self, info: ArtifactInfo, output: BorrowablePath) -> StoreHandle;

    /// This backend's explicit-store participation policy
    fn read_mode(&self) -> CacheReadMode;

    /// Release connections and pools; idempotent
    ///
    /// May run concurrently with in-flight operations, which complete or
    /// fail cleanly rather than being force-cancelled.
    async fn close(&self) -> Result<()>;
}

/// Awaitable completion of an asynchronous store
///
/// Dropping the handle detaches the store rather than cancelling it, so a
/// build rule may fire and forget. Joining surfaces the store's outcome.
#[derive(Debug)]
pub struct StoreHandle {
    inner: JoinHandle<Result<()>>,
}

impl StoreHandle {
    /// Spawn a store task onto the runtime
    pub fn spawn<F>(future: F) -> Self
    where
        F: std::future::Future<Output = Result<()>> + Send + 'static,
    {
        Self {
            inner: tokio::spawn(future),
        }
    }

    /// An already-successful store, for backends with nothing to do
    #[must_use]
    pub fn ready() -> Self {
        Self::spawn(async { Ok(()) })
    }

    /// Wait for the store to finish
    pub async fn join(self) -> Result<()> {
        match self.inner.await {
            Ok(result) => result,
            Err(join_error) => Err(CacheError::StoreFailed {
                message: join_error.to_string(),
            }),
        }
    }
}
