//! Path ownership and deferred-destination helpers
//!
//! `BorrowablePath` encodes the one rule of artifact file hand-off: a file
//! given to N consumers may be physically taken (moved or deleted) by at
//! most one of them, and only when the flag says so. `LazyPath` is a fetch
//! destination that materializes only once a hit is confirmed; verification
//! happens against a sibling temp file that is renamed into place on
//! success, so a failed fetch never leaves a valid-looking partial file.

use std::path::{Path, PathBuf};

use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use crate::errors::{CacheError, Result};

/// A path whose ownership may be transferred to exactly one consumer
#[derive(Clone, Debug)]
pub struct BorrowablePath {
    path: PathBuf,
    can_borrow: bool,
}

impl BorrowablePath {
    /// The receiver may take ownership of the underlying file
    ///
    /// The caller guarantees nothing else needs this exact file afterwards.
    #[must_use]
    pub fn borrowable(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            can_borrow: true,
        }
    }

    /// The receiver must only read the underlying file
    #[must_use]
    pub fn read_only(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            can_borrow: false,
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn can_borrow(&self) -> bool {
        self.can_borrow
    }
}

/// A deferred fetch destination
///
/// Holds the path an artifact should land at without creating anything
/// there. Backends call [`LazyPath::stage`] once a response looks viable
/// and commit the staged file only after full verification, so misses and
/// errors never allocate an output file.
#[derive(Clone, Debug)]
pub struct LazyPath {
    path: PathBuf,
}

impl LazyPath {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The destination path; only exists after a confirmed hit
    #[must_use]
    pub fn as_path(&self) -> &Path {
        &self.path
    }

    /// Open a temp file next to the destination for staged writes
    ///
    /// Failure here is a local environment fault and propagates as `Err`
    /// rather than being folded into a cache result.
    pub async fn stage(&self) -> Result<StagedOutput> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| CacheError::io(parent, "create destination directory", e))?;
            }
        }

        let temp_path = self
            .path
            .with_extension(format!("tmp.{}", uuid::Uuid::new_v4()));
        let file = File::create(&temp_path)
            .await
            .map_err(|e| CacheError::io(&temp_path, "create staging file", e))?;

        Ok(StagedOutput {
            temp_path,
            final_path: self.path.clone(),
            file,
        })
    }
}

/// A staged, not-yet-committed fetch destination
#[derive(Debug)]
pub struct StagedOutput {
    temp_path: PathBuf,
    final_path: PathBuf,
    file: File,
}

impl StagedOutput {
    /// Append verified-so-far payload bytes
    pub async fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        self.file
            .write_all(bytes)
            .await
            .map_err(|e| CacheError::io(&self.temp_path, "write staging file", e))
    }

    /// Atomically move the staged file to the final destination
    pub async fn commit(mut self) -> Result<PathBuf> {
        self.file
            .flush()
            .await
            .map_err(|e| CacheError::io(&self.temp_path, "flush staging file", e))?;
        drop(self.file);
        tokio::fs::rename(&self.temp_path, &self.final_path)
            .await
            .map_err(|e| CacheError::io(&self.final_path, "commit staged artifact", e))?;
        Ok(self.final_path)
    }

    /// Drop the staged file, leaving the destination untouched
    pub async fn discard(self) {
        drop(self.file);
        // Best effort; a stray temp file is harmless.
        let _ = tokio::fs::remove_file(&self.temp_path).await;
    }
}
