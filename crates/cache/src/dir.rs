//! Local directory artifact cache backend
//!
//! Artifacts live under a two-level fan-out keyed by rule-key hex, one
//! content file plus a metadata sidecar per claimed key. The sidecar is the
//! same binary block the HTTP transport ships, so an artifact round-trips
//! between transports byte for byte. Reads are fail-safe: a corrupt entry
//! is evicted and reported as a miss rather than poisoning the build.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;
use tokio::sync::Semaphore;

use crate::artifact::ArtifactInfo;
use crate::config::{render_error_message, DirCacheConfig};
use crate::errors::{CacheError, Result};
use crate::keys::RuleKey;
use crate::mode::CacheReadMode;
use crate::paths::{BorrowablePath, LazyPath};
use crate::result::CacheResult;
use crate::traits::{ArtifactCache, StoreHandle};
use crate::wire::{self, ArtifactMetadata, PAYLOAD_DIGEST_LEN};

/// File extension for artifact content
const CONTENT_EXT: &str = "artifact";

/// File extension for the metadata sidecar
const METADATA_EXT: &str = "metadata";

/// Local directory cache tier
pub struct DirArtifactCache {
    name: String,
    cache_dir: PathBuf,
    read_mode: CacheReadMode,
    error_message_format: String,
    store_permits: Arc<Semaphore>,
}

impl DirArtifactCache {
    #[must_use]
    pub fn new(config: &DirCacheConfig) -> Self {
        Self {
            name: config.name.clone(),
            cache_dir: config.dir.clone(),
            read_mode: config.mode,
            error_message_format: config.error_message_format.clone(),
            store_permits: Arc::new(Semaphore::new(config.store_concurrency.max(1))),
        }
    }

    fn entry_paths(cache_dir: &Path, rule_key: &RuleKey) -> (PathBuf, PathBuf) {
        let hex = rule_key.to_hex();
        let shard = cache_dir.join(&hex[..2]);
        (
            shard.join(format!("{hex}.{CONTENT_EXT}")),
            shard.join(format!("{hex}.{METADATA_EXT}")),
        )
    }

    /// Remove both files of an entry, best effort
    async fn evict(content_path: &Path, metadata_path: &Path) {
        let _ = tokio::fs::remove_file(content_path).await;
        let _ = tokio::fs::remove_file(metadata_path).await;
    }

    async fn fetch_artifact(&self, rule_key: &RuleKey, output: &LazyPath) -> Result<CacheResult> {
        let (content_path, metadata_path) = Self::entry_paths(&self.cache_dir, rule_key);

        let block = match tokio::fs::read(&metadata_path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(CacheResult::miss())
            }
            Err(e) => {
                return Err(CacheError::CorruptEntry {
                    rule_key: *rule_key,
                    reason: format!("unreadable metadata sidecar: {e}"),
                })
            }
        };

        let metadata = match ArtifactMetadata::from_bytes(&block) {
            Ok(metadata) if metadata.contains(rule_key) => metadata,
            Ok(_) => {
                tracing::warn!(
                    "{}",
                    render_error_message(
                        &self.error_message_format,
                        &self.name,
                        &format!("evicting entry for {rule_key}: sidecar claims other keys"),
                    )
                );
                Self::evict(&content_path, &metadata_path).await;
                return Ok(CacheResult::miss());
            }
            Err(e) => {
                tracing::warn!(
                    "{}",
                    render_error_message(
                        &self.error_message_format,
                        &self.name,
                        &format!("evicting corrupt entry for {rule_key}: {e}"),
                    )
                );
                Self::evict(&content_path, &metadata_path).await;
                return Ok(CacheResult::miss());
            }
        };

        let mut content = match tokio::fs::File::open(&content_path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Self::evict(&content_path, &metadata_path).await;
                return Ok(CacheResult::miss());
            }
            Err(e) => {
                return Err(CacheError::CorruptEntry {
                    rule_key: *rule_key,
                    reason: format!("unreadable content file: {e}"),
                })
            }
        };

        let declared = metadata.payload_len();
        let mut staged = output.stage().await?;
        let mut hasher = Sha256::new();
        let mut received: u64 = 0;
        let mut buffer = vec![0u8; 64 * 1024];
        loop {
            let read = match content.read(&mut buffer).await {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    staged.discard().await;
                    return Err(CacheError::CorruptEntry {
                        rule_key: *rule_key,
                        reason: format!("error reading content file: {e}"),
                    });
                }
            };
            received += read as u64;
            if received > declared {
                break;
            }
            hasher.update(&buffer[..read]);
            staged.write_all(&buffer[..read]).await?;
        }

        let actual: [u8; PAYLOAD_DIGEST_LEN] = hasher.finalize().into();
        if received != declared || &actual != metadata.payload_digest() {
            staged.discard().await;
            tracing::warn!(
                "{}",
                render_error_message(
                    &self.error_message_format,
                    &self.name,
                    &format!("evicting entry for {rule_key}: content does not match sidecar"),
                )
            );
            Self::evict(&content_path, &metadata_path).await;
            return Ok(CacheResult::miss());
        }

        staged.commit().await?;
        tracing::debug!(
            "cache hit for {} at {} ({} bytes)",
            rule_key,
            self.name,
            declared
        );
        Ok(CacheResult::hit(
            self.name.clone(),
            metadata.metadata().clone(),
            declared,
        ))
    }
}

#[async_trait]
impl ArtifactCache for DirArtifactCache {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, rule_key: &RuleKey, output: &LazyPath) -> Result<CacheResult> {
        match self.fetch_artifact(rule_key, output).await {
            Ok(result) => Ok(result),
            Err(err) if err.is_environment_fault() => Err(err),
            Err(err) => {
                tracing::warn!(
                    "{}",
                    render_error_message(&self.error_message_format, &self.name, &err.to_string())
                );
                Ok(CacheResult::error(self.name.clone(), err.to_string()))
            }
        }
    }

    fn store(&self, info: ArtifactInfo, output: BorrowablePath) -> StoreHandle {
        let cache_dir = self.cache_dir.clone();
        let name = self.name.clone();
        let template = self.error_message_format.clone();
        let permits = Arc::clone(&self.store_permits);

        StoreHandle::spawn(async move {
            let _permit = permits
                .acquire_owned()
                .await
                .map_err(|e| CacheError::StoreFailed {
                    message: e.to_string(),
                })?;
            let result = store_entry(&cache_dir, &info, &output).await;
            if let Err(err) = &result {
                tracing::warn!("{}", render_error_message(&template, &name, &err.to_string()));
            }
            result
        })
    }

    fn read_mode(&self) -> CacheReadMode {
        self.read_mode
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Write content and sidecar for every claimed rule key
///
/// Non-final placements copy the source; a borrowable source is moved into
/// place by the final placement, which is why it must come last.
async fn store_entry(cache_dir: &Path, info: &ArtifactInfo, output: &BorrowablePath) -> Result<()> {
    let source = output.path();
    let payload = tokio::fs::read(source)
        .await
        .map_err(|e| CacheError::io(source, "read artifact for store", e))?;
    let block = ArtifactMetadata::for_artifact(
        info,
        payload.len() as u64,
        wire::payload_digest(&payload),
    )
    .to_bytes();

    let keys = info.rule_keys();
    for (index, rule_key) in keys.iter().enumerate() {
        let (content_path, metadata_path) = DirArtifactCache::entry_paths(cache_dir, rule_key);
        if let Some(shard) = content_path.parent() {
            tokio::fs::create_dir_all(shard)
                .await
                .map_err(|e| CacheError::io(shard, "create cache shard directory", e))?;
        }

        place_atomically(&metadata_path, &block).await?;

        let is_last = index + 1 == keys.len();
        if is_last && output.can_borrow() {
            move_into_place(source, &content_path).await?;
        } else {
            place_atomically(&content_path, &payload).await?;
        }
    }
    Ok(())
}

/// Write bytes next to `path` and rename into place
async fn place_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    let temp_path = path.with_extension(format!("tmp.{}", uuid::Uuid::new_v4()));
    tokio::fs::write(&temp_path, bytes)
        .await
        .map_err(|e| CacheError::io(&temp_path, "write cache entry", e))?;
    tokio::fs::rename(&temp_path, path)
        .await
        .map_err(|e| CacheError::io(path, "commit cache entry", e))?;
    Ok(())
}

/// Take ownership of a borrowable source file
async fn move_into_place(source: &Path, dest: &Path) -> Result<()> {
    match tokio::fs::rename(source, dest).await {
        Ok(()) => Ok(()),
        // Rename fails across filesystems; fall back to copy-and-delete.
        Err(_) => {
            tokio::fs::copy(source, dest)
                .await
                .map_err(|e| CacheError::io(dest, "copy artifact into cache", e))?;
            tokio::fs::remove_file(source)
                .await
                .map_err(|e| CacheError::io(source, "remove borrowed artifact", e))?;
            Ok(())
        }
    }
}
