//! Multi-tier composing cache
//!
//! Chains an ordered list of backends into one: tier 0 is the fastest and
//! most local, the last tier the slowest and most remote. Fetch falls
//! through misses and remembers errors; a hit in a slow tier is promoted
//! into every faster tier in the background. Explicit stores copy into
//! every writable tier, handing the borrowable original only to the last
//! recipient.

use std::sync::Arc;

use async_trait::async_trait;

use crate::artifact::ArtifactInfo;
use crate::errors::{CacheError, Result};
use crate::keys::RuleKey;
use crate::mode::CacheReadMode;
use crate::paths::{BorrowablePath, LazyPath};
use crate::result::{CacheResult, CacheResultType};
use crate::traits::{ArtifactCache, StoreHandle};

/// Ordered chain of cache backends behaving as one
pub struct MultiArtifactCache {
    name: String,
    tiers: Vec<Arc<dyn ArtifactCache>>,
}

impl MultiArtifactCache {
    /// Compose tiers in fetch order, fastest first
    ///
    /// Zero tiers is valid and behaves as an always-miss cache.
    #[must_use]
    pub fn new(tiers: Vec<Arc<dyn ArtifactCache>>) -> Self {
        Self {
            name: "multi".to_string(),
            tiers,
        }
    }

    #[must_use]
    pub fn tier_count(&self) -> usize {
        self.tiers.len()
    }

    /// Warm every tier faster than the one that hit
    ///
    /// Promotion deliberately ignores each recipient's read mode: warming a
    /// faster tier pays off whether or not that tier accepts explicit
    /// stores. The handles are dropped, not awaited; a build's correctness
    /// depends only on the result already returned.
    fn promote(&self, rule_key: &RuleKey, hit: &CacheResult, output: &LazyPath, hit_tier: usize) {
        if hit_tier == 0 {
            return;
        }
        let mut info = ArtifactInfo::for_key(*rule_key);
        for (key, value) in hit.metadata() {
            info = info.with_metadata(key.clone(), value.clone());
        }
        for tier in &self.tiers[..hit_tier] {
            tracing::debug!(
                "promoting {} from {} into {}",
                rule_key,
                hit.cache_name().unwrap_or("unknown"),
                tier.name()
            );
            let handle = tier.store(
                info.clone(),
                BorrowablePath::read_only(output.as_path()),
            );
            // Fire and forget; the spawned store keeps running on its own.
            drop(handle);
        }
    }
}

#[async_trait]
impl ArtifactCache for MultiArtifactCache {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, rule_key: &RuleKey, output: &LazyPath) -> Result<CacheResult> {
        let mut last_error: Option<CacheResult> = None;
        for (index, tier) in self.tiers.iter().enumerate() {
            let result = tier.fetch(rule_key, output).await?;
            match result.result_type() {
                CacheResultType::Hit => {
                    self.promote(rule_key, &result, output, index);
                    return Ok(result);
                }
                CacheResultType::Error => {
                    // Remember the malfunction but keep trying slower tiers.
                    last_error = Some(result);
                }
                CacheResultType::Miss => {}
            }
        }
        // Only report a miss if every tier genuinely missed; a remembered
        // error must stay visible to operators.
        Ok(last_error.unwrap_or_else(CacheResult::miss))
    }

    fn store(&self, info: ArtifactInfo, output: BorrowablePath) -> StoreHandle {
        let writable: Vec<Arc<dyn ArtifactCache>> = self
            .tiers
            .iter()
            .filter(|tier| tier.read_mode().is_writable())
            .cloned()
            .collect();
        if writable.is_empty() {
            return StoreHandle::ready();
        }

        StoreHandle::spawn(async move {
            let mut failures: Vec<String> = Vec::new();
            let count = writable.len();
            for (index, tier) in writable.into_iter().enumerate() {
                // Earlier recipients copy; only the final one may receive
                // the caller's borrow flag and consume the file, so each
                // store must finish before the next begins.
                let tier_output = if index + 1 == count {
                    output.clone()
                } else {
                    BorrowablePath::read_only(output.path())
                };
                let tier_name = tier.name().to_string();
                if let Err(err) = tier.store(info.clone(), tier_output).join().await {
                    failures.push(format!("{tier_name}: {err}"));
                }
            }
            if failures.is_empty() {
                Ok(())
            } else {
                Err(CacheError::StoreFailed {
                    message: failures.join("; "),
                })
            }
        })
    }

    fn read_mode(&self) -> CacheReadMode {
        let mut aggregate = CacheReadMode::PassThrough;
        for tier in &self.tiers {
            match tier.read_mode() {
                CacheReadMode::ReadWrite => return CacheReadMode::ReadWrite,
                CacheReadMode::ReadOnly => aggregate = CacheReadMode::ReadOnly,
                CacheReadMode::PassThrough => {}
            }
        }
        aggregate
    }

    async fn close(&self) -> Result<()> {
        let mut failures: Vec<String> = Vec::new();
        for tier in &self.tiers {
            if let Err(err) = tier.close().await {
                failures.push(format!("{}: {err}", tier.name()));
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(CacheError::CloseFailed {
                message: failures.join("; "),
            })
        }
    }
}
