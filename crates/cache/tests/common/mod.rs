//! Shared test helpers for cache integration tests
#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use quarry_cache::errors::CacheError;
use quarry_cache::keys::RULE_KEY_LEN;
use quarry_cache::{
    ArtifactCache, ArtifactInfo, BorrowablePath, CacheReadMode, CacheResult, LazyPath, Result,
    RuleKey, StoreHandle,
};

/// Deterministic rule key for tests
pub fn key(byte: u8) -> RuleKey {
    RuleKey::from_bytes([byte; RULE_KEY_LEN])
}

/// Poll until `condition` holds, failing the test after a few seconds
pub async fn wait_until<F>(what: &str, mut condition: F)
where
    F: FnMut() -> bool,
{
    for _ in 0..300 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for: {what}");
}

#[derive(Clone)]
struct Entry {
    payload: Vec<u8>,
    metadata: BTreeMap<String, String>,
}

struct Inner {
    entries: Mutex<HashMap<RuleKey, Entry>>,
    store_count: AtomicUsize,
    closed: AtomicBool,
}

/// In-memory cache backend with injectable failures
pub struct InMemoryCache {
    name: String,
    mode: CacheReadMode,
    fail_fetch: bool,
    fail_close: bool,
    inner: Arc<Inner>,
}

impl InMemoryCache {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mode: CacheReadMode::ReadWrite,
            fail_fetch: false,
            fail_close: false,
            inner: Arc::new(Inner {
                entries: Mutex::new(HashMap::new()),
                store_count: AtomicUsize::new(0),
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn with_mode(mut self, mode: CacheReadMode) -> Self {
        self.mode = mode;
        self
    }

    /// Every fetch reports an error-typed result
    pub fn failing_fetch(mut self) -> Self {
        self.fail_fetch = true;
        self
    }

    /// `close` reports a failure
    pub fn failing_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    /// Seed an artifact directly, bypassing `store`
    pub fn seed(&self, rule_key: RuleKey, payload: &[u8], metadata: BTreeMap<String, String>) {
        self.inner.entries.lock().unwrap().insert(
            rule_key,
            Entry {
                payload: payload.to_vec(),
                metadata,
            },
        );
    }

    pub fn contains(&self, rule_key: &RuleKey) -> bool {
        self.inner.entries.lock().unwrap().contains_key(rule_key)
    }

    /// Number of completed `store` calls
    pub fn store_count(&self) -> usize {
        self.inner.store_count.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ArtifactCache for InMemoryCache {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, rule_key: &RuleKey, output: &LazyPath) -> Result<CacheResult> {
        if self.fail_fetch {
            return Ok(CacheResult::error(self.name.clone(), "injected failure"));
        }
        let entry = {
            let entries = self.inner.entries.lock().unwrap();
            entries.get(rule_key).cloned()
        };
        let Some(entry) = entry else {
            return Ok(CacheResult::miss());
        };

        let mut staged = output.stage().await?;
        staged.write_all(&entry.payload).await?;
        staged.commit().await?;
        Ok(CacheResult::hit(
            self.name.clone(),
            entry.metadata,
            entry.payload.len() as u64,
        ))
    }

    fn store(&self, info: ArtifactInfo, output: BorrowablePath) -> StoreHandle {
        let inner = Arc::clone(&self.inner);
        StoreHandle::spawn(async move {
            let path = output.path().to_path_buf();
            let payload = tokio::fs::read(&path)
                .await
                .map_err(|e| CacheError::io(&path, "read artifact for store", e))?;
            let mut entries = inner.entries.lock().unwrap();
            for rule_key in info.rule_keys() {
                entries.insert(
                    *rule_key,
                    Entry {
                        payload: payload.clone(),
                        metadata: info.metadata().clone(),
                    },
                );
            }
            inner.store_count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    fn read_mode(&self) -> CacheReadMode {
        self.mode
    }

    async fn close(&self) -> Result<()> {
        self.inner.closed.store(true, Ordering::SeqCst);
        if self.fail_close {
            return Err(CacheError::CloseFailed {
                message: "injected close failure".to_string(),
            });
        }
        Ok(())
    }
}
