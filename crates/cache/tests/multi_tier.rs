//! Multi-tier cache behavior: fallback, promotion, and store discipline

mod common;

use std::collections::BTreeMap;
use std::sync::Arc;

use tempfile::TempDir;

use common::{key, wait_until, InMemoryCache};
use quarry_cache::{
    ArtifactCache, ArtifactInfo, BorrowablePath, CacheReadMode, CacheResultType, DirArtifactCache,
    DirCacheConfig, LazyPath, MultiArtifactCache,
};

fn multi(tiers: Vec<Arc<dyn ArtifactCache>>) -> MultiArtifactCache {
    MultiArtifactCache::new(tiers)
}

fn dir_tier(root: &TempDir, name: &str) -> DirArtifactCache {
    DirArtifactCache::new(&DirCacheConfig {
        name: name.to_string(),
        dir: root.path().join(name),
        mode: CacheReadMode::ReadWrite,
        error_message_format: quarry_cache::config::DEFAULT_ERROR_MESSAGE_FORMAT.to_string(),
        store_concurrency: 2,
    })
}

#[tokio::test]
async fn test_unknown_key_misses_through_all_tiers() {
    let scratch = TempDir::new().unwrap();
    let cache = multi(vec![
        Arc::new(InMemoryCache::new("fast")),
        Arc::new(InMemoryCache::new("slow")),
    ]);
    let dest = LazyPath::new(scratch.path().join("out.bin"));
    let result = cache.fetch(&key(1), &dest).await.unwrap();
    assert_eq!(result.result_type(), CacheResultType::Miss);
    assert!(!dest.as_path().exists());
}

#[tokio::test]
async fn test_zero_tiers_behaves_as_always_miss() {
    let scratch = TempDir::new().unwrap();
    let cache = multi(vec![]);
    let dest = LazyPath::new(scratch.path().join("out.bin"));
    let result = cache.fetch(&key(1), &dest).await.unwrap();
    assert_eq!(result.result_type(), CacheResultType::Miss);
    assert_eq!(cache.read_mode(), CacheReadMode::PassThrough);
    cache.close().await.unwrap();
}

#[tokio::test]
async fn test_store_then_fetch_round_trip() {
    let scratch = TempDir::new().unwrap();
    let fast = Arc::new(InMemoryCache::new("fast"));
    let slow = Arc::new(InMemoryCache::new("slow"));
    let cache = multi(vec![fast.clone(), slow.clone()]);

    let source = scratch.path().join("built.bin");
    tokio::fs::write(&source, b"artifact bytes").await.unwrap();
    let info = ArtifactInfo::for_key(key(2)).with_metadata("rule", "//lib:core");
    cache
        .store(info, BorrowablePath::read_only(&source))
        .join()
        .await
        .unwrap();

    let dest = LazyPath::new(scratch.path().join("out.bin"));
    let result = cache.fetch(&key(2), &dest).await.unwrap();
    assert!(result.is_success());
    assert_eq!(
        result.metadata().get("rule").map(String::as_str),
        Some("//lib:core")
    );
    assert_eq!(
        tokio::fs::read(dest.as_path()).await.unwrap(),
        b"artifact bytes"
    );
}

#[tokio::test]
async fn test_hit_in_slow_tier_promotes_into_faster_tiers() {
    let scratch = TempDir::new().unwrap();
    // The fast tier is pass-through: excluded from explicit stores, yet it
    // still receives the promoted copy.
    let fast =
        Arc::new(InMemoryCache::new("fast").with_mode(CacheReadMode::PassThrough));
    let slow = Arc::new(InMemoryCache::new("slow"));
    let mut metadata = BTreeMap::new();
    metadata.insert("hello".to_string(), "world".to_string());
    slow.seed(key(3), b"promoted payload", metadata.clone());

    let cache = multi(vec![fast.clone(), slow.clone()]);
    let dest = LazyPath::new(scratch.path().join("out.bin"));
    let result = cache.fetch(&key(3), &dest).await.unwrap();
    assert!(result.is_success());
    assert_eq!(result.cache_name(), Some("slow"));
    assert_eq!(
        result.metadata().get("hello").map(String::as_str),
        Some("world")
    );

    wait_until("promotion into the fast tier", || fast.contains(&key(3))).await;

    // A direct fetch on the fast tier now hits with the same metadata.
    let direct_dest = LazyPath::new(scratch.path().join("direct.bin"));
    let direct = fast.fetch(&key(3), &direct_dest).await.unwrap();
    assert!(direct.is_success());
    assert_eq!(
        direct.metadata().get("hello").map(String::as_str),
        Some("world")
    );
    assert_eq!(
        tokio::fs::read(direct_dest.as_path()).await.unwrap(),
        b"promoted payload"
    );
}

#[tokio::test]
async fn test_tier_error_does_not_block_slower_tiers() {
    let scratch = TempDir::new().unwrap();
    let broken = Arc::new(InMemoryCache::new("broken").failing_fetch());
    let slow = Arc::new(InMemoryCache::new("slow"));
    slow.seed(key(4), b"still reachable", BTreeMap::new());

    let cache = multi(vec![broken, slow]);
    let dest = LazyPath::new(scratch.path().join("out.bin"));
    let result = cache.fetch(&key(4), &dest).await.unwrap();
    assert!(result.is_success());
    assert_eq!(result.cache_name(), Some("slow"));
}

#[tokio::test]
async fn test_last_error_surfaces_when_nothing_hits() {
    let scratch = TempDir::new().unwrap();
    let broken = Arc::new(InMemoryCache::new("broken").failing_fetch());
    let empty = Arc::new(InMemoryCache::new("empty"));

    let cache = multi(vec![broken, empty]);
    let dest = LazyPath::new(scratch.path().join("out.bin"));
    let result = cache.fetch(&key(5), &dest).await.unwrap();
    // The malfunction must not be masked as a plain miss.
    assert_eq!(result.result_type(), CacheResultType::Error);
    assert_eq!(result.cache_name(), Some("broken"));
}

#[tokio::test]
async fn test_explicit_store_targets_only_writable_tiers() {
    let scratch = TempDir::new().unwrap();
    let read_only = Arc::new(InMemoryCache::new("ro").with_mode(CacheReadMode::ReadOnly));
    let writable = Arc::new(InMemoryCache::new("rw"));
    let pass_through =
        Arc::new(InMemoryCache::new("pt").with_mode(CacheReadMode::PassThrough));
    let cache = multi(vec![read_only.clone(), writable.clone(), pass_through.clone()]);

    let source = scratch.path().join("built.bin");
    tokio::fs::write(&source, b"payload").await.unwrap();
    cache
        .store(
            ArtifactInfo::for_key(key(6)),
            BorrowablePath::read_only(&source),
        )
        .join()
        .await
        .unwrap();

    assert_eq!(read_only.store_count(), 0);
    assert_eq!(writable.store_count(), 1);
    assert_eq!(pass_through.store_count(), 0);
}

#[tokio::test]
async fn test_borrow_discipline_only_last_writable_tier_consumes() {
    let root = TempDir::new().unwrap();
    let a = Arc::new(dir_tier(&root, "a"));
    let b = Arc::new(dir_tier(&root, "b"));
    let c = Arc::new(dir_tier(&root, "c"));
    let cache = multi(vec![a.clone(), b.clone(), c.clone()]);

    let source = root.path().join("built.bin");
    tokio::fs::write(&source, b"borrowed payload").await.unwrap();
    cache
        .store(
            ArtifactInfo::for_key(key(7)),
            BorrowablePath::borrowable(&source),
        )
        .join()
        .await
        .unwrap();

    // The final writable tier took the file; everyone before it copied.
    assert!(!source.exists());
    for (index, tier) in [a, b, c].into_iter().enumerate() {
        let dest = LazyPath::new(root.path().join(format!("out-{index}.bin")));
        let result = tier.fetch(&key(7), &dest).await.unwrap();
        assert!(result.is_success(), "tier {index} should hold the artifact");
        assert_eq!(
            tokio::fs::read(dest.as_path()).await.unwrap(),
            b"borrowed payload"
        );
    }
}

#[tokio::test]
async fn test_read_only_store_leaves_source_untouched() {
    let root = TempDir::new().unwrap();
    let a = Arc::new(dir_tier(&root, "a"));
    let b = Arc::new(dir_tier(&root, "b"));
    let cache = multi(vec![a, b]);

    let source = root.path().join("built.bin");
    tokio::fs::write(&source, b"shared payload").await.unwrap();
    cache
        .store(
            ArtifactInfo::for_key(key(8)),
            BorrowablePath::read_only(&source),
        )
        .join()
        .await
        .unwrap();

    assert!(source.exists());
}

#[tokio::test]
async fn test_combined_store_attempts_all_tiers_and_fails() {
    let scratch = TempDir::new().unwrap();
    let writable = Arc::new(InMemoryCache::new("rw"));
    let cache = multi(vec![writable.clone()]);

    // A missing source file fails the only store, which must fail the
    // combined handle.
    let source = scratch.path().join("never-created.bin");
    let handle = cache.store(
        ArtifactInfo::for_key(key(9)),
        BorrowablePath::read_only(&source),
    );
    assert!(handle.join().await.is_err());
}

#[tokio::test]
async fn test_read_mode_aggregation() {
    let rw: Arc<dyn ArtifactCache> = Arc::new(InMemoryCache::new("rw"));
    let ro: Arc<dyn ArtifactCache> =
        Arc::new(InMemoryCache::new("ro").with_mode(CacheReadMode::ReadOnly));
    let pt: Arc<dyn ArtifactCache> =
        Arc::new(InMemoryCache::new("pt").with_mode(CacheReadMode::PassThrough));

    assert_eq!(
        multi(vec![pt.clone(), rw.clone()]).read_mode(),
        CacheReadMode::ReadWrite
    );
    assert_eq!(
        multi(vec![pt.clone(), ro.clone()]).read_mode(),
        CacheReadMode::ReadOnly
    );
    assert_eq!(multi(vec![pt.clone()]).read_mode(), CacheReadMode::PassThrough);
}

#[tokio::test]
async fn test_close_closes_every_tier_even_after_failure() {
    let failing = Arc::new(InMemoryCache::new("failing").failing_close());
    let healthy = Arc::new(InMemoryCache::new("healthy"));
    let cache = multi(vec![failing.clone(), healthy.clone()]);

    assert!(cache.close().await.is_err());
    assert!(failing.is_closed());
    assert!(healthy.is_closed());
}

#[tokio::test]
async fn test_two_tier_scenario_with_metadata() {
    let scratch = TempDir::new().unwrap();
    let tier1 = Arc::new(InMemoryCache::new("tier1"));
    let tier2 = Arc::new(InMemoryCache::new("tier2"));
    let mut metadata = BTreeMap::new();
    metadata.insert("hello".to_string(), "world".to_string());
    tier2.seed(key(10), b"scenario payload", metadata.clone());

    let cache = multi(vec![tier1.clone(), tier2]);
    let dest = LazyPath::new(scratch.path().join("out.bin"));
    let result = cache.fetch(&key(10), &dest).await.unwrap();
    assert!(result.is_success());
    assert_eq!(result.metadata(), &metadata);

    wait_until("promotion into tier 1", || tier1.contains(&key(10))).await;
    let direct_dest = LazyPath::new(scratch.path().join("direct.bin"));
    let direct = tier1.fetch(&key(10), &direct_dest).await.unwrap();
    assert!(direct.is_success());
    assert_eq!(direct.metadata(), &metadata);
}
