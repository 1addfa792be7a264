use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::CacheConfig;
use crate::test;
use crate::types::{AssetHandle, AssetKind, AssetPayload, DecodedTexture, ParsedModel};

use super::{AssetCache, AssetKey, CacheError, DecodeOptions, Disposer};

/// Counts disposals so tests can assert exactly-once release of native
/// resources.
#[derive(Debug, Default)]
struct CountingDisposer {
    disposed: Arc<AtomicUsize>,
}

impl Disposer for CountingDisposer {
    fn dispose(&self, _handle: &AssetHandle) {
        self.disposed.fetch_add(1, Ordering::SeqCst);
    }
}

fn counting_cache() -> (AssetCache, Arc<AtomicUsize>) {
    let disposed = Arc::new(AtomicUsize::new(0));
    let disposer = CountingDisposer {
        disposed: disposed.clone(),
    };
    let cache = AssetCache::with_disposer(CacheConfig::default(), Box::new(disposer));
    (cache, disposed)
}

fn texture_key(source: &str) -> AssetKey {
    AssetKey::new(source, DecodeOptions::default())
}

fn texture_payload() -> AssetPayload {
    AssetPayload::Texture(DecodedTexture {
        width: 1,
        height: 1,
        levels: vec![vec![255, 0, 0, 255]],
        options: DecodeOptions::default(),
    })
}

fn model_payload() -> AssetPayload {
    AssetPayload::Model(ParsedModel::default())
}

/// A decode closure that succeeds with a tiny texture and counts its
/// invocations.
fn counted_decode(
    counter: Arc<AtomicUsize>,
) -> impl FnOnce() -> futures::future::BoxFuture<'static, super::CacheContents<AssetPayload>> {
    move || {
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(texture_payload())
        }
        .boxed()
    }
}

#[tokio::test]
async fn test_concurrent_acquires_share_one_decode() {
    test::setup();
    let (cache, _) = counting_cache();
    let key = texture_key("materials/oak.png");
    let decodes = Arc::new(AtomicUsize::new(0));

    let (first, second) = tokio::join!(
        cache.acquire(key.clone(), AssetKind::Texture, counted_decode(decodes.clone())),
        cache.acquire(key.clone(), AssetKind::Texture, counted_decode(decodes.clone())),
    );

    let first = first.unwrap();
    let second = second.unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(decodes.load(Ordering::SeqCst), 1);
    assert_eq!(cache.ref_count(&key), Some(2));

    let stats = cache.stats();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.entries, 1);
    assert_eq!(stats.pending, 0);
}

#[tokio::test]
async fn test_idle_entry_evicted_after_threshold() {
    test::setup();
    let (cache, disposed) = counting_cache();
    let key = texture_key("materials/leather.png");

    let handle = cache
        .acquire(key.clone(), AssetKind::Texture, counted_decode(Default::default()))
        .await
        .unwrap();
    cache.release(&key);

    // Below the texture threshold nothing happens.
    cache.tick(Instant::now() + Duration::from_secs(29));
    assert_eq!(cache.ref_count(&key), Some(0));
    assert_eq!(disposed.load(Ordering::SeqCst), 0);

    cache.tick(Instant::now() + Duration::from_secs(31));
    assert_eq!(cache.ref_count(&key), None);
    assert_eq!(disposed.load(Ordering::SeqCst), 1);
    assert!(handle.is_disposed());
    assert_eq!(cache.stats().evictions, 1);
}

#[tokio::test]
async fn test_referenced_entry_survives_any_sweep() {
    test::setup();
    let (cache, disposed) = counting_cache();
    let key = texture_key("materials/velvet.png");

    cache
        .acquire(key.clone(), AssetKind::Texture, counted_decode(Default::default()))
        .await
        .unwrap();
    cache.release(&key);

    // A re-acquire pins the entry no matter how stale it looks.
    cache
        .acquire(key.clone(), AssetKind::Texture, counted_decode(Default::default()))
        .await
        .unwrap();
    cache.tick(Instant::now() + Duration::from_secs(3600));
    assert_eq!(cache.ref_count(&key), Some(1));
    assert_eq!(disposed.load(Ordering::SeqCst), 0);

    // Releasing restarts the idle clock from now, not from first load.
    cache.release(&key);
    cache.tick(Instant::now() + Duration::from_secs(31));
    assert_eq!(cache.ref_count(&key), None);
    assert_eq!(disposed.load(Ordering::SeqCst), 1);
}

/// Calls back into the cache from inside `dispose`, as a disposer that logs
/// cache statistics on every release would.
struct ReentrantDisposer {
    cache: std::sync::Mutex<Option<AssetCache>>,
    disposed: Arc<AtomicUsize>,
}

impl Disposer for ReentrantDisposer {
    fn dispose(&self, _handle: &AssetHandle) {
        if let Some(cache) = self.cache.lock().unwrap().as_ref() {
            let _ = cache.stats();
        }
        self.disposed.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn test_disposer_may_reenter_the_cache() {
    test::setup();
    let disposed = Arc::new(AtomicUsize::new(0));
    let disposer = Arc::new(ReentrantDisposer {
        cache: std::sync::Mutex::new(None),
        disposed: disposed.clone(),
    });
    let cache = {
        let disposer = disposer.clone();
        AssetCache::with_disposer(
            CacheConfig::default(),
            Box::new(ArcDisposer(disposer)),
        )
    };
    *disposer.cache.lock().unwrap() = Some(cache.clone());

    let key = texture_key("materials/oak.png");
    cache
        .acquire(key.clone(), AssetKind::Texture, counted_decode(Default::default()))
        .await
        .unwrap();
    cache.release(&key);

    // Sweep path: must not hold the table lock across dispose.
    cache.tick(Instant::now() + Duration::from_secs(31));
    assert_eq!(disposed.load(Ordering::SeqCst), 1);

    // Forced eviction and clear paths likewise.
    cache
        .acquire(key.clone(), AssetKind::Texture, counted_decode(Default::default()))
        .await
        .unwrap();
    cache.release(&key);
    assert_eq!(cache.evict_now(&key), Ok(true));
    assert_eq!(disposed.load(Ordering::SeqCst), 2);

    cache
        .acquire(key.clone(), AssetKind::Texture, counted_decode(Default::default()))
        .await
        .unwrap();
    cache.clear_all();
    assert_eq!(disposed.load(Ordering::SeqCst), 3);
}

/// Forwards disposal to a shared disposer.
struct ArcDisposer(Arc<ReentrantDisposer>);

impl Disposer for ArcDisposer {
    fn dispose(&self, handle: &AssetHandle) {
        self.0.dispose(handle);
    }
}

#[tokio::test]
async fn test_models_idle_longer_than_textures() {
    test::setup();
    let (cache, disposed) = counting_cache();
    let texture = texture_key("materials/oak.png");
    let model = texture_key("models/sofa.glb");

    cache
        .acquire(texture.clone(), AssetKind::Texture, counted_decode(Default::default()))
        .await
        .unwrap();
    cache
        .acquire(model.clone(), AssetKind::Model, move || {
            async move { Ok(model_payload()) }.boxed()
        })
        .await
        .unwrap();
    cache.release(&texture);
    cache.release(&model);

    // 45s idle: past the texture threshold, within the model threshold.
    cache.tick(Instant::now() + Duration::from_secs(45));
    assert_eq!(cache.ref_count(&texture), None);
    assert_eq!(cache.ref_count(&model), Some(0));
    assert_eq!(disposed.load(Ordering::SeqCst), 1);

    cache.tick(Instant::now() + Duration::from_secs(61));
    assert_eq!(cache.ref_count(&model), None);
    assert_eq!(disposed.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_decode_failure_is_not_cached() {
    test::setup();
    let (cache, _) = counting_cache();
    let key = texture_key("materials/corrupt.png");
    let attempts = Arc::new(AtomicUsize::new(0));

    let attempts_first = attempts.clone();
    let result = cache
        .acquire(key.clone(), AssetKind::Texture, move || {
            async move {
                attempts_first.fetch_add(1, Ordering::SeqCst);
                Err(CacheError::DecodeFailed("bad magic bytes".into()))
            }
            .boxed()
        })
        .await;

    assert_eq!(
        result.err(),
        Some(CacheError::DecodeFailed("bad magic bytes".into()))
    );
    assert_eq!(cache.ref_count(&key), None);
    assert_eq!(cache.stats().entries, 0);

    // The next acquire retries from scratch and can succeed.
    let handle = cache
        .acquire(key.clone(), AssetKind::Texture, counted_decode(attempts.clone()))
        .await
        .unwrap();
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    assert!(!handle.is_disposed());
    assert_eq!(cache.ref_count(&key), Some(1));
}

#[tokio::test]
async fn test_preload_failures_do_not_abort_siblings() {
    test::setup();
    let (cache, _) = counting_cache();

    let batch = vec![
        (
            texture_key("materials/a.png"),
            AssetKind::Texture,
            Box::new(|| async { Ok(texture_payload()) }.boxed()) as super::DecodeFn,
        ),
        (
            texture_key("materials/b.png"),
            AssetKind::Texture,
            Box::new(|| {
                async { Err(CacheError::DecodeFailed("unsupported format".into())) }.boxed()
            }) as super::DecodeFn,
        ),
        (
            texture_key("materials/c.png"),
            AssetKind::Texture,
            Box::new(|| async { Ok(texture_payload()) }.boxed()) as super::DecodeFn,
        ),
    ];

    let results = cache.preload(batch).await;
    assert_eq!(results.len(), 3);
    assert!(results[0].is_ok());
    assert!(matches!(results[1], Err(CacheError::DecodeFailed(_))));
    assert!(results[2].is_ok());

    // The successes are cached and referenced, the failure left no entry.
    assert_eq!(cache.stats().entries, 2);
    assert_eq!(cache.ref_count(&texture_key("materials/a.png")), Some(1));
    assert_eq!(cache.ref_count(&texture_key("materials/b.png")), None);
}

#[tokio::test]
async fn test_clear_all_during_inflight_decode() {
    test::setup();
    let (cache, disposed) = counting_cache();
    let key = texture_key("materials/slow.png");
    let (gate_tx, gate_rx) = oneshot::channel::<()>();

    let loading = {
        let cache = cache.clone();
        let key = key.clone();
        tokio::spawn(async move {
            cache
                .acquire(key, AssetKind::Texture, move || {
                    async move {
                        let _ = gate_rx.await;
                        Ok(texture_payload())
                    }
                    .boxed()
                })
                .await
        })
    };

    // Let the acquire install its pending entry before clearing.
    while cache.stats().pending == 0 {
        tokio::task::yield_now().await;
    }
    cache.clear_all();
    assert_eq!(cache.stats().entries, 0);

    // The decode completes into a cleared store; its result is disposed on
    // arrival instead of resurrecting the entry.
    gate_tx.send(()).unwrap();
    let handle = loading.await.unwrap().unwrap();
    assert!(handle.is_disposed());
    assert_eq!(disposed.load(Ordering::SeqCst), 1);
    assert_eq!(cache.stats().entries, 0);

    // A fresh acquire for the same key starts a brand new decode.
    let fresh = cache
        .acquire(key.clone(), AssetKind::Texture, counted_decode(Default::default()))
        .await
        .unwrap();
    assert!(!fresh.is_disposed());
    assert_eq!(cache.ref_count(&key), Some(1));
}

#[tokio::test]
async fn test_evict_now_semantics() {
    test::setup();
    let (cache, disposed) = counting_cache();
    let key = texture_key("materials/oak.png");

    assert_eq!(cache.evict_now(&key), Ok(false));

    let handle = cache
        .acquire(key.clone(), AssetKind::Texture, counted_decode(Default::default()))
        .await
        .unwrap();

    // Still referenced: refused, nothing disposed.
    assert_eq!(cache.evict_now(&key), Err(CacheError::ResourceBusy));
    assert!(!handle.is_disposed());
    assert_eq!(disposed.load(Ordering::SeqCst), 0);

    cache.release(&key);
    assert_eq!(cache.evict_now(&key), Ok(true));
    assert!(handle.is_disposed());
    assert_eq!(disposed.load(Ordering::SeqCst), 1);
    assert_eq!(cache.stats().evictions, 1);

    // Already gone.
    assert_eq!(cache.evict_now(&key), Ok(false));
}

#[tokio::test]
async fn test_clear_all_disposes_each_entry_once() {
    test::setup();
    let (cache, disposed) = counting_cache();
    let oak = texture_key("materials/oak.png");
    let sofa = texture_key("models/sofa.glb");

    let oak_handle = cache
        .acquire(oak.clone(), AssetKind::Texture, counted_decode(Default::default()))
        .await
        .unwrap();
    let sofa_handle = cache
        .acquire(sofa.clone(), AssetKind::Model, move || {
            async move { Ok(model_payload()) }.boxed()
        })
        .await
        .unwrap();

    cache.clear_all();
    assert_eq!(disposed.load(Ordering::SeqCst), 2);
    assert!(oak_handle.is_disposed());
    assert!(sofa_handle.is_disposed());
    assert_eq!(cache.stats().entries, 0);
    // Shutdown disposals count as evictions too.
    assert_eq!(cache.stats().evictions, 2);

    // Repeating is a no-op; handles are never disposed twice.
    cache.clear_all();
    assert_eq!(disposed.load(Ordering::SeqCst), 2);
    assert_eq!(cache.stats().evictions, 2);
}

#[tokio::test(start_paused = true)]
async fn test_reaper_task_evicts_idle_entries() {
    test::setup();
    let (cache, disposed) = counting_cache();
    let token = CancellationToken::new();
    let reaper = super::spawn_reaper(cache.clone(), token.clone());

    let key = texture_key("materials/oak.png");
    cache
        .acquire(key.clone(), AssetKind::Texture, counted_decode(Default::default()))
        .await
        .unwrap();
    cache.release(&key);

    // Paused time auto-advances through the sweep interval; the second sweep
    // finds the entry past its idle threshold.
    tokio::time::sleep(Duration::from_secs(90)).await;
    assert_eq!(cache.ref_count(&key), None);
    assert_eq!(disposed.load(Ordering::SeqCst), 1);

    token.cancel();
    reaper.await.unwrap();
}

#[cfg(debug_assertions)]
#[tokio::test]
#[should_panic(expected = "release without matching acquire")]
async fn test_unbalanced_release_is_fatal_in_debug() {
    let (cache, _) = counting_cache();
    cache.release(&texture_key("materials/never-loaded.png"));
}
