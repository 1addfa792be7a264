use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::config::CacheConfig;
use crate::types::{AssetHandle, AssetKind, AssetPayload};

use super::{AssetKey, CacheContents, CacheError};

/// The in-flight load joined by every caller that requests a key before its
/// decode completes.
type SharedLoad = Shared<BoxFuture<'static, CacheContents<Arc<AssetHandle>>>>;

/// A decode routine, invoked at most once per entry lifetime.
pub type DecodeFn = Box<dyn FnOnce() -> BoxFuture<'static, CacheContents<AssetPayload>> + Send>;

/// Releases the native resource behind an evicted or cleared handle.
///
/// The store guarantees at most one call per handle, so implementations do
/// not need their own double-free protection.
pub trait Disposer: Send + Sync + 'static {
    fn dispose(&self, handle: &AssetHandle);
}

/// Disposer for purely CPU-side payloads, where dropping the last `Arc` is
/// all the release there is.
#[derive(Debug, Default)]
pub struct NoopDisposer;

impl Disposer for NoopDisposer {
    fn dispose(&self, _handle: &AssetHandle) {}
}

pub(super) enum Payload {
    /// A decode is in flight. The `id` ties the spawned decode task to this
    /// particular entry, so a result can never be installed into an entry
    /// created after a forced eviction or `clear_all`.
    Pending { id: u64, load: SharedLoad },
    Resolved(Arc<AssetHandle>),
}

pub(super) struct CacheEntry {
    pub(super) kind: AssetKind,
    pub(super) payload: Payload,
    /// Refreshed on every acquire and release; the reaper's idle clock.
    pub(super) last_used: Instant,
    /// Outstanding acquisitions not yet released.
    pub(super) ref_count: u32,
}

#[derive(Default)]
pub(super) struct Table {
    pub(super) entries: HashMap<AssetKey, CacheEntry>,
    next_pending_id: u64,
}

#[derive(Default)]
pub(super) struct StatsCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    pub(super) evictions: AtomicU64,
}

/// A point-in-time snapshot of cache activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: u64,
    pub pending: u64,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

pub(super) struct CacheInner {
    pub(super) table: Mutex<Table>,
    pub(super) config: CacheConfig,
    pub(super) disposer: Box<dyn Disposer>,
    pub(super) stats: StatsCounters,
}

/// The keyed table owning the single authoritative copy of every loaded
/// asset.
///
/// Deduplicates concurrent loads: the first request for a key installs a
/// pending entry *before* its decode starts, and every request arriving until
/// resolution joins that one in-flight load. All table transitions (insert
/// pending, resolve, refcount changes, eviction) are serialized behind one
/// mutex; decoding itself runs outside the critical section on a spawned
/// task, so it completes and lands in the cache even if every requester goes
/// away.
pub struct AssetCache {
    pub(super) inner: Arc<CacheInner>,
}

impl Clone for AssetCache {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl fmt::Debug for AssetCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self
            .inner
            .table
            .try_lock()
            .map(|t| t.entries.len())
            .unwrap_or_default();
        f.debug_struct("AssetCache")
            .field("config", &self.inner.config)
            .field("entries", &entries)
            .finish()
    }
}

/// What `acquire` decided to do while it held the table lock.
enum Acquired {
    Hit(Arc<AssetHandle>),
    Join(SharedLoad),
    Start {
        id: u64,
        load: SharedLoad,
        tx: oneshot::Sender<CacheContents<Arc<AssetHandle>>>,
    },
}

impl AssetCache {
    pub fn new(config: CacheConfig) -> Self {
        Self::with_disposer(config, Box::new(NoopDisposer))
    }

    pub fn with_disposer(config: CacheConfig, disposer: Box<dyn Disposer>) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                table: Mutex::new(Table::default()),
                config,
                disposer,
                stats: StatsCounters::default(),
            }),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Acquires the asset identified by `key`, loading it via `decode` if it
    /// is not cached yet.
    ///
    /// Every call increments the entry's reference count and refreshes its
    /// last-used time, including calls that join an in-flight load. A hit on
    /// an already resolved entry returns without suspending; `decode` is only
    /// invoked when this call is the one that creates the entry.
    pub async fn acquire<F>(
        &self,
        key: AssetKey,
        kind: AssetKind,
        decode: F,
    ) -> CacheContents<Arc<AssetHandle>>
    where
        F: FnOnce() -> BoxFuture<'static, CacheContents<AssetPayload>>,
    {
        let acquired = {
            let mut table = self.inner.table.lock().unwrap();
            match table.entries.get_mut(&key) {
                Some(entry) => {
                    entry.ref_count += 1;
                    entry.last_used = Instant::now();
                    self.inner.stats.hits.fetch_add(1, Ordering::Relaxed);
                    match &entry.payload {
                        Payload::Resolved(handle) => Acquired::Hit(handle.clone()),
                        Payload::Pending { load, .. } => Acquired::Join(load.clone()),
                    }
                }
                None => {
                    self.inner.stats.misses.fetch_add(1, Ordering::Relaxed);
                    let id = table.next_pending_id;
                    table.next_pending_id += 1;

                    let (tx, rx) = oneshot::channel();
                    let load: SharedLoad = rx
                        .map(|res| res.unwrap_or(Err(CacheError::InternalError)))
                        .boxed()
                        .shared();

                    // The pending entry goes into the table before the decode
                    // starts: any acquire from here on joins it instead of
                    // racing a second decode.
                    table.entries.insert(
                        key.clone(),
                        CacheEntry {
                            kind,
                            payload: Payload::Pending {
                                id,
                                load: load.clone(),
                            },
                            last_used: Instant::now(),
                            ref_count: 1,
                        },
                    );
                    Acquired::Start { id, load, tx }
                }
            }
        };

        match acquired {
            Acquired::Hit(handle) => Ok(handle),
            Acquired::Join(load) => load.await,
            Acquired::Start { id, load, tx } => {
                tracing::trace!(key = %key, %kind, "starting asset decode");
                let this = self.clone();
                let decode = decode();
                let key = key.clone();
                tokio::spawn(async move { this.run_decode(key, id, decode, tx).await });
                load.await
            }
        }
    }

    /// Runs one decode to completion and installs its result.
    ///
    /// Runs on a spawned task: releasing all references to a key does not
    /// cancel its in-flight decode, the result still lands in the cache and
    /// simply becomes eligible for idle eviction.
    async fn run_decode(
        &self,
        key: AssetKey,
        id: u64,
        decode: BoxFuture<'static, CacheContents<AssetPayload>>,
        tx: oneshot::Sender<CacheContents<Arc<AssetHandle>>>,
    ) {
        let result = decode
            .await
            .map(|payload| Arc::new(AssetHandle::new(key.clone(), payload)));

        let mut stale = None;
        {
            let mut table = self.inner.table.lock().unwrap();
            let is_ours = match table.entries.get(&key) {
                Some(entry) => {
                    matches!(&entry.payload, Payload::Pending { id: pending, .. } if *pending == id)
                }
                None => false,
            };

            if is_ours {
                match &result {
                    Ok(handle) => {
                        if let Some(entry) = table.entries.get_mut(&key) {
                            entry.payload = Payload::Resolved(handle.clone());
                        }
                    }
                    Err(err) => {
                        // Failures are never cached; the next acquire retries.
                        tracing::warn!(key = %key, error = %err, "asset decode failed");
                        table.entries.remove(&key);
                    }
                }
            } else if let Ok(handle) = &result {
                // The entry was cleared or force-evicted mid-decode. The
                // result arrives into nothing and is released right away.
                stale = Some(handle.clone());
            }
        }

        if let Some(handle) = stale {
            tracing::debug!(key = %key, "disposing decode result that outlived its entry");
            self.dispose_handle(&handle);
        }

        // Joiners wake only after the table transition above, so a caller
        // that re-acquires immediately observes the resolved entry.
        let _ = tx.send(result);
    }

    /// Releases one acquisition of `key`.
    ///
    /// Does not evict: reclamation is the reaper's policy decision. Releasing
    /// without a matching acquire is a programmer error, fatal in debug
    /// builds and logged in release builds.
    pub fn release(&self, key: &AssetKey) {
        let mut table = self.inner.table.lock().unwrap();
        match table.entries.get_mut(key) {
            Some(entry) if entry.ref_count > 0 => {
                entry.ref_count -= 1;
                entry.last_used = Instant::now();
            }
            _ => {
                drop(table);
                tracing::error!(key = %key, "{}", CacheError::UnbalancedRelease);
                debug_assert!(false, "release without matching acquire: {key}");
            }
        }
    }

    /// Forces disposal of `key` regardless of idle time.
    ///
    /// Returns `Ok(false)` if the key is absent and `Err(ResourceBusy)` if
    /// the entry still has outstanding acquisitions.
    pub fn evict_now(&self, key: &AssetKey) -> CacheContents<bool> {
        let removed = {
            let mut table = self.inner.table.lock().unwrap();
            match table.entries.get(key) {
                None => return Ok(false),
                Some(entry) if entry.ref_count > 0 => return Err(CacheError::ResourceBusy),
                Some(_) => table.entries.remove(key),
            }
        };
        if let Some(entry) = removed {
            self.inner.stats.evictions.fetch_add(1, Ordering::Relaxed);
            if let Payload::Resolved(handle) = entry.payload {
                self.dispose_handle(&handle);
            }
            // A removed pending entry's result is disposed on arrival by its
            // decode task.
        }
        Ok(true)
    }

    /// Disposes every entry unconditionally and resets the store to empty.
    ///
    /// Shutdown only. In-flight decodes are left to complete, but their
    /// results are disposed on arrival instead of cached, so the store is
    /// never resurrected.
    pub fn clear_all(&self) {
        let entries = {
            let mut table = self.inner.table.lock().unwrap();
            std::mem::take(&mut table.entries)
        };
        let mut disposed = 0usize;
        for entry in entries.into_values() {
            if let Payload::Resolved(handle) = entry.payload {
                self.inner.stats.evictions.fetch_add(1, Ordering::Relaxed);
                self.dispose_handle(&handle);
                disposed += 1;
            }
        }
        tracing::debug!(disposed, "cleared asset cache");
    }

    /// Fires `acquire` for every item; each element succeeds or fails on its
    /// own, one failing decode never aborts or cancels its siblings.
    pub async fn preload(
        &self,
        batch: Vec<(AssetKey, AssetKind, DecodeFn)>,
    ) -> Vec<CacheContents<Arc<AssetHandle>>> {
        let loads = batch
            .into_iter()
            .map(|(key, kind, decode)| self.acquire(key, kind, decode));
        futures::future::join_all(loads).await
    }

    pub fn stats(&self) -> CacheStats {
        let table = self.inner.table.lock().unwrap();
        let pending = table
            .entries
            .values()
            .filter(|e| matches!(e.payload, Payload::Pending { .. }))
            .count() as u64;
        CacheStats {
            entries: table.entries.len() as u64,
            pending,
            hits: self.inner.stats.hits.load(Ordering::Relaxed),
            misses: self.inner.stats.misses.load(Ordering::Relaxed),
            evictions: self.inner.stats.evictions.load(Ordering::Relaxed),
        }
    }

    /// The number of outstanding acquisitions for `key`, if present.
    pub fn ref_count(&self, key: &AssetKey) -> Option<u32> {
        let table = self.inner.table.lock().unwrap();
        table.entries.get(key).map(|entry| entry.ref_count)
    }

    /// Releases the native resource exactly once, no matter how many paths
    /// race to dispose the same handle.
    pub(crate) fn dispose_handle(&self, handle: &Arc<AssetHandle>) {
        if handle.mark_disposed() {
            self.inner.disposer.dispose(handle);
        }
    }
}
