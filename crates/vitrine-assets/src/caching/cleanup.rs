//! Periodic reclamation of idle cache entries.
//!
//! The sweep itself is the explicit, clock-driven [`AssetCache::tick`], so
//! eviction policy can be tested deterministically; [`spawn_reaper`] merely
//! drives it on the configured interval.

use std::sync::atomic::Ordering;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::memory::Payload;
use super::AssetCache;

impl AssetCache {
    /// One reaper sweep at time `now`.
    ///
    /// Two phases: first scan the whole table and mark every entry that is
    /// unreferenced, resolved, and idle beyond its kind's threshold; then
    /// evict the marked entries. Marking never mutates the table mid-scan.
    /// Entries still decoding are never reaped, and neither is anything with
    /// an outstanding reference.
    ///
    /// Disposal happens after the table lock is released, so a disposer may
    /// call back into the cache.
    pub fn tick(&self, now: Instant) {
        let evicted = {
            let mut table = self.inner.table.lock().unwrap();

            let marked: Vec<_> = table
                .entries
                .iter()
                .filter(|(_, entry)| {
                    entry.ref_count == 0
                        && matches!(entry.payload, Payload::Resolved(_))
                        && now.duration_since(entry.last_used)
                            > self.inner.config.idle_threshold(entry.kind)
                })
                .map(|(key, _)| key.clone())
                .collect();

            marked
                .into_iter()
                .filter_map(|key| table.entries.remove(&key).map(|entry| (key, entry)))
                .collect::<Vec<_>>()
        };

        for (key, entry) in evicted {
            tracing::debug!(key = %key, kind = %entry.kind, "evicting idle asset");
            self.inner.stats.evictions.fetch_add(1, Ordering::Relaxed);
            if let Payload::Resolved(handle) = entry.payload {
                self.dispose_handle(&handle);
            }
        }
    }
}

/// Spawns the task that sweeps `cache` every configured interval until
/// `token` is cancelled.
pub fn spawn_reaper(cache: AssetCache, token: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(cache.config().sweep_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = interval.tick() => cache.tick(Instant::now()),
            }
        }
        tracing::debug!("reaper stopped");
    })
}
