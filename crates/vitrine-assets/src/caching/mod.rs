//! # Asset caching infrastructure
//!
//! Caching is front and center in vitrine: every material or model swap in
//! the configurator asks for externally sourced binary assets, and reloading
//! them on each swap would stall the frame loop and leak native memory. This
//! module contains the keyed in-memory cache, our central [`CacheError`]
//! type, and the lifecycle machinery around both.
//!
//! ## How a request flows
//!
//! A caller asks the [`AssetCache`] for an asset by [`AssetKey`]:
//!
//! - On a hit, the resolved handle is returned immediately, the entry's
//!   reference count goes up and its last-used time is refreshed.
//! - If a load for the key is already in flight, the caller joins it: one
//!   decode, any number of waiters.
//! - On a miss, a pending entry is installed *before* the decode starts, and
//!   the decode runs on a spawned task outside the table lock. This ordering
//!   is the core correctness property of the store: two "first" requesters
//!   can never race two decodes for the same key.
//!
//! Time drives reclamation independently of any caller: the reaper in
//! [`cleanup`](self) sweeps the table on a fixed interval and disposes
//! entries that are both unreferenced and idle beyond their kind's
//! threshold. Handles held by callers are never disposed underneath them.
//!
//! ## Ownership
//!
//! Each loaded asset has exactly one owning cache entry. Callers hold
//! borrowed `Arc` views of the handle; the native resource behind it is
//! released through the [`Disposer`] seam exactly once, when the entry is
//! evicted, force-evicted, or the whole store is cleared at shutdown.
//!
//! Failures are not cached: a failing decode drops its entry, every joined
//! waiter observes the same [`CacheError::DecodeFailed`], and the next
//! acquire for that key retries from scratch.

mod cache_error;
mod cache_key;
mod cleanup;
mod memory;
#[cfg(test)]
mod tests;

pub use cache_error::{CacheContents, CacheError};
pub use cache_key::{AssetKey, DecodeOptions, WrapMode};
pub use cleanup::spawn_reaper;
pub use memory::{AssetCache, CacheStats, DecodeFn, Disposer, NoopDisposer};
