//! Asset loading, caching and lifecycle management for interactive 3D
//! viewers.
//!
//! The crate is built around one [`AssetService`] per application. It owns an
//! [`AssetCache`] that deduplicates concurrent loads of the same asset, a
//! background reaper that reclaims idle entries, and the decoders that turn
//! raw bytes into usable textures and models.

pub mod caching;
pub mod config;
pub mod decoders;
pub mod download;
pub mod lod;
pub mod logging;
pub mod services;
pub mod types;


pub use caching::{
    AssetCache, AssetKey, CacheContents, CacheError, CacheStats, DecodeOptions, Disposer, WrapMode,
};
pub use lod::LodHandle;
pub use services::{AssetRequest, AssetService};
pub use types::{AssetHandle, AssetKind};
