//! Kind-specific decode routines.
//!
//! Stateless: raw bytes in, renderer-consumable payload out. The cache never
//! calls these directly; callers hand them to
//! [`AssetCache::acquire`](crate::caching::AssetCache::acquire) as the decode
//! routine for their key.

pub mod model;
pub mod texture;
