//! Distance-based detail variants derived from a cached model.
//!
//! LOD construction goes through the [`AssetCache`] like any other model
//! request, so the base geometry participates in the usual refcounting and
//! disposal discipline: a live [`LodHandle`] keeps its base model pinned in
//! the cache, and dropping it releases that acquisition.

use std::sync::Arc;

use futures::future::BoxFuture;

use crate::caching::{AssetCache, AssetKey, CacheContents, CacheError};
use crate::types::{AssetHandle, AssetKind, AssetPayload};

/// One detail variant: the base model's vertex data with a decimated index
/// buffer per primitive.
pub struct LodLevel {
    /// This variant's own reference to the base model.
    base: Arc<AssetHandle>,
    /// Decimated index buffers, one per primitive of the base model.
    pub indices: Vec<Vec<u32>>,
}

impl LodLevel {
    pub fn base(&self) -> &Arc<AssetHandle> {
        &self.base
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.iter().map(|i| i.len() / 3).sum()
    }
}

/// A set of progressively simplified variants of one model, selected by
/// viewing distance.
///
/// Dropping the handle releases the base model's cache acquisition.
pub struct LodHandle {
    cache: AssetCache,
    key: AssetKey,
    /// Upper viewing distances: variant `i` applies up to `distances[i]`,
    /// the final variant covers everything beyond the last distance.
    distances: Vec<f64>,
    levels: Vec<LodLevel>,
}

impl LodHandle {
    pub fn key(&self) -> &AssetKey {
        &self.key
    }

    pub fn levels(&self) -> &[LodLevel] {
        &self.levels
    }

    /// The variant to render at the given viewing distance.
    pub fn level_for_distance(&self, distance: f64) -> &LodLevel {
        let idx = self
            .distances
            .iter()
            .position(|&d| distance <= d)
            .unwrap_or(self.distances.len());
        &self.levels[idx]
    }
}

impl Drop for LodHandle {
    fn drop(&mut self) {
        self.levels.clear();
        self.cache.release(&self.key);
    }
}

/// Builds `distances.len() + 1` detail variants of the model behind `key`.
///
/// The base model is acquired through `cache`; if its load fails, this fails
/// with the same error and produces no partial LOD object. Variant `n` keeps
/// every `2^n`-th triangle.
pub async fn build_lod<F>(
    cache: &AssetCache,
    key: AssetKey,
    decode: F,
    distances: &[f64],
) -> CacheContents<LodHandle>
where
    F: FnOnce() -> BoxFuture<'static, CacheContents<AssetPayload>>,
{
    let base = cache.acquire(key.clone(), AssetKind::Model, decode).await?;

    let model = match base.payload() {
        AssetPayload::Model(model) => model,
        AssetPayload::Texture(_) => {
            cache.release(&key);
            return Err(CacheError::DecodeFailed(
                "LOD requested for a non-model asset".into(),
            ));
        }
    };

    let levels = (0..=distances.len())
        .map(|level| {
            // Saturates for very deep chains instead of overflowing the shift.
            let factor = 1usize.checked_shl(level as u32).unwrap_or(usize::MAX);
            LodLevel {
                base: base.clone(),
                indices: model
                    .primitives
                    .iter()
                    .map(|prim| decimate(&prim.indices, factor))
                    .collect(),
            }
        })
        .collect();

    Ok(LodHandle {
        cache: cache.clone(),
        key,
        distances: distances.to_vec(),
        levels,
    })
}

/// Keeps every `factor`-th triangle of an index buffer.
fn decimate(indices: &[u32], factor: usize) -> Vec<u32> {
    if factor <= 1 {
        return indices.to_vec();
    }
    indices
        .chunks_exact(3)
        .step_by(factor)
        .flatten()
        .copied()
        .collect()
}
