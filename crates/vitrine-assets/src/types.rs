//! The decoded asset types handed out by the cache.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::caching::{AssetKey, DecodeOptions};

/// The closed set of asset kinds the cache manages.
///
/// The kind selects both the decoder and the idle threshold that applies to an
/// entry, and dispatch over it is exhaustive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetKind {
    Texture,
    Model,
}

impl AssetKind {
    pub fn name(&self) -> &'static str {
        match self {
            AssetKind::Texture => "texture",
            AssetKind::Model => "model",
        }
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A decoded image, as consumed by the renderer.
///
/// Pixel data is RGBA8. `levels[0]` is the base image; further levels are the
/// mip chain when mip generation was requested, each level halving the
/// previous one's dimensions.
#[derive(Debug, Clone)]
pub struct DecodedTexture {
    pub width: u32,
    pub height: u32,
    pub levels: Vec<Vec<u8>>,
    pub options: DecodeOptions,
}

/// A single glTF mesh primitive with its vertex streams.
#[derive(Debug, Clone, Default)]
pub struct MeshPrimitive {
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub tex_coords: Vec<[f32; 2]>,
    pub indices: Vec<u32>,
}

impl MeshPrimitive {
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

/// A parsed model, flattened to its mesh primitives.
#[derive(Debug, Clone, Default)]
pub struct ParsedModel {
    pub primitives: Vec<MeshPrimitive>,
}

/// The decoded contents of a cache entry.
#[derive(Debug, Clone)]
pub enum AssetPayload {
    Texture(DecodedTexture),
    Model(ParsedModel),
}

impl AssetPayload {
    pub fn kind(&self) -> AssetKind {
        match self {
            AssetPayload::Texture(_) => AssetKind::Texture,
            AssetPayload::Model(_) => AssetKind::Model,
        }
    }
}

/// Ownership token for one decoded native resource.
///
/// Exactly one cache entry owns a given handle. Callers get `Arc` clones of it
/// and must never assume the resource outlives their acquisition.
#[derive(Debug)]
pub struct AssetHandle {
    key: AssetKey,
    payload: AssetPayload,
    disposed: AtomicBool,
}

impl AssetHandle {
    pub(crate) fn new(key: AssetKey, payload: AssetPayload) -> Self {
        Self {
            key,
            payload,
            disposed: AtomicBool::new(false),
        }
    }

    pub fn key(&self) -> &AssetKey {
        &self.key
    }

    pub fn kind(&self) -> AssetKind {
        self.payload.kind()
    }

    pub fn payload(&self) -> &AssetPayload {
        &self.payload
    }

    /// Whether the underlying native resource has been released.
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Flips the disposed flag, returning `true` exactly once.
    pub(crate) fn mark_disposed(&self) -> bool {
        !self.disposed.swap(true, Ordering::AcqRel)
    }
}
