use crate::caching::{CacheContents, CacheError};
use crate::types::{MeshPrimitive, ParsedModel};

/// Parses glTF/GLB bytes into a flat list of mesh primitives.
///
/// Only geometry is extracted: positions, normals, first UV set, and the
/// index buffer. Primitives without positions are skipped; a model yielding
/// no usable primitive at all is treated as malformed.
pub fn decode(bytes: &[u8]) -> CacheContents<ParsedModel> {
    let (document, buffers, _images) = gltf::import_slice(bytes)
        .map_err(|e| CacheError::DecodeFailed(format!("model parse failed: {e}")))?;

    let mut primitives = Vec::new();
    for mesh in document.meshes() {
        for primitive in mesh.primitives() {
            let reader = primitive
                .reader(|buffer| buffers.get(buffer.index()).map(|data| data.0.as_slice()));

            let positions: Vec<[f32; 3]> = reader
                .read_positions()
                .map(|iter| iter.collect())
                .unwrap_or_default();
            if positions.is_empty() {
                continue;
            }

            let normals = reader
                .read_normals()
                .map(|iter| iter.collect())
                .unwrap_or_default();
            let tex_coords = reader
                .read_tex_coords(0)
                .map(|tc| tc.into_f32().collect())
                .unwrap_or_default();
            let indices = reader
                .read_indices()
                .map(|idx| idx.into_u32().collect())
                .unwrap_or_else(|| (0..positions.len() as u32).collect());

            primitives.push(MeshPrimitive {
                positions,
                normals,
                tex_coords,
                indices,
            });
        }
    }

    if primitives.is_empty() {
        return Err(CacheError::DecodeFailed(
            "model contains no mesh primitives".into(),
        ));
    }

    Ok(ParsedModel { primitives })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_garbage_is_decode_failed() {
        let result = decode(b"not a model");
        assert!(matches!(result, Err(CacheError::DecodeFailed(_))));
    }

    #[test]
    fn test_empty_document_is_decode_failed() {
        // A syntactically valid glTF document without any mesh.
        let gltf = br#"{"asset":{"version":"2.0"},"meshes":[]}"#;
        let result = decode(gltf);
        assert!(matches!(result, Err(CacheError::DecodeFailed(_))));
    }
}
