use image::imageops::FilterType;

use crate::caching::{CacheContents, CacheError, DecodeOptions};
use crate::types::DecodedTexture;

/// Decodes image bytes into an RGBA8 texture.
///
/// When `generate_mips` is set, a box-filtered mip chain is derived down to
/// 1x1, each level halving the previous one's dimensions.
pub fn decode(bytes: &[u8], options: DecodeOptions) -> CacheContents<DecodedTexture> {
    let image = image::load_from_memory(bytes)
        .map_err(|e| CacheError::DecodeFailed(format!("image decode failed: {e}")))?;
    let base = image.to_rgba8();
    let (width, height) = base.dimensions();

    let mut levels = vec![base.as_raw().clone()];
    if options.generate_mips {
        let (mut w, mut h) = (width, height);
        let mut current = base;
        while w > 1 || h > 1 {
            w = (w / 2).max(1);
            h = (h / 2).max(1);
            current = image::imageops::resize(&current, w, h, FilterType::Triangle);
            levels.push(current.as_raw().clone());
        }
    }

    Ok(DecodedTexture {
        width,
        height,
        levels,
        options,
    })
}
