//! Tile rendering collaborator.
//!
//! The cache never renders. On a miss the caller renders the tile and puts
//! it, or hands a [`TileRenderer`] to
//! [`TileCache::get_or_render`](crate::cache::TileCache::get_or_render).

use std::io::Cursor;

use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use thiserror::Error;

use crate::key::{TileImage, TileKey};

/// Errors raised while rendering a tile.
#[derive(Debug, Error)]
pub enum RenderError {
    /// Encoding the raster failed.
    #[error("Failed to encode tile: {0}")]
    Encode(#[from] image::ImageError),

    /// The renderer could not produce the tile.
    #[error("Render failed: {0}")]
    Failed(String),
}

/// Produces the encoded image for a tile key.
pub trait TileRenderer: Send + Sync {
    fn render(&self, key: &TileKey) -> Result<TileImage, RenderError>;
}

impl<F> TileRenderer for F
where
    F: Fn(&TileKey) -> Result<TileImage, RenderError> + Send + Sync,
{
    fn render(&self, key: &TileKey) -> Result<TileImage, RenderError> {
        self(key)
    }
}

/// Renders each tile as a flat PNG whose colour is derived from its key.
///
/// Useful for warming a cache and for exercising the storage path with
/// realistic payloads.
#[derive(Debug, Clone, Copy)]
pub struct SolidTileRenderer {
    tile_size: u32,
}

impl SolidTileRenderer {
    pub fn new(tile_size: u32) -> Self {
        Self { tile_size }
    }

    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    /// Colour used for `key`.
    pub fn color_for(key: &TileKey) -> Rgba<u8> {
        let mut hash: u32 = 2_166_136_261;
        for byte in key.cache_id().bytes() {
            hash = (hash ^ byte as u32).wrapping_mul(16_777_619);
        }
        for part in [key.zoom() as u32, key.x(), key.y()] {
            hash = (hash ^ part).wrapping_mul(16_777_619);
        }
        let [r, g, b, _] = hash.to_le_bytes();
        Rgba([r, g, b, 255])
    }
}

impl TileRenderer for SolidTileRenderer {
    fn render(&self, key: &TileKey) -> Result<TileImage, RenderError> {
        if self.tile_size == 0 {
            return Err(RenderError::Failed("tile size is 0".to_string()));
        }

        let raster = RgbaImage::from_pixel(self.tile_size, self.tile_size, Self::color_for(key));
        let mut encoded = Vec::new();
        DynamicImage::ImageRgba8(raster)
            .write_to(&mut Cursor::new(&mut encoded), ImageFormat::Png)?;
        Ok(TileImage::new(encoded))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_SIGNATURE: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

    #[test]
    fn test_solid_renderer_produces_png() {
        let renderer = SolidTileRenderer::new(16);
        let image = renderer.render(&TileKey::new("osm", 3, 1, 2)).unwrap();

        assert!(image.as_bytes().starts_with(PNG_SIGNATURE));

        let decoded = image::load_from_memory(image.as_bytes()).unwrap();
        assert_eq!(decoded.width(), 16);
        assert_eq!(decoded.height(), 16);
    }

    #[test]
    fn test_color_depends_on_key() {
        let a = SolidTileRenderer::color_for(&TileKey::new("osm", 3, 1, 2));
        let b = SolidTileRenderer::color_for(&TileKey::new("osm", 3, 1, 2));
        let c = SolidTileRenderer::color_for(&TileKey::new("dark", 3, 1, 2));

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_zero_size_fails() {
        let result = SolidTileRenderer::new(0).render(&TileKey::new("osm", 0, 0, 0));
        assert!(matches!(result, Err(RenderError::Failed(_))));
    }

    #[test]
    fn test_closure_renderer() {
        let renderer =
            |key: &TileKey| Ok::<_, RenderError>(TileImage::new(key.to_string().into_bytes()));
        let image = renderer.render(&TileKey::new("t", 1, 2, 3)).unwrap();
        assert_eq!(image.as_bytes(), b"t/1/2/3");
    }
}
