//! Tile identity and tile payload types.
//!
//! A [`TileKey`] names one rendered variant of a map tile: the same
//! geographic tile rendered for two different themes or cache instances
//! produces two distinct keys because the cache identifier differs.
//!
//! A [`TileImage`] is the opaque encoded raster (PNG, JPEG, ...) produced by
//! a renderer. The buffer is reference counted, so handing an image to the
//! memory tier, the pending-write set and the worker never copies the bytes.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;

/// Identifies one rendered tile variant.
///
/// Keys are immutable once created; all fields are private and exposed
/// through accessors. Cloning is cheap (the cache identifier is shared).
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileKey {
    cache_id: Arc<str>,
    zoom: u8,
    x: u32,
    y: u32,
}

impl TileKey {
    /// Create a new tile key.
    ///
    /// # Arguments
    ///
    /// * `cache_id` - Identifier of the cache instance or render theme
    /// * `zoom` - Zoom level
    /// * `x` - Tile column
    /// * `y` - Tile row
    pub fn new(cache_id: impl Into<Arc<str>>, zoom: u8, x: u32, y: u32) -> Self {
        Self {
            cache_id: cache_id.into(),
            zoom,
            x,
            y,
        }
    }

    /// The cache identifier this tile belongs to.
    pub fn cache_id(&self) -> &str {
        &self.cache_id
    }

    pub fn zoom(&self) -> u8 {
        self.zoom
    }

    pub fn x(&self) -> u32 {
        self.x
    }

    pub fn y(&self) -> u32 {
        self.y
    }
}

impl fmt::Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}/{}", self.cache_id, self.zoom, self.x, self.y)
    }
}

impl fmt::Debug for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TileKey({})", self)
    }
}

/// An encoded tile raster.
#[derive(Clone, PartialEq, Eq)]
pub struct TileImage {
    data: Bytes,
}

impl TileImage {
    /// Wrap an encoded image buffer.
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }

    /// Borrow the encoded bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Size of the encoded image in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Consume the image and return the shared buffer.
    pub fn into_bytes(self) -> Bytes {
        self.data
    }
}

impl From<Vec<u8>> for TileImage {
    fn from(data: Vec<u8>) -> Self {
        Self::new(data)
    }
}

impl fmt::Debug for TileImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TileImage")
            .field("len", &self.data.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_tile_key_accessors() {
        let key = TileKey::new("osm", 12, 2200, 1343);
        assert_eq!(key.cache_id(), "osm");
        assert_eq!(key.zoom(), 12);
        assert_eq!(key.x(), 2200);
        assert_eq!(key.y(), 1343);
    }

    #[test]
    fn test_tile_key_display() {
        let key = TileKey::new("osm", 12, 2200, 1343);
        assert_eq!(key.to_string(), "osm/12/2200/1343");
        assert_eq!(format!("{:?}", key), "TileKey(osm/12/2200/1343)");
    }

    #[test]
    fn test_same_tile_different_cache_id_is_distinct() {
        let a = TileKey::new("theme-a", 12, 1, 1);
        let b = TileKey::new("theme-b", 12, 1, 1);
        assert_ne!(a, b);

        let mut set = HashSet::new();
        set.insert(a.clone());
        set.insert(b);
        set.insert(a);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_tile_image_len() {
        let image = TileImage::new(vec![1u8, 2, 3]);
        assert_eq!(image.len(), 3);
        assert!(!image.is_empty());
        assert_eq!(image.as_bytes(), &[1, 2, 3]);
        assert!(TileImage::new(Vec::new()).is_empty());
    }

    #[test]
    fn test_tile_image_clone_shares_buffer() {
        let image = TileImage::new(vec![7u8; 64]);
        let clone = image.clone();
        assert_eq!(image.as_bytes().as_ptr(), clone.as_bytes().as_ptr());
        assert_eq!(image, clone);
    }

    #[test]
    fn test_tile_image_debug_hides_payload() {
        let image = TileImage::new(vec![0u8; 10]);
        assert_eq!(format!("{:?}", image), "TileImage { len: 10 }");
    }
}
