//! Filesystem-backed persistent tier.
//!
//! Tiles are stored one file per key:
//!
//! ```text
//! <root>/<cache_id>/<zoom>/<x>/<y>.tile
//! ```
//!
//! The cache identifier is escaped into a single safe path component, so a
//! purge of one identifier is a single directory removal. Writes go to a
//! uniquely named temp file that is renamed into place, so a concurrent
//! reader sees either the previous tile or the complete new one.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tracing::debug;

use super::traits::{StorageError, TileTier};
use crate::key::{TileImage, TileKey};

/// File extension for stored tiles.
pub const TILE_EXTENSION: &str = "tile";

/// Tries per write or directory removal racing the opposite operation.
const RACE_ATTEMPTS: usize = 3;

/// File and byte counts for one cache identifier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DiskUsage {
    pub files: u64,
    pub bytes: u64,
}

/// Persistent tier writing tiles as individual files.
pub struct FileSystemTier {
    root: PathBuf,
    temp_counter: AtomicU64,
}

impl FileSystemTier {
    /// Open (and create if needed) a tile store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        debug!(root = %root.display(), "Opened filesystem tile tier");
        Ok(Self {
            root,
            temp_counter: AtomicU64::new(0),
        })
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the file holding `key`.
    pub fn tile_path(&self, key: &TileKey) -> PathBuf {
        self.root
            .join(encode_cache_id(key.cache_id()))
            .join(key.zoom().to_string())
            .join(key.x().to_string())
            .join(format!("{}.{}", key.y(), TILE_EXTENSION))
    }

    /// Per-identifier file and byte counts of everything on disk.
    pub fn disk_usage(&self) -> Result<BTreeMap<String, DiskUsage>, StorageError> {
        let mut usage = BTreeMap::new();
        let dir = match fs::read_dir(&self.root) {
            Ok(dir) => dir,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(usage),
            Err(e) => return Err(e.into()),
        };

        for entry in dir {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let Some(cache_id) = entry.file_name().to_str().and_then(decode_cache_id) else {
                continue;
            };
            let mut totals = DiskUsage::default();
            walk_tiles(&entry.path(), &mut |size| {
                totals.files += 1;
                totals.bytes += size;
            })?;
            usage.insert(cache_id, totals);
        }
        Ok(usage)
    }

    fn temp_path(&self, path: &Path) -> PathBuf {
        let n = self.temp_counter.fetch_add(1, Ordering::Relaxed);
        path.with_extension(format!("{}.{}.tmp", std::process::id(), n))
    }

    fn remove_tree(&self, dir: &Path) -> Result<usize, StorageError> {
        let mut count = 0usize;
        match walk_tiles(dir, &mut |_| count += 1) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        }
        let mut attempt = 1;
        loop {
            match fs::remove_dir_all(dir) {
                Ok(()) => return Ok(count),
                Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(count),
                // A concurrent write can repopulate a directory while it is being removed.
                Err(_) if attempt < RACE_ATTEMPTS => attempt += 1,
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl TileTier for FileSystemTier {
    fn get(&self, key: &TileKey) -> Result<Option<TileImage>, StorageError> {
        match fs::read(self.tile_path(key)) {
            Ok(bytes) => Ok(Some(TileImage::new(bytes))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn put(&self, key: &TileKey, image: &TileImage) -> Result<(), StorageError> {
        let path = self.tile_path(key);
        let temp_path = self.temp_path(&path);

        let mut attempt = 1;
        loop {
            let written = path
                .parent()
                .map_or(Ok(()), fs::create_dir_all)
                .and_then(|()| write_atomically(&temp_path, &path, image.as_bytes()));
            match written {
                // A purge of the same identifier removed the directory under us.
                Err(e) if e.kind() == io::ErrorKind::NotFound && attempt < RACE_ATTEMPTS => {
                    attempt += 1;
                }
                result => return result.map_err(StorageError::from),
            }
        }
    }

    fn delete(&self, key: &TileKey) -> Result<bool, StorageError> {
        match fs::remove_file(self.tile_path(key)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn contains(&self, key: &TileKey) -> Result<bool, StorageError> {
        Ok(self.tile_path(key).is_file())
    }

    fn purge(&self, cache_id: &str) -> Result<usize, StorageError> {
        let removed = self.remove_tree(&self.root.join(encode_cache_id(cache_id)))?;
        debug!(cache_id, removed, "Purged tiles from disk");
        Ok(removed)
    }

    fn purge_all(&self) -> Result<usize, StorageError> {
        let mut removed = 0;
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                removed += self.remove_tree(&entry.path())?;
            }
        }
        Ok(removed)
    }
}

/// Visit every stored tile under `dir`, passing its size.
fn walk_tiles(dir: &Path, visit: &mut dyn FnMut(u64)) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            walk_tiles(&entry.path(), visit)?;
        } else if file_type.is_file()
            && entry.path().extension().is_some_and(|ext| ext == TILE_EXTENSION)
        {
            visit(entry.metadata()?.len());
        }
    }
    Ok(())
}

/// Write `bytes` to `temp_path`, then rename it over `path`.
fn write_atomically(temp_path: &Path, path: &Path, bytes: &[u8]) -> io::Result<()> {
    fs::write(temp_path, bytes)?;
    if let Err(e) = fs::rename(temp_path, path) {
        let _ = fs::remove_file(temp_path);
        return Err(e);
    }
    Ok(())
}

/// Escape a cache identifier into one safe path component.
///
/// ASCII alphanumerics, `-` and `_` are kept; every other byte becomes `%XX`.
/// The empty identifier maps to `%` so it still has its own directory.
pub fn encode_cache_id(cache_id: &str) -> String {
    if cache_id.is_empty() {
        return "%".to_string();
    }
    let mut out = String::with_capacity(cache_id.len());
    for byte in cache_id.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
    out
}

/// Reverse of [`encode_cache_id`]. Returns `None` for names it never produces.
pub fn decode_cache_id(encoded: &str) -> Option<String> {
    if encoded == "%" {
        return Some(String::new());
    }
    let bytes = encoded.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = encoded.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_tier() -> (TempDir, FileSystemTier) {
        let dir = TempDir::new().unwrap();
        let tier = FileSystemTier::open(dir.path().join("tiles")).unwrap();
        (dir, tier)
    }

    #[test]
    fn test_tile_path_layout() {
        let (_dir, tier) = open_tier();
        let path = tier.tile_path(&TileKey::new("osm", 12, 1234, 5678));
        assert_eq!(
            path,
            tier.root().join("osm").join("12").join("1234").join("5678.tile")
        );
    }

    #[test]
    fn test_put_and_get() {
        let (_dir, tier) = open_tier();
        let key = TileKey::new("osm", 3, 1, 2);
        let image = TileImage::new(vec![9u8, 8, 7]);

        tier.put(&key, &image).unwrap();

        assert_eq!(tier.get(&key).unwrap(), Some(image));
        assert!(tier.contains(&key).unwrap());
    }

    #[test]
    fn test_get_missing_is_none() {
        let (_dir, tier) = open_tier();
        assert!(tier.get(&TileKey::new("osm", 1, 0, 0)).unwrap().is_none());
    }

    #[test]
    fn test_put_replaces_and_leaves_no_temp_files() {
        let (_dir, tier) = open_tier();
        let key = TileKey::new("osm", 3, 1, 2);
        tier.put(&key, &TileImage::new(vec![1u8; 10])).unwrap();
        tier.put(&key, &TileImage::new(vec![2u8; 4])).unwrap();

        assert_eq!(tier.get(&key).unwrap().unwrap().as_bytes(), &[2, 2, 2, 2]);

        let parent = tier.tile_path(&key).parent().unwrap().to_path_buf();
        let temp_files = fs::read_dir(parent)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "tmp"))
            .count();
        assert_eq!(temp_files, 0);
    }

    #[test]
    fn test_delete() {
        let (_dir, tier) = open_tier();
        let key = TileKey::new("osm", 3, 1, 2);
        tier.put(&key, &TileImage::new(vec![1u8])).unwrap();

        assert!(tier.delete(&key).unwrap());
        assert!(!tier.delete(&key).unwrap());
        assert!(tier.get(&key).unwrap().is_none());
    }

    #[test]
    fn test_purge_only_matching_identifier() {
        let (_dir, tier) = open_tier();
        tier.put(&TileKey::new("day", 5, 1, 1), &TileImage::new(vec![1u8]))
            .unwrap();
        tier.put(&TileKey::new("day", 6, 2, 2), &TileImage::new(vec![1u8]))
            .unwrap();
        tier.put(&TileKey::new("night", 5, 1, 1), &TileImage::new(vec![1u8]))
            .unwrap();

        assert_eq!(tier.purge("day").unwrap(), 2);

        assert!(tier.get(&TileKey::new("day", 5, 1, 1)).unwrap().is_none());
        assert!(tier.get(&TileKey::new("night", 5, 1, 1)).unwrap().is_some());
        assert_eq!(tier.purge("day").unwrap(), 0);
    }

    #[test]
    fn test_write_atomically_reports_missing_directory() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gone").join("0.tile");
        let temp = dir.path().join("gone").join("0.1.tmp");

        let err = write_atomically(&temp, &path, b"x").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_put_survives_concurrent_purge_of_same_identifier() {
        let (_dir, tier) = open_tier();
        let tier = std::sync::Arc::new(tier);

        let purger = {
            let tier = std::sync::Arc::clone(&tier);
            std::thread::spawn(move || {
                for _ in 0..50 {
                    let _ = tier.purge("race");
                    std::thread::sleep(std::time::Duration::from_millis(1));
                }
            })
        };

        for i in 0..200 {
            let key = TileKey::new("race", 4, i % 16, i / 16);
            tier.put(&key, &TileImage::new(vec![7u8; 64])).unwrap();
        }
        purger.join().unwrap();

        let key = TileKey::new("race", 4, 0, 0);
        tier.put(&key, &TileImage::new(vec![9u8])).unwrap();
        assert_eq!(tier.get(&key).unwrap().unwrap().as_bytes(), &[9u8]);
    }

    #[test]
    fn test_purge_all() {
        let (_dir, tier) = open_tier();
        tier.put(&TileKey::new("a", 1, 0, 0), &TileImage::new(vec![1u8]))
            .unwrap();
        tier.put(&TileKey::new("b", 1, 0, 0), &TileImage::new(vec![1u8]))
            .unwrap();

        assert_eq!(tier.purge_all().unwrap(), 2);
        assert!(tier.disk_usage().unwrap().is_empty());
    }

    #[test]
    fn test_disk_usage_per_identifier() {
        let (_dir, tier) = open_tier();
        tier.put(&TileKey::new("a/b", 1, 0, 0), &TileImage::new(vec![0u8; 10]))
            .unwrap();
        tier.put(&TileKey::new("a/b", 1, 0, 1), &TileImage::new(vec![0u8; 5]))
            .unwrap();
        tier.put(&TileKey::new("c", 2, 0, 0), &TileImage::new(vec![0u8; 3]))
            .unwrap();

        let usage = tier.disk_usage().unwrap();
        assert_eq!(usage["a/b"], DiskUsage { files: 2, bytes: 15 });
        assert_eq!(usage["c"], DiskUsage { files: 1, bytes: 3 });
    }

    #[test]
    fn test_encode_cache_id_is_single_safe_component() {
        assert_eq!(encode_cache_id("osm-day_1"), "osm-day_1");
        assert_eq!(encode_cache_id("../etc"), "%2E%2E%2Fetc");
        assert_eq!(encode_cache_id(""), "%");
        assert!(!encode_cache_id("a/b.c").contains('/'));
        assert!(!encode_cache_id("a/b.c").contains('.'));
    }

    #[test]
    fn test_decode_cache_id_reverses_encoding() {
        for id in ["osm", "../etc", "", "theme: dark", "ünïcode"] {
            assert_eq!(decode_cache_id(&encode_cache_id(id)).as_deref(), Some(id));
        }
        assert_eq!(decode_cache_id("%zz"), None);
        assert_eq!(decode_cache_id("%2"), None);
    }
}
