//! Disk cache inspection and maintenance commands.

use std::collections::BTreeMap;
use std::io::Write;

use serde::Serialize;
use tilecache::cache::{DiskUsage, FileSystemTier};
use tilecache::config::CacheSettings;

use super::open_cache;
use crate::error::CliError;

#[derive(Debug, Serialize)]
struct StatsReport<'a> {
    directory: String,
    total: DiskUsage,
    caches: &'a BTreeMap<String, DiskUsage>,
}

/// Print per-identifier file and byte counts of the disk tier.
pub fn stats(settings: &CacheSettings, json: bool, out: &mut dyn Write) -> Result<(), CliError> {
    let tier = FileSystemTier::open(&settings.directory)?;
    let usage = tier.disk_usage()?;

    let total = usage.values().fold(DiskUsage::default(), |acc, u| DiskUsage {
        files: acc.files + u.files,
        bytes: acc.bytes + u.bytes,
    });

    if json {
        let report = StatsReport {
            directory: settings.directory.display().to_string(),
            total,
            caches: &usage,
        };
        writeln!(out, "{}", serde_json::to_string_pretty(&report)?).map_err(write_error)?;
        return Ok(());
    }

    let mut lines = vec![format!("Disk cache: {}", settings.directory.display())];
    if usage.is_empty() {
        lines.push("  (empty)".to_string());
    }
    for (cache_id, u) in &usage {
        lines.push(format!(
            "  {:<24} {:>8} files  {:>12}",
            cache_id,
            u.files,
            format_bytes(u.bytes)
        ));
    }
    lines.push(format!(
        "  {:<24} {:>8} files  {:>12}",
        "total",
        total.files,
        format_bytes(total.bytes)
    ));

    for line in lines {
        writeln!(out, "{}", line).map_err(write_error)?;
    }
    Ok(())
}

/// Remove one cache identifier from the disk tier.
pub fn purge(
    settings: &CacheSettings,
    cache_id: &str,
    out: &mut dyn Write,
) -> Result<(), CliError> {
    let cache = open_cache(settings)?;
    let result = cache.purge(cache_id)?;
    cache.destroy();

    writeln!(
        out,
        "Purged '{}': {} tiles removed from {}",
        cache_id,
        result.persistent_entries,
        settings.directory.display()
    )
    .map_err(write_error)
}

/// Remove every tile from the disk tier.
pub fn clear(settings: &CacheSettings, out: &mut dyn Write) -> Result<(), CliError> {
    let cache = open_cache(settings)?;
    let result = cache.purge_all()?;
    cache.destroy();

    writeln!(
        out,
        "Cleared {}: {} tiles removed",
        settings.directory.display(),
        result.persistent_entries
    )
    .map_err(write_error)
}

fn write_error(error: std::io::Error) -> CliError {
    CliError::FileWrite {
        path: "<stdout>".to_string(),
        error,
    }
}

/// Human-readable byte count.
fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tilecache::cache::TileTier;
    use tilecache::key::{TileImage, TileKey};

    fn settings_for(dir: &TempDir) -> CacheSettings {
        CacheSettings {
            directory: dir.path().to_path_buf(),
            ..CacheSettings::default()
        }
    }

    fn seed(dir: &TempDir, cache_id: &str, count: u32) {
        let tier = FileSystemTier::open(dir.path()).unwrap();
        for x in 0..count {
            let key = TileKey::new(cache_id, 5, x, 0);
            tier.put(&key, &TileImage::new(vec![1u8; 100])).unwrap();
        }
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn test_stats_json() {
        let dir = TempDir::new().unwrap();
        seed(&dir, "osm", 3);
        seed(&dir, "dark", 1);

        let mut out = Vec::new();
        stats(&settings_for(&dir), true, &mut out).unwrap();

        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["total"]["files"], 4);
        assert_eq!(value["caches"]["osm"]["files"], 3);
        assert_eq!(value["caches"]["dark"]["bytes"], 100);
    }

    #[test]
    fn test_stats_text_empty() {
        let dir = TempDir::new().unwrap();
        let mut out = Vec::new();
        stats(&settings_for(&dir), false, &mut out).unwrap();
        assert!(String::from_utf8(out).unwrap().contains("(empty)"));
    }

    #[test]
    fn test_purge_and_clear() {
        let dir = TempDir::new().unwrap();
        seed(&dir, "osm", 3);
        seed(&dir, "dark", 2);
        let settings = settings_for(&dir);

        let mut out = Vec::new();
        purge(&settings, "osm", &mut out).unwrap();
        assert!(String::from_utf8_lossy(&out).contains("3 tiles removed"));

        let usage = FileSystemTier::open(dir.path()).unwrap().disk_usage().unwrap();
        assert!(!usage.contains_key("osm"));
        assert_eq!(usage["dark"].files, 2);

        let mut out = Vec::new();
        clear(&settings, &mut out).unwrap();
        assert!(String::from_utf8_lossy(&out).contains("2 tiles removed"));
    }
}
