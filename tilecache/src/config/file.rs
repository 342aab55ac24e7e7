//! Configuration file handling for `config.ini`.
//!
//! Loads and saves [`CacheSettings`] with sensible defaults. A missing file
//! yields the defaults; any value that does not parse is rejected with the
//! section and key it came from.

use std::path::{Path, PathBuf};

use ini::Ini;
use thiserror::Error;

use super::settings::CacheSettings;

/// Configuration file errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read or parse the config file
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] ini::Error),

    /// Failed to write the config file
    #[error("Failed to write config file: {0}")]
    WriteError(String),

    /// Invalid configuration value
    #[error("Invalid configuration: {section}.{key} = '{value}' - {reason}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },

    /// Failed to create the config directory
    #[error("Failed to create config directory: {0}")]
    DirectoryError(std::io::Error),
}

/// Directory holding the config file (`~/.config/tilecache` on Linux).
pub fn config_directory() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tilecache")
}

/// Default config file path.
pub fn config_file_path() -> PathBuf {
    config_directory().join("config.ini")
}

impl CacheSettings {
    /// Load settings from the default path.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&config_file_path())
    }

    /// Load settings from a specific path.
    ///
    /// If the file doesn't exist, returns defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let ini = Ini::load_from_file(path)?;
        parse_ini(&ini)
    }

    /// Save settings to a specific path, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(ConfigError::DirectoryError)?;
        }

        std::fs::write(path, to_config_string(self))
            .map_err(|e| ConfigError::WriteError(e.to_string()))
    }
}

fn invalid(section: &str, key: &str, value: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_bool(section: &str, key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(invalid(section, key, value, "expected true or false")),
    }
}

fn parse_number<T: std::str::FromStr>(
    section: &str,
    key: &str,
    value: &str,
) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| invalid(section, key, value, "expected a number"))
}

/// Overlay the values present in `ini` on top of the defaults.
fn parse_ini(ini: &Ini) -> Result<CacheSettings, ConfigError> {
    let mut settings = CacheSettings::default();

    // [cache] section
    if let Some(section) = ini.section(Some("cache")) {
        if let Some(v) = section.get("directory") {
            let v = v.trim();
            if !v.is_empty() {
                settings.directory = expand_tilde(v);
            }
        }
        if let Some(v) = section.get("threaded") {
            settings.threaded = parse_bool("cache", "threaded", v)?;
        }
        if let Some(v) = section.get("queue_size") {
            let size: usize = parse_number("cache", "queue_size", v)?;
            if size == 0 {
                return Err(invalid("cache", "queue_size", v, "must be at least 1"));
            }
            settings.queue_size = size;
        }
        if let Some(v) = section.get("persistent") {
            settings.persistent = parse_bool("cache", "persistent", v)?;
        }
        if let Some(v) = section.get("overflow") {
            settings.overflow_policy = v
                .parse()
                .map_err(|reason: String| invalid("cache", "overflow", v, &reason))?;
        }
    }

    // [display] section
    if let Some(section) = ini.section(Some("display")) {
        if let Some(v) = section.get("tile_size") {
            let size: u32 = parse_number("display", "tile_size", v)?;
            if size == 0 {
                return Err(invalid("display", "tile_size", v, "must be at least 1"));
            }
            settings.tile_size = size;
        }
        if let Some(v) = section.get("overdraw_factor") {
            let factor: f64 = parse_number("display", "overdraw_factor", v)?;
            if factor.is_nan() || factor <= 0.0 {
                return Err(invalid("display", "overdraw_factor", v, "must be positive"));
            }
            settings.overdraw_factor = factor;
        }
        if let Some(v) = section.get("screen_ratio") {
            let ratio: f64 = parse_number("display", "screen_ratio", v)?;
            if ratio.is_nan() || ratio <= 0.0 {
                return Err(invalid("display", "screen_ratio", v, "must be positive"));
            }
            settings.screen_ratio = ratio;
        }
        if let Some(v) = section.get("width") {
            settings.screen_width = parse_number("display", "width", v)?;
        }
        if let Some(v) = section.get("height") {
            settings.screen_height = parse_number("display", "height", v)?;
        }
    }

    Ok(settings)
}

fn to_config_string(settings: &CacheSettings) -> String {
    format!(
        r#"[cache]
; Root directory of the on-disk tile store
directory = {directory}
; Write tiles to disk on a background thread
threaded = {threaded}
; Number of writes that may wait for the background thread
queue_size = {queue_size}
; Keep tiles on disk between runs
persistent = {persistent}
; What to do when the write queue is full: block | drop
overflow = {overflow}

[display]
tile_size = {tile_size}
overdraw_factor = {overdraw_factor}
screen_ratio = {screen_ratio}
width = {width}
height = {height}
"#,
        directory = path_to_display(&settings.directory),
        threaded = settings.threaded,
        queue_size = settings.queue_size,
        persistent = settings.persistent,
        overflow = settings.overflow_policy,
        tile_size = settings.tile_size,
        overdraw_factor = settings.overdraw_factor,
        screen_ratio = settings.screen_ratio,
        width = settings.screen_width,
        height = settings.screen_height,
    )
}

/// Expand a leading `~/` to the home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

/// Convert a path to display form, collapsing the home directory to `~`.
fn path_to_display(path: &Path) -> String {
    if let Some(home) = dirs::home_dir() {
        if let Ok(stripped) = path.strip_prefix(&home) {
            return format!("~/{}", stripped.display());
        }
    }
    path.display().to_string()
}
