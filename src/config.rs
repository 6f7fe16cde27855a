//! Service configuration.
//!
//! Handles loading, validating, and merging `thumbcache.toml`. The stock
//! defaults are serialized into a TOML table and the user file is merged on
//! top of it, so a config file only needs the keys it wants to change.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [thumbnails]
//! width = 1920              # Default box when a request names no dimension
//! height = 1920
//! quality = 95              # Default encode quality (1-100)
//! min_file_size = 307200    # Smaller sources are served untouched
//! image_extensions = ["jpg", "jpeg", "png", "webp", "gif", "bmp", "tiff", "tif"]
//! always_transform = ["tiff", "tif"]
//!
//! [cache]
//! dir = ".thumbcache"
//! max_age_days = 60
//!
//! [processing]
//! max_processes = 4         # Max parallel warm workers (omit for auto = CPU cores)
//! auto_sharpen = false
//! auto_normalize = false
//!
//! [processing.sharpen]
//! sigma = 0.5
//! flat = 1.0
//! jagged = 2.0
//! threshold = 2.0
//!
//! [formats.png]             # Per-extension encode policy, merged over stock
//! compression = "fast"
//!
//! [[roots]]
//! id = 0
//! path = "/srv/media"
//! origin = "example"
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::imaging::calculations::MAX_DIMENSION;
use crate::imaging::params::Sharpening;
use crate::imaging::policy::{FormatOverride, stock_format_table};
use crate::imaging::rust_backend::supported_input_extensions;
use crate::roots::{Root, RootTable};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default config file name, looked up in the working directory.
pub const CONFIG_FILE: &str = "thumbcache.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Complete service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ThumbcacheConfig {
    pub thumbnails: ThumbnailsConfig,
    pub cache: CacheConfig,
    pub processing: ProcessingConfig,
    /// Encode policy per lower-case extension.
    pub formats: BTreeMap<String, FormatOverride>,
    pub roots: Vec<Root>,
}

impl Default for ThumbcacheConfig {
    fn default() -> Self {
        Self {
            thumbnails: ThumbnailsConfig::default(),
            cache: CacheConfig::default(),
            processing: ProcessingConfig::default(),
            formats: stock_format_table(),
            roots: Vec::new(),
        }
    }
}

fn check_quality(field: &str, value: u32) -> Result<(), ConfigError> {
    if (1..=100).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::Validation(format!("{field} must be 1-100")))
    }
}

impl ThumbcacheConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.thumbnails;
        check_quality("thumbnails.quality", t.quality)?;
        for (name, value) in [("width", t.width), ("height", t.height)] {
            if !(1..=MAX_DIMENSION).contains(&value) {
                return Err(ConfigError::Validation(format!(
                    "thumbnails.{name} must be 1-{MAX_DIMENSION}"
                )));
            }
        }
        if t.image_extensions.is_empty() {
            return Err(ConfigError::Validation(
                "thumbnails.image_extensions must not be empty".into(),
            ));
        }
        let supported = supported_input_extensions();
        if let Some(ext) = t
            .image_extensions
            .iter()
            .find(|e| !supported.contains(&e.to_ascii_lowercase().as_str()))
        {
            return Err(ConfigError::Validation(format!(
                "thumbnails.image_extensions: no decoder for '{ext}'"
            )));
        }
        if let Some(ext) = t.always_transform.iter().find(|e| !t.is_image(e)) {
            return Err(ConfigError::Validation(format!(
                "thumbnails.always_transform: '{ext}' is not in image_extensions"
            )));
        }

        for (ext, policy) in &self.formats {
            for (name, value) in [
                ("quality", policy.quality),
                ("quality_floor", policy.quality_floor),
                ("alpha_quality", policy.alpha_quality),
            ] {
                if let Some(v) = value {
                    check_quality(&format!("formats.{ext}.{name}"), v)?;
                }
            }
        }

        if self.processing.sharpen.sigma <= 0.0 {
            return Err(ConfigError::Validation(
                "processing.sharpen.sigma must be positive".into(),
            ));
        }

        self.root_table()?;
        Ok(())
    }

    /// Build the root table from `[[roots]]`.
    pub fn root_table(&self) -> Result<RootTable, ConfigError> {
        RootTable::new(self.roots.clone()).map_err(|e| ConfigError::Validation(e.to_string()))
    }
}

/// Eligibility and default-size settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ThumbnailsConfig {
    /// Default box width, used only when a request names neither dimension.
    pub width: u32,
    pub height: u32,
    /// Default encode quality when neither request nor format policy sets one.
    pub quality: u32,
    /// Sources smaller than this many bytes are served as-is.
    pub min_file_size: u64,
    /// Extensions (lower-case) treated as images.
    pub image_extensions: Vec<String>,
    /// Extensions transformed regardless of `min_file_size`.
    pub always_transform: Vec<String>,
}

impl ThumbnailsConfig {
    pub fn is_image(&self, ext: &str) -> bool {
        self.image_extensions
            .iter()
            .any(|e| e.eq_ignore_ascii_case(ext))
    }

    pub fn always_transforms(&self, ext: &str) -> bool {
        self.always_transform
            .iter()
            .any(|e| e.eq_ignore_ascii_case(ext))
    }
}

impl Default for ThumbnailsConfig {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1920,
            quality: 95,
            min_file_size: 300 * 1024,
            image_extensions: ["jpg", "jpeg", "png", "webp", "gif", "bmp", "tiff", "tif"]
                .map(String::from)
                .to_vec(),
            always_transform: vec!["tiff".to_string(), "tif".to_string()],
        }
    }
}

/// Where the cache lives and how long entries survive.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    pub dir: PathBuf,
    /// Entries older than this are removed by `sweep`.
    pub max_age_days: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(".thumbcache"),
            max_age_days: 60,
        }
    }
}

/// Parallelism and optional pixel filters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel warm workers.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
    /// Sharpen every output unless the request says otherwise.
    pub auto_sharpen: bool,
    /// Stretch brightness of every output.
    pub auto_normalize: bool,
    pub sharpen: Sharpening,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            max_processes: None,
            auto_sharpen: false,
            auto_normalize: false,
            sharpen: Sharpening::light(),
        }
    }
}

fn available_cores() -> usize {
    std::thread::available_parallelism().map_or(1, |n| n.get())
}

/// Worker count for generation: `max_processes` capped at the core count,
/// or every core when unset. Never zero.
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = available_cores();
    match config.max_processes {
        Some(n) => n.clamp(1, cores),
        None => cores,
    }
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the base layer user overrides are merged onto.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(ThumbcacheConfig::default())?)
}

/// Layer `overlay` over `base`.
///
/// Tables merge per key, recursively; any other overlay value (arrays
/// included) replaces what it lands on.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    use toml::Value::Table;

    match (base, overlay) {
        (Table(mut merged), Table(layer)) => {
            for (key, value) in layer {
                let value = match merged.remove(&key) {
                    Some(existing) => merge_toml(existing, value),
                    None => value,
                };
                merged.insert(key, value);
            }
            Table(merged)
        }
        (_, replacement) => replacement,
    }
}

/// Load a config file as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<ThumbcacheConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: ThumbcacheConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from `path`, falling back to stock defaults when absent.
pub fn load_config(path: &Path) -> Result<ThumbcacheConfig, ConfigError> {
    let base = stock_defaults_value()?;
    let overlay = load_raw_config(path)?;
    resolve_config(base, overlay)
}

/// Returns a fully-commented stock `thumbcache.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# thumbcache configuration
# ========================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults. Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Eligibility and default size
# ---------------------------------------------------------------------------
[thumbnails]
# Bounding box used when a request names neither width nor height.
# Naming only one leaves the other unbounded.
width = 1920
height = 1920

# Encode quality when neither the request nor the format policy sets one.
quality = 95

# Sources smaller than this (bytes) are served as-is.
min_file_size = 307200

# Extensions treated as images. Anything else is served untouched.
image_extensions = ["jpg", "jpeg", "png", "webp", "gif", "bmp", "tiff", "tif"]

# Extensions transformed even below min_file_size.
always_transform = ["tiff", "tif"]

# ---------------------------------------------------------------------------
# Cache
# ---------------------------------------------------------------------------
[cache]
dir = ".thumbcache"

# Entries older than this are removed by `thumbcache sweep`.
max_age_days = 60

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel warm workers.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_processes = 4

auto_sharpen = false
auto_normalize = false

# Unsharp mask used when sharpening is on.
[processing.sharpen]
sigma = 0.5
flat = 1.0
jagged = 2.0
threshold = 2.0

# ---------------------------------------------------------------------------
# Encode policy per extension (merged over the stock table)
# ---------------------------------------------------------------------------
[formats.jpg]
quality = 95

[formats.jpeg]
quality = 95

[formats.png]
quality = 95
compression = "best"       # fast | default | best
reduce_channels = true

[formats.webp]
quality = 95
lossless = false
near_lossless = true
alpha_quality = 100

[formats.tif]
quality = 98
quality_floor = 98
lossy_intermediate = true

[formats.tiff]
quality = 98
quality_floor = 98
lossy_intermediate = true

# ---------------------------------------------------------------------------
# Storage roots
# ---------------------------------------------------------------------------
# [[roots]]
# id = 0
# path = "/srv/media"
# origin = "example"
"##
}
