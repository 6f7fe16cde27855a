//! Shared test utilities: synthetic image fixtures and a ready-made coordinator.
//!
//! Fixtures are generated on the fly with the `image` encoders, so tests
//! need no binary files in the repository.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let tmp = TempDir::new().unwrap();
//! let source = tmp.path().join("photo.jpg");
//! write_gradient_jpeg(&source, 2000, 2000);
//! ```

use crate::config::ThumbcacheConfig;
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageEncoder, ImageFormat, RgbImage};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

// =========================================================================
// Fixture images
// =========================================================================

fn gradient(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([
            (x * 255 / width.max(1)) as u8,
            (y * 255 / height.max(1)) as u8,
            128,
        ])
    })
}

/// Write a colour-gradient JPEG of the given size.
pub fn write_gradient_jpeg(path: &Path, width: u32, height: u32) {
    let img = gradient(width, height);
    let file = BufWriter::new(File::create(path).unwrap());
    JpegEncoder::new_with_quality(file, 90)
        .write_image(img.as_raw(), width, height, ExtendedColorType::Rgb8)
        .unwrap();
}

pub fn write_gradient_png(path: &Path, width: u32, height: u32) {
    gradient(width, height)
        .save_with_format(path, ImageFormat::Png)
        .unwrap();
}

pub fn write_gradient_tiff(path: &Path, width: u32, height: u32) {
    gradient(width, height)
        .save_with_format(path, ImageFormat::Tiff)
        .unwrap();
}

// =========================================================================
// Config
// =========================================================================

/// Stock config with the cache under `cache_dir` and no size threshold,
/// so every image source is eligible for transformation.
pub fn test_config(cache_dir: &Path) -> ThumbcacheConfig {
    let mut config = ThumbcacheConfig::default();
    config.cache.dir = cache_dir.to_path_buf();
    config.thumbnails.min_file_size = 0;
    config
}
