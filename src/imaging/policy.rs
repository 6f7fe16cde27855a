//! Format-specific encode policy.
//!
//! Each output keeps the source's format. How it is encoded is decided by a
//! table keyed by lower-case file extension. The stock table ships tuned
//! defaults, the config file may override any field per extension, and a
//! request may override again on top of that:
//!
//! | Extension | Codec | Stock policy |
//! |---|---|---|
//! | `jpg`, `jpeg` | JPEG | quality 95 |
//! | `png` | PNG | best compression, lossless channel reduction |
//! | `webp` | libwebp | near-lossless, alpha quality 100 |
//! | `tif`, `tiff` | TIFF | lossy JPEG intermediate, quality floor 98 |
//! | anything else | generic `image` encoder | requested quality where the format has one |
//!
//! TIFF sources are typically uncompressed and huge, which is why they go
//! through a lossy intermediate with a high fixed floor instead of being
//! re-encoded losslessly.
//!
//! JPEG output is baseline, full-chroma, and uses the standard Huffman
//! tables: the `image` encoder cannot optimize its entropy coding, so JPEG
//! thumbnails run a few percent larger than an optimizing encoder's.

use super::params::Quality;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Encoder family selected by extension.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    Jpeg,
    Png,
    WebP,
    Tiff,
    /// Any other format the `image` crate can write, named by extension.
    Generic(String),
}

impl Codec {
    pub fn for_extension(ext: &str) -> Self {
        match ext {
            "jpg" | "jpeg" => Codec::Jpeg,
            "png" => Codec::Png,
            "webp" => Codec::WebP,
            "tif" | "tiff" => Codec::Tiff,
            other => Codec::Generic(other.to_string()),
        }
    }
}

/// PNG deflate effort.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    Fast,
    #[default]
    Default,
    Best,
}

/// Sparse per-extension override. Unset fields inherit from the layer below.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FormatOverride {
    /// Quality used when the request does not name one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<u32>,
    /// Minimum quality, applied after everything else.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality_floor: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compression: Option<Compression>,
    /// Drop an all-opaque alpha channel and collapse grey RGB to luma (PNG).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reduce_channels: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lossless: Option<bool>,
    /// WebP near-lossless preprocessing, at a level equal to the quality.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub near_lossless: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alpha_quality: Option<u32>,
    /// Round-trip through a lossy JPEG before writing the container (TIFF).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lossy_intermediate: Option<bool>,
}

/// Fully-resolved encoder settings for one output.
///
/// Part of the cache key, so every field that changes the encoded bytes
/// must live here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EncodeParams {
    pub codec: Codec,
    pub quality: Quality,
    pub compression: Compression,
    pub reduce_channels: bool,
    pub lossless: bool,
    pub near_lossless: bool,
    pub alpha_quality: Quality,
    pub lossy_intermediate: bool,
}

impl EncodeParams {
    fn base(codec: Codec, quality: Quality) -> Self {
        Self {
            codec,
            quality,
            compression: Compression::Default,
            reduce_channels: false,
            lossless: false,
            near_lossless: false,
            alpha_quality: Quality::new(100),
            lossy_intermediate: false,
        }
    }
}

/// Resolve encoder settings for `ext`.
///
/// `layers` are applied bottom-up (config table first, request last).
/// An explicitly requested quality beats any layer's default quality, and
/// the topmost quality floor is applied last of all.
pub fn resolve_encode(
    ext: &str,
    requested: Option<Quality>,
    default_quality: Quality,
    layers: &[Option<&FormatOverride>],
) -> EncodeParams {
    let mut params = EncodeParams::base(Codec::for_extension(ext), default_quality);
    let mut floor = None;

    for layer in layers.iter().flatten() {
        if let Some(q) = layer.quality {
            params.quality = Quality::new(q);
        }
        if let Some(f) = layer.quality_floor {
            floor = Some(Quality::new(f));
        }
        if let Some(c) = layer.compression {
            params.compression = c;
        }
        if let Some(r) = layer.reduce_channels {
            params.reduce_channels = r;
        }
        if let Some(l) = layer.lossless {
            params.lossless = l;
        }
        if let Some(n) = layer.near_lossless {
            params.near_lossless = n;
        }
        if let Some(a) = layer.alpha_quality {
            params.alpha_quality = Quality::new(a);
        }
        if let Some(i) = layer.lossy_intermediate {
            params.lossy_intermediate = i;
        }
    }

    if let Some(q) = requested {
        params.quality = q;
    }
    if let Some(f) = floor {
        params.quality = params.quality.at_least(f);
    }
    params
}

/// The stock per-extension policy table.
pub fn stock_format_table() -> BTreeMap<String, FormatOverride> {
    let jpeg = FormatOverride {
        quality: Some(95),
        ..FormatOverride::default()
    };
    let png = FormatOverride {
        quality: Some(95),
        compression: Some(Compression::Best),
        reduce_channels: Some(true),
        ..FormatOverride::default()
    };
    let webp = FormatOverride {
        quality: Some(95),
        lossless: Some(false),
        near_lossless: Some(true),
        alpha_quality: Some(100),
        ..FormatOverride::default()
    };
    let tiff = FormatOverride {
        quality: Some(98),
        quality_floor: Some(98),
        lossy_intermediate: Some(true),
        ..FormatOverride::default()
    };

    BTreeMap::from([
        ("jpg".to_string(), jpeg.clone()),
        ("jpeg".to_string(), jpeg),
        ("png".to_string(), png),
        ("webp".to_string(), webp),
        ("tif".to_string(), tiff.clone()),
        ("tiff".to_string(), tiff),
    ])
}

/// Lower-case extension of `path`, without the dot.
pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}
