//! Request options: parsing, clamping, and resolution.
//!
//! A request arrives as loosely typed strings ([`RawOptions`]), is validated
//! into a [`TransformOptions`], and is finally resolved against the config for
//! one concrete source extension into an [`EffectiveOptions`]. Only the
//! effective form is hashed into the cache key, so requests that cannot
//! produce different bytes share an entry:
//!
//! ```text
//! ?width=400&quality=80   ──parse──▶  TransformOptions
//!                                          │ effective("png", &config)
//!                                          ▼
//!                         EffectiveOptions { box, fit, filters, EncodeParams }
//!                                          │ canonical()
//!                                          ▼
//!                                   hashed into CacheKey
//! ```

use crate::config::ThumbcacheConfig;
use crate::imaging::calculations::MAX_DIMENSION;
use crate::imaging::params::{Fit, Quality, Sharpening};
use crate::imaging::policy::{EncodeParams, FormatOverride, resolve_encode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::num::IntErrorKind;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum OptionsError {
    #[error("{field} must be a number, got '{value}'")]
    NotNumeric { field: &'static str, value: String },
    #[error("{field} must be a boolean, got '{value}'")]
    NotBoolean { field: &'static str, value: String },
    #[error("{0}")]
    InvalidFit(String),
}

/// Options exactly as received, before validation.
///
/// Field names follow the query-string keys of the HTTP layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RawOptions {
    pub width: Option<String>,
    pub height: Option<String>,
    pub quality: Option<String>,
    pub fit: Option<String>,
    pub upscale: Option<String>,
    pub sharpen: Option<String>,
}

fn parse_clamped(field: &'static str, raw: &str, min: u32, max: u32) -> Result<u32, OptionsError> {
    match raw.trim().parse::<i64>() {
        Ok(n) => Ok(n.clamp(min as i64, max as i64) as u32),
        Err(e) => match e.kind() {
            IntErrorKind::PosOverflow => Ok(max),
            IntErrorKind::NegOverflow => Ok(min),
            _ => Err(OptionsError::NotNumeric {
                field,
                value: raw.to_string(),
            }),
        },
    }
}

fn parse_flag(field: &'static str, raw: &str) -> Result<bool, OptionsError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(OptionsError::NotBoolean {
            field,
            value: raw.to_string(),
        }),
    }
}

impl RawOptions {
    /// Validate into typed options.
    ///
    /// Non-numeric dimensions or quality are rejected. Numeric values out of
    /// range are clamped: dimensions to `1..=16384`, quality to `1..=100`.
    pub fn parse(&self) -> Result<TransformOptions, OptionsError> {
        let dimension = |field, raw: &Option<String>| {
            raw.as_deref()
                .map(|v| parse_clamped(field, v, 1, MAX_DIMENSION))
                .transpose()
        };

        Ok(TransformOptions {
            width: dimension("width", &self.width)?,
            height: dimension("height", &self.height)?,
            quality: self
                .quality
                .as_deref()
                .map(|v| parse_clamped("quality", v, 1, 100).map(Quality::new))
                .transpose()?,
            fit: self
                .fit
                .as_deref()
                .map(str::parse::<Fit>)
                .transpose()
                .map_err(OptionsError::InvalidFit)?
                .unwrap_or_default(),
            allow_upscale: self
                .upscale
                .as_deref()
                .map(|v| parse_flag("upscale", v))
                .transpose()?
                .unwrap_or(false),
            sharpen: self
                .sharpen
                .as_deref()
                .map(|v| parse_flag("sharpen", v))
                .transpose()?,
            format_overrides: BTreeMap::new(),
        })
    }
}

/// Validated request options, independent of any particular source file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransformOptions {
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Explicit quality; beats the format policy's default but not its floor.
    pub quality: Option<Quality>,
    pub fit: Fit,
    pub allow_upscale: bool,
    /// `None` defers to `processing.auto_sharpen`.
    pub sharpen: Option<bool>,
    /// Per-extension encode overrides layered on top of the config table.
    pub format_overrides: BTreeMap<String, FormatOverride>,
}

impl TransformOptions {
    /// Options asking for a bounding box.
    pub fn sized(width: Option<u32>, height: Option<u32>) -> Self {
        Self {
            width,
            height,
            ..Self::default()
        }
    }

    /// Resolve against the config for a source with extension `ext`.
    ///
    /// The configured default box applies only when neither dimension was
    /// given; a single given dimension leaves the other unbounded.
    pub fn effective(&self, ext: &str, config: &ThumbcacheConfig) -> EffectiveOptions {
        let clamp = |d: u32| d.clamp(1, MAX_DIMENSION);
        let (width, height) = match (self.width, self.height) {
            (None, None) => (
                Some(config.thumbnails.width),
                Some(config.thumbnails.height),
            ),
            dims => dims,
        };

        let sharpen = self
            .sharpen
            .unwrap_or(config.processing.auto_sharpen)
            .then_some(config.processing.sharpen);

        let encode = resolve_encode(
            ext,
            self.quality,
            Quality::new(config.thumbnails.quality),
            &[config.formats.get(ext), self.format_overrides.get(ext)],
        );

        EffectiveOptions {
            width: width.map(clamp),
            height: height.map(clamp),
            fit: self.fit,
            allow_upscale: self.allow_upscale,
            sharpen,
            normalize: config.processing.auto_normalize,
            encode,
        }
    }
}

/// Every option that can influence the generated bytes, fully resolved.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EffectiveOptions {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fit: Fit,
    pub allow_upscale: bool,
    pub sharpen: Option<Sharpening>,
    pub normalize: bool,
    pub encode: EncodeParams,
}

impl EffectiveOptions {
    /// Canonical serialization used for key derivation.
    ///
    /// Field order is fixed by the struct definition and maps are never
    /// involved, so equal values always serialize identically.
    pub fn canonical(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
