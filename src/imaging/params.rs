//! Parameter types for image operations.
//!
//! These structs describe *what* to do, not *how* to do it. They are the
//! interface between the high-level [`operations`](super::operations) module
//! (which decides whether and how an image is transformed) and the
//! [`backend`](super::backend) (which does the actual pixel work). This
//! separation allows swapping backends (e.g. for testing with a mock) without
//! changing operation logic.
//!
//! ## Types
//!
//! - [`Quality`] - Lossy encoding quality (1–100, default 95). Clamped on construction.
//! - [`Sharpening`] - Unsharp-mask parameters with separate gains for flat and jagged areas.
//! - [`Fit`] - How the source is mapped onto the requested box.
//! - [`TransformParams`] - Everything one transform needs: source, output size, filters, encoding.

use super::policy::EncodeParams;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Quality(pub u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u32 {
        self.0
    }

    /// Raise the quality to at least `floor`.
    pub fn at_least(self, floor: Quality) -> Self {
        self.max(floor)
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(95)
    }
}

/// Sharpening parameters for the unsharp mask.
///
/// - `sigma`: standard deviation of the Gaussian blur the mask is built from
/// - `flat`: gain applied where the local detail is at most `threshold`
/// - `jagged`: gain applied to stronger edges
/// - `threshold`: detail magnitude (0-255 scale) separating flat from jagged areas
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Sharpening {
    pub sigma: f32,
    pub flat: f32,
    pub jagged: f32,
    pub threshold: f32,
}

impl Sharpening {
    /// Light sharpening that restores crispness lost in downscaling.
    pub fn light() -> Self {
        Self {
            sigma: 0.5,
            flat: 1.0,
            jagged: 2.0,
            threshold: 2.0,
        }
    }
}

impl Default for Sharpening {
    fn default() -> Self {
        Self::light()
    }
}

/// How the source is mapped onto the requested box.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Fit {
    /// Largest size that fits inside the box, aspect ratio preserved.
    #[default]
    Inside,
    /// Smallest size that covers the box, aspect ratio preserved.
    Outside,
    /// Cover the box, then center-crop to it exactly.
    Cover,
    /// Stretch to the box, ignoring aspect ratio.
    Fill,
}

impl std::str::FromStr for Fit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "inside" => Ok(Fit::Inside),
            "outside" => Ok(Fit::Outside),
            "cover" => Ok(Fit::Cover),
            "fill" => Ok(Fit::Fill),
            other => Err(format!("unknown fit '{other}'")),
        }
    }
}

/// Parameters for a single transform executed by a backend.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformParams {
    pub source: PathBuf,
    /// Final output dimensions.
    pub width: u32,
    pub height: u32,
    /// Center-crop to `width`×`height` after filling (used by [`Fit::Cover`]).
    pub crop: bool,
    pub sharpening: Option<Sharpening>,
    pub normalize: bool,
    pub encode: EncodeParams,
}
