//! Pure calculation functions for image dimensions and pixel levels.
//!
//! All functions here are pure and testable without any I/O or images.

use super::params::{Fit, Sharpening};

/// Largest dimension accepted for a requested box.
pub const MAX_DIMENSION: u32 = 16_384;

/// Returns true when `source` already fits inside the requested box.
///
/// A missing dimension is unbounded.
pub fn within_bounds(source: (u32, u32), width: Option<u32>, height: Option<u32>) -> bool {
    let (src_w, src_h) = source;
    width.is_none_or(|w| src_w <= w) && height.is_none_or(|h| src_h <= h)
}

/// Complete a partially specified box using the source aspect ratio.
///
/// # Examples
/// ```
/// # use thumbcache::imaging::calculations::complete_box;
/// assert_eq!(complete_box((2000, 1000), Some(400), None), (400, 200));
/// assert_eq!(complete_box((2000, 1000), None, Some(100)), (200, 100));
/// ```
pub fn complete_box(source: (u32, u32), width: Option<u32>, height: Option<u32>) -> (u32, u32) {
    let (src_w, src_h) = source;
    match (width, height) {
        (Some(w), Some(h)) => (w, h),
        (Some(w), None) => (w, scale_edge(src_h, w as f64 / src_w as f64)),
        (None, Some(h)) => (scale_edge(src_w, h as f64 / src_h as f64), h),
        (None, None) => source,
    }
}

/// Scale factor that fits `source` inside `target` (aspect preserved).
fn inside_ratio(source: (u32, u32), target: (u32, u32)) -> f64 {
    let rw = target.0 as f64 / source.0 as f64;
    let rh = target.1 as f64 / source.1 as f64;
    rw.min(rh)
}

/// Scale factor that makes `source` cover `target` (aspect preserved).
fn outside_ratio(source: (u32, u32), target: (u32, u32)) -> f64 {
    let rw = target.0 as f64 / source.0 as f64;
    let rh = target.1 as f64 / source.1 as f64;
    rw.max(rh)
}

fn scale_edge(edge: u32, ratio: f64) -> u32 {
    ((edge as f64 * ratio).round() as u32).max(1)
}

fn scale(source: (u32, u32), ratio: f64) -> (u32, u32) {
    (scale_edge(source.0, ratio), scale_edge(source.1, ratio))
}

/// Shrink `size` proportionally until neither edge exceeds `MAX_DIMENSION`.
fn limit(size: (u32, u32)) -> (u32, u32) {
    let longest = size.0.max(size.1);
    if longest <= MAX_DIMENSION {
        return size;
    }
    let ratio = MAX_DIMENSION as f64 / longest as f64;
    let (w, h) = scale(size, ratio);
    (w.min(MAX_DIMENSION), h.min(MAX_DIMENSION))
}

/// Output geometry for a resize.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputSize {
    pub width: u32,
    pub height: u32,
    /// Fill then center-crop to exactly `width`×`height`.
    pub crop: bool,
}

/// Calculate output dimensions for `fit` against the requested box.
///
/// Without `allow_upscale` no output dimension exceeds the source; a cover
/// box larger than the source is shrunk (keeping the box's aspect) until it
/// fits inside the source. No output edge ever exceeds [`MAX_DIMENSION`],
/// even when upscaling completes a box from an extreme aspect ratio.
pub fn calculate_output_size(
    source: (u32, u32),
    width: Option<u32>,
    height: Option<u32>,
    fit: Fit,
    allow_upscale: bool,
) -> OutputSize {
    let target = complete_box(source, width, height);
    let cap = |ratio: f64| if allow_upscale { ratio } else { ratio.min(1.0) };

    match fit {
        Fit::Inside => {
            let (w, h) = limit(scale(source, cap(inside_ratio(source, target))));
            OutputSize { width: w, height: h, crop: false }
        }
        Fit::Outside => {
            let (w, h) = limit(scale(source, cap(outside_ratio(source, target))));
            OutputSize { width: w, height: h, crop: false }
        }
        Fit::Cover => {
            let (w, h) = if allow_upscale || within_bounds(target, Some(source.0), Some(source.1)) {
                target
            } else {
                scale(target, inside_ratio(target, source))
            };
            let (w, h) = limit((w, h));
            OutputSize { width: w, height: h, crop: true }
        }
        Fit::Fill => {
            let (w, h) = if allow_upscale {
                target
            } else {
                (target.0.min(source.0), target.1.min(source.1))
            };
            let (w, h) = (w.min(MAX_DIMENSION), h.min(MAX_DIMENSION));
            OutputSize { width: w, height: h, crop: false }
        }
    }
}

/// Black and white points for brightness normalization.
///
/// Takes a 256-bin luma histogram and returns the levels at the 1st and 99th
/// percentiles, or `None` when the image is (nearly) flat and stretching
/// would only amplify noise.
pub fn normalize_levels(histogram: &[u64; 256]) -> Option<(u8, u8)> {
    let total: u64 = histogram.iter().sum();
    if total == 0 {
        return None;
    }
    let low_cut = total / 100;
    let high_cut = total - total / 100;

    let mut seen = 0u64;
    let mut low = None;
    let mut high = 255u8;
    for (level, &count) in histogram.iter().enumerate() {
        seen += count;
        if low.is_none() && seen > low_cut {
            low = Some(level as u8);
        }
        if seen >= high_cut {
            high = level as u8;
            break;
        }
    }

    let low = low?;
    if high <= low || (low == 0 && high == 255) {
        return None;
    }
    Some((low, high))
}

/// Linearly stretch `value` so that `low` maps to 0 and `high` to 255.
pub fn stretch_level(value: u8, low: u8, high: u8) -> u8 {
    let span = (high - low) as f32;
    let v = (value.saturating_sub(low)) as f32 * 255.0 / span;
    v.round().clamp(0.0, 255.0) as u8
}

/// Apply the unsharp mask to one channel sample.
///
/// `blurred` is the same sample after a Gaussian blur of `sigma`. Detail at
/// or below `threshold` is boosted by `flat`, stronger detail by `jagged`.
pub fn sharpen_sample(original: u8, blurred: u8, s: &Sharpening) -> u8 {
    let detail = original as f32 - blurred as f32;
    let gain = if detail.abs() <= s.threshold {
        s.flat
    } else {
        s.jagged
    };
    (original as f32 + detail * gain).round().clamp(0.0, 255.0) as u8
}
