//! Production image backend built on the `image` crate ecosystem.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Identify | `image::image_dimensions` (header only) |
//! | Decode (JPEG, PNG, TIFF, WebP, GIF first frame, BMP) | `image::ImageReader` with content sniffing |
//! | Resize | `resize_exact` / `resize_to_fill` with `Lanczos3` |
//! | Normalize | percentile luma stretch ([`normalize_levels`]) |
//! | Sharpen | `image::imageops::blur` + per-sample gain ([`sharpen_sample`]) |
//! | Encode → JPEG, PNG, TIFF, BMP, GIF | `image::codecs::*` |
//! | Encode → WebP | `webp` (libwebp, lossy / near-lossless / lossless) |

use super::backend::{BackendError, Dimensions, ImageBackend};
use super::calculations::{normalize_levels, sharpen_sample, stretch_level};
use super::params::{Quality, Sharpening, TransformParams};
use super::policy::{Codec, Compression, EncodeParams};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::codecs::tiff::TiffEncoder;
use image::imageops::FilterType;
use image::{ColorType, DynamicImage, ImageError, ImageFormat, ImageReader};
use std::io::Cursor;
use std::path::Path;
use std::sync::LazyLock;

/// Extensions whose decoders are compiled in.
const PHOTO_CANDIDATES: &[(&str, ImageFormat)] = &[
    ("jpg", ImageFormat::Jpeg),
    ("jpeg", ImageFormat::Jpeg),
    ("png", ImageFormat::Png),
    ("tif", ImageFormat::Tiff),
    ("tiff", ImageFormat::Tiff),
    ("webp", ImageFormat::WebP),
    ("gif", ImageFormat::Gif),
    ("bmp", ImageFormat::Bmp),
];

static SUPPORTED_EXTENSIONS: LazyLock<Vec<&'static str>> = LazyLock::new(|| {
    PHOTO_CANDIDATES
        .iter()
        .filter(|(_, fmt)| fmt.reading_enabled())
        .map(|(ext, _)| *ext)
        .collect()
});

/// Returns the set of image file extensions that have working decoders compiled in.
pub fn supported_input_extensions() -> &'static [&'static str] {
    &SUPPORTED_EXTENSIONS
}

/// Pure Rust decode/resize plus libwebp for WebP output.
///
/// See the [module docs](self) for the crate-to-operation mapping.
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn map_decode_error(path: &Path, err: ImageError) -> BackendError {
    match err {
        ImageError::IoError(e) => BackendError::Io(e),
        other => BackendError::decode(path, other),
    }
}

/// Load and decode an image from disk, sniffing the format from content.
fn load_image(path: &Path) -> Result<DynamicImage, BackendError> {
    ImageReader::open(path)?
        .with_guessed_format()?
        .decode()
        .map_err(|e| map_decode_error(path, e))
}

fn resize(img: &DynamicImage, params: &TransformParams) -> DynamicImage {
    if params.crop {
        img.resize_to_fill(params.width, params.height, FilterType::Lanczos3)
    } else {
        img.resize_exact(params.width, params.height, FilterType::Lanczos3)
    }
}

/// Stretch brightness so the 1st–99th percentile luma spans the full range.
fn normalize(img: DynamicImage) -> DynamicImage {
    let has_alpha = img.color().has_alpha();
    let mut rgba = img.to_rgba8();

    let mut histogram = [0u64; 256];
    for p in rgba.pixels() {
        let [r, g, b, _] = p.0;
        let luma = 0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32;
        histogram[(luma.round() as usize).min(255)] += 1;
    }
    let Some((low, high)) = normalize_levels(&histogram) else {
        return img;
    };

    for p in rgba.pixels_mut() {
        for c in &mut p.0[..3] {
            *c = stretch_level(*c, low, high);
        }
    }
    restore_alpha_layout(rgba, has_alpha)
}

fn sharpen(img: DynamicImage, sharpening: &Sharpening) -> DynamicImage {
    let has_alpha = img.color().has_alpha();
    let mut rgba = img.to_rgba8();
    let blurred = image::imageops::blur(&rgba, sharpening.sigma);

    for (p, b) in rgba.pixels_mut().zip(blurred.pixels()) {
        for c in 0..3 {
            p.0[c] = sharpen_sample(p.0[c], b.0[c], sharpening);
        }
    }
    restore_alpha_layout(rgba, has_alpha)
}

fn restore_alpha_layout(rgba: image::RgbaImage, has_alpha: bool) -> DynamicImage {
    let img = DynamicImage::ImageRgba8(rgba);
    if has_alpha {
        img
    } else {
        DynamicImage::ImageRgb8(img.to_rgb8())
    }
}

/// Encode according to the resolved policy.
fn encode(img: &DynamicImage, params: &EncodeParams) -> Result<Vec<u8>, BackendError> {
    match &params.codec {
        Codec::Jpeg => encode_jpeg(img, params.quality),
        Codec::Png => encode_png(img, params),
        Codec::WebP => encode_webp(img, params),
        Codec::Tiff => encode_tiff(img, params),
        Codec::Generic(ext) => encode_generic(img, ext),
    }
}

fn encode_jpeg(img: &DynamicImage, quality: Quality) -> Result<Vec<u8>, BackendError> {
    // JPEG has no alpha; keep grey images single-channel
    let flat = if img.color() == ColorType::L8 {
        DynamicImage::ImageLuma8(img.to_luma8())
    } else {
        DynamicImage::ImageRgb8(img.to_rgb8())
    };
    let mut buf = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buf, quality.value() as u8);
    flat.write_with_encoder(encoder)
        .map_err(|e| BackendError::encode("jpeg", e))?;
    Ok(buf)
}

/// Drop channels that carry no information: an all-opaque alpha channel,
/// and colour channels of an image that is entirely grey.
fn reduce_channels(img: &DynamicImage) -> DynamicImage {
    let color = img.color();
    if color.bytes_per_pixel() != color.channel_count() {
        // Only 8-bit images; narrowing 16-bit would lose precision
        return img.clone();
    }

    let rgba = img.to_rgba8();
    let opaque = rgba.pixels().all(|p| p.0[3] == u8::MAX);
    let grey = rgba.pixels().all(|p| p.0[0] == p.0[1] && p.0[1] == p.0[2]);

    match (grey, opaque) {
        (true, true) => DynamicImage::ImageLuma8(img.to_luma8()),
        (true, false) => DynamicImage::ImageLumaA8(img.to_luma_alpha8()),
        (false, true) => DynamicImage::ImageRgb8(img.to_rgb8()),
        (false, false) => DynamicImage::ImageRgba8(rgba),
    }
}

fn encode_png(img: &DynamicImage, params: &EncodeParams) -> Result<Vec<u8>, BackendError> {
    let compression = match params.compression {
        Compression::Fast => CompressionType::Fast,
        Compression::Default => CompressionType::Default,
        Compression::Best => CompressionType::Best,
    };
    let reduced;
    let img = if params.reduce_channels {
        reduced = reduce_channels(img);
        &reduced
    } else {
        img
    };

    let mut buf = Vec::new();
    let encoder = PngEncoder::new_with_quality(&mut buf, compression, PngFilter::Adaptive);
    img.write_with_encoder(encoder)
        .map_err(|e| BackendError::encode("png", e))?;
    Ok(buf)
}

fn encode_webp(img: &DynamicImage, params: &EncodeParams) -> Result<Vec<u8>, BackendError> {
    // libwebp only accepts 8-bit RGB / RGBA
    let img = if img.color().has_alpha() {
        DynamicImage::ImageRgba8(img.to_rgba8())
    } else {
        DynamicImage::ImageRgb8(img.to_rgb8())
    };
    let encoder = webp::Encoder::from_image(&img).map_err(|e| BackendError::encode("webp", e))?;

    let mut config = webp::WebPConfig::new()
        .map_err(|_| BackendError::encode("webp", "failed to initialise encoder config"))?;
    let quality = params.quality.value();
    config.quality = quality as f32;
    config.alpha_quality = params.alpha_quality.value() as i32;
    if params.near_lossless {
        config.lossless = 1;
        config.near_lossless = quality as i32;
    } else {
        config.lossless = i32::from(params.lossless);
    }

    let memory = encoder
        .encode_advanced(&config)
        .map_err(|e| BackendError::encode("webp", format!("{e:?}")))?;
    Ok(memory.to_vec())
}

fn encode_tiff(img: &DynamicImage, params: &EncodeParams) -> Result<Vec<u8>, BackendError> {
    let intermediate;
    let img = if params.lossy_intermediate {
        let jpeg = encode_jpeg(img, params.quality)?;
        intermediate = image::load_from_memory_with_format(&jpeg, ImageFormat::Jpeg)
            .map_err(|e| BackendError::encode("tiff", e))?;
        &intermediate
    } else {
        img
    };

    let mut cursor = Cursor::new(Vec::new());
    img.write_with_encoder(TiffEncoder::new(&mut cursor))
        .map_err(|e| BackendError::encode("tiff", e))?;
    Ok(cursor.into_inner())
}

/// Fallback for extensions without a policy. These formats have no quality
/// knob, so the pixels are written as-is.
fn encode_generic(img: &DynamicImage, ext: &str) -> Result<Vec<u8>, BackendError> {
    let format = ImageFormat::from_extension(ext)
        .filter(|f| f.writing_enabled())
        .ok_or_else(|| BackendError::UnsupportedFormat(ext.to_string()))?;

    let converted;
    let img = if format == ImageFormat::Gif {
        converted = DynamicImage::ImageRgba8(img.to_rgba8());
        &converted
    } else {
        img
    };

    let mut cursor = Cursor::new(Vec::new());
    img.write_to(&mut cursor, format)
        .map_err(|e| BackendError::encode(ext, e))?;
    Ok(cursor.into_inner())
}

impl ImageBackend for RustBackend {
    fn identify(&self, path: &Path) -> Result<Dimensions, BackendError> {
        let (width, height) =
            image::image_dimensions(path).map_err(|e| map_decode_error(path, e))?;
        Ok(Dimensions { width, height })
    }

    fn transform(&self, params: &TransformParams) -> Result<Vec<u8>, BackendError> {
        let img = load_image(&params.source)?;
        let mut out = resize(&img, params);
        drop(img);

        if params.normalize {
            out = normalize(out);
        }
        if let Some(sharpening) = &params.sharpening {
            out = sharpen(out, sharpening);
        }

        encode(&out, &params.encode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::policy::resolve_encode;
    use crate::test_helpers::{write_gradient_jpeg, write_gradient_png, write_gradient_tiff};
    use tempfile::TempDir;

    fn params_for(source: &Path, ext: &str, width: u32, height: u32) -> TransformParams {
        let table = crate::imaging::policy::stock_format_table();
        TransformParams {
            source: source.to_path_buf(),
            width,
            height,
            crop: false,
            sharpening: None,
            normalize: false,
            encode: resolve_encode(ext, None, Quality::default(), &[table.get(ext)]),
        }
    }

    fn decoded_dims(bytes: &[u8]) -> (u32, u32) {
        let img = image::load_from_memory(bytes).unwrap();
        (img.width(), img.height())
    }

    #[test]
    fn supported_extensions_match_decodable_formats() {
        let exts = supported_input_extensions();
        for expected in &["jpg", "jpeg", "png", "tif", "tiff", "webp", "gif", "bmp"] {
            assert!(
                exts.contains(expected),
                "expected {expected} in supported extensions"
            );
        }
    }

    #[test]
    fn identify_synthetic_jpeg() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("test.jpg");
        write_gradient_jpeg(&path, 200, 150);

        let dims = RustBackend::new().identify(&path).unwrap();
        assert_eq!((dims.width, dims.height), (200, 150));
    }

    #[test]
    fn identify_nonexistent_file_is_io_error() {
        let result = RustBackend::new().identify(Path::new("/nonexistent/image.jpg"));
        assert!(matches!(result, Err(BackendError::Io(_))));
    }

    #[test]
    fn identify_text_file_is_decode_failure() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("fake.jpg");
        std::fs::write(&path, "this is not an image").unwrap();

        let result = RustBackend::new().identify(&path);
        assert!(matches!(result, Err(BackendError::DecodeFailed { .. })));
    }

    #[test]
    fn transform_jpeg_to_exact_dimensions() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("source.jpg");
        write_gradient_jpeg(&source, 400, 300);

        let bytes = RustBackend::new()
            .transform(&params_for(&source, "jpg", 200, 150))
            .unwrap();

        assert_eq!(image::guess_format(&bytes).unwrap(), ImageFormat::Jpeg);
        assert_eq!(decoded_dims(&bytes), (200, 150));
    }

    #[test]
    fn transform_cover_crops_exactly() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("source.jpg");
        write_gradient_jpeg(&source, 800, 600);

        let mut params = params_for(&source, "jpg", 400, 500);
        params.crop = true;
        params.sharpening = Some(Sharpening::light());
        let bytes = RustBackend::new().transform(&params).unwrap();

        assert_eq!(decoded_dims(&bytes), (400, 500));
    }

    #[test]
    fn transform_png_keeps_png_format() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("source.png");
        write_gradient_png(&source, 300, 300);

        let mut params = params_for(&source, "png", 100, 100);
        params.normalize = true;
        let bytes = RustBackend::new().transform(&params).unwrap();

        assert_eq!(image::guess_format(&bytes).unwrap(), ImageFormat::Png);
        assert_eq!(decoded_dims(&bytes), (100, 100));
    }

    #[test]
    fn transform_tiff_through_lossy_intermediate() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("scan.tiff");
        write_gradient_tiff(&source, 300, 200);

        let params = params_for(&source, "tiff", 150, 100);
        assert!(params.encode.lossy_intermediate);
        let bytes = RustBackend::new().transform(&params).unwrap();

        assert_eq!(image::guess_format(&bytes).unwrap(), ImageFormat::Tiff);
        assert_eq!(decoded_dims(&bytes), (150, 100));
    }

    #[test]
    fn transform_webp_output() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("photo.jpg");
        write_gradient_jpeg(&source, 300, 300);

        let mut params = params_for(&source, "webp", 120, 120);
        params.source = source.clone();
        let bytes = RustBackend::new().transform(&params).unwrap();

        assert_eq!(image::guess_format(&bytes).unwrap(), ImageFormat::WebP);
    }

    #[test]
    fn transform_bmp_uses_generic_encoder() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("photo.jpg");
        write_gradient_jpeg(&source, 64, 64);

        let bytes = RustBackend::new()
            .transform(&params_for(&source, "bmp", 32, 32))
            .unwrap();
        assert_eq!(image::guess_format(&bytes).unwrap(), ImageFormat::Bmp);
    }

    #[test]
    fn transform_unknown_output_extension_is_unsupported() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("photo.jpg");
        write_gradient_jpeg(&source, 64, 64);

        let result = RustBackend::new().transform(&params_for(&source, "xyz", 32, 32));
        assert!(matches!(result, Err(BackendError::UnsupportedFormat(_))));
    }

    #[test]
    fn reduce_channels_collapses_grey_opaque_to_luma() {
        let img = DynamicImage::ImageRgba8(image::RgbaImage::from_pixel(
            4,
            4,
            image::Rgba([90, 90, 90, 255]),
        ));
        assert_eq!(reduce_channels(&img).color(), ColorType::L8);
    }

    #[test]
    fn reduce_channels_keeps_real_alpha() {
        let img = DynamicImage::ImageRgba8(image::RgbaImage::from_pixel(
            4,
            4,
            image::Rgba([10, 20, 30, 128]),
        ));
        assert_eq!(reduce_channels(&img).color(), ColorType::Rgba8);
    }
}
