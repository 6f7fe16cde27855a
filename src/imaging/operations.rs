//! High-level image operations.
//!
//! These functions combine calculations with backend execution. They take
//! resolved options, decide whether any pixel work is needed, and call the
//! backend only when it is.

use super::backend::{BackendError, Dimensions, ImageBackend};
use super::calculations::{calculate_output_size, within_bounds};
use super::params::TransformParams;
use crate::options::EffectiveOptions;
use std::path::Path;

/// Result type for image operations.
pub type Result<T> = std::result::Result<T, BackendError>;

/// Get image dimensions using the backend.
pub fn get_dimensions(backend: &impl ImageBackend, path: &Path) -> Result<(u32, u32)> {
    let dims = backend.identify(path)?;
    Ok((dims.width, dims.height))
}

/// What a transform should do for one source.
#[derive(Debug, Clone, PartialEq)]
pub enum TransformPlan {
    /// The source already satisfies the box; serve it verbatim.
    Unchanged,
    Resize(TransformParams),
}

/// Outcome of [`transform`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransformOutput {
    /// Short-circuited: the original bytes are the answer.
    Unchanged(Dimensions),
    Encoded {
        bytes: Vec<u8>,
        width: u32,
        height: u32,
    },
}

/// Plan a transform without executing it.
///
/// A source already inside the box is never re-encoded unless upscaling was
/// asked for. This takes precedence over any format policy, TIFF's forced
/// re-encode included.
pub fn plan_transform(source: &Path, dims: Dimensions, options: &EffectiveOptions) -> TransformPlan {
    let src = (dims.width, dims.height);
    if !options.allow_upscale && within_bounds(src, options.width, options.height) {
        return TransformPlan::Unchanged;
    }

    let size = calculate_output_size(
        src,
        options.width,
        options.height,
        options.fit,
        options.allow_upscale,
    );

    TransformPlan::Resize(TransformParams {
        source: source.to_path_buf(),
        width: size.width,
        height: size.height,
        crop: size.crop,
        sharpening: options.sharpen,
        normalize: options.normalize,
        encode: options.encode.clone(),
    })
}

/// Identify, plan, and (if needed) run the backend for one source.
pub fn transform(
    backend: &impl ImageBackend,
    source: &Path,
    options: &EffectiveOptions,
) -> Result<TransformOutput> {
    let dims = backend.identify(source)?;

    match plan_transform(source, dims, options) {
        TransformPlan::Unchanged => Ok(TransformOutput::Unchanged(dims)),
        TransformPlan::Resize(params) => {
            let bytes = backend.transform(&params)?;
            Ok(TransformOutput::Encoded {
                bytes,
                width: params.width,
                height: params.height,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::backend::tests::{MockBackend, RecordedOp};
    use crate::imaging::params::{Fit, Quality};
    use crate::imaging::policy::{Codec, resolve_encode};

    fn options(width: Option<u32>, height: Option<u32>) -> EffectiveOptions {
        EffectiveOptions {
            width,
            height,
            fit: Fit::Inside,
            allow_upscale: false,
            sharpen: None,
            normalize: false,
            encode: resolve_encode("jpg", Some(Quality::new(80)), Quality::default(), &[]),
        }
    }

    #[test]
    fn get_dimensions_calls_backend() {
        let backend = MockBackend::with_dimensions(1920, 1080);
        let dims = get_dimensions(&backend, Path::new("/test.jpg")).unwrap();
        assert_eq!(dims, (1920, 1080));
    }

    #[test]
    fn plan_unchanged_when_within_bounds() {
        let plan = plan_transform(
            Path::new("/small.jpg"),
            Dimensions { width: 300, height: 200 },
            &options(Some(400), Some(400)),
        );
        assert_eq!(plan, TransformPlan::Unchanged);
    }

    #[test]
    fn plan_resizes_when_upscale_requested() {
        let mut opts = options(Some(400), Some(400));
        opts.allow_upscale = true;
        let plan = plan_transform(
            Path::new("/small.jpg"),
            Dimensions { width: 200, height: 100 },
            &opts,
        );
        match plan {
            TransformPlan::Resize(p) => assert_eq!((p.width, p.height), (400, 200)),
            other => panic!("expected resize, got {other:?}"),
        }
    }

    #[test]
    fn tiff_within_bounds_is_still_unchanged() {
        let mut opts = options(Some(1920), Some(1920));
        opts.encode = resolve_encode("tiff", None, Quality::new(98), &[]);
        let plan = plan_transform(
            Path::new("/scan.tiff"),
            Dimensions { width: 800, height: 600 },
            &opts,
        );
        assert_eq!(plan, TransformPlan::Unchanged);
    }

    #[test]
    fn transform_short_circuit_skips_backend() {
        let backend = MockBackend::with_dimensions(300, 300);
        let out = transform(&backend, Path::new("/a.jpg"), &options(Some(400), Some(400))).unwrap();
        assert_eq!(
            out,
            TransformOutput::Unchanged(Dimensions { width: 300, height: 300 })
        );
        assert_eq!(backend.transform_count(), 0);
    }

    #[test]
    fn transform_passes_plan_to_backend() {
        let backend = MockBackend::with_dimensions(2000, 2000);
        let out = transform(&backend, Path::new("/a.jpg"), &options(Some(400), Some(400))).unwrap();
        assert!(matches!(out, TransformOutput::Encoded { width: 400, height: 400, .. }));

        let ops = backend.get_operations();
        assert_eq!(ops.len(), 2);
        assert!(matches!(&ops[0], RecordedOp::Identify(_)));
        assert!(matches!(
            &ops[1],
            RecordedOp::Transform {
                width: 400,
                height: 400,
                quality: 80,
                codec: Codec::Jpeg,
                ..
            }
        ));
    }

    #[test]
    fn transform_identify_failure_propagates() {
        let backend = MockBackend::new();
        let err = transform(&backend, Path::new("/bad.jpg"), &options(Some(400), None)).unwrap_err();
        assert!(matches!(err, BackendError::DecodeFailed { .. }));
    }
}
