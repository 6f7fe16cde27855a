//! Image processing backend trait and shared types.
//!
//! The [`ImageBackend`] trait defines the two operations every backend must
//! support: identify (header-only dimensions) and transform (decode, resize,
//! filter, encode to bytes).
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend). Tests use the
//! recording `MockBackend` in this module.

use super::params::TransformParams;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to decode {path}: {reason}")]
    DecodeFailed { path: String, reason: String },
    #[error("Failed to encode {format}: {reason}")]
    EncodeFailed { format: String, reason: String },
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}

impl BackendError {
    pub(crate) fn decode(path: &Path, reason: impl ToString) -> Self {
        Self::DecodeFailed {
            path: path.display().to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn encode(format: impl ToString, reason: impl ToString) -> Self {
        Self::EncodeFailed {
            format: format.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Result of an identify operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// Trait for image processing backends.
///
/// `Sync` because the coordinator shares one backend across every request
/// thread.
pub trait ImageBackend: Sync {
    /// Get image dimensions without a full decode.
    fn identify(&self, path: &Path) -> Result<Dimensions, BackendError>;

    /// Decode, resize, filter and encode. Returns the encoded bytes.
    fn transform(&self, params: &TransformParams) -> Result<Vec<u8>, BackendError>;
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::imaging::Sharpening;
    use crate::imaging::params::Quality;
    use crate::imaging::policy::{Codec, resolve_encode};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Mock backend that records operations without touching pixels.
    /// Uses Mutex (not RefCell) so it is Sync and can be shared across threads.
    #[derive(Default)]
    pub struct MockBackend {
        /// Returned by every identify call; `None` makes identify fail.
        pub dimensions: Option<Dimensions>,
        /// Artificial latency inside transform, to widen race windows.
        pub delay: Duration,
        /// Make transform fail with `EncodeFailed`.
        pub fail_transform: bool,
        /// Make transform panic.
        pub panic_transform: bool,
        pub transforms: AtomicUsize,
        pub operations: Mutex<Vec<RecordedOp>>,
    }

    #[derive(Debug, Clone, PartialEq)]
    pub enum RecordedOp {
        Identify(String),
        Transform {
            source: String,
            width: u32,
            height: u32,
            crop: bool,
            quality: u32,
            codec: Codec,
            sharpening: Option<(f32, f32, f32)>,
            normalize: bool,
        },
    }

    impl MockBackend {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_dimensions(width: u32, height: u32) -> Self {
            Self {
                dimensions: Some(Dimensions { width, height }),
                ..Self::default()
            }
        }

        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        pub fn failing(mut self) -> Self {
            self.fail_transform = true;
            self
        }

        pub fn panicking(mut self) -> Self {
            self.panic_transform = true;
            self
        }

        pub fn transform_count(&self) -> usize {
            self.transforms.load(Ordering::SeqCst)
        }

        pub fn get_operations(&self) -> Vec<RecordedOp> {
            self.operations.lock().unwrap().clone()
        }
    }

    impl ImageBackend for MockBackend {
        fn identify(&self, path: &Path) -> Result<Dimensions, BackendError> {
            self.operations
                .lock()
                .unwrap()
                .push(RecordedOp::Identify(path.to_string_lossy().to_string()));

            self.dimensions
                .ok_or_else(|| BackendError::decode(path, "no mock dimensions"))
        }

        fn transform(&self, params: &TransformParams) -> Result<Vec<u8>, BackendError> {
            self.transforms.fetch_add(1, Ordering::SeqCst);
            self.operations.lock().unwrap().push(RecordedOp::Transform {
                source: params.source.to_string_lossy().to_string(),
                width: params.width,
                height: params.height,
                crop: params.crop,
                quality: params.encode.quality.value(),
                codec: params.encode.codec.clone(),
                sharpening: params.sharpening.map(|s| (s.sigma, s.flat, s.jagged)),
                normalize: params.normalize,
            });
            if !self.delay.is_zero() {
                std::thread::sleep(self.delay);
            }
            if self.panic_transform {
                panic!("mock backend panic");
            }
            if self.fail_transform {
                return Err(BackendError::encode("mock", "forced failure"));
            }
            Ok(format!("mock {}x{}", params.width, params.height).into_bytes())
        }
    }

    fn sample_params() -> TransformParams {
        TransformParams {
            source: "/source.jpg".into(),
            width: 400,
            height: 300,
            crop: false,
            sharpening: Some(Sharpening::light()),
            normalize: false,
            encode: resolve_encode("jpg", Some(Quality::new(85)), Quality::default(), &[]),
        }
    }

    #[test]
    fn mock_records_identify() {
        let backend = MockBackend::with_dimensions(800, 600);

        let result = backend.identify(Path::new("/test/image.jpg")).unwrap();
        assert_eq!(result.width, 800);
        assert_eq!(result.height, 600);

        let ops = backend.get_operations();
        assert_eq!(ops.len(), 1);
        assert!(matches!(&ops[0], RecordedOp::Identify(p) if p == "/test/image.jpg"));
    }

    #[test]
    fn mock_identify_without_dimensions_is_decode_failure() {
        let backend = MockBackend::new();
        let err = backend.identify(Path::new("/test/image.jpg")).unwrap_err();
        assert!(matches!(err, BackendError::DecodeFailed { .. }));
    }

    #[test]
    fn mock_records_transform() {
        let backend = MockBackend::new();
        let bytes = backend.transform(&sample_params()).unwrap();
        assert_eq!(bytes, b"mock 400x300");
        assert_eq!(backend.transform_count(), 1);

        let ops = backend.get_operations();
        assert!(matches!(
            &ops[0],
            RecordedOp::Transform {
                width: 400,
                height: 300,
                quality: 85,
                codec: Codec::Jpeg,
                sharpening: Some((0.5, 1.0, 2.0)),
                ..
            }
        ));
    }

    #[test]
    fn mock_failing_transform_errors() {
        let backend = MockBackend::new().failing();
        let err = backend.transform(&sample_params()).unwrap_err();
        assert!(matches!(err, BackendError::EncodeFailed { .. }));
    }
}
