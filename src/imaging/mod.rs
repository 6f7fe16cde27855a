//! Image processing: pure Rust decode and resize, libwebp for WebP output.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Identify** | `image::image_dimensions` |
//! | **Resize** | Lanczos3 (`resize_exact`, `resize_to_fill` for cover) |
//! | **Filters** | percentile normalize, unsharp mask |
//! | **Encode** | per-extension policy ([`policy`]) |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for dimension and level math (unit testable)
//! - **Parameters**: Data structures describing image operations
//! - **Policy**: The per-extension encode table
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]
//! - **Operations**: Plan a transform and run it through a backend

pub mod backend;
pub mod calculations;
pub mod operations;
pub mod params;
pub mod policy;
pub mod rust_backend;

pub use backend::{BackendError, Dimensions, ImageBackend};
pub use operations::{TransformOutput, TransformPlan, get_dimensions, plan_transform, transform};
pub use params::{Fit, Quality, Sharpening, TransformParams};
pub use policy::{Codec, EncodeParams, FormatOverride};
pub use rust_backend::RustBackend;
