//! Image processing: handles, primitives and the operations built on them.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Decode** (JPEG, PNG, GIF, TIFF, WebP, BMP) | `image` crate, all GIF frames via `AnimationDecoder` |
//! | **Decode** (SVG) | `usvg` + `resvg` |
//! | **Thumbnail** | `resize_exact` (Lanczos3), fill + centre crop in cover mode |
//! | **Scale** | `resize_exact` (Triangle, linear) |
//! | **Compose / text** | `imageops::overlay`, text laid out by `usvg` with system fonts |
//! | **Shadow blur** | `DynamicImage::blur` |
//! | **Encode** | `image` encoders, GIF animation via `GifEncoder` |
//!
//! The module is split into:
//! - **Calculations / geometry**: pure dimension math (unit testable)
//! - **Parameters**: data structures describing operations
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]
//! - **Engine**: [`Engine`] turns backend rasters into owned [`ImageHandle`]s
//! - **Operations**: dispatch, scratch pool, text shadow, frames, finalize

pub mod backend;
mod calculations;
pub mod engine;
pub mod error;
pub mod finalize;
pub mod format;
pub mod frames;
pub mod geometry;
pub mod gradient;
pub mod handle;
pub mod operations;
mod params;
pub mod pool;
pub mod rust_backend;
pub mod text;

pub use backend::{BackendError, ImageBackend, ImageSource};
pub use calculations::{fill_dimensions, thumbnail_dimensions};
pub use engine::Engine;
pub use error::{PipelineError, Result};
pub use finalize::OutputArtifact;
pub use format::ImageFormat;
pub use frames::{FrameCompositor, FrameSet, MAX_FRAME_AREA};
pub use geometry::{
    Alignment, HorizontalAlign, OverlayMargin, OverlaySize, SizeAndMargin, VerticalAlign,
};
pub use gradient::{Direction, Gradient, GradientStop};
pub use handle::{ImageHandle, ImageMeta, Lifecycle};
pub use params::{
    ComposeParams, CropParams, EncodeOptions, Operation, OutputParams, OverlaySource, Quality,
    ScaleParams, TextMarkup, TextParams, ThumbnailParams,
};
pub use pool::ScratchPool;
pub use rust_backend::RustBackend;
