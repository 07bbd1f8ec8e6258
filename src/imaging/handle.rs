//! Owned image handles.
//!
//! An [`ImageHandle`] is the only way pixels travel through the pipeline. It
//! cannot be cloned, so every decoded or transformed image has exactly one
//! owner; dropping the handle releases it, and the owning [`Engine`]'s live
//! counter goes down by one. Handles are `!Sync`: they may move to another
//! thread together with their pipeline but are never shared between threads.
//!
//! [`Engine`]: super::engine::Engine

use super::format::ImageFormat;
use image::DynamicImage;
use std::cell::Cell;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Metadata the engine keeps next to the pixels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageMeta {
    /// Format of the loader that produced the image, if it was decoded.
    pub loader: Option<ImageFormat>,
    /// Height of one page when several frames are stacked vertically.
    pub page_height: Option<u32>,
    /// Number of stacked pages (1 for still images).
    pub pages: u32,
    /// Per-page display time in milliseconds (animated images only).
    pub delays_ms: Vec<u32>,
}

impl ImageMeta {
    /// Metadata for a single-page image.
    pub fn single(loader: Option<ImageFormat>) -> Self {
        Self {
            loader,
            page_height: None,
            pages: 1,
            delays_ms: Vec::new(),
        }
    }

    /// Metadata for `pages` frames of `page_height` rows stacked vertically.
    pub fn stacked(loader: Option<ImageFormat>, page_height: u32, delays_ms: Vec<u32>) -> Self {
        Self {
            loader,
            page_height: Some(page_height),
            pages: delays_ms.len().max(1) as u32,
            delays_ms,
        }
    }
}

impl Default for ImageMeta {
    fn default() -> Self {
        Self::single(None)
    }
}

/// Decrements the engine's live-handle counter exactly once, on drop.
struct ReleaseGuard(Arc<AtomicUsize>);

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Exclusively owned decoded image.
pub struct ImageHandle {
    image: DynamicImage,
    meta: ImageMeta,
    _release: ReleaseGuard,
    _not_sync: PhantomData<Cell<()>>,
}

impl ImageHandle {
    pub(crate) fn adopt(image: DynamicImage, meta: ImageMeta, live: &Arc<AtomicUsize>) -> Self {
        live.fetch_add(1, Ordering::AcqRel);
        Self {
            image,
            meta,
            _release: ReleaseGuard(Arc::clone(live)),
            _not_sync: PhantomData,
        }
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    pub fn meta(&self) -> &ImageMeta {
        &self.meta
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.image.width(), self.image.height())
    }

    /// Release the handle now instead of at end of scope.
    pub fn release(self) {}
}

impl fmt::Debug for ImageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageHandle")
            .field("width", &self.width())
            .field("height", &self.height())
            .field("meta", &self.meta)
            .finish()
    }
}

/// Lifecycle of anything that owns handles on behalf of a caller.
///
/// Releasing is only performed while `Active`; a second `dispose` or a
/// `dispose` after `finalize` is a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Active,
    Finalized,
    Disposed,
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Lifecycle::Active => "active",
            Lifecycle::Finalized => "finalized",
            Lifecycle::Disposed => "disposed",
        })
    }
}
