//! Image processing backend trait and shared types.
//!
//! The [`ImageBackend`] trait is the native engine contract: decode, the
//! geometric transforms, compositing, text rendering, blur, canvas embedding,
//! vertical joins for animated pages, blank canvases, and encoding. Every
//! primitive borrows its inputs and returns a fresh raster; ownership of the
//! results is taken over by [`Engine`](super::engine::Engine), which wraps
//! them in handles.
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend). Tests use the recording
//! [`MockBackend`](tests::MockBackend).

use super::handle::ImageMeta;
use super::params::{CropParams, EncodeOptions, TextMarkup, ThumbnailParams};
use image::DynamicImage;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Decode failed: {0}")]
    Decode(String),
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),
    #[error("Unsupported: {0}")]
    Unsupported(String),
}

/// Encoded input: an in-memory buffer or a file on disk.
#[derive(Debug, Clone, Copy)]
pub enum ImageSource<'a> {
    Bytes(&'a [u8]),
    File(&'a Path),
}

impl ImageSource<'_> {
    pub fn describe(&self) -> String {
        match self {
            ImageSource::Bytes(data) => format!("buffer of {} bytes", data.len()),
            ImageSource::File(path) => path.display().to_string(),
        }
    }
}

/// A decoded raster plus what the loader knew about it.
#[derive(Debug, Clone)]
pub struct Decoded {
    pub image: DynamicImage,
    pub meta: ImageMeta,
}

/// Trait for image processing backends.
///
/// Implementations must be `Sync`: one backend serves every pipeline of a
/// process, possibly from several rayon workers at once.
pub trait ImageBackend: Sync {
    /// Decode an image. With `all_frames`, animated inputs come back as all
    /// pages stacked vertically and [`ImageMeta::page_height`] set.
    fn decode(&self, source: ImageSource<'_>, all_frames: bool) -> Result<Decoded, BackendError>;

    /// Decode and shrink in one step (first frame only).
    fn thumbnail_source(
        &self,
        source: ImageSource<'_>,
        params: &ThumbnailParams,
    ) -> Result<Decoded, BackendError>;

    fn thumbnail(
        &self,
        image: &DynamicImage,
        params: &ThumbnailParams,
    ) -> Result<DynamicImage, BackendError>;

    /// Resample by independent horizontal and vertical factors.
    fn resize(
        &self,
        image: &DynamicImage,
        h_scale: f64,
        v_scale: f64,
    ) -> Result<DynamicImage, BackendError>;

    fn crop(&self, image: &DynamicImage, region: &CropParams) -> Result<DynamicImage, BackendError>;

    /// Alpha-over blend of `overlay` onto `base` with its top-left corner at
    /// `(x, y)`. Parts of the overlay outside the base are clipped.
    fn composite_over(
        &self,
        base: &DynamicImage,
        overlay: &DynamicImage,
        x: i64,
        y: i64,
    ) -> Result<DynamicImage, BackendError>;

    /// Render `markup` to an RGBA image fitted to `width` (and `height`, when set).
    fn render_text(
        &self,
        markup: &TextMarkup,
        font_family: &str,
        width: u32,
        height: Option<u32>,
    ) -> Result<DynamicImage, BackendError>;

    fn gaussian_blur(&self, image: &DynamicImage, sigma: f32) -> Result<DynamicImage, BackendError>;

    /// Place `image` at `(x, y)` on a transparent `width` x `height` canvas.
    fn embed(
        &self,
        image: &DynamicImage,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    ) -> Result<DynamicImage, BackendError>;

    /// Stack equally sized frames top to bottom.
    fn join_vertical(&self, frames: &[&DynamicImage]) -> Result<DynamicImage, BackendError>;

    fn encode(
        &self,
        image: &DynamicImage,
        meta: &ImageMeta,
        options: &EncodeOptions,
    ) -> Result<Vec<u8>, BackendError>;

    /// Encode to `path` with the same options as [`encode`](Self::encode).
    fn encode_file(
        &self,
        image: &DynamicImage,
        meta: &ImageMeta,
        path: &Path,
        options: &EncodeOptions,
    ) -> Result<(), BackendError>;

    /// An opaque black `width` x `height` canvas.
    fn black(&self, width: u32, height: u32) -> Result<DynamicImage, BackendError>;
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::imaging::calculations::thumbnail_dimensions;
    use crate::imaging::format::ImageFormat;
    use std::sync::Mutex;

    pub const MOCK_DELAY_MS: u32 = 100;

    /// Mock backend that records operations and produces blank rasters of
    /// the right size instead of doing pixel work.
    /// Uses Mutex (not RefCell) so it is Sync and works with rayon's par_iter.
    pub struct MockBackend {
        /// Size of one decoded page.
        pub source_size: (u32, u32),
        /// Pages returned when all frames are requested.
        pub pages: u32,
        pub loader: Option<ImageFormat>,
        pub operations: Mutex<Vec<RecordedOp>>,
        failures: Mutex<Vec<(&'static str, usize)>>,
    }

    #[derive(Debug, Clone, PartialEq)]
    pub enum RecordedOp {
        Decode {
            all_frames: bool,
        },
        ThumbnailSource(ThumbnailParams),
        Thumbnail(ThumbnailParams),
        Resize {
            h_scale: f64,
            v_scale: f64,
        },
        Crop(CropParams),
        CompositeOver {
            x: i64,
            y: i64,
            overlay: (u32, u32),
        },
        RenderText {
            content: String,
            color: String,
            width: u32,
            height: Option<u32>,
        },
        GaussianBlur {
            sigma: f32,
        },
        Embed {
            x: u32,
            y: u32,
            width: u32,
            height: u32,
        },
        JoinVertical {
            frames: usize,
        },
        Encode(EncodeOptions),
        EncodeFile {
            path: String,
            options: EncodeOptions,
        },
        Black {
            width: u32,
            height: u32,
        },
    }

    impl RecordedOp {
        pub fn name(&self) -> &'static str {
            match self {
                RecordedOp::Decode { .. } => "decode",
                RecordedOp::ThumbnailSource(_) => "thumbnail_source",
                RecordedOp::Thumbnail(_) => "thumbnail",
                RecordedOp::Resize { .. } => "resize",
                RecordedOp::Crop(_) => "crop",
                RecordedOp::CompositeOver { .. } => "composite_over",
                RecordedOp::RenderText { .. } => "render_text",
                RecordedOp::GaussianBlur { .. } => "gaussian_blur",
                RecordedOp::Embed { .. } => "embed",
                RecordedOp::JoinVertical { .. } => "join_vertical",
                RecordedOp::Encode(_) => "encode",
                RecordedOp::EncodeFile { .. } => "encode_file",
                RecordedOp::Black { .. } => "black",
            }
        }
    }

    impl MockBackend {
        /// A still JPEG of the given size.
        pub fn still(width: u32, height: u32) -> Self {
            Self {
                source_size: (width, height),
                pages: 1,
                loader: Some(ImageFormat::Jpeg),
                operations: Mutex::new(Vec::new()),
                failures: Mutex::new(Vec::new()),
            }
        }

        /// An animated GIF with `pages` frames of the given size.
        pub fn animated(width: u32, height: u32, pages: u32) -> Self {
            Self {
                pages,
                loader: Some(ImageFormat::Gif),
                ..Self::still(width, height)
            }
        }

        /// Make the `nth` (0-based) call of primitive `name` fail.
        pub fn fail_nth(self, name: &'static str, nth: usize) -> Self {
            self.failures.lock().unwrap().push((name, nth));
            self
        }

        pub fn get_operations(&self) -> Vec<RecordedOp> {
            self.operations.lock().unwrap().clone()
        }

        pub fn op_names(&self) -> Vec<&'static str> {
            self.get_operations().iter().map(RecordedOp::name).collect()
        }

        pub fn calls(&self, name: &str) -> usize {
            self.operations
                .lock()
                .unwrap()
                .iter()
                .filter(|op| op.name() == name)
                .count()
        }

        pub fn clear(&self) {
            self.operations.lock().unwrap().clear();
        }

        fn record(&self, op: RecordedOp) -> Result<(), BackendError> {
            let name = op.name();
            let mut ops = self.operations.lock().unwrap();
            let index = ops.iter().filter(|o| o.name() == name).count();
            ops.push(op);
            let fail = self
                .failures
                .lock()
                .unwrap()
                .iter()
                .any(|&(n, i)| n == name && i == index);
            if fail {
                Err(BackendError::ProcessingFailed(format!(
                    "injected failure in {name} call {index}"
                )))
            } else {
                Ok(())
            }
        }
    }

    fn blank(width: u32, height: u32) -> DynamicImage {
        DynamicImage::new_luma8(width, height)
    }

    impl ImageBackend for MockBackend {
        fn decode(&self, _source: ImageSource<'_>, all_frames: bool) -> Result<Decoded, BackendError> {
            self.record(RecordedOp::Decode { all_frames })?;
            let (w, h) = self.source_size;
            if all_frames && self.loader.is_some_and(ImageFormat::is_animated) {
                Ok(Decoded {
                    image: blank(w, h * self.pages),
                    meta: ImageMeta::stacked(
                        self.loader,
                        h,
                        vec![MOCK_DELAY_MS; self.pages as usize],
                    ),
                })
            } else {
                Ok(Decoded {
                    image: blank(w, h),
                    meta: ImageMeta::single(self.loader),
                })
            }
        }

        fn thumbnail_source(
            &self,
            _source: ImageSource<'_>,
            params: &ThumbnailParams,
        ) -> Result<Decoded, BackendError> {
            self.record(RecordedOp::ThumbnailSource(*params))?;
            let (w, h) = thumbnail_dimensions(self.source_size, params)
                .ok_or_else(|| BackendError::ProcessingFailed("empty thumbnail box".into()))?;
            Ok(Decoded {
                image: blank(w, h),
                meta: ImageMeta::single(self.loader),
            })
        }

        fn thumbnail(
            &self,
            image: &DynamicImage,
            params: &ThumbnailParams,
        ) -> Result<DynamicImage, BackendError> {
            self.record(RecordedOp::Thumbnail(*params))?;
            let (w, h) = thumbnail_dimensions((image.width(), image.height()), params)
                .ok_or_else(|| BackendError::ProcessingFailed("empty thumbnail box".into()))?;
            Ok(blank(w, h))
        }

        fn resize(
            &self,
            image: &DynamicImage,
            h_scale: f64,
            v_scale: f64,
        ) -> Result<DynamicImage, BackendError> {
            self.record(RecordedOp::Resize { h_scale, v_scale })?;
            let w = ((image.width() as f64 * h_scale).round() as u32).max(1);
            let h = ((image.height() as f64 * v_scale).round() as u32).max(1);
            Ok(blank(w, h))
        }

        fn crop(&self, _image: &DynamicImage, region: &CropParams) -> Result<DynamicImage, BackendError> {
            self.record(RecordedOp::Crop(*region))?;
            Ok(blank(region.width, region.height))
        }

        fn composite_over(
            &self,
            base: &DynamicImage,
            overlay: &DynamicImage,
            x: i64,
            y: i64,
        ) -> Result<DynamicImage, BackendError> {
            self.record(RecordedOp::CompositeOver {
                x,
                y,
                overlay: (overlay.width(), overlay.height()),
            })?;
            Ok(blank(base.width(), base.height()))
        }

        fn render_text(
            &self,
            markup: &TextMarkup,
            _font_family: &str,
            width: u32,
            height: Option<u32>,
        ) -> Result<DynamicImage, BackendError> {
            self.record(RecordedOp::RenderText {
                content: markup.content.clone(),
                color: markup.color.clone(),
                width,
                height,
            })?;
            Ok(blank(width, height.unwrap_or(20)))
        }

        fn gaussian_blur(&self, image: &DynamicImage, sigma: f32) -> Result<DynamicImage, BackendError> {
            self.record(RecordedOp::GaussianBlur { sigma })?;
            Ok(blank(image.width(), image.height()))
        }

        fn embed(
            &self,
            _image: &DynamicImage,
            x: u32,
            y: u32,
            width: u32,
            height: u32,
        ) -> Result<DynamicImage, BackendError> {
            self.record(RecordedOp::Embed {
                x,
                y,
                width,
                height,
            })?;
            Ok(blank(width, height))
        }

        fn join_vertical(&self, frames: &[&DynamicImage]) -> Result<DynamicImage, BackendError> {
            self.record(RecordedOp::JoinVertical {
                frames: frames.len(),
            })?;
            let width = frames.first().map_or(0, |f| f.width());
            let height = frames.iter().map(|f| f.height()).sum();
            Ok(blank(width, height))
        }

        fn encode(
            &self,
            image: &DynamicImage,
            meta: &ImageMeta,
            options: &EncodeOptions,
        ) -> Result<Vec<u8>, BackendError> {
            self.record(RecordedOp::Encode(*options))?;
            Ok(format!(
                "{}:{}x{}:{}",
                options.format,
                image.width(),
                image.height(),
                meta.pages
            )
            .into_bytes())
        }

        fn encode_file(
            &self,
            _image: &DynamicImage,
            _meta: &ImageMeta,
            path: &Path,
            options: &EncodeOptions,
        ) -> Result<(), BackendError> {
            self.record(RecordedOp::EncodeFile {
                path: path.to_string_lossy().to_string(),
                options: *options,
            })
        }

        fn black(&self, width: u32, height: u32) -> Result<DynamicImage, BackendError> {
            self.record(RecordedOp::Black { width, height })?;
            Ok(blank(width, height))
        }
    }

    #[test]
    fn mock_records_decode() {
        let backend = MockBackend::still(800, 600);
        let decoded = backend.decode(ImageSource::Bytes(b"x"), false).unwrap();
        assert_eq!((decoded.image.width(), decoded.image.height()), (800, 600));
        assert_eq!(decoded.meta.loader, Some(ImageFormat::Jpeg));
        assert_eq!(backend.get_operations(), vec![RecordedOp::Decode { all_frames: false }]);
    }

    #[test]
    fn mock_stacks_animated_pages() {
        let backend = MockBackend::animated(10, 8, 3);
        let decoded = backend.decode(ImageSource::Bytes(b"x"), true).unwrap();
        assert_eq!(decoded.image.height(), 24);
        assert_eq!(decoded.meta.page_height, Some(8));
        assert_eq!(decoded.meta.pages, 3);
    }

    #[test]
    fn mock_fails_requested_call_only() {
        let backend = MockBackend::still(10, 10).fail_nth("resize", 1);
        let img = blank(10, 10);
        assert!(backend.resize(&img, 0.5, 0.5).is_ok());
        assert!(backend.resize(&img, 0.5, 0.5).is_err());
        assert!(backend.resize(&img, 0.5, 0.5).is_ok());
        assert_eq!(backend.calls("resize"), 3);
    }

    #[test]
    fn mock_records_thumbnail_size() {
        let backend = MockBackend::still(400, 300);
        let out = backend
            .thumbnail(&blank(400, 300), &ThumbnailParams::new(100, 0))
            .unwrap();
        assert_eq!((out.width(), out.height()), (100, 75));
        assert!(matches!(
            &backend.get_operations()[0],
            RecordedOp::Thumbnail(ThumbnailParams {
                width: 100,
                height: 0,
                crop: false,
                force: false
            })
        ));
    }
}
