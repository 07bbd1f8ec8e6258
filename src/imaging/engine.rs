//! The engine context.
//!
//! An [`Engine`] is created once per process and borrowed by every pipeline.
//! It owns the backend and the configuration, and it is the only place that
//! turns backend rasters into [`ImageHandle`]s, so it can count how many
//! handles are alive at any moment.

use super::backend::{BackendError, ImageBackend, ImageSource};
use super::error::{PipelineError, Result};
use super::finalize::{self, OutputArtifact};
use super::format::ImageFormat;
use super::handle::{ImageHandle, ImageMeta};
use super::params::{CropParams, EncodeOptions, OutputParams, TextMarkup, ThumbnailParams};
use super::rust_backend::RustBackend;
use crate::config::{EngineConfig, effective_threads};
use image::DynamicImage;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

pub struct Engine<B: ImageBackend = RustBackend> {
    backend: B,
    config: EngineConfig,
    live: Arc<AtomicUsize>,
}

impl Engine<RustBackend> {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_backend(RustBackend::new(), config)
    }
}

impl<B: ImageBackend> Engine<B> {
    pub fn with_backend(backend: B, config: EngineConfig) -> Self {
        Self {
            backend,
            config,
            live: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Number of handles minted by this engine that have not been released.
    pub fn live_handles(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    /// Size rayon's global pool from `[engine] concurrency`.
    ///
    /// Must run before the first parallel iterator; a pool that is already
    /// built is left alone. Returns the thread count in effect.
    pub fn init_thread_pool(&self) -> usize {
        let threads = effective_threads(&self.config.engine);
        if let Err(e) = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
        {
            debug!(error = %e, "rayon global pool already initialised");
        }
        rayon::current_num_threads()
    }

    fn adopt(&self, image: DynamicImage, meta: ImageMeta) -> ImageHandle {
        ImageHandle::adopt(image, meta, &self.live)
    }

    /// Source format of `image`, from the loader that decoded it.
    pub fn loader(&self, image: &ImageHandle) -> Result<ImageFormat> {
        image.meta().loader.ok_or_else(|| {
            PipelineError::Format("image has no loader metadata to take the format from".into())
        })
    }

    pub fn decode(&self, source: ImageSource<'_>, all_frames: bool) -> Result<ImageHandle> {
        let decoded = self
            .backend
            .decode(source, all_frames)
            .map_err(|e| load_error(&source, e))?;
        debug!(
            source = %source.describe(),
            width = decoded.image.width(),
            height = decoded.image.height(),
            pages = decoded.meta.pages,
            "decoded"
        );
        Ok(self.adopt(decoded.image, decoded.meta))
    }

    pub fn thumbnail_source(&self, source: ImageSource<'_>, params: &ThumbnailParams) -> Result<ImageHandle> {
        let decoded = self
            .backend
            .thumbnail_source(source, params)
            .map_err(|e| load_error(&source, e))?;
        debug!(
            source = %source.describe(),
            width = decoded.image.width(),
            height = decoded.image.height(),
            "decoded thumbnail"
        );
        Ok(self.adopt(decoded.image, decoded.meta))
    }

    pub fn thumbnail(&self, image: &ImageHandle, params: &ThumbnailParams) -> Result<ImageHandle> {
        let out = self
            .backend
            .thumbnail(image.image(), params)
            .map_err(|e| PipelineError::engine("thumbnail", e))?;
        Ok(self.derived(image, out, "thumbnail"))
    }

    pub fn resize(&self, image: &ImageHandle, h_scale: f64, v_scale: f64) -> Result<ImageHandle> {
        let out = self
            .backend
            .resize(image.image(), h_scale, v_scale)
            .map_err(|e| PipelineError::engine("resize", e))?;
        Ok(self.derived(image, out, "resize"))
    }

    pub fn crop(&self, image: &ImageHandle, region: &CropParams) -> Result<ImageHandle> {
        let out = self
            .backend
            .crop(image.image(), region)
            .map_err(|e| PipelineError::engine("crop", e))?;
        Ok(self.derived(image, out, "crop"))
    }

    pub fn composite_over(&self, base: &ImageHandle, overlay: &ImageHandle, x: i64, y: i64) -> Result<ImageHandle> {
        let out = self
            .backend
            .composite_over(base.image(), overlay.image(), x, y)
            .map_err(|e| PipelineError::engine("composite", e))?;
        Ok(self.derived(base, out, "composite"))
    }

    /// Render text with the configured font family.
    pub fn render_text(&self, markup: &TextMarkup, width: u32, height: Option<u32>) -> Result<ImageHandle> {
        let out = self
            .backend
            .render_text(markup, &self.config.text.font_family, width, height)
            .map_err(|e| PipelineError::engine("render text", e))?;
        debug!(width = out.width(), height = out.height(), "rendered text");
        Ok(self.adopt(out, ImageMeta::default()))
    }

    pub fn gaussian_blur(&self, image: &ImageHandle, sigma: f32) -> Result<ImageHandle> {
        let out = self
            .backend
            .gaussian_blur(image.image(), sigma)
            .map_err(|e| PipelineError::engine("gaussian blur", e))?;
        Ok(self.derived(image, out, "gaussian blur"))
    }

    pub fn embed(&self, image: &ImageHandle, x: u32, y: u32, width: u32, height: u32) -> Result<ImageHandle> {
        let out = self
            .backend
            .embed(image.image(), x, y, width, height)
            .map_err(|e| PipelineError::engine("embed", e))?;
        Ok(self.derived(image, out, "embed"))
    }

    /// Stack frames into one tall image whose page height is the frame height.
    pub fn join_vertical(&self, frames: &[ImageHandle], delays_ms: Vec<u32>) -> Result<ImageHandle> {
        let first = frames
            .first()
            .ok_or_else(|| PipelineError::engine("join", BackendError::ProcessingFailed("no frames to join".into())))?;
        let page_height = first.height();
        let loader = first.meta().loader;
        let rasters: Vec<&DynamicImage> = frames.iter().map(ImageHandle::image).collect();
        let out = self
            .backend
            .join_vertical(&rasters)
            .map_err(|e| PipelineError::engine("join", e))?;
        debug!(
            frames = frames.len(),
            page_height,
            height = out.height(),
            "joined frames"
        );
        Ok(self.adopt(out, ImageMeta::stacked(loader, page_height, delays_ms)))
    }

    pub fn encode(&self, image: &ImageHandle, options: &EncodeOptions) -> Result<Vec<u8>> {
        let bytes = self
            .backend
            .encode(image.image(), image.meta(), options)
            .map_err(|e| output_error("encode", e))?;
        debug!(
            format = %options.format,
            quality = ?options.quality,
            strip = options.strip_metadata,
            bytes = bytes.len(),
            "encoded"
        );
        Ok(bytes)
    }

    pub fn encode_file(&self, image: &ImageHandle, path: &Path, options: &EncodeOptions) -> Result<()> {
        self.backend
            .encode_file(image.image(), image.meta(), path, options)
            .map_err(|e| output_error(&format!("write {}", path.display()), e))?;
        debug!(
            path = %path.display(),
            format = %options.format,
            quality = ?options.quality,
            strip = options.strip_metadata,
            "wrote image"
        );
        Ok(())
    }

    /// An opaque black canvas with no loader.
    pub fn black(&self, width: u32, height: u32) -> Result<ImageHandle> {
        if width == 0 || height == 0 {
            return Err(PipelineError::Geometry(format!(
                "blank image must be at least 1x1, got {width}x{height}"
            )));
        }
        let image = self
            .backend
            .black(width, height)
            .map_err(|e| PipelineError::engine("black", e))?;
        Ok(self.adopt(image, ImageMeta::single(None)))
    }

    /// Encode a black `width` x `height` image as `format`.
    pub fn blank(&self, width: u32, height: u32, format: ImageFormat) -> Result<OutputArtifact> {
        let canvas = self.black(width, height)?;
        finalize::encode(self, &canvas, &OutputParams::new(Some(format)))
    }

    /// Wrap a transform result, keeping the input's loader.
    fn derived(&self, input: &ImageHandle, out: DynamicImage, step: &str) -> ImageHandle {
        debug!(
            step,
            from_width = input.width(),
            from_height = input.height(),
            width = out.width(),
            height = out.height(),
            "transformed"
        );
        self.adopt(out, ImageMeta::single(input.meta().loader))
    }
}

fn load_error(source: &ImageSource<'_>, error: BackendError) -> PipelineError {
    match error {
        BackendError::Decode(_) | BackendError::Unsupported(_) | BackendError::Io(_) => {
            PipelineError::Load(format!("{}: {error}", source.describe()))
        }
        other => PipelineError::engine(format!("decode {}", source.describe()), other),
    }
}

fn output_error(context: &str, error: BackendError) -> PipelineError {
    match error {
        BackendError::Unsupported(msg) => PipelineError::Format(msg),
        other => PipelineError::engine(context, other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::backend::tests::MockBackend;

    fn engine(backend: MockBackend) -> Engine<MockBackend> {
        Engine::with_backend(backend, EngineConfig::default())
    }

    #[test]
    fn handles_are_counted_until_dropped() {
        let engine = engine(MockBackend::still(40, 30));
        let source = engine.decode(ImageSource::Bytes(b"x"), false).unwrap();
        let half = engine.resize(&source, 0.5, 0.5).unwrap();
        assert_eq!(engine.live_handles(), 2);
        assert_eq!(half.dimensions(), (20, 15));
        drop(source);
        assert_eq!(engine.live_handles(), 1);
        half.release();
        assert_eq!(engine.live_handles(), 0);
    }

    #[test]
    fn failed_primitive_mints_no_handle() {
        let engine = engine(MockBackend::still(40, 30).fail_nth("crop", 0));
        let source = engine.decode(ImageSource::Bytes(b"x"), false).unwrap();
        let err = engine.crop(&source, &CropParams::new(0, 0, 10, 10)).unwrap_err();
        assert!(matches!(err, PipelineError::Engine { ref context, .. } if context == "crop"));
        assert_eq!(engine.live_handles(), 1);
    }

    #[test]
    fn transforms_keep_loader() {
        let engine = engine(MockBackend::still(40, 30));
        let source = engine.decode(ImageSource::Bytes(b"x"), false).unwrap();
        let out = engine.thumbnail(&source, &ThumbnailParams::new(10, 0)).unwrap();
        assert_eq!(engine.loader(&out).unwrap(), ImageFormat::Jpeg);
    }

    #[test]
    fn text_has_no_loader() {
        let engine = engine(MockBackend::still(40, 30));
        let markup = TextMarkup {
            content: "x".into(),
            color: "#FFFFFF".into(),
        };
        let text = engine.render_text(&markup, 30, None).unwrap();
        assert!(matches!(engine.loader(&text), Err(PipelineError::Format(_))));
    }

    #[test]
    fn injected_decode_failure_is_engine_error() {
        let engine = engine(MockBackend::still(40, 30).fail_nth("decode", 0));
        assert!(matches!(
            engine.decode(ImageSource::Bytes(b"x"), false),
            Err(PipelineError::Engine { .. })
        ));
        assert_eq!(engine.live_handles(), 0);
    }

    #[test]
    fn undecodable_bytes_are_load_error() {
        let engine = Engine::new(EngineConfig::default());
        assert!(matches!(
            engine.decode(ImageSource::Bytes(b"not an image"), false),
            Err(PipelineError::Load(_))
        ));
        assert!(matches!(
            load_error(&ImageSource::Bytes(b"x"), BackendError::Decode("bad".into())),
            PipelineError::Load(_)
        ));
    }

    #[test]
    fn blank_encodes_black_canvas() {
        let engine = engine(MockBackend::still(40, 30));
        let artifact = engine.blank(64, 48, ImageFormat::Jpeg).unwrap();
        assert_eq!(artifact.format, ImageFormat::Jpeg);
        assert_eq!(artifact.bytes, b"jpg:64x48:1");
        assert_eq!(engine.backend().op_names(), vec!["black", "encode"]);
        assert_eq!(engine.live_handles(), 0);
    }

    #[test]
    fn blank_rejects_empty_canvas() {
        let engine = engine(MockBackend::still(40, 30));
        assert!(matches!(
            engine.blank(0, 10, ImageFormat::Png),
            Err(PipelineError::Geometry(_))
        ));
        assert_eq!(engine.backend().calls("black"), 0);
    }

    #[test]
    fn blank_jpeg_decodes_to_black() {
        let engine = Engine::new(EngineConfig::default());
        let artifact = engine.blank(20, 10, ImageFormat::Jpeg).unwrap();
        assert_eq!(ImageFormat::sniff(&artifact.bytes), Some(ImageFormat::Jpeg));
        let decoded = image::load_from_memory(&artifact.bytes).unwrap().to_rgb8();
        assert_eq!(decoded.dimensions(), (20, 10));
        assert!(decoded.pixels().all(|p| p.0.iter().all(|&c| c < 8)));
    }

    #[test]
    fn join_records_page_height() {
        let engine = engine(MockBackend::still(40, 30));
        let source = engine.decode(ImageSource::Bytes(b"x"), false).unwrap();
        let frames = vec![
            engine.crop(&source, &CropParams::new(0, 0, 40, 10)).unwrap(),
            engine.crop(&source, &CropParams::new(0, 10, 40, 10)).unwrap(),
        ];
        let joined = engine.join_vertical(&frames, vec![50, 70]).unwrap();
        assert_eq!(joined.dimensions(), (40, 20));
        assert_eq!(joined.meta().page_height, Some(10));
        assert_eq!(joined.meta().pages, 2);
        assert_eq!(joined.meta().delays_ms, vec![50, 70]);
    }

    #[test]
    fn unsupported_encoder_is_format_error() {
        assert!(matches!(
            output_error("encode", BackendError::Unsupported("pdf".into())),
            PipelineError::Format(_)
        ));
    }
}
