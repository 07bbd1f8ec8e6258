//! Chainable pipelines over still and animated images.
//!
//! A pipeline owns the image it is working on. Every chain call replaces
//! that image with the result of the operation, or fails and leaves it
//! exactly as it was. [`finalize`](ImageOperations::finalize) encodes the
//! current image and releases it; [`dispose`](ImageOperations::dispose)
//! releases it without output. Both move the pipeline out of the
//! [`Lifecycle::Active`] state, after which chain calls fail with
//! [`PipelineError::Closed`] and further releases do nothing.
//!
//! ```no_run
//! use imgchain::config::EngineConfig;
//! use imgchain::imaging::{Engine, ImageFormat, OutputParams, ScaleParams, ThumbnailParams};
//! use imgchain::pipeline::{ImageOperations, Pipeline};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = Engine::new(EngineConfig::default());
//! let data = std::fs::read("photo.jpg")?;
//! let mut pipeline = Pipeline::open(&engine, None, &data)?;
//! pipeline
//!     .thumbnail(ThumbnailParams::new(800, 0))?
//!     .scale(ScaleParams::uniform(0.5)?)?;
//! let artifact = pipeline.finalize(&OutputParams::new(Some(ImageFormat::Webp)))?;
//! # let _ = artifact;
//! # Ok(())
//! # }
//! ```

use crate::imaging::operations;
use crate::imaging::{
    ComposeParams, CropParams, Engine, FrameCompositor, ImageBackend, ImageFormat, ImageHandle,
    ImageSource, Lifecycle, Operation, OutputArtifact, OutputParams, PipelineError, Result,
    RustBackend, ScaleParams, TextParams, ThumbnailParams,
};
use crate::imaging::finalize;
use std::path::Path;
use tracing::{info, warn};

/// Operations shared by the still and animated pipelines.
///
/// The chain methods return `&mut Self` so calls can be strung together
/// with `?`.
pub trait ImageOperations {
    /// Run one operation, replacing the current image on success.
    fn apply(&mut self, operation: &Operation) -> Result<()>;

    /// Encode the current image and release everything the pipeline owns.
    ///
    /// On failure the pipeline stays active and still owns its image.
    fn finalize(&mut self, params: &OutputParams) -> Result<OutputArtifact>;

    /// Like [`finalize`](Self::finalize), writing to `path`. Without a
    /// requested format the extension of `path` picks one. Returns the
    /// format written.
    fn finalize_to_file(&mut self, path: &Path, params: &OutputParams) -> Result<ImageFormat>;

    /// Release everything without output. Safe to call in any state.
    fn dispose(&mut self);

    fn state(&self) -> Lifecycle;

    fn thumbnail(&mut self, params: ThumbnailParams) -> Result<&mut Self>
    where
        Self: Sized,
    {
        self.apply(&Operation::Thumbnail(params))?;
        Ok(self)
    }

    fn scale(&mut self, params: ScaleParams) -> Result<&mut Self>
    where
        Self: Sized,
    {
        self.apply(&Operation::Scale(params))?;
        Ok(self)
    }

    fn crop(&mut self, region: CropParams) -> Result<&mut Self>
    where
        Self: Sized,
    {
        self.apply(&Operation::Crop(region))?;
        Ok(self)
    }

    fn compose(&mut self, params: ComposeParams) -> Result<&mut Self>
    where
        Self: Sized,
    {
        self.apply(&Operation::Compose(params))?;
        Ok(self)
    }

    fn text(&mut self, params: TextParams) -> Result<&mut Self>
    where
        Self: Sized,
    {
        self.apply(&Operation::Text(params))?;
        Ok(self)
    }
}

/// Pipeline over one still image.
pub struct StaticPipeline<'e, B: ImageBackend = RustBackend> {
    engine: &'e Engine<B>,
    image: Option<ImageHandle>,
    state: Lifecycle,
}

impl<'e, B: ImageBackend> StaticPipeline<'e, B> {
    pub fn open(engine: &'e Engine<B>, data: &[u8]) -> Result<Self> {
        let image = engine.decode(ImageSource::Bytes(data), false)?;
        info!(width = image.width(), height = image.height(), "opened still pipeline");
        Ok(Self::from_handle(engine, image))
    }

    /// Decode straight to thumbnail size.
    pub fn open_with_thumbnail(engine: &'e Engine<B>, data: &[u8], params: &ThumbnailParams) -> Result<Self> {
        if params.width == 0 && params.height == 0 {
            return Err(PipelineError::Configuration(
                "thumbnail needs a width or a height".into(),
            ));
        }
        let image = engine.thumbnail_source(ImageSource::Bytes(data), params)?;
        info!(
            width = image.width(),
            height = image.height(),
            "opened still pipeline with thumbnail"
        );
        Ok(Self::from_handle(engine, image))
    }

    /// Wrap an image that was already decoded by `engine`.
    pub fn from_handle(engine: &'e Engine<B>, image: ImageHandle) -> Self {
        Self {
            engine,
            image: Some(image),
            state: Lifecycle::Active,
        }
    }

    /// The current image while the pipeline is active.
    pub fn image(&self) -> Result<&ImageHandle> {
        match (&self.image, self.state) {
            (Some(image), Lifecycle::Active) => Ok(image),
            (_, state) => Err(PipelineError::Closed(state)),
        }
    }

    fn close(&mut self, state: Lifecycle) {
        self.image = None;
        self.state = state;
    }
}

impl<B: ImageBackend> ImageOperations for StaticPipeline<'_, B> {
    #[tracing::instrument(level = "debug", skip_all, fields(operation = operation.name()))]
    fn apply(&mut self, operation: &Operation) -> Result<()> {
        let next = match operations::apply(self.engine, self.image()?, operation) {
            Ok(next) => next,
            Err(e) => {
                warn!(error = %e, "operation failed, keeping previous image");
                return Err(e);
            }
        };
        self.image = Some(next);
        Ok(())
    }

    fn finalize(&mut self, params: &OutputParams) -> Result<OutputArtifact> {
        let artifact = finalize::encode(self.engine, self.image()?, params)?;
        self.close(Lifecycle::Finalized);
        Ok(artifact)
    }

    fn finalize_to_file(&mut self, path: &Path, params: &OutputParams) -> Result<ImageFormat> {
        let format = finalize::encode_to_file(self.engine, self.image()?, path, params)?;
        self.close(Lifecycle::Finalized);
        Ok(format)
    }

    fn dispose(&mut self) {
        if self.state == Lifecycle::Active {
            self.close(Lifecycle::Disposed);
        }
    }

    fn state(&self) -> Lifecycle {
        self.state
    }
}

/// Pipeline over every frame of an animation.
pub struct AnimatedPipeline<'e, B: ImageBackend = RustBackend> {
    engine: &'e Engine<B>,
    compositor: FrameCompositor,
}

impl<'e, B: ImageBackend> AnimatedPipeline<'e, B> {
    pub fn open(engine: &'e Engine<B>, data: &[u8]) -> Result<Self> {
        Self::open_with_crop(engine, data, None)
    }

    /// Decode every frame, keeping only `region` of each.
    pub fn open_with_crop(engine: &'e Engine<B>, data: &[u8], region: Option<&CropParams>) -> Result<Self> {
        let source = engine.decode(ImageSource::Bytes(data), true)?;
        let compositor = FrameCompositor::load(engine, source, region)?;
        if let Some(frames) = compositor.frames() {
            let (width, height) = frames.frame_dimensions();
            info!(
                frames = frames.frame_count(),
                width,
                height,
                "opened animated pipeline"
            );
        }
        Ok(Self { engine, compositor })
    }

    pub fn compositor(&self) -> &FrameCompositor {
        &self.compositor
    }
}

impl<B: ImageBackend> ImageOperations for AnimatedPipeline<'_, B> {
    #[tracing::instrument(level = "debug", skip_all, fields(operation = operation.name()))]
    fn apply(&mut self, operation: &Operation) -> Result<()> {
        let dimensions = self.compositor.frame_dimensions()?;
        let step = operations::prepare(self.engine, operation, dimensions)?;
        let engine = self.engine;
        self.compositor.apply_per_frame(|frame| step.run(engine, frame))
    }

    fn finalize(&mut self, params: &OutputParams) -> Result<OutputArtifact> {
        self.compositor.finalize(self.engine, params)
    }

    fn finalize_to_file(&mut self, path: &Path, params: &OutputParams) -> Result<ImageFormat> {
        self.compositor.finalize_to_file(self.engine, path, params)
    }

    fn dispose(&mut self) {
        self.compositor.dispose();
    }

    fn state(&self) -> Lifecycle {
        self.compositor.state()
    }
}

/// A still or animated pipeline, picked from the input format.
pub enum Pipeline<'e, B: ImageBackend = RustBackend> {
    Static(StaticPipeline<'e, B>),
    Animated(AnimatedPipeline<'e, B>),
}

/// The declared format, or the one the bytes look like.
fn input_format(declared: Option<ImageFormat>, data: &[u8]) -> Option<ImageFormat> {
    declared.or_else(|| ImageFormat::sniff(data))
}

impl<'e, B: ImageBackend> Pipeline<'e, B> {
    /// Open `data` as an animated pipeline when its format is animated
    /// and as a still pipeline otherwise.
    pub fn open(engine: &'e Engine<B>, declared: Option<ImageFormat>, data: &[u8]) -> Result<Self> {
        match input_format(declared, data) {
            Some(format) if format.is_animated() => Ok(Self::Animated(AnimatedPipeline::open(engine, data)?)),
            _ => Ok(Self::Static(StaticPipeline::open(engine, data)?)),
        }
    }

    /// Open an animation, keeping only `region` of every frame.
    pub fn open_with_crop(
        engine: &'e Engine<B>,
        declared: Option<ImageFormat>,
        data: &[u8],
        region: &CropParams,
    ) -> Result<Self> {
        match input_format(declared, data) {
            Some(format) if format.is_animated() => Ok(Self::Animated(AnimatedPipeline::open_with_crop(
                engine,
                data,
                Some(region),
            )?)),
            other => Err(PipelineError::Unsupported(format!(
                "crop on open needs an animated input, got {}",
                other.map_or("unknown format", ImageFormat::name)
            ))),
        }
    }

    /// Open a still image decoded straight to thumbnail size.
    pub fn open_with_thumbnail(
        engine: &'e Engine<B>,
        declared: Option<ImageFormat>,
        data: &[u8],
        params: &ThumbnailParams,
    ) -> Result<Self> {
        match input_format(declared, data) {
            Some(format) if format.is_animated() => Err(PipelineError::Unsupported(format!(
                "thumbnail on open is not available for {format} input, frames must be decoded first"
            ))),
            _ => Ok(Self::Static(StaticPipeline::open_with_thumbnail(engine, data, params)?)),
        }
    }

    pub fn is_animated(&self) -> bool {
        matches!(self, Self::Animated(_))
    }

    fn inner(&mut self) -> &mut dyn ImageOperations {
        match self {
            Self::Static(p) => p,
            Self::Animated(p) => p,
        }
    }
}

impl<B: ImageBackend> ImageOperations for Pipeline<'_, B> {
    fn apply(&mut self, operation: &Operation) -> Result<()> {
        self.inner().apply(operation)
    }

    fn finalize(&mut self, params: &OutputParams) -> Result<OutputArtifact> {
        self.inner().finalize(params)
    }

    fn finalize_to_file(&mut self, path: &Path, params: &OutputParams) -> Result<ImageFormat> {
        self.inner().finalize_to_file(path, params)
    }

    fn dispose(&mut self) {
        self.inner().dispose()
    }

    fn state(&self) -> Lifecycle {
        match self {
            Self::Static(p) => p.state(),
            Self::Animated(p) => p.state(),
        }
    }
}

/// Open `data`, apply `ops` in order and encode the result.
///
/// The pipeline is disposed if any step fails.
pub fn run<B: ImageBackend>(
    engine: &Engine<B>,
    declared: Option<ImageFormat>,
    data: &[u8],
    ops: &[Operation],
    output: &OutputParams,
) -> Result<OutputArtifact> {
    let mut pipeline = Pipeline::open(engine, declared, data)?;
    let result = ops
        .iter()
        .try_for_each(|op| pipeline.apply(op))
        .and_then(|()| pipeline.finalize(output));
    if result.is_err() {
        pipeline.dispose();
    }
    result
}

/// [`run`], writing the result to `path`. Returns the format written.
pub fn run_to_file<B: ImageBackend>(
    engine: &Engine<B>,
    declared: Option<ImageFormat>,
    data: &[u8],
    ops: &[Operation],
    path: &Path,
    output: &OutputParams,
) -> Result<ImageFormat> {
    let mut pipeline = Pipeline::open(engine, declared, data)?;
    let result = ops
        .iter()
        .try_for_each(|op| pipeline.apply(op))
        .and_then(|()| pipeline.finalize_to_file(path, output));
    if result.is_err() {
        pipeline.dispose();
    }
    result
}
