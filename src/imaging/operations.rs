//! Dispatch of chainable operations.
//!
//! An [`Operation`] is first *prepared* against the size of the image it
//! will run on: parameters are checked, overlay geometry is resolved and
//! overlays are decoded or rendered. The prepared step can then run on one
//! image (static pipelines) or on every frame of an animation, reusing the
//! same overlay for all frames.

use super::backend::{ImageBackend, ImageSource};
use super::calculations::thumbnail_dimensions;
use super::engine::Engine;
use super::error::{PipelineError, Result};
use super::geometry;
use super::gradient;
use super::handle::ImageHandle;
use super::params::{ComposeParams, CropParams, Operation, OverlaySource, ScaleParams, ThumbnailParams};
use super::text;
use tracing::debug;

/// An operation ready to run on images of one size.
#[derive(Debug)]
pub enum PreparedOperation<'o> {
    Thumbnail(&'o ThumbnailParams),
    Scale(&'o ScaleParams),
    Crop(&'o CropParams),
    /// Composite a ready overlay at a fixed position.
    Overlay { overlay: ImageHandle, x: i64, y: i64 },
}

impl PreparedOperation<'_> {
    pub fn run<B: ImageBackend>(&self, engine: &Engine<B>, image: &ImageHandle) -> Result<ImageHandle> {
        match self {
            PreparedOperation::Thumbnail(params) => engine.thumbnail(image, params),
            PreparedOperation::Scale(params) => engine.resize(image, params.h_scale, params.v_scale),
            PreparedOperation::Crop(region) => engine.crop(image, region),
            PreparedOperation::Overlay { overlay, x, y } => engine.composite_over(image, overlay, *x, *y),
        }
    }
}

/// Validate `operation` for images of `dimensions` and build what it needs.
///
/// Size, region and geometry errors are raised here, before any backend call.
pub fn prepare<'o, B: ImageBackend>(
    engine: &Engine<B>,
    operation: &'o Operation,
    dimensions: (u32, u32),
) -> Result<PreparedOperation<'o>> {
    let (width, height) = dimensions;
    match operation {
        Operation::Thumbnail(params) => {
            thumbnail_dimensions(dimensions, params).ok_or_else(|| {
                PipelineError::Configuration("thumbnail needs a width or a height".into())
            })?;
            Ok(PreparedOperation::Thumbnail(params))
        }
        Operation::Scale(params) => Ok(PreparedOperation::Scale(params)),
        Operation::Crop(region) => {
            region.ensure_fits(width, height)?;
            Ok(PreparedOperation::Crop(region))
        }
        Operation::Compose(params) => {
            let (overlay, x, y) = prepare_overlay(engine, params, dimensions)?;
            Ok(PreparedOperation::Overlay { overlay, x, y })
        }
        Operation::Text(params) => {
            let (overlay, x, y) = text::prepare_text(engine, params, dimensions)?;
            Ok(PreparedOperation::Overlay { overlay, x, y })
        }
    }
}

/// Apply one operation to one image.
pub fn apply<B: ImageBackend>(engine: &Engine<B>, image: &ImageHandle, operation: &Operation) -> Result<ImageHandle> {
    prepare(engine, operation, image.dimensions())?.run(engine, image)
}

/// Decode or render a compose overlay at its resolved size and position it.
fn prepare_overlay<B: ImageBackend>(
    engine: &Engine<B>,
    params: &ComposeParams,
    source: (u32, u32),
) -> Result<(ImageHandle, i64, i64)> {
    let (width, height) = source;
    let request = geometry::thumbnail_equivalent(&params.size_and_margin.size, width, height)?;
    let margins = geometry::resolve_margins(&params.size_and_margin.margin, width, height)?;

    let overlay = match &params.source {
        OverlaySource::File(path) => engine.thumbnail_source(ImageSource::File(path), &request)?,
        OverlaySource::Bytes(data) => engine.thumbnail_source(ImageSource::Bytes(data), &request)?,
        OverlaySource::Gradients(gradients) => {
            let svg_height = if request.height == 0 { height } else { request.height };
            let svg = gradient::to_svg(gradients, request.width, svg_height);
            engine.thumbnail_source(ImageSource::Bytes(svg.as_bytes()), &request)?
        }
    };

    let (x, y) = geometry::placement(params.align, source, overlay.dimensions(), margins);
    debug!(
        width = overlay.width(),
        height = overlay.height(),
        x,
        y,
        crop = request.crop,
        "overlay ready"
    );
    Ok((overlay, x, y))
}
