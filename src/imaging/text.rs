//! Text overlays with an optional blurred drop shadow.
//!
//! With a shadow the overlay is built in five scratch slots:
//!
//! ```text
//! 0  text            render_text(text)
//! 1  shadow          render_text(shadow)
//! 2  padded shadow   embed(1) at (r, r) on (w + 2r) x (h + 2r)
//! 3  blurred shadow  gaussian_blur(2, r)
//! 4  composed        composite_over(3, 0) at (r, r)
//! ```
//!
//! Only the last slot leaves the pool; everything else is released with it.

use super::backend::ImageBackend;
use super::engine::Engine;
use super::error::Result;
use super::geometry;
use super::handle::ImageHandle;
use super::params::{TextMarkup, TextParams};
use super::pool::ScratchPool;
use tracing::debug;

/// Blur sigma of the shadow, also the padding around it.
pub const SHADOW_RADIUS: f32 = 4.0;

/// Render `text` (and its shadow) into one overlay image.
pub fn render_text_overlay<B: ImageBackend>(
    engine: &Engine<B>,
    pool: &mut ScratchPool,
    text: &TextMarkup,
    shadow: Option<&TextMarkup>,
    width: u32,
    height: Option<u32>,
) -> Result<ImageHandle> {
    let primary = pool.alloc(|| engine.render_text(text, width, height))?;
    let Some(shadow) = shadow else {
        return pool.take(primary);
    };

    let radius = SHADOW_RADIUS as u32;
    let rendered = pool.alloc(|| engine.render_text(shadow, width, height))?;

    let padded = pool.get_image()?;
    let (w, h) = pool.get(rendered)?.dimensions();
    let image = engine.embed(pool.get(rendered)?, radius, radius, w + 2 * radius, h + 2 * radius)?;
    pool.fill(padded, image)?;

    let blurred = pool.get_image()?;
    let image = engine.gaussian_blur(pool.get(padded)?, SHADOW_RADIUS)?;
    pool.fill(blurred, image)?;

    let composed = pool.get_image()?;
    let image = engine.composite_over(
        pool.get(blurred)?,
        pool.get(primary)?,
        radius as i64,
        radius as i64,
    )?;
    pool.fill(composed, image)?;

    pool.take(composed)
}

/// Build the overlay for `params` against a `source` sized image and work
/// out where it goes.
///
/// Geometry is resolved before anything is rendered.
pub fn prepare_text<B: ImageBackend>(
    engine: &Engine<B>,
    params: &TextParams,
    source: (u32, u32),
) -> Result<(ImageHandle, i64, i64)> {
    let size = &params.size_and_margin.size;
    let width = geometry::resolve_width(size, source.0)?;
    let height = geometry::resolve_height(size, source.1)?;
    let margins = geometry::resolve_margins(&params.size_and_margin.margin, source.0, source.1)?;

    let mut pool = ScratchPool::new(engine.config().text.scratch_capacity);
    let overlay = render_text_overlay(
        engine,
        &mut pool,
        &params.text,
        params.shadow.as_ref(),
        width,
        height,
    );
    pool.dispose();
    let overlay = overlay?;

    let (x, y) = geometry::placement(params.align, source, overlay.dimensions(), margins);
    debug!(
        width = overlay.width(),
        height = overlay.height(),
        x,
        y,
        shadow = params.shadow.is_some(),
        "text overlay ready"
    );
    Ok((overlay, x, y))
}

/// Draw text onto `image`.
pub fn apply_text<B: ImageBackend>(engine: &Engine<B>, image: &ImageHandle, params: &TextParams) -> Result<ImageHandle> {
    let (overlay, x, y) = prepare_text(engine, params, image.dimensions())?;
    engine.composite_over(image, &overlay, x, y)
}
