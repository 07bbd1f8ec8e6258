//! Animated images as a set of per-frame handles.
//!
//! Backends decode animations as one tall image with every page stacked
//! vertically. [`extract_frames`] cuts that image at page boundaries into a
//! [`FrameSet`]; transforms then run frame by frame, and [`reassemble`]
//! joins the frames back into a tall image for encoding.
//!
//! [`FrameCompositor`] owns a frame set for the lifetime of an animated
//! pipeline. Per-frame transforms are all-or-nothing: a failure on any frame
//! drops the partially built replacement and keeps the previous frames.

use super::backend::ImageBackend;
use super::engine::Engine;
use super::error::{PipelineError, Result};
use super::finalize::{self, OutputArtifact};
use super::format::ImageFormat;
use super::handle::{ImageHandle, Lifecycle};
use super::params::{CropParams, OutputParams};
use std::path::Path;
use tracing::{debug, warn};

/// Largest frame area the GIF writer accepts.
pub const MAX_FRAME_AREA: u64 = 2000 * 2000;

/// Display time given to frames whose source carried none.
pub const DEFAULT_DELAY_MS: u32 = 100;

/// Ordered per-frame handles of one animation. All frames share one size.
#[derive(Debug)]
pub struct FrameSet {
    frames: Vec<ImageHandle>,
    page_height: u32,
    source_width: u32,
    delays_ms: Vec<u32>,
}

impl FrameSet {
    pub fn frames(&self) -> &[ImageHandle] {
        &self.frames
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Page height of the source the frames were cut from.
    pub fn page_height(&self) -> u32 {
        self.page_height
    }

    pub fn source_width(&self) -> u32 {
        self.source_width
    }

    pub fn delays_ms(&self) -> &[u32] {
        &self.delays_ms
    }

    /// Current size of every frame.
    pub fn frame_dimensions(&self) -> (u32, u32) {
        self.frames.first().map_or((0, 0), ImageHandle::dimensions)
    }

    pub fn loader(&self) -> Option<ImageFormat> {
        self.frames.first().and_then(|f| f.meta().loader)
    }

    /// A frame set with the same timing but new frames.
    fn with_frames(&self, frames: Vec<ImageHandle>) -> Self {
        Self {
            frames,
            page_height: self.page_height,
            source_width: self.source_width,
            delays_ms: self.delays_ms.clone(),
        }
    }
}

/// Cut a stacked source into frames.
///
/// `region` selects the same rectangle in every page and defaults to the
/// whole page. It must fit inside one page.
pub fn extract_frames<B: ImageBackend>(
    engine: &Engine<B>,
    source: &ImageHandle,
    region: Option<&CropParams>,
) -> Result<FrameSet> {
    let meta = source.meta();
    let source_width = source.width();
    let page_height = meta.page_height.unwrap_or(source.height());
    if page_height == 0 {
        return Err(PipelineError::Region("source has no pages".into()));
    }
    let pages = (source.height() / page_height).max(1);

    let region = region
        .copied()
        .unwrap_or_else(|| CropParams::new(0, 0, source_width, page_height));
    region.ensure_fits(source_width, page_height)?;

    let mut frames = Vec::with_capacity(pages as usize);
    for page in 0..pages {
        let cut = CropParams {
            top: page * page_height + region.top,
            ..region
        };
        frames.push(engine.crop(source, &cut)?);
    }

    let mut delays_ms = meta.delays_ms.clone();
    delays_ms.resize(frames.len(), DEFAULT_DELAY_MS);
    debug!(
        frames = frames.len(),
        page_height,
        width = region.width,
        height = region.height,
        "extracted frames"
    );
    Ok(FrameSet {
        frames,
        page_height,
        source_width,
        delays_ms,
    })
}

/// Fail when a frame is too large to be written as an animation.
pub fn check_frame_area(width: u32, height: u32) -> Result<()> {
    let area = width as u64 * height as u64;
    if area > MAX_FRAME_AREA {
        return Err(PipelineError::Capacity(format!(
            "frame of {width}x{height} ({area} px) exceeds the animated limit of {MAX_FRAME_AREA} px"
        )));
    }
    Ok(())
}

/// Join the frames into one tall image with the frame height as page height.
pub fn reassemble<B: ImageBackend>(engine: &Engine<B>, set: &FrameSet) -> Result<ImageHandle> {
    let (width, height) = set.frame_dimensions();
    check_frame_area(width, height)?;
    engine.join_vertical(&set.frames, set.delays_ms.clone())
}

/// Owner of an animated pipeline's frames.
#[derive(Debug)]
pub struct FrameCompositor {
    frames: Option<FrameSet>,
    state: Lifecycle,
}

impl FrameCompositor {
    /// Take over a decoded animation, extracting `region` from every page.
    ///
    /// The stacked source is released once the frames are cut.
    pub fn load<B: ImageBackend>(engine: &Engine<B>, source: ImageHandle, region: Option<&CropParams>) -> Result<Self> {
        let frames = extract_frames(engine, &source, region)?;
        source.release();
        Ok(Self {
            frames: Some(frames),
            state: Lifecycle::Active,
        })
    }

    pub fn state(&self) -> Lifecycle {
        self.state
    }

    pub fn frames(&self) -> Option<&FrameSet> {
        self.frames.as_ref()
    }

    fn active(&self) -> Result<&FrameSet> {
        match (&self.frames, self.state) {
            (Some(frames), Lifecycle::Active) => Ok(frames),
            (_, state) => Err(PipelineError::Closed(state)),
        }
    }

    pub fn frame_dimensions(&self) -> Result<(u32, u32)> {
        Ok(self.active()?.frame_dimensions())
    }

    /// Run `transform` on every frame and swap in the results.
    ///
    /// If any frame fails, the frames built so far are released and the
    /// current frame set stays as it was.
    pub fn apply_per_frame<F>(&mut self, mut transform: F) -> Result<()>
    where
        F: FnMut(&ImageHandle) -> Result<ImageHandle>,
    {
        let current = self.active()?;
        let mut next = Vec::with_capacity(current.frame_count());
        for (index, frame) in current.frames.iter().enumerate() {
            match transform(frame) {
                Ok(out) => next.push(out),
                Err(e) => {
                    warn!(
                        frame = index,
                        frames = current.frame_count(),
                        error = %e,
                        "frame transform failed, keeping previous frames"
                    );
                    return Err(e);
                }
            }
        }
        debug_assert!(next.windows(2).all(|w| w[0].dimensions() == w[1].dimensions()));
        let replacement = current.with_frames(next);
        self.frames = Some(replacement);
        Ok(())
    }

    /// Encode the frames as one animation and release them.
    ///
    /// On failure nothing is released and the compositor stays active.
    pub fn finalize<B: ImageBackend>(&mut self, engine: &Engine<B>, params: &OutputParams) -> Result<OutputArtifact> {
        let joined = reassemble(engine, self.active()?)?;
        let artifact = finalize::encode(engine, &joined, params)?;
        self.close(Lifecycle::Finalized);
        Ok(artifact)
    }

    /// Write the frames to `path` as one animation and release them.
    pub fn finalize_to_file<B: ImageBackend>(
        &mut self,
        engine: &Engine<B>,
        path: &Path,
        params: &OutputParams,
    ) -> Result<ImageFormat> {
        let joined = reassemble(engine, self.active()?)?;
        let format = finalize::encode_to_file(engine, &joined, path, params)?;
        self.close(Lifecycle::Finalized);
        Ok(format)
    }

    /// Release the frames. Calling it again, or after `finalize`, does nothing.
    pub fn dispose(&mut self) {
        if self.state == Lifecycle::Active {
            self.close(Lifecycle::Disposed);
        }
    }

    fn close(&mut self, state: Lifecycle) {
        self.frames = None;
        self.state = state;
    }
}
