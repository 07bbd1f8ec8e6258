//! Encoding the final image.
//!
//! The output format is the requested one or, when none is given, the
//! format of the loader that decoded the input. Quality is only passed to
//! encoders that have a lossy quality setting.

use super::backend::ImageBackend;
use super::engine::Engine;
use super::error::Result;
use super::format::ImageFormat;
use super::handle::ImageHandle;
use super::params::{EncodeOptions, OutputParams};
use std::path::Path;
use tracing::info;

/// Encoded bytes tagged with their format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputArtifact {
    pub bytes: Vec<u8>,
    pub format: ImageFormat,
}

/// Turn output parameters into a concrete encoder request for `image`.
pub fn resolve_request<B: ImageBackend>(
    engine: &Engine<B>,
    image: &ImageHandle,
    params: &OutputParams,
) -> Result<EncodeOptions> {
    let format = match params.format {
        Some(format) => format,
        None => engine.loader(image)?,
    };
    Ok(request(format, params))
}

/// Like [`resolve_request`], with the extension of `path` taking the place
/// of a missing format before the loader is consulted.
pub fn resolve_file_request<B: ImageBackend>(
    engine: &Engine<B>,
    image: &ImageHandle,
    path: &Path,
    params: &OutputParams,
) -> Result<EncodeOptions> {
    let format = match params.format.or_else(|| ImageFormat::from_path(path)) {
        Some(format) => format,
        None => engine.loader(image)?,
    };
    Ok(request(format, params))
}

fn request(format: ImageFormat, params: &OutputParams) -> EncodeOptions {
    EncodeOptions {
        format,
        quality: format.supports_quality().then(|| params.quality.value()),
        strip_metadata: params.strip_metadata,
    }
}

pub fn encode<B: ImageBackend>(engine: &Engine<B>, image: &ImageHandle, params: &OutputParams) -> Result<OutputArtifact> {
    let options = resolve_request(engine, image, params)?;
    let bytes = engine.encode(image, &options)?;
    info!(
        format = %options.format,
        width = image.width(),
        height = image.meta().page_height.unwrap_or(image.height()),
        pages = image.meta().pages,
        bytes = bytes.len(),
        "finalized"
    );
    Ok(OutputArtifact {
        bytes,
        format: options.format,
    })
}

/// Encode `image` to `path`, returning the format written.
pub fn encode_to_file<B: ImageBackend>(
    engine: &Engine<B>,
    image: &ImageHandle,
    path: &Path,
    params: &OutputParams,
) -> Result<ImageFormat> {
    let options = resolve_file_request(engine, image, path, params)?;
    engine.encode_file(image, path, &options)?;
    info!(path = %path.display(), format = %options.format, "finalized to file");
    Ok(options.format)
}
