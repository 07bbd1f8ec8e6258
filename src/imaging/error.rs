//! Error taxonomy of the operation pipeline.
//!
//! Geometry, region and capacity violations are detected before any backend
//! call is issued. [`PipelineError::Engine`] wraps the backend's own error
//! text together with the step that failed.

use super::backend::BackendError;
use super::handle::Lifecycle;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    /// Invalid construction parameters.
    #[error("Invalid parameters: {0}")]
    Configuration(String),
    /// The requested operation is not available for this kind of input.
    #[error("Unsupported operation: {0}")]
    Unsupported(String),
    /// Input bytes could not be decoded.
    #[error("Failed to load image: {0}")]
    Load(String),
    /// Overlay size or margin does not fit in the source image.
    #[error("Overlay geometry out of bounds: {0}")]
    Geometry(String),
    /// Crop or extraction region lies outside the image.
    #[error("Region out of bounds: {0}")]
    Region(String),
    /// Scratch pool exhausted or frame area above the supported limit.
    #[error("Capacity exceeded: {0}")]
    Capacity(String),
    /// A backend primitive failed.
    #[error("{context}: {source}")]
    Engine {
        context: String,
        #[source]
        source: BackendError,
    },
    /// Output or input format unsupported or undetectable.
    #[error("Format error: {0}")]
    Format(String),
    /// Chain call on a pipeline that was already finalized or disposed.
    #[error("Pipeline is already {0}")]
    Closed(Lifecycle),
}

impl PipelineError {
    pub(crate) fn engine(context: impl Into<String>, source: BackendError) -> Self {
        PipelineError::Engine {
            context: context.into(),
            source,
        }
    }
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;
