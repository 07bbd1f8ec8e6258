//! Parameter types for image operations.
//!
//! These structs describe *what* to do, not *how* to do it. They are the
//! interface between the [`pipeline`](crate::pipeline) (which decides what to
//! apply and in which order) and the [`backend`](super::backend) (which does
//! the actual pixel work). Validation happens at construction, so a value of
//! one of these types is always a legal request.
//!
//! ## Types
//!
//! - [`Quality`]: Lossy encoding quality (0–100, default 75).
//! - [`OutputParams`]: Output format, quality and metadata policy for `finalize`.
//! - [`ThumbnailParams`] / [`ScaleParams`] / [`CropParams`]: geometric transforms.
//! - [`ComposeParams`]: Overlay an image file, an encoded buffer or generated gradients.
//! - [`TextParams`]: Overlay text, optionally with a blurred shadow.
//! - [`Operation`]: The closed set of chainable operations.

use super::error::{PipelineError, Result};
use super::format::ImageFormat;
use super::geometry::{Alignment, OverlayMargin, OverlaySize, SizeAndMargin};
use super::gradient::Gradient;
use std::path::PathBuf;

/// Quality setting for lossy image encoding (0-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(u8);

impl Quality {
    pub fn new(value: u8) -> Result<Self> {
        if value > 100 {
            return Err(PipelineError::Configuration(format!(
                "quality must be in 0..=100, got {value}"
            )));
        }
        Ok(Self(value))
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(75)
    }
}

/// How `finalize` encodes the result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputParams {
    /// Target format; `None` keeps the format the input was decoded from.
    pub format: Option<ImageFormat>,
    pub quality: Quality,
    pub strip_metadata: bool,
}

impl OutputParams {
    pub fn new(format: Option<ImageFormat>) -> Self {
        Self {
            format,
            ..Self::default()
        }
    }

    pub fn with_quality(mut self, quality: Quality) -> Self {
        self.quality = quality;
        self
    }

    pub fn with_strip_metadata(mut self, strip: bool) -> Self {
        self.strip_metadata = strip;
        self
    }
}

impl Default for OutputParams {
    fn default() -> Self {
        Self {
            format: None,
            quality: Quality::default(),
            strip_metadata: true,
        }
    }
}

/// Fully resolved encoder request handed to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeOptions {
    pub format: ImageFormat,
    /// Present only for formats with a lossy quality setting.
    pub quality: Option<u8>,
    pub strip_metadata: bool,
}

/// Thumbnail resize.
///
/// A zero `width` or `height` leaves that axis unbounded so the aspect ratio
/// is kept. `crop` centre-crops to fill the box, `force` stretches to it;
/// both only apply when both axes are set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThumbnailParams {
    pub width: u32,
    pub height: u32,
    pub crop: bool,
    pub force: bool,
}

impl ThumbnailParams {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            crop: false,
            force: false,
        }
    }

    pub fn cropped(mut self) -> Self {
        self.crop = true;
        self
    }

    pub fn forced(mut self) -> Self {
        self.force = true;
        self
    }
}

/// Independent horizontal and vertical scale factors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleParams {
    pub h_scale: f64,
    pub v_scale: f64,
}

impl ScaleParams {
    pub fn new(h_scale: f64, v_scale: f64) -> Result<Self> {
        for (axis, value) in [("horizontal", h_scale), ("vertical", v_scale)] {
            if !value.is_finite() || value <= 0.0 {
                return Err(PipelineError::Configuration(format!(
                    "{axis} scale must be a positive number, got {value}"
                )));
            }
        }
        Ok(Self { h_scale, v_scale })
    }

    pub fn uniform(scale: f64) -> Result<Self> {
        Self::new(scale, scale)
    }
}

/// Rectangular region, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropParams {
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

impl CropParams {
    pub fn new(left: u32, top: u32, width: u32, height: u32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    /// Whether the region lies entirely inside a `image_width` x `image_height` image.
    pub fn fits_in(&self, image_width: u32, image_height: u32) -> bool {
        let right = self.left as u64 + self.width as u64;
        let bottom = self.top as u64 + self.height as u64;
        self.width > 0
            && self.height > 0
            && right <= image_width as u64
            && bottom <= image_height as u64
    }

    pub fn ensure_fits(&self, image_width: u32, image_height: u32) -> Result<()> {
        if self.fits_in(image_width, image_height) {
            Ok(())
        } else {
            Err(PipelineError::Region(format!(
                "{}x{}+{}+{} does not fit in {image_width}x{image_height}",
                self.width, self.height, self.left, self.top
            )))
        }
    }
}

/// Where a composed overlay comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum OverlaySource {
    File(PathBuf),
    Bytes(Vec<u8>),
    /// Rasterised from generated SVG at the overlay's resolved size.
    Gradients(Vec<Gradient>),
}

/// Overlay another image onto the current one.
#[derive(Debug, Clone, PartialEq)]
pub struct ComposeParams {
    pub source: OverlaySource,
    pub size_and_margin: SizeAndMargin,
    pub align: Alignment,
}

impl ComposeParams {
    pub fn from_file(path: impl Into<PathBuf>, size_and_margin: SizeAndMargin, align: Alignment) -> Self {
        Self {
            source: OverlaySource::File(path.into()),
            size_and_margin,
            align,
        }
    }

    pub fn from_bytes(data: Vec<u8>, size_and_margin: SizeAndMargin, align: Alignment) -> Self {
        Self {
            source: OverlaySource::Bytes(data),
            size_and_margin,
            align,
        }
    }

    /// Gradients always cover the whole image (canvas mode, top-left, no margin).
    pub fn from_gradients(gradients: Vec<Gradient>) -> Self {
        Self {
            source: OverlaySource::Gradients(gradients),
            size_and_margin: SizeAndMargin {
                size: OverlaySize::Percent {
                    width: 1.0,
                    height: Some(1.0),
                },
                margin: OverlayMargin::default(),
            },
            align: Alignment::default(),
        }
    }
}

pub const DEFAULT_TEXT_COLOR: &str = "#FFFFFF";

/// Text plus the colour it is drawn in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextMarkup {
    pub content: String,
    pub color: String,
}

/// Overlay text, optionally with a blurred drop shadow.
#[derive(Debug, Clone, PartialEq)]
pub struct TextParams {
    pub text: TextMarkup,
    pub shadow: Option<TextMarkup>,
    pub size_and_margin: SizeAndMargin,
    pub align: Alignment,
}

impl TextParams {
    pub fn new(content: impl Into<String>, size_and_margin: SizeAndMargin, align: Alignment) -> Self {
        Self {
            text: TextMarkup {
                content: content.into(),
                color: DEFAULT_TEXT_COLOR.to_string(),
            },
            shadow: None,
            size_and_margin,
            align,
        }
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.text.color = color.into();
        self
    }

    /// Add a shadow in `color`; a blank colour means no shadow.
    pub fn with_shadow(mut self, color: impl Into<String>) -> Self {
        let color = color.into();
        self.shadow = (!color.trim().is_empty()).then(|| TextMarkup {
            content: self.text.content.clone(),
            color,
        });
        self
    }
}

/// The closed set of chainable operations.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Thumbnail(ThumbnailParams),
    Scale(ScaleParams),
    Crop(CropParams),
    Compose(ComposeParams),
    Text(TextParams),
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Thumbnail(_) => "thumbnail",
            Operation::Scale(_) => "scale",
            Operation::Crop(_) => "crop",
            Operation::Compose(_) => "compose",
            Operation::Text(_) => "text",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_rejects_out_of_range() {
        assert_eq!(Quality::new(0).unwrap().value(), 0);
        assert_eq!(Quality::new(100).unwrap().value(), 100);
        assert!(matches!(
            Quality::new(101),
            Err(PipelineError::Configuration(_))
        ));
    }

    #[test]
    fn quality_default_is_75() {
        assert_eq!(Quality::default().value(), 75);
    }

    #[test]
    fn output_params_default_strips_metadata() {
        let params = OutputParams::default();
        assert!(params.strip_metadata);
        assert_eq!(params.format, None);
    }

    #[test]
    fn scale_rejects_non_positive() {
        assert!(ScaleParams::new(0.0, 1.0).is_err());
        assert!(ScaleParams::new(1.0, f64::NAN).is_err());
        assert!(ScaleParams::uniform(0.5).is_ok());
    }

    #[test]
    fn crop_fits_inside_bounds() {
        assert!(CropParams::new(0, 0, 100, 50).fits_in(100, 50));
        assert!(CropParams::new(10, 10, 90, 40).fits_in(100, 50));
    }

    #[test]
    fn crop_outside_bounds_is_region_error() {
        // left + width > image width
        let rect = CropParams::new(11, 0, 90, 10);
        assert!(!rect.fits_in(100, 50));
        assert!(matches!(
            rect.ensure_fits(100, 50),
            Err(PipelineError::Region(_))
        ));
        // top + height > image height
        assert!(!CropParams::new(0, 41, 10, 10).fits_in(100, 50));
        // no wrap-around on huge offsets
        assert!(!CropParams::new(u32::MAX, 0, 2, 2).fits_in(100, 50));
    }

    #[test]
    fn blank_shadow_color_means_no_shadow() {
        let params = TextParams::new(
            "hi",
            SizeAndMargin::new(OverlaySize::percent(0.5, None).unwrap()),
            Alignment::default(),
        );
        assert!(params.clone().with_shadow("  ").shadow.is_none());
        let shadowed = params.with_shadow("#000000").shadow.unwrap();
        assert_eq!(shadowed.content, "hi");
        assert_eq!(shadowed.color, "#000000");
    }

    #[test]
    fn gradient_compose_uses_cover_layout() {
        let params = ComposeParams::from_gradients(Vec::new());
        assert_eq!(
            params.size_and_margin.size,
            OverlaySize::Percent {
                width: 1.0,
                height: Some(1.0)
            }
        );
    }
}
