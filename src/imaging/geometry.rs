//! Overlay geometry: size, margins and placement of an overlay on a source.
//!
//! Everything here is plain arithmetic on dimensions, so compose and text
//! operations can reject impossible layouts before touching the backend.
//!
//! | Input | Resolves to |
//! |---|---|
//! | `Percent(p)` | `round(D * p)` |
//! | `Absolute(a)` | `round(a)`; error when `a >= D` |
//! | `Left` / `Top` | margin |
//! | `Center` | `D/2 - overlay/2` |
//! | `Right` / `Bottom` | `D - overlay - margin` |

use super::error::{PipelineError, Result};
use super::params::ThumbnailParams;
use serde::{Deserialize, Serialize};

/// Overlay target size, relative to the source or in pixels.
///
/// A missing height keeps the overlay's aspect ratio.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OverlaySize {
    Percent { width: f32, height: Option<f32> },
    Absolute { width: f64, height: Option<f64> },
}

impl OverlaySize {
    /// Fractions of the source size, each in `(0, 1]`.
    pub fn percent(width: f32, height: Option<f32>) -> Result<Self> {
        for value in std::iter::once(width).chain(height) {
            if !(value > 0.0 && value <= 1.0) {
                return Err(PipelineError::Configuration(format!(
                    "overlay percent must be in (0, 1], got {value}"
                )));
            }
        }
        Ok(OverlaySize::Percent { width, height })
    }

    pub fn absolute(width: f64, height: Option<f64>) -> Result<Self> {
        for value in std::iter::once(width).chain(height) {
            if !(value.is_finite() && value > 0.0) {
                return Err(PipelineError::Configuration(format!(
                    "overlay size must be a positive number of pixels, got {value}"
                )));
            }
        }
        Ok(OverlaySize::Absolute { width, height })
    }
}

/// Distance kept from the aligned edges.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OverlayMargin {
    Percent { vertical: f32, horizontal: f32 },
    Absolute { vertical: f64, horizontal: f64 },
}

impl OverlayMargin {
    pub fn percent(vertical: f32, horizontal: f32) -> Result<Self> {
        for value in [vertical, horizontal] {
            if !(0.0..=1.0).contains(&value) {
                return Err(PipelineError::Configuration(format!(
                    "margin percent must be in [0, 1], got {value}"
                )));
            }
        }
        Ok(OverlayMargin::Percent {
            vertical,
            horizontal,
        })
    }

    pub fn absolute(vertical: f64, horizontal: f64) -> Result<Self> {
        for value in [vertical, horizontal] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(PipelineError::Configuration(format!(
                    "margin must be a non-negative number of pixels, got {value}"
                )));
            }
        }
        Ok(OverlayMargin::Absolute {
            vertical,
            horizontal,
        })
    }
}

impl Default for OverlayMargin {
    fn default() -> Self {
        OverlayMargin::Absolute {
            vertical: 0.0,
            horizontal: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SizeAndMargin {
    pub size: OverlaySize,
    pub margin: OverlayMargin,
}

impl SizeAndMargin {
    pub fn new(size: OverlaySize) -> Self {
        Self {
            size,
            margin: OverlayMargin::default(),
        }
    }

    pub fn with_margin(mut self, margin: OverlayMargin) -> Self {
        self.margin = margin;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HorizontalAlign {
    #[default]
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerticalAlign {
    #[default]
    Top,
    Center,
    Bottom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Alignment {
    pub horizontal: HorizontalAlign,
    pub vertical: VerticalAlign,
}

impl Alignment {
    pub fn new(horizontal: HorizontalAlign, vertical: VerticalAlign) -> Self {
        Self {
            horizontal,
            vertical,
        }
    }

    pub fn center() -> Self {
        Self::new(HorizontalAlign::Center, VerticalAlign::Center)
    }
}

/// Margins in pixels, as `(vertical, horizontal)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Margins {
    pub vertical: u32,
    pub horizontal: u32,
}

fn percent_of(dimension: u32, percent: f32) -> u32 {
    (dimension as f64 * percent as f64).round() as u32
}

fn absolute_within(value: f64, dimension: u32, what: &str) -> Result<u32> {
    if value >= dimension as f64 {
        return Err(PipelineError::Geometry(format!(
            "{what} {value} is not smaller than source dimension {dimension}"
        )));
    }
    Ok(value.round() as u32)
}

/// Overlay width in pixels for a source `source_width` wide.
pub fn resolve_width(size: &OverlaySize, source_width: u32) -> Result<u32> {
    let width = match *size {
        OverlaySize::Percent { width, .. } => percent_of(source_width, width),
        OverlaySize::Absolute { width, .. } => absolute_within(width, source_width, "overlay width")?,
    };
    Ok(width.max(1))
}

/// Overlay height in pixels, or `None` to keep the aspect ratio.
pub fn resolve_height(size: &OverlaySize, source_height: u32) -> Result<Option<u32>> {
    let height = match *size {
        OverlaySize::Percent { height, .. } => height.map(|p| percent_of(source_height, p)),
        OverlaySize::Absolute { height, .. } => height
            .map(|h| absolute_within(h, source_height, "overlay height"))
            .transpose()?,
    };
    Ok(height.map(|h| h.max(1)))
}

pub fn resolve_margins(margin: &OverlayMargin, source_width: u32, source_height: u32) -> Result<Margins> {
    Ok(match *margin {
        OverlayMargin::Percent {
            vertical,
            horizontal,
        } => Margins {
            vertical: percent_of(source_height, vertical),
            horizontal: percent_of(source_width, horizontal),
        },
        OverlayMargin::Absolute {
            vertical,
            horizontal,
        } => Margins {
            vertical: absolute_within(vertical, source_height, "vertical margin")?,
            horizontal: absolute_within(horizontal, source_width, "horizontal margin")?,
        },
    })
}

/// Cover mode: a percent overlay exactly as wide as the source.
pub fn uses_cover_crop(size: &OverlaySize) -> bool {
    matches!(size, OverlaySize::Percent { width, .. } if *width == 1.0)
}

/// The thumbnail request that produces an overlay of the resolved size.
pub fn thumbnail_equivalent(size: &OverlaySize, source_width: u32, source_height: u32) -> Result<ThumbnailParams> {
    Ok(ThumbnailParams {
        width: resolve_width(size, source_width)?,
        height: resolve_height(size, source_height)?.unwrap_or(0),
        crop: uses_cover_crop(size),
        force: false,
    })
}

pub fn overlay_x(align: HorizontalAlign, source_width: u32, overlay_width: u32, margin: u32) -> i64 {
    match align {
        HorizontalAlign::Left => margin as i64,
        HorizontalAlign::Center => (source_width / 2) as i64 - (overlay_width / 2) as i64,
        HorizontalAlign::Right => source_width as i64 - overlay_width as i64 - margin as i64,
    }
}

pub fn overlay_y(align: VerticalAlign, source_height: u32, overlay_height: u32, margin: u32) -> i64 {
    match align {
        VerticalAlign::Top => margin as i64,
        VerticalAlign::Center => (source_height / 2) as i64 - (overlay_height / 2) as i64,
        VerticalAlign::Bottom => source_height as i64 - overlay_height as i64 - margin as i64,
    }
}

/// Top-left corner of the overlay on the source.
pub fn placement(align: Alignment, source: (u32, u32), overlay: (u32, u32), margins: Margins) -> (i64, i64) {
    (
        overlay_x(align.horizontal, source.0, overlay.0, margins.horizontal),
        overlay_y(align.vertical, source.1, overlay.1, margins.vertical),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn percent(width: f32) -> OverlaySize {
        OverlaySize::percent(width, None).unwrap()
    }

    #[test]
    fn percent_width_rounds_product() {
        for (p, d) in [(0.5f32, 200u32), (0.25, 333), (1.0, 17), (0.1, 1920), (0.333, 1000)] {
            let expected = (d as f64 * p as f64).round() as u32;
            assert_eq!(resolve_width(&percent(p), d).unwrap(), expected, "p={p} d={d}");
        }
    }

    #[test]
    fn percent_out_of_range_rejected() {
        assert!(OverlaySize::percent(0.0, None).is_err());
        assert!(OverlaySize::percent(1.01, None).is_err());
        assert!(OverlaySize::percent(0.5, Some(-0.1)).is_err());
        assert!(OverlaySize::percent(f32::NAN, None).is_err());
    }

    #[test]
    fn absolute_width_fails_iff_not_smaller() {
        let size = |w| OverlaySize::absolute(w, None).unwrap();
        assert_eq!(resolve_width(&size(99.4), 100).unwrap(), 99);
        assert!(matches!(
            resolve_width(&size(100.0), 100),
            Err(PipelineError::Geometry(_))
        ));
        assert!(resolve_width(&size(250.0), 100).is_err());
    }

    #[test]
    fn absolute_height_checked_against_source_height() {
        let size = OverlaySize::absolute(10.0, Some(50.0)).unwrap();
        assert_eq!(resolve_height(&size, 51).unwrap(), Some(50));
        assert!(resolve_height(&size, 50).is_err());
    }

    #[test]
    fn missing_height_is_unbounded() {
        assert_eq!(resolve_height(&percent(0.5), 100).unwrap(), None);
    }

    #[test]
    fn margins_resolve_per_axis() {
        let margin = OverlayMargin::percent(0.1, 0.05).unwrap();
        assert_eq!(
            resolve_margins(&margin, 200, 100).unwrap(),
            Margins {
                vertical: 10,
                horizontal: 10
            }
        );
        let margin = OverlayMargin::absolute(99.0, 150.0).unwrap();
        assert!(matches!(
            resolve_margins(&margin, 150, 100),
            Err(PipelineError::Geometry(_))
        ));
    }

    #[test]
    fn alignment_offsets() {
        // Center: D/2 - overlay/2
        assert_eq!(overlay_x(HorizontalAlign::Center, 200, 100, 7), 50);
        assert_eq!(overlay_x(HorizontalAlign::Center, 201, 51, 0), 75);
        // Left/Top: margin
        assert_eq!(overlay_x(HorizontalAlign::Left, 200, 100, 7), 7);
        assert_eq!(overlay_y(VerticalAlign::Top, 100, 30, 4), 4);
        // Right/Bottom: D - overlay - margin
        assert_eq!(overlay_x(HorizontalAlign::Right, 200, 100, 7), 93);
        assert_eq!(overlay_y(VerticalAlign::Bottom, 100, 30, 4), 66);
    }

    #[test]
    fn cover_crop_only_for_full_percent_width() {
        assert!(uses_cover_crop(&percent(1.0)));
        assert!(!uses_cover_crop(&percent(0.999_999)));
        assert!(!uses_cover_crop(&OverlaySize::absolute(1.0, None).unwrap()));
    }

    #[test]
    fn half_width_centered_overlay_on_200x100() {
        let size = percent(0.5);
        let request = thumbnail_equivalent(&size, 200, 100).unwrap();
        assert_eq!(request.width, 100);
        assert_eq!(request.height, 0);
        assert!(!request.crop);
        let (x, _) = placement(Alignment::center(), (200, 100), (100, 50), Margins::default());
        assert_eq!(x, 50);
    }
}
