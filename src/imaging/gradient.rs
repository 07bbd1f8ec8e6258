//! Linear gradient overlays rendered through SVG markup.
//!
//! Each [`Gradient`] becomes one `<linearGradient>` definition and one
//! full-size `<rect>` filled with it, painted in order, so later gradients
//! sit on top of earlier ones.

use super::error::{PipelineError, Result};
use std::fmt::Write;

/// One colour stop. `offset` is a percentage along the gradient vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GradientStop {
    color: String,
    offset: u8,
}

impl GradientStop {
    /// `color` must be `#RGB`, `#RRGGBB` or `#RRGGBBAA`; `offset` in `0..=100`.
    pub fn new(color: impl Into<String>, offset: u8) -> Result<Self> {
        let color = color.into();
        if !is_hex_color(&color) {
            return Err(PipelineError::Configuration(format!(
                "gradient stop colour {color:?} is not #RGB, #RRGGBB or #RRGGBBAA"
            )));
        }
        if offset > 100 {
            return Err(PipelineError::Configuration(format!(
                "gradient stop offset must be in 0..=100, got {offset}"
            )));
        }
        Ok(Self { color, offset })
    }

    pub fn color(&self) -> &str {
        &self.color
    }

    pub fn offset(&self) -> u8 {
        self.offset
    }
}

fn is_hex_color(value: &str) -> bool {
    value
        .strip_prefix('#')
        .is_some_and(|hex| matches!(hex.len(), 3 | 6 | 8) && hex.chars().all(|c| c.is_ascii_hexdigit()))
}

/// Direction the gradient runs towards, from the opposite edge or corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    TopLeft,
    Top,
    TopRight,
    Left,
    Right,
    BottomLeft,
    Bottom,
    BottomRight,
    /// Start and end points, as percentages of the image.
    Custom { x1: u8, y1: u8, x2: u8, y2: u8 },
}

impl Direction {
    pub fn custom(x1: u8, y1: u8, x2: u8, y2: u8) -> Result<Self> {
        if [x1, y1, x2, y2].iter().any(|&v| v > 100) {
            return Err(PipelineError::Configuration(format!(
                "gradient coordinates must be in 0..=100, got ({x1}, {y1}, {x2}, {y2})"
            )));
        }
        Ok(Direction::Custom { x1, y1, x2, y2 })
    }

    /// `(x1, y1, x2, y2)` in percent.
    pub fn coordinates(self) -> (u8, u8, u8, u8) {
        match self {
            Direction::TopLeft => (0, 0, 100, 100),
            Direction::Top => (50, 0, 50, 100),
            Direction::TopRight => (100, 0, 0, 100),
            Direction::Left => (0, 50, 100, 50),
            Direction::Right => (100, 50, 0, 50),
            Direction::BottomLeft => (0, 100, 100, 0),
            Direction::Bottom => (50, 100, 50, 0),
            Direction::BottomRight => (100, 100, 0, 0),
            Direction::Custom { x1, y1, x2, y2 } => (x1, y1, x2, y2),
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name.to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "topleft" => Direction::TopLeft,
            "top" => Direction::Top,
            "topright" => Direction::TopRight,
            "left" => Direction::Left,
            "right" => Direction::Right,
            "bottomleft" => Direction::BottomLeft,
            "bottom" => Direction::Bottom,
            "bottomright" => Direction::BottomRight,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Gradient {
    id: String,
    direction: Direction,
    stops: Vec<GradientStop>,
}

impl Gradient {
    /// Stops are kept sorted by offset.
    pub fn new(id: impl Into<String>, direction: Direction, mut stops: Vec<GradientStop>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
            return Err(PipelineError::Configuration(format!(
                "gradient id {id:?} must be a non-empty identifier"
            )));
        }
        if stops.is_empty() {
            return Err(PipelineError::Configuration(format!(
                "gradient {id} has no colour stops"
            )));
        }
        stops.sort_by_key(GradientStop::offset);
        Ok(Self {
            id,
            direction,
            stops,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn stops(&self) -> &[GradientStop] {
        &self.stops
    }
}

/// SVG document of `width` x `height` pixels painting every gradient.
pub fn to_svg(gradients: &[Gradient], width: u32, height: u32) -> String {
    let mut svg = format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{width}px" height="{height}px"><defs>"#
    );
    for gradient in gradients {
        let (x1, y1, x2, y2) = gradient.direction.coordinates();
        let _ = write!(
            svg,
            r#"<linearGradient id="{}" x1="{x1}%" y1="{y1}%" x2="{x2}%" y2="{y2}%">"#,
            gradient.id
        );
        for stop in &gradient.stops {
            let _ = write!(
                svg,
                r#"<stop offset="{}%" stop-color="{}"/>"#,
                stop.offset, stop.color
            );
        }
        svg.push_str("</linearGradient>");
    }
    svg.push_str("</defs>");
    for gradient in gradients {
        let _ = write!(
            svg,
            r#"<rect x="0" y="0" width="{width}" height="{height}" fill="url(#{})"/>"#,
            gradient.id
        );
    }
    svg.push_str("</svg>");
    svg
}
