//! Pure calculation functions for image dimensions.
//!
//! All functions here are pure and testable without any I/O or images.

use super::params::ThumbnailParams;

/// Calculate the output size of a thumbnail request.
///
/// A zero target on one axis leaves that axis unbounded: the image is scaled
/// to the other axis and keeps its aspect ratio. With both axes set the
/// image is fitted inside the box, unless `crop` (fill then centre crop) or
/// `force` (stretch) asks for the exact box.
///
/// Returns `None` when both axes are zero or the source is empty.
///
/// # Examples
/// ```
/// # use imgchain::imaging::{ThumbnailParams, thumbnail_dimensions};
/// // width only: 400x300 → 100x75
/// assert_eq!(thumbnail_dimensions((400, 300), &ThumbnailParams::new(100, 0)), Some((100, 75)));
///
/// // fit inside 100x100 box
/// assert_eq!(thumbnail_dimensions((400, 200), &ThumbnailParams::new(100, 100)), Some((100, 50)));
/// ```
pub fn thumbnail_dimensions(source: (u32, u32), params: &ThumbnailParams) -> Option<(u32, u32)> {
    let (src_w, src_h) = source;
    if src_w == 0 || src_h == 0 {
        return None;
    }
    let scaled = |value: u32, factor: f64| ((value as f64 * factor).round() as u32).max(1);

    match (params.width, params.height) {
        (0, 0) => None,
        (w, 0) => Some((w, scaled(src_h, w as f64 / src_w as f64))),
        (0, h) => Some((scaled(src_w, h as f64 / src_h as f64), h)),
        (w, h) if params.crop || params.force => Some((w, h)),
        (w, h) => {
            let factor = (w as f64 / src_w as f64).min(h as f64 / src_h as f64);
            Some((scaled(src_w, factor).min(w), scaled(src_h, factor).min(h)))
        }
    }
}

/// Calculate dimensions needed to fill a target area (resize before crop).
///
/// Returns dimensions that completely cover the target area while maintaining
/// the source aspect ratio. One dimension will match exactly, the other may exceed.
///
/// # Arguments
/// * `source` - Original image dimensions (width, height)
/// * `target` - Target area dimensions (width, height)
pub fn fill_dimensions(source: (u32, u32), target: (u32, u32)) -> (u32, u32) {
    let (src_w, src_h) = source;
    let (tgt_w, tgt_h) = target;

    let src_aspect = src_w as f64 / src_h as f64;
    let tgt_aspect = tgt_w as f64 / tgt_h as f64;

    if src_aspect > tgt_aspect {
        // Source is wider: height will match, width will exceed
        let h = tgt_h;
        let w = ((h as f64 * src_aspect).round() as u32).max(tgt_w);
        (w, h)
    } else {
        // Source is taller: width will match, height will exceed
        let w = tgt_w;
        let h = ((w as f64 / src_aspect).round() as u32).max(tgt_h);
        (w, h)
    }
}

/// Top-left offset that centres a `inner` box inside an `outer` box.
pub fn centre_offset(outer: (u32, u32), inner: (u32, u32)) -> (u32, u32) {
    (
        outer.0.saturating_sub(inner.0) / 2,
        outer.1.saturating_sub(inner.1) / 2,
    )
}
