//! Pure Rust image processing backend.
//!
//! Everything is statically linked into the binary.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, TIFF, WebP, BMP) | `image` crate (pure Rust decoders) |
//! | Decode (GIF, all frames) | `GifDecoder` + `AnimationDecoder::into_frames`, stacked vertically |
//! | Decode (SVG) | `usvg` parse + `resvg` render into a `tiny_skia` pixmap |
//! | Thumbnail | `resize_exact` with `Lanczos3`; cover mode fills then centre-crops |
//! | Scale | `resize_exact` with `Triangle` (linear) |
//! | Composite / embed / join | `imageops::overlay` / `imageops::replace` |
//! | Text | SVG `<text>` laid out by `usvg` with system fonts, fitted to the box |
//! | Blur | `DynamicImage::blur` |
//! | Black canvas | zeroed `RgbImage` |
//! | Encode | `image` encoders; animated GIF via `GifEncoder` with infinite repeat; WebP lossless |
//!
//! PDF input and PDF/SVG output are not available. The `image` encoders
//! never copy input metadata, so output is always stripped.

use super::backend::{BackendError, Decoded, ImageBackend, ImageSource};
use super::calculations::{centre_offset, fill_dimensions, thumbnail_dimensions};
use super::format::ImageFormat;
use super::handle::ImageMeta;
use super::params::{CropParams, EncodeOptions, TextMarkup, ThumbnailParams};
use image::codecs::gif::{GifDecoder, GifEncoder, Repeat};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::webp::WebPEncoder;
use image::imageops::{self, FilterType};
use image::{AnimationDecoder, Delay, DynamicImage, Frame, RgbImage, RgbaImage};
use std::borrow::Cow;
use std::fs;
use std::io::{BufWriter, Cursor, Seek, Write};
use std::path::Path;
use std::sync::{Arc, OnceLock};
use tracing::{debug, trace};

/// Font size the text is laid out at before it is scaled to the box.
const TEXT_LAYOUT_SIZE: f32 = 64.0;

/// Delay written for pages without timing information.
const FALLBACK_DELAY_MS: u32 = 100;

/// Pure Rust backend using the `image` crate ecosystem.
///
/// See the [module docs](self) for the crate-to-operation mapping.
pub struct RustBackend {
    fonts: OnceLock<Arc<usvg::fontdb::Database>>,
}

impl RustBackend {
    pub fn new() -> Self {
        Self {
            fonts: OnceLock::new(),
        }
    }

    /// System fonts, loaded on first use.
    fn fonts(&self) -> Arc<usvg::fontdb::Database> {
        Arc::clone(self.fonts.get_or_init(|| {
            let mut db = usvg::fontdb::Database::new();
            db.load_system_fonts();
            debug!(faces = db.len(), "loaded system fonts");
            Arc::new(db)
        }))
    }

    fn svg_options(&self) -> usvg::Options<'static> {
        usvg::Options {
            fontdb: self.fonts(),
            ..Default::default()
        }
    }

    fn rasterize_svg(&self, data: &[u8]) -> Result<DynamicImage, BackendError> {
        let tree = usvg::Tree::from_data(data, &self.svg_options())
            .map_err(|e| BackendError::Decode(format!("SVG parse failed: {e}")))?;
        let size = tree.size();
        let width = (size.width().ceil() as u32).max(1);
        let height = (size.height().ceil() as u32).max(1);
        let mut pixmap = new_pixmap(width, height)?;
        resvg::render(&tree, resvg::tiny_skia::Transform::default(), &mut pixmap.as_mut());
        pixmap_to_image(&pixmap)
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn read_source<'a>(source: ImageSource<'a>) -> Result<Cow<'a, [u8]>, BackendError> {
    match source {
        ImageSource::Bytes(data) => Ok(Cow::Borrowed(data)),
        ImageSource::File(path) => Ok(Cow::Owned(fs::read(path)?)),
    }
}

fn decode_err(e: image::ImageError) -> BackendError {
    BackendError::Decode(e.to_string())
}

fn encode_err(e: image::ImageError) -> BackendError {
    BackendError::ProcessingFailed(format!("encode failed: {e}"))
}

fn new_pixmap(width: u32, height: u32) -> Result<resvg::tiny_skia::Pixmap, BackendError> {
    resvg::tiny_skia::Pixmap::new(width, height).ok_or_else(|| {
        BackendError::ProcessingFailed(format!("cannot allocate {width}x{height} pixmap"))
    })
}

/// Copy a premultiplied pixmap into a straight-alpha RGBA image.
fn pixmap_to_image(pixmap: &resvg::tiny_skia::Pixmap) -> Result<DynamicImage, BackendError> {
    let mut rgba = Vec::with_capacity(pixmap.data().len());
    for pixel in pixmap.pixels() {
        let c = pixel.demultiply();
        rgba.extend_from_slice(&[c.red(), c.green(), c.blue(), c.alpha()]);
    }
    RgbaImage::from_raw(pixmap.width(), pixmap.height(), rgba)
        .map(DynamicImage::ImageRgba8)
        .ok_or_else(|| BackendError::ProcessingFailed("pixmap size mismatch".into()))
}

/// Decode every GIF frame and stack the frames top to bottom.
fn decode_gif_frames(data: &[u8]) -> Result<Decoded, BackendError> {
    let decoder = GifDecoder::new(Cursor::new(data)).map_err(decode_err)?;
    let frames = decoder.into_frames().collect_frames().map_err(decode_err)?;
    let first = frames
        .first()
        .ok_or_else(|| BackendError::Decode("GIF has no frames".into()))?;
    let (width, page_height) = first.buffer().dimensions();
    let total_height = page_height
        .checked_mul(frames.len() as u32)
        .ok_or_else(|| BackendError::ProcessingFailed("stacked GIF is too tall".into()))?;

    let mut stacked = RgbaImage::new(width, total_height);
    let mut delays_ms = Vec::with_capacity(frames.len());
    for (index, frame) in frames.iter().enumerate() {
        imageops::replace(&mut stacked, frame.buffer(), 0, index as i64 * page_height as i64);
        let (numer, denom) = frame.delay().numer_denom_ms();
        delays_ms.push(if denom == 0 { FALLBACK_DELAY_MS } else { numer / denom });
    }
    trace!(frames = frames.len(), width, page_height, "decoded GIF frames");
    Ok(Decoded {
        image: DynamicImage::ImageRgba8(stacked),
        meta: ImageMeta::stacked(Some(ImageFormat::Gif), page_height, delays_ms),
    })
}

/// Drop to the pixel layouts every writer accepts.
fn normalized(image: &DynamicImage) -> DynamicImage {
    if image.color().has_alpha() {
        DynamicImage::ImageRgba8(image.to_rgba8())
    } else {
        DynamicImage::ImageRgb8(image.to_rgb8())
    }
}

fn encode_animation<W: Write>(writer: W, image: &DynamicImage, meta: &ImageMeta) -> Result<(), BackendError> {
    let page_height = meta.page_height.unwrap_or(image.height()).max(1);
    let rgba = image.to_rgba8();
    let mut encoder = GifEncoder::new_with_speed(writer, 10);
    encoder.set_repeat(Repeat::Infinite).map_err(encode_err)?;
    for (index, top) in (0..image.height()).step_by(page_height as usize).enumerate() {
        let rows = page_height.min(image.height() - top);
        let page = imageops::crop_imm(&rgba, 0, top, image.width(), rows).to_image();
        let delay = meta.delays_ms.get(index).copied().unwrap_or(FALLBACK_DELAY_MS);
        encoder
            .encode_frame(Frame::from_parts(page, 0, 0, Delay::from_numer_denom_ms(delay, 1)))
            .map_err(encode_err)?;
    }
    Ok(())
}

fn write_image<W: Write + Seek>(
    mut writer: W,
    image: &DynamicImage,
    meta: &ImageMeta,
    format: ImageFormat,
    quality: Option<u8>,
) -> Result<(), BackendError> {
    match format {
        ImageFormat::Pdf | ImageFormat::Svg => Err(BackendError::Unsupported(format!(
            "{format} output is not supported"
        ))),
        ImageFormat::Jpeg => {
            let encoder = JpegEncoder::new_with_quality(writer, quality.unwrap_or(75));
            DynamicImage::ImageRgb8(image.to_rgb8())
                .write_with_encoder(encoder)
                .map_err(encode_err)
        }
        ImageFormat::Gif if meta.pages > 1 => encode_animation(writer, image, meta),
        ImageFormat::Webp => {
            // lossless only, so no quality reaches this arm
            normalized(image)
                .write_with_encoder(WebPEncoder::new_lossless(writer))
                .map_err(encode_err)
        }
        other => {
            let codec = other
                .codec()
                .ok_or_else(|| BackendError::Unsupported(format!("{other} output is not supported")))?;
            normalized(image).write_to(&mut writer, codec).map_err(encode_err)
        }
    }
}

/// Escape text for use inside XML content and attribute values.
///
/// Covers the five predefined XML entities (`&`, `<`, `>`, `"`, `'`); every
/// other character is valid as is in the UTF-8 markup handed to usvg.
fn xml_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

fn text_svg(markup: &TextMarkup, font_family: &str) -> String {
    let line_height = TEXT_LAYOUT_SIZE * 1.25;
    let canvas_width = (markup.content.chars().count().max(1) as f32 * TEXT_LAYOUT_SIZE).ceil();
    format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{canvas_width}" height="{line_height}"><text x="0" y="{TEXT_LAYOUT_SIZE}" font-family="{}, sans-serif" font-size="{TEXT_LAYOUT_SIZE}" fill="{}">{}</text></svg>"#,
        xml_escape(font_family),
        xml_escape(&markup.color),
        xml_escape(&markup.content),
    )
}

impl ImageBackend for RustBackend {
    fn decode(&self, source: ImageSource<'_>, all_frames: bool) -> Result<Decoded, BackendError> {
        let data = read_source(source)?;
        let format = ImageFormat::sniff(&data)
            .ok_or_else(|| BackendError::Decode("unrecognised image data".into()))?;
        match format {
            ImageFormat::Pdf => Err(BackendError::Unsupported("PDF input is not supported".into())),
            ImageFormat::Svg => Ok(Decoded {
                image: self.rasterize_svg(&data)?,
                meta: ImageMeta::single(Some(ImageFormat::Svg)),
            }),
            ImageFormat::Gif if all_frames => decode_gif_frames(&data),
            other => {
                let codec = other
                    .codec()
                    .ok_or_else(|| BackendError::Unsupported(format!("{other} input is not supported")))?;
                let image = image::load_from_memory_with_format(&data, codec).map_err(decode_err)?;
                Ok(Decoded {
                    image,
                    meta: ImageMeta::single(Some(other)),
                })
            }
        }
    }

    fn thumbnail_source(
        &self,
        source: ImageSource<'_>,
        params: &ThumbnailParams,
    ) -> Result<Decoded, BackendError> {
        let decoded = self.decode(source, false)?;
        Ok(Decoded {
            image: self.thumbnail(&decoded.image, params)?,
            meta: decoded.meta,
        })
    }

    fn thumbnail(
        &self,
        image: &DynamicImage,
        params: &ThumbnailParams,
    ) -> Result<DynamicImage, BackendError> {
        let source = (image.width(), image.height());
        let (width, height) = thumbnail_dimensions(source, params).ok_or_else(|| {
            BackendError::ProcessingFailed(format!(
                "cannot thumbnail {}x{} to {}x{}",
                source.0, source.1, params.width, params.height
            ))
        })?;
        if (width, height) == source {
            return Ok(image.clone());
        }
        let cover = params.crop && !params.force && params.width > 0 && params.height > 0;
        if cover {
            let filled_size = fill_dimensions(source, (width, height));
            let filled = image.resize_exact(filled_size.0, filled_size.1, FilterType::Lanczos3);
            let (x, y) = centre_offset(filled_size, (width, height));
            Ok(filled.crop_imm(x, y, width, height))
        } else {
            Ok(image.resize_exact(width, height, FilterType::Lanczos3))
        }
    }

    fn resize(
        &self,
        image: &DynamicImage,
        h_scale: f64,
        v_scale: f64,
    ) -> Result<DynamicImage, BackendError> {
        if !(h_scale > 0.0 && v_scale > 0.0) {
            return Err(BackendError::ProcessingFailed(format!(
                "invalid scale {h_scale}x{v_scale}"
            )));
        }
        let width = ((image.width() as f64 * h_scale).round() as u32).max(1);
        let height = ((image.height() as f64 * v_scale).round() as u32).max(1);
        Ok(image.resize_exact(width, height, FilterType::Triangle))
    }

    fn crop(&self, image: &DynamicImage, region: &CropParams) -> Result<DynamicImage, BackendError> {
        if !region.fits_in(image.width(), image.height()) {
            return Err(BackendError::ProcessingFailed(format!(
                "crop {}x{}+{}+{} outside {}x{} image",
                region.width,
                region.height,
                region.left,
                region.top,
                image.width(),
                image.height()
            )));
        }
        Ok(image.crop_imm(region.left, region.top, region.width, region.height))
    }

    fn composite_over(
        &self,
        base: &DynamicImage,
        overlay: &DynamicImage,
        x: i64,
        y: i64,
    ) -> Result<DynamicImage, BackendError> {
        let mut canvas = base.to_rgba8();
        imageops::overlay(&mut canvas, &overlay.to_rgba8(), x, y);
        Ok(DynamicImage::ImageRgba8(canvas))
    }

    fn render_text(
        &self,
        markup: &TextMarkup,
        font_family: &str,
        width: u32,
        height: Option<u32>,
    ) -> Result<DynamicImage, BackendError> {
        let svg = text_svg(markup, font_family);
        let tree = usvg::Tree::from_str(&svg, &self.svg_options())
            .map_err(|e| BackendError::ProcessingFailed(format!("text layout failed: {e}")))?;
        let bbox = tree.root().abs_bounding_box();
        if !tree.root().has_children() || bbox.width() <= 0.0 || bbox.height() <= 0.0 {
            return Err(BackendError::ProcessingFailed(format!(
                "no font could render {:?} in family {font_family:?}",
                markup.content
            )));
        }

        let mut scale = width as f32 / bbox.width();
        if let Some(h) = height {
            scale = scale.min(h as f32 / bbox.height());
        }
        let out_w = ((bbox.width() * scale).ceil() as u32).clamp(1, width.max(1));
        let out_h = ((bbox.height() * scale).ceil() as u32).clamp(1, height.unwrap_or(u32::MAX));

        let mut pixmap = new_pixmap(out_w, out_h)?;
        let transform = resvg::tiny_skia::Transform::from_scale(scale, scale)
            .pre_translate(-bbox.x(), -bbox.y());
        resvg::render(&tree, transform, &mut pixmap.as_mut());
        pixmap_to_image(&pixmap)
    }

    fn gaussian_blur(&self, image: &DynamicImage, sigma: f32) -> Result<DynamicImage, BackendError> {
        Ok(image.blur(sigma))
    }

    fn embed(
        &self,
        image: &DynamicImage,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    ) -> Result<DynamicImage, BackendError> {
        let mut canvas = RgbaImage::new(width, height);
        imageops::replace(&mut canvas, &image.to_rgba8(), x as i64, y as i64);
        Ok(DynamicImage::ImageRgba8(canvas))
    }

    fn join_vertical(&self, frames: &[&DynamicImage]) -> Result<DynamicImage, BackendError> {
        let first = frames
            .first()
            .ok_or_else(|| BackendError::ProcessingFailed("no frames to join".into()))?;
        let width = first.width();
        if frames.iter().any(|f| f.width() != width) {
            return Err(BackendError::ProcessingFailed(
                "frames to join differ in width".into(),
            ));
        }
        let height = frames
            .iter()
            .try_fold(0u32, |acc, f| acc.checked_add(f.height()))
            .ok_or_else(|| BackendError::ProcessingFailed("joined image is too tall".into()))?;

        let mut canvas = RgbaImage::new(width, height);
        let mut top = 0i64;
        for frame in frames {
            imageops::replace(&mut canvas, &frame.to_rgba8(), 0, top);
            top += frame.height() as i64;
        }
        Ok(DynamicImage::ImageRgba8(canvas))
    }

    fn encode(
        &self,
        image: &DynamicImage,
        meta: &ImageMeta,
        options: &EncodeOptions,
    ) -> Result<Vec<u8>, BackendError> {
        let mut out = Cursor::new(Vec::new());
        write_image(&mut out, image, meta, options.format, options.quality)?;
        Ok(out.into_inner())
    }

    fn encode_file(
        &self,
        image: &DynamicImage,
        meta: &ImageMeta,
        path: &Path,
        options: &EncodeOptions,
    ) -> Result<(), BackendError> {
        let file = fs::File::create(path)?;
        let mut writer = BufWriter::new(file);
        write_image(&mut writer, image, meta, options.format, options.quality)?;
        writer.flush()?;
        Ok(())
    }

    fn black(&self, width: u32, height: u32) -> Result<DynamicImage, BackendError> {
        if width == 0 || height == 0 {
            return Err(BackendError::ProcessingFailed(format!(
                "empty canvas {width}x{height}"
            )));
        }
        Ok(DynamicImage::ImageRgb8(RgbImage::new(width, height)))
    }
}
