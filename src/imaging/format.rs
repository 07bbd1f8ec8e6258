//! Image formats understood by the pipeline.
//!
//! A format can be named explicitly (`"jpg"`, `"webp"`, ...), recovered from
//! the loader that decoded an image (`"gifload"`, `"jpegload_buffer"`), or
//! sniffed from the first bytes of an encoded buffer.

use super::error::PipelineError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Encoded image format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Jpeg,
    Png,
    Gif,
    Tiff,
    Webp,
    Pdf,
    Svg,
    Bmp,
}

impl ImageFormat {
    pub const ALL: [ImageFormat; 8] = [
        ImageFormat::Jpeg,
        ImageFormat::Png,
        ImageFormat::Gif,
        ImageFormat::Tiff,
        ImageFormat::Webp,
        ImageFormat::Pdf,
        ImageFormat::Svg,
        ImageFormat::Bmp,
    ];

    /// Canonical short name, also used as file extension.
    pub fn name(self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Png => "png",
            ImageFormat::Gif => "gif",
            ImageFormat::Tiff => "tiff",
            ImageFormat::Webp => "webp",
            ImageFormat::Pdf => "pdf",
            ImageFormat::Svg => "svg",
            ImageFormat::Bmp => "bmp",
        }
    }

    /// Name of the loader that produces images of this format.
    pub fn loader(self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "jpegload",
            ImageFormat::Png => "pngload",
            ImageFormat::Gif => "gifload",
            ImageFormat::Tiff => "tiffload",
            ImageFormat::Webp => "webpload",
            ImageFormat::Pdf => "pdfload",
            ImageFormat::Svg => "svgload",
            ImageFormat::Bmp => "bmpload",
        }
    }

    /// Parse a format name (case-insensitive, `jpeg` accepted for `jpg`).
    pub fn from_name(name: &str) -> Result<Self, PipelineError> {
        let lower = name.trim().trim_start_matches('.').to_ascii_lowercase();
        match lower.as_str() {
            "jpeg" => Ok(ImageFormat::Jpeg),
            "tif" => Ok(ImageFormat::Tiff),
            other => Self::ALL
                .into_iter()
                .find(|f| f.name() == other)
                .ok_or_else(|| {
                    PipelineError::Format(format!("image format {name} is not supported"))
                }),
        }
    }

    /// Parse a loader name.
    ///
    /// Loaders come in two flavours, from file (`jpegload`) and from buffer
    /// (`jpegload_buffer`); only the part before the first `_` matters.
    pub fn from_loader(loader: &str) -> Result<Self, PipelineError> {
        let lower = loader.to_ascii_lowercase();
        let prefix = lower.split('_').next().unwrap_or_default();
        Self::ALL
            .into_iter()
            .find(|f| f.loader() == prefix)
            .ok_or_else(|| PipelineError::Format(format!("image loader {loader} is not supported")))
    }

    /// Infer a format from a file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(|e| Self::from_name(e).ok())
    }

    /// Whether the encoder accepts a lossy quality setting.
    ///
    /// GIF and BMP writers have no quality knob, and the PNG and WebP
    /// writers are lossless only, so quality is omitted for them.
    pub fn supports_quality(self) -> bool {
        self == ImageFormat::Jpeg
    }

    /// Whether images of this format may carry several frames.
    pub fn is_animated(self) -> bool {
        self == ImageFormat::Gif
    }

    /// Guess the format of an encoded buffer from its magic bytes.
    pub fn sniff(data: &[u8]) -> Option<Self> {
        if data.starts_with(b"%PDF") {
            return Some(ImageFormat::Pdf);
        }
        if looks_like_svg(data) {
            return Some(ImageFormat::Svg);
        }
        match image::guess_format(data).ok()? {
            image::ImageFormat::Jpeg => Some(ImageFormat::Jpeg),
            image::ImageFormat::Png => Some(ImageFormat::Png),
            image::ImageFormat::Gif => Some(ImageFormat::Gif),
            image::ImageFormat::Tiff => Some(ImageFormat::Tiff),
            image::ImageFormat::WebP => Some(ImageFormat::Webp),
            image::ImageFormat::Bmp => Some(ImageFormat::Bmp),
            _ => None,
        }
    }

    /// The `image` crate codec for raster formats.
    pub(crate) fn codec(self) -> Option<image::ImageFormat> {
        match self {
            ImageFormat::Jpeg => Some(image::ImageFormat::Jpeg),
            ImageFormat::Png => Some(image::ImageFormat::Png),
            ImageFormat::Gif => Some(image::ImageFormat::Gif),
            ImageFormat::Tiff => Some(image::ImageFormat::Tiff),
            ImageFormat::Webp => Some(image::ImageFormat::WebP),
            ImageFormat::Bmp => Some(image::ImageFormat::Bmp),
            ImageFormat::Pdf | ImageFormat::Svg => None,
        }
    }
}

fn looks_like_svg(data: &[u8]) -> bool {
    let head = &data[..data.len().min(512)];
    // a multibyte character may straddle the cut
    let text = std::str::from_utf8(head)
        .unwrap_or_else(|e| std::str::from_utf8(&head[..e.valid_up_to()]).unwrap_or_default());
    let text = text.trim_start_matches('\u{feff}').trim_start();
    text.starts_with("<svg") || (text.starts_with("<?xml") && text.contains("<svg"))
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ImageFormat {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_name_accepts_aliases_and_case() {
        assert_eq!(ImageFormat::from_name("JPEG").unwrap(), ImageFormat::Jpeg);
        assert_eq!(ImageFormat::from_name("jpg").unwrap(), ImageFormat::Jpeg);
        assert_eq!(ImageFormat::from_name(".png").unwrap(), ImageFormat::Png);
        assert_eq!(ImageFormat::from_name("WebP").unwrap(), ImageFormat::Webp);
        assert_eq!(ImageFormat::from_name("bmp").unwrap(), ImageFormat::Bmp);
    }

    #[test]
    fn from_name_rejects_unknown() {
        assert!(matches!(
            ImageFormat::from_name("heic"),
            Err(PipelineError::Format(_))
        ));
    }

    #[test]
    fn from_loader_strips_buffer_suffix() {
        assert_eq!(
            ImageFormat::from_loader("jpegload_buffer").unwrap(),
            ImageFormat::Jpeg
        );
        assert_eq!(ImageFormat::from_loader("gifload").unwrap(), ImageFormat::Gif);
        assert_eq!(
            ImageFormat::from_loader("svgload_string").unwrap(),
            ImageFormat::Svg
        );
        assert!(ImageFormat::from_loader("magickload").is_err());
    }

    #[test]
    fn quality_only_for_lossy_formats() {
        assert!(ImageFormat::Jpeg.supports_quality());
        assert!(!ImageFormat::Webp.supports_quality());
        assert!(!ImageFormat::Gif.supports_quality());
        assert!(!ImageFormat::Bmp.supports_quality());
        assert!(!ImageFormat::Png.supports_quality());
    }

    #[test]
    fn sniff_magic_bytes() {
        assert_eq!(ImageFormat::sniff(b"GIF89a\x01\x00"), Some(ImageFormat::Gif));
        assert_eq!(
            ImageFormat::sniff(b"\x89PNG\r\n\x1a\n\0\0"),
            Some(ImageFormat::Png)
        );
        assert_eq!(ImageFormat::sniff(b"%PDF-1.7"), Some(ImageFormat::Pdf));
        assert_eq!(
            ImageFormat::sniff(b"  <?xml version=\"1.0\"?>\n<svg xmlns=\"\"/>"),
            Some(ImageFormat::Svg)
        );
        assert_eq!(ImageFormat::sniff(b"hello"), None);
    }

    #[test]
    fn sniff_svg_with_character_split_at_cut() {
        let mut doc = String::from(
            "<?xml version=\"1.0\"?>\n<svg xmlns=\"http://www.w3.org/2000/svg\"><!-- ",
        );
        while doc.len() < 511 {
            doc.push('a');
        }
        doc.push_str("é -->\n</svg>");
        assert!(std::str::from_utf8(&doc.as_bytes()[..512]).is_err());
        assert_eq!(ImageFormat::sniff(doc.as_bytes()), Some(ImageFormat::Svg));
    }

    #[test]
    fn from_path_uses_extension() {
        assert_eq!(
            ImageFormat::from_path(Path::new("/out/thumb.JPEG")),
            Some(ImageFormat::Jpeg)
        );
        assert_eq!(ImageFormat::from_path(Path::new("/out/noext")), None);
    }
}
