//! Image types understood by the codec
//!
//! External strings (query parameters, sniffed formats) are converted
//! into [`ImageType`] once, at the edge. Nothing past that point deals
//! in bare type strings.

use std::{fmt::Display, str::FromStr};

/// A closed set of image encodings the codec is built with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageType {
    Jpeg,
    Png,
    Gif,
    WebP,
}

/// Every supported type, in the order they are listed to users.
pub const SUPPORTED: [ImageType; 4] =
    [ImageType::Jpeg, ImageType::Png, ImageType::Gif, ImageType::WebP];

/// Unknown image type name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown image type {name:?} (supported: {})", supported_list())]
pub struct UnknownType {
    pub name: String,
}

impl ImageType {
    /// Short canonical name, e.g. `jpeg`
    pub fn name(self) -> &'static str {
        match self {
            ImageType::Jpeg => "jpeg",
            ImageType::Png => "png",
            ImageType::Gif => "gif",
            ImageType::WebP => "webp",
        }
    }

    /// `image/` + [`name`](Self::name)
    pub fn mime(self) -> &'static str {
        match self {
            ImageType::Jpeg => "image/jpeg",
            ImageType::Png => "image/png",
            ImageType::Gif => "image/gif",
            ImageType::WebP => "image/webp",
        }
    }

    /// Whether the encoder takes a quality setting.
    pub fn is_jpeg_like(self) -> bool {
        matches!(self, ImageType::Jpeg)
    }

    /// Map from the codec library's format, if it is one of ours.
    pub fn from_image_format(format: image::ImageFormat) -> Option<Self> {
        match format {
            image::ImageFormat::Jpeg => Some(ImageType::Jpeg),
            image::ImageFormat::Png => Some(ImageType::Png),
            image::ImageFormat::Gif => Some(ImageType::Gif),
            image::ImageFormat::WebP => Some(ImageType::WebP),
            _ => None,
        }
    }

    /// Map to the codec library's format.
    pub fn image_format(self) -> image::ImageFormat {
        match self {
            ImageType::Jpeg => image::ImageFormat::Jpeg,
            ImageType::Png => image::ImageFormat::Png,
            ImageType::Gif => image::ImageFormat::Gif,
            ImageType::WebP => image::ImageFormat::WebP,
        }
    }
}

impl Display for ImageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Case-insensitive; accepts `jpg` for JPEG and an optional `image/` prefix.
impl FromStr for ImageType {
    type Err = UnknownType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let t = s.trim();
        let t = match t.get(..6) {
            Some(prefix) if prefix.eq_ignore_ascii_case("image/") => &t[6..],
            _ => t,
        };
        match t.to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" => Ok(ImageType::Jpeg),
            "png" => Ok(ImageType::Png),
            "gif" => Ok(ImageType::Gif),
            "webp" => Ok(ImageType::WebP),
            _ => Err(UnknownType { name: s.to_string() }),
        }
    }
}

/// Comma-separated list of supported type names, for diagnostics.
pub fn supported_list() -> String {
    SUPPORTED
        .iter()
        .map(|t| t.name())
        .collect::<Vec<_>>()
        .join(", ")
}
