//! Image codec
//!
//! This module specifies the image codec the thumbnail pipeline drives:
//! read the header, decode, crop, scale, encode. The pipeline only
//! orchestrates; every pixel operation lives behind [`CodecV1`].

use std::{fmt::Display, io::Cursor, str::FromStr};

use fast_image_resize as fr;
use image::{DynamicImage, GenericImageView, ImageBuffer, Rgba};

use crate::{
    format::ImageType,
    primitive::anyhow::{self, Context},
};

/// What the header says, without decoding any pixel data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Probe {
    /// Detected type, if it is one of ours
    pub kind: Option<ImageType>,
    /// (width, height), if the header could be read
    pub dimensions: Option<(u32, u32)>,
}

/// A named resampling strategy.
///
/// The pipeline passes this through to the codec untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize)]
#[serde(try_from = "String")]
pub enum ScaleFilter {
    /// Area averaging ("mixing")
    #[default]
    Box,
    /// Nearest neighbour ("preview")
    Nearest,
    Bilinear,
    Hamming,
    CatmullRom,
    Mitchell,
    /// Lanczos, a = 3 ("normal")
    Lanczos3,
}

/// Unknown resampling strategy name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown scaling algorithm {0:?}")]
pub struct UnknownFilter(pub String);

impl FromStr for ScaleFilter {
    type Err = UnknownFilter;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "box" | "mixing" => Ok(ScaleFilter::Box),
            "nearest" | "preview" => Ok(ScaleFilter::Nearest),
            "bilinear" | "triangle" => Ok(ScaleFilter::Bilinear),
            "hamming" => Ok(ScaleFilter::Hamming),
            "catmullrom" => Ok(ScaleFilter::CatmullRom),
            "mitchell" => Ok(ScaleFilter::Mitchell),
            "lanczos3" | "normal" => Ok(ScaleFilter::Lanczos3),
            _ => Err(UnknownFilter(s.to_string())),
        }
    }
}

impl TryFrom<String> for ScaleFilter {
    type Error = UnknownFilter;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl Display for ScaleFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ScaleFilter::Box => "box",
            ScaleFilter::Nearest => "nearest",
            ScaleFilter::Bilinear => "bilinear",
            ScaleFilter::Hamming => "hamming",
            ScaleFilter::CatmullRom => "catmullrom",
            ScaleFilter::Mitchell => "mitchell",
            ScaleFilter::Lanczos3 => "lanczos3",
        })
    }
}

impl ScaleFilter {
    fn resize_alg(self) -> fr::ResizeAlg {
        match self {
            ScaleFilter::Nearest => fr::ResizeAlg::Nearest,
            ScaleFilter::Box => fr::ResizeAlg::Convolution(fr::FilterType::Box),
            ScaleFilter::Bilinear => {
                fr::ResizeAlg::Convolution(fr::FilterType::Bilinear)
            }
            ScaleFilter::Hamming => {
                fr::ResizeAlg::Convolution(fr::FilterType::Hamming)
            }
            ScaleFilter::CatmullRom => {
                fr::ResizeAlg::Convolution(fr::FilterType::CatmullRom)
            }
            ScaleFilter::Mitchell => {
                fr::ResizeAlg::Convolution(fr::FilterType::Mitchell)
            }
            ScaleFilter::Lanczos3 => {
                fr::ResizeAlg::Convolution(fr::FilterType::Lanczos3)
            }
        }
    }

    /// Closest filter `image` itself offers (fallback path only).
    fn image_filter(self) -> image::imageops::FilterType {
        use image::imageops::FilterType;

        match self {
            ScaleFilter::Nearest => FilterType::Nearest,
            ScaleFilter::Box | ScaleFilter::Bilinear | ScaleFilter::Hamming => {
                FilterType::Triangle
            }
            ScaleFilter::CatmullRom | ScaleFilter::Mitchell => {
                FilterType::CatmullRom
            }
            ScaleFilter::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

/// A specification of an image codec.
///
/// Implementations are expected be zero-sized structs.
///
/// - Read type and dimensions from the header only.
/// - Decode with an explicit type (never re-guessed) under limits.
/// - Crop and scale a decoded image, consuming it.
/// - Encode a decoded image to a given type.
pub trait CodecV1: Copy + Send + Sync + 'static {
    /// Decoded image handle
    type Image: Send + 'static;

    /// Inspect the header. Never fails; unknown parts are `None`.
    fn probe(self, bytes: &[u8]) -> Probe;

    /// Decode `bytes`, which are encoded as `kind`.
    ///
    /// `max_pixels` bounds the decoder's allocation.
    fn decode(
        self,
        bytes: &[u8],
        kind: ImageType,
        max_pixels: Option<u64>,
    ) -> anyhow::Result<Self::Image>;

    /// (width, height) of a decoded image
    fn dimensions(self, image: &Self::Image) -> (u32, u32);

    /// Cut out a region. The region must lie inside the image.
    fn crop(
        self,
        image: Self::Image,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    ) -> Self::Image;

    /// Resample to exactly `width` x `height`.
    fn scale(
        self,
        image: Self::Image,
        width: u32,
        height: u32,
        filter: ScaleFilter,
    ) -> Self::Image;

    /// Decide if this codec can write `kind`.
    fn can_encode(self, kind: ImageType) -> bool;

    /// Encode. `jpeg_quality` is ignored unless `kind` is JPEG-like.
    fn encode(
        self,
        image: &Self::Image,
        kind: ImageType,
        jpeg_quality: u8,
    ) -> anyhow::Result<Vec<u8>>;
}

/// Codec implementation A: `image` for I/O, `fast_image_resize` for scaling.
#[derive(Debug, Clone, Copy)]
pub struct CodecImplA;

impl CodecV1 for CodecImplA {
    type Image = DynamicImage;

    fn probe(self, bytes: &[u8]) -> Probe {
        let format = image::guess_format(bytes).ok();
        let kind = format.and_then(ImageType::from_image_format);
        let dimensions = format.and_then(|format| {
            image::io::Reader::with_format(Cursor::new(bytes), format)
                .into_dimensions()
                .ok()
        });
        Probe { kind, dimensions }
    }

    fn decode(
        self,
        bytes: &[u8],
        kind: ImageType,
        max_pixels: Option<u64>,
    ) -> anyhow::Result<DynamicImage> {
        let mut reader =
            image::io::Reader::with_format(Cursor::new(bytes), kind.image_format());
        if let Some(pixels) = max_pixels {
            // Widest pixel we decode to is 16-bit RGBA.
            let mut limits = image::io::Limits::default();
            limits.max_alloc = Some(pixels.saturating_mul(8));
            reader.limits(limits);
        }
        reader
            .decode()
            .with_context(|| format!("cannot decode {kind} image"))
    }

    fn dimensions(self, image: &DynamicImage) -> (u32, u32) {
        image.dimensions()
    }

    fn crop(
        self,
        image: DynamicImage,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    ) -> DynamicImage {
        image.crop_imm(x, y, width, height)
    }

    fn scale(
        self,
        image: DynamicImage,
        width: u32,
        height: u32,
        filter: ScaleFilter,
    ) -> DynamicImage {
        match fast_scale(&image, width, height, filter) {
            Ok(scaled) => scaled,
            Err(e) => {
                tracing::warn!(
                    "fast_image_resize failed, falling back to image::resize_exact: {e:#}"
                );
                image.resize_exact(width, height, filter.image_filter())
            }
        }
    }

    fn can_encode(self, kind: ImageType) -> bool {
        // No WebP encoder in this build (decode only).
        !matches!(kind, ImageType::WebP)
    }

    fn encode(
        self,
        image: &DynamicImage,
        kind: ImageType,
        jpeg_quality: u8,
    ) -> anyhow::Result<Vec<u8>> {
        let mut cursor = Cursor::new(Vec::new());
        if kind.is_jpeg_like() {
            let rgb = image.to_rgb8();
            let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(
                &mut cursor,
                jpeg_quality.clamp(1, 100),
            );
            encoder
                .encode(
                    rgb.as_raw(),
                    rgb.width(),
                    rgb.height(),
                    image::ColorType::Rgb8,
                )
                .with_context(|| format!("cannot write {kind} image"))?;
            return Ok(cursor.into_inner());
        }

        // Quality-less formats
        let output = match kind {
            ImageType::Png => image::ImageOutputFormat::Png,
            ImageType::Gif => image::ImageOutputFormat::Gif,
            ImageType::Jpeg | ImageType::WebP => {
                return Err(anyhow::anyhow!("no encoder available for {kind}"))
            }
        };
        image
            .write_to(&mut cursor, output)
            .with_context(|| format!("cannot write {kind} image"))?;
        Ok(cursor.into_inner())
    }
}

/// Resample through an RGBA8 buffer with `fast_image_resize`.
fn fast_scale(
    image: &DynamicImage,
    width: u32,
    height: u32,
    filter: ScaleFilter,
) -> anyhow::Result<DynamicImage> {
    let src = image.to_rgba8();
    let (src_width, src_height) = src.dimensions();
    let src = fr::images::Image::from_vec_u8(
        src_width,
        src_height,
        src.into_raw(),
        fr::PixelType::U8x4,
    )
    .map_err(|e| anyhow::anyhow!("source buffer: {e}"))?;

    let mut dst = fr::images::Image::new(width, height, fr::PixelType::U8x4);
    let options = fr::ResizeOptions::new().resize_alg(filter.resize_alg());
    fr::Resizer::new()
        .resize(&src, &mut dst, Some(&options))
        .map_err(|e| anyhow::anyhow!("resize: {e}"))?;

    let rgba = ImageBuffer::<Rgba<u8>, Vec<u8>>::from_raw(width, height, dst.into_vec())
        .context("resized buffer has the wrong length")?;
    Ok(DynamicImage::ImageRgba8(rgba))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture;

    #[test]
    fn probe_reads_header_only() {
        let png = fixture::encoded(400, 200, ImageType::Png);
        let probe = CodecImplA.probe(&png);
        assert_eq!(probe.kind, Some(ImageType::Png));
        assert_eq!(probe.dimensions, Some((400, 200)));

        let jpeg = fixture::encoded(30, 70, ImageType::Jpeg);
        let probe = CodecImplA.probe(&jpeg);
        assert_eq!(probe.kind, Some(ImageType::Jpeg));
        assert_eq!(probe.dimensions, Some((30, 70)));
    }

    #[test]
    fn probe_garbage() {
        assert_eq!(CodecImplA.probe(b"definitely not an image"), Probe::default());
        assert_eq!(CodecImplA.probe(&[]), Probe::default());
    }

    #[test]
    fn probe_truncated_header_keeps_the_type() {
        let png = fixture::encoded(10, 10, ImageType::Png);
        let probe = CodecImplA.probe(&png[..12]);
        assert_eq!(probe.kind, Some(ImageType::Png));
        assert_eq!(probe.dimensions, None);
    }

    #[test]
    fn decode_uses_the_given_type() {
        let png = fixture::encoded(8, 4, ImageType::Png);
        let img = CodecImplA.decode(&png, ImageType::Png, None).unwrap();
        assert_eq!(CodecImplA.dimensions(&img), (8, 4));
        assert!(CodecImplA.decode(&png, ImageType::Gif, None).is_err());
    }

    #[test]
    fn decode_within_pixel_budget() {
        let png = fixture::encoded(64, 64, ImageType::Png);
        let img = CodecImplA.decode(&png, ImageType::Png, Some(1 << 20)).unwrap();
        assert_eq!(CodecImplA.dimensions(&img), (64, 64));
    }

    #[test]
    fn decode_over_pixel_budget_is_refused() {
        let png = fixture::encoded(64, 64, ImageType::Png);
        let e = CodecImplA.decode(&png, ImageType::Png, Some(10)).unwrap_err();
        assert!(format!("{e:#}").contains("cannot decode png image"), "{e:#}");
    }

    #[test]
    fn crop_and_scale() {
        let img = fixture::image(40, 20);
        let img = CodecImplA.crop(img, 10, 0, 20, 20);
        assert_eq!(CodecImplA.dimensions(&img), (20, 20));
        for filter in [ScaleFilter::Box, ScaleFilter::Nearest, ScaleFilter::Lanczos3] {
            let scaled = CodecImplA.scale(img.clone(), 7, 5, filter);
            assert_eq!(CodecImplA.dimensions(&scaled), (7, 5));
        }
    }

    #[test]
    fn encode_each_type() {
        let img = fixture::image(12, 9);
        for kind in [ImageType::Jpeg, ImageType::Png, ImageType::Gif] {
            assert!(CodecImplA.can_encode(kind));
            let bytes = CodecImplA.encode(&img, kind, 80).unwrap();
            let probe = CodecImplA.probe(&bytes);
            assert_eq!(probe.kind, Some(kind));
            assert_eq!(probe.dimensions, Some((12, 9)));
        }
    }

    #[test]
    fn webp_is_decode_only() {
        let img = fixture::image(4, 4);
        assert!(!CodecImplA.can_encode(ImageType::WebP));
        let e = CodecImplA.encode(&img, ImageType::WebP, 100).unwrap_err();
        assert!(e.to_string().contains("webp"));
    }

    #[test]
    fn jpeg_quality_changes_output() {
        let img = fixture::image(64, 64);
        let low = CodecImplA.encode(&img, ImageType::Jpeg, 10).unwrap();
        let high = CodecImplA.encode(&img, ImageType::Jpeg, 100).unwrap();
        assert!(low.len() < high.len());
        // 0 is clamped rather than rejected
        assert!(CodecImplA.encode(&img, ImageType::Jpeg, 0).is_ok());
    }

    #[test]
    fn quality_only_applies_to_jpeg_like() {
        let img = fixture::image(32, 32);
        for kind in crate::format::SUPPORTED {
            if kind.is_jpeg_like() || !CodecImplA.can_encode(kind) {
                continue;
            }
            let low = CodecImplA.encode(&img, kind, 1).unwrap();
            let high = CodecImplA.encode(&img, kind, 100).unwrap();
            assert_eq!(low, high, "{kind}");
        }
    }

    #[test]
    fn filter_names() {
        assert_eq!("mixing".parse(), Ok(ScaleFilter::Box));
        assert_eq!("BOX".parse(), Ok(ScaleFilter::Box));
        assert_eq!("preview".parse(), Ok(ScaleFilter::Nearest));
        assert_eq!("normal".parse(), Ok(ScaleFilter::Lanczos3));
        assert_eq!("triangle".parse(), Ok(ScaleFilter::Bilinear));
        assert!("sinc".parse::<ScaleFilter>().is_err());
        assert_eq!(ScaleFilter::default(), ScaleFilter::Box);
        for f in ["box", "nearest", "bilinear", "hamming", "catmullrom", "mitchell", "lanczos3"] {
            assert_eq!(f.parse::<ScaleFilter>().unwrap().to_string(), f);
        }
    }
}
