//! The thumbnail pipeline
//!
//! One invocation: probe the header, decide whether anything needs to
//! happen, and if so decode, crop to a centered square, scale the
//! longest side down, and encode.
//!
//! When nothing needs to happen the input bytes come back untouched
//! (no decode, no recompression). Every invocation is independent; the
//! only shared input is the read-only [`ViewConfig`].

use bytes::Bytes;

use crate::{
    codec::{CodecV1, ScaleFilter},
    config::ViewConfig,
    format::{supported_list, ImageType},
    primitive::{anyhow, tracing::instrument},
};

/// Per-invocation options. Anything unset falls back to [`ViewConfig`]
/// or to "leave it alone".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThumbnailOptions {
    /// Desired length of the longest side, in pixels (positive)
    pub target_size: Option<u32>,
    /// Crop to a centered square first
    pub square: bool,
    /// Encode as this type (default: the input's type)
    pub output_type: Option<ImageType>,
    /// Decode and re-encode even if nothing else asks for it
    pub force: bool,
    /// Overrides [`ViewConfig::jpeg_quality`]
    pub jpeg_quality: Option<u8>,
    /// Overrides [`ViewConfig::max_image_size`]
    pub max_decode_bytes: Option<u64>,
    /// Overrides [`ViewConfig::scaling_qtype`]
    pub scaling_qtype: Option<ScaleFilter>,
}

/// Pipeline failure. Terminal for the invocation.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// No image bytes in the request
    #[error("no image in the request")]
    MissingInput,
    /// The type could not be derived, or is not one we handle
    #[error("unsupported image format: {0} (supported: {list})", list = supported_list())]
    UnsupportedFormat(String),
    /// Decoding was attempted (or refused by a limit) and failed
    #[error("decode failed: {0:#}")]
    DecodeFailed(anyhow::Error),
    /// Encoding the final image failed
    #[error("encode failed: {0:#}")]
    EncodeFailed(anyhow::Error),
}

/// Successful pipeline outcome.
#[derive(Debug)]
pub enum Thumbnail<I> {
    /// The input, byte-for-byte
    Unchanged { bytes: Bytes, mime: &'static str },
    /// Freshly encoded bytes plus the decoded image they came from
    Transformed {
        bytes: Bytes,
        mime: &'static str,
        image: I,
    },
}

impl<I> Thumbnail<I> {
    /// `image/<type>` of [`bytes`](Self::bytes)
    pub fn mime(&self) -> &'static str {
        match self {
            Thumbnail::Unchanged { mime, .. } | Thumbnail::Transformed { mime, .. } => {
                mime
            }
        }
    }

    /// The response payload
    pub fn bytes(&self) -> &Bytes {
        match self {
            Thumbnail::Unchanged { bytes, .. } | Thumbnail::Transformed { bytes, .. } => {
                bytes
            }
        }
    }

    /// Decide if the image went through the codec.
    pub fn is_transformed(&self) -> bool {
        matches!(self, Thumbnail::Transformed { .. })
    }
}

/// Why a transform is needed. Any one field being true is enough.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Decision {
    /// `target_size` is below the longest side
    pub scale: bool,
    /// `square` was asked for and the sides differ
    pub crop: bool,
    /// `output_type` differs from the input type
    pub transcode: bool,
    /// `force` was asked for
    pub force: bool,
}

impl Decision {
    /// Whether to decode at all
    pub fn should_transform(&self) -> bool {
        self.scale || self.crop || self.transcode || self.force
    }
}

/// Decide from header metadata alone. Unknown dimensions can never
/// trigger scaling or cropping.
pub fn decide(
    kind: ImageType,
    dimensions: Option<(u32, u32)>,
    options: &ThumbnailOptions,
) -> Decision {
    Decision {
        scale: match (options.target_size, dimensions) {
            (Some(target), Some((w, h))) => target < w.max(h),
            _ => false,
        },
        crop: options.square && matches!(dimensions, Some((w, h)) if w != h),
        transcode: options.output_type.map_or(false, |out| out != kind),
        force: options.force,
    }
}

/// Dimensions after fitting the longest side of `width` x `height` to
/// `target`, keeping the aspect ratio. The shorter side is rounded and
/// never below 1.
pub fn fit_longest(width: u32, height: u32, target: u32) -> (u32, u32) {
    let scaled = |short: u32, long: u32| -> u32 {
        let (short, long, target) = (short as u64, long as u64, target as u64);
        ((short * target + long / 2) / long).max(1) as u32
    };
    if width >= height {
        (target, scaled(height, width))
    } else {
        (scaled(width, height), target)
    }
}

/// Run one invocation.
#[instrument(skip(codec, input, config), fields(len = input.len()))]
pub fn run<C: CodecV1>(
    codec: C,
    input: Bytes,
    options: &ThumbnailOptions,
    config: &ViewConfig,
) -> Result<Thumbnail<C::Image>, PipelineError> {
    // Metadata
    let probe = codec.probe(&input);
    let Some(kind) = probe.kind else {
        return Err(PipelineError::UnsupportedFormat(
            "cannot derive the type of the image data".to_string(),
        ));
    };
    tracing::debug!("Probed {kind}, dimensions {:?}", probe.dimensions);

    // Decision
    let decision = decide(kind, probe.dimensions, options);
    if !decision.should_transform() {
        tracing::debug!("Nothing to do, passing {kind} through");
        return Ok(Thumbnail::Unchanged {
            bytes: input,
            mime: kind.mime(),
        });
    }
    tracing::debug!("Transform: {decision:?}");

    let out = options.output_type.unwrap_or(kind);
    if !codec.can_encode(out) {
        return Err(PipelineError::EncodeFailed(anyhow::anyhow!(
            "no encoder available for {out}"
        )));
    }

    // Decode
    let max_bytes = options.max_decode_bytes.unwrap_or(config.max_image_size);
    if input.len() as u64 > max_bytes {
        return Err(PipelineError::DecodeFailed(anyhow::anyhow!(
            "image is {} bytes, over the {max_bytes} byte limit",
            input.len()
        )));
    }
    if let (Some(max_pixels), Some((w, h))) = (config.max_decode_pixels, probe.dimensions) {
        if w as u64 * h as u64 > max_pixels {
            return Err(PipelineError::DecodeFailed(anyhow::anyhow!(
                "image is {w}x{h}, over the {max_pixels} pixel limit"
            )));
        }
    }
    let mut image = codec
        .decode(&input, kind, config.max_decode_pixels)
        .map_err(PipelineError::DecodeFailed)?;
    // Authoritative from here on; the header may have disagreed.
    let (mut width, mut height) = codec.dimensions(&image);
    tracing::debug!("Decoded {width}x{height}");

    // Crop
    if options.square && width != height {
        let side = width.min(height);
        let (x, y) = ((width - side) / 2, (height - side) / 2);
        image = codec.crop(image, x, y, side, side);
        (width, height) = (side, side);
        tracing::debug!("Cropped to {side}x{side} at ({x}, {y})");
    }

    // Scale
    if let Some(target) = options.target_size {
        if target < width.max(height) {
            let filter = options.scaling_qtype.unwrap_or(config.scaling_qtype);
            let (w, h) = fit_longest(width, height, target);
            image = codec.scale(image, w, h, filter);
            tracing::debug!("Scaled {width}x{height} to {w}x{h} ({filter})");
        }
    }

    // Encode
    let quality = options.jpeg_quality.unwrap_or(config.jpeg_quality);
    let bytes = codec
        .encode(&image, out, quality)
        .map_err(PipelineError::EncodeFailed)?;
    tracing::debug!("Encoded {out}, {} bytes", bytes.len());

    Ok(Thumbnail::Transformed {
        bytes: Bytes::from(bytes),
        mime: out.mime(),
        image,
    })
}
