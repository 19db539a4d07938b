//! Process-wide view configuration
//!
//! Read once at start-up and then shared read-only between requests.
//! Sources, strongest first: command line (or `THUMBVIEW_*` variables),
//! the JSON config file section named after the component, built-in
//! defaults.

use std::path::Path;

use serde::Deserialize;

use crate::{
    codec::ScaleFilter,
    primitive::anyhow::{self, Context},
};

/// Default component name; the config file section to read.
pub const COMPONENT: &str = "View::Thumbnail";

/// Defaults for every invocation of the thumbnail view.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ViewConfig {
    /// Largest input (bytes) we attempt to decode
    pub max_image_size: u64,
    /// Resampling algorithm
    pub scaling_qtype: ScaleFilter,
    /// JPEG quality when a request does not say
    pub jpeg_quality: u8,
    /// Largest input (pixels) we attempt to decode; `null` disables
    pub max_decode_pixels: Option<u64>,
    /// Largest request body accepted on upload
    pub max_body_bytes: usize,
    /// Whole-request deadline
    pub request_timeout_secs: u64,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            max_image_size: 15 * 1024 * 1024,
            scaling_qtype: ScaleFilter::Box,
            jpeg_quality: 100,
            max_decode_pixels: Some(50_000_000),
            max_body_bytes: 64 * 1024 * 1024,
            request_timeout_secs: 30,
        }
    }
}

impl ViewConfig {
    /// Read the section keyed by `component` out of a JSON document.
    ///
    /// A document without that section gives the defaults.
    pub fn from_json_section(text: &str, component: &str) -> anyhow::Result<Self> {
        let doc: serde_json::Value =
            serde_json::from_str(text).context("config is not valid JSON")?;
        match doc.get(component) {
            None => {
                tracing::debug!("No {component:?} section in config, using defaults");
                Ok(Self::default())
            }
            Some(section) => Self::deserialize(section)
                .with_context(|| format!("config section {component:?}")),
        }
    }

    /// Load from an optional file, then apply the overrides.
    pub fn load(
        file: Option<&Path>,
        component: &str,
        overrides: &ConfigOverrides,
    ) -> anyhow::Result<Self> {
        let base = match file {
            None => Self::default(),
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("reading config file {path:?}"))?;
                Self::from_json_section(&text, component)?
            }
        };
        Ok(overrides.apply(base))
    }
}

/// Command line settings. Anything left unset keeps the file/default value.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct ConfigOverrides {
    /// Largest input in bytes that will be decoded
    #[arg(long, env = "THUMBVIEW_MAX_IMAGE_SIZE")]
    pub max_image_size: Option<u64>,

    /// Resampling algorithm (box/mixing, nearest/preview, bilinear, hamming,
    /// catmullrom, mitchell, lanczos3/normal)
    #[arg(long, env = "THUMBVIEW_SCALING_QTYPE")]
    pub scaling_qtype: Option<ScaleFilter>,

    /// Default JPEG quality (0-100)
    #[arg(long, env = "THUMBVIEW_JPEG_QUALITY",
          value_parser = clap::value_parser!(u8).range(0..=100))]
    pub jpeg_quality: Option<u8>,

    /// Largest input in pixels that will be decoded
    #[arg(long, env = "THUMBVIEW_MAX_DECODE_PIXELS")]
    pub max_decode_pixels: Option<u64>,

    /// Largest upload body in bytes
    #[arg(long, env = "THUMBVIEW_MAX_BODY_BYTES")]
    pub max_body_bytes: Option<usize>,

    /// Request timeout in seconds
    #[arg(long, env = "THUMBVIEW_REQUEST_TIMEOUT_SECS")]
    pub request_timeout_secs: Option<u64>,
}

impl ConfigOverrides {
    /// Overlay the set fields onto `base`.
    pub fn apply(&self, base: ViewConfig) -> ViewConfig {
        ViewConfig {
            max_image_size: self.max_image_size.unwrap_or(base.max_image_size),
            scaling_qtype: self.scaling_qtype.unwrap_or(base.scaling_qtype),
            jpeg_quality: self.jpeg_quality.unwrap_or(base.jpeg_quality),
            max_decode_pixels: self.max_decode_pixels.or(base.max_decode_pixels),
            max_body_bytes: self.max_body_bytes.unwrap_or(base.max_body_bytes),
            request_timeout_secs: self
                .request_timeout_secs
                .unwrap_or(base.request_timeout_secs),
        }
    }
}
