//! A codec that reads headers and panics for every other operation.

use crate::{
    codec::{CodecImplA, CodecV1, Probe, ScaleFilter},
    format::ImageType,
    primitive::anyhow,
};

/// Probes like [`CodecImplA`]; panics on decode, crop, scale, and encode.
///
/// Running the pipeline with this proves that a path never touches
/// pixel data.
#[derive(Debug, Clone, Copy)]
pub struct CodecPanic;

impl CodecV1 for CodecPanic {
    type Image = ();

    fn probe(self, bytes: &[u8]) -> Probe {
        CodecImplA.probe(bytes)
    }

    fn decode(
        self,
        _bytes: &[u8],
        _kind: ImageType,
        _max_pixels: Option<u64>,
    ) -> anyhow::Result<()> {
        panic!("CodecPanic::decode");
    }

    fn dimensions(self, _image: &()) -> (u32, u32) {
        panic!("CodecPanic::dimensions");
    }

    fn crop(self, _image: (), _x: u32, _y: u32, _width: u32, _height: u32) {
        panic!("CodecPanic::crop");
    }

    fn scale(self, _image: (), _width: u32, _height: u32, _filter: ScaleFilter) {
        panic!("CodecPanic::scale");
    }

    fn can_encode(self, kind: ImageType) -> bool {
        CodecImplA.can_encode(kind)
    }

    fn encode(
        self,
        _image: &(),
        _kind: ImageType,
        _jpeg_quality: u8,
    ) -> anyhow::Result<Vec<u8>> {
        panic!("CodecPanic::encode");
    }
}
