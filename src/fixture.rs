//! Test images, generated in memory

use std::io::Cursor;

use image::{DynamicImage, ImageBuffer, Rgb};

use crate::format::ImageType;

/// A `width` x `height` RGB gradient with some high-frequency detail.
pub fn image(width: u32, height: u32) -> DynamicImage {
    let buf = ImageBuffer::from_fn(width, height, |x, y| {
        let checker = if (x / 3 + y / 3) % 2 == 0 { 0 } else { 60 };
        Rgb([
            (x * 255 / width.max(1)) as u8,
            (y * 255 / height.max(1)) as u8,
            checker,
        ])
    });
    DynamicImage::ImageRgb8(buf)
}

/// [`image`], encoded as `kind`. WebP has no encoder here; see [`webp`].
pub fn encoded(width: u32, height: u32, kind: ImageType) -> Vec<u8> {
    let img = image(width, height);
    let format = match kind {
        ImageType::Jpeg => image::ImageOutputFormat::Jpeg(90),
        ImageType::Png => image::ImageOutputFormat::Png,
        ImageType::Gif => image::ImageOutputFormat::Gif,
        ImageType::WebP => panic!("no webp encoder in tests"),
    };
    let mut cursor = Cursor::new(Vec::new());
    img.write_to(&mut cursor, format).unwrap();
    cursor.into_inner()
}

/// A 1x1 lossless WebP.
pub fn webp() -> Vec<u8> {
    vec![
        0x52, 0x49, 0x46, 0x46, 0x1a, 0x00, 0x00, 0x00, 0x57, 0x45, 0x42, 0x50,
        0x56, 0x50, 0x38, 0x4c, 0x0d, 0x00, 0x00, 0x00, 0x2f, 0x00, 0x00, 0x00,
        0x10, 0x07, 0x10, 0x11, 0x11, 0x88, 0x88, 0xfe, 0x07, 0x00,
    ]
}
