//! Container stage: pixel buffer <-> compressed image bytes.

use crate::error::CodecError;
use crate::frame::{ImageBuffer, ImageFormat};
use image::codecs::jpeg::JpegEncoder;
use std::io::Cursor;

const JPEG_QUALITY: u8 = 95;

/// The container type is guessed from the leading bytes. The result is always
/// in RGB order.
pub fn decode(bytes: &[u8]) -> Result<ImageBuffer, CodecError> {
    let image_reader = image::ImageReader::new(Cursor::new(bytes)).with_guessed_format()?;
    let image = image_reader.decode()?;

    Ok(ImageBuffer::from_rgb_image(image.to_rgb8()))
}

pub fn encode(image: &ImageBuffer, format: ImageFormat) -> Result<Vec<u8>, CodecError> {
    let rgb = image.to_rgb_image()?;
    let mut bytes = Vec::new();

    match format {
        ImageFormat::Jpeg => {
            JpegEncoder::new_with_quality(&mut bytes, JPEG_QUALITY).encode_image(&rgb)?;
        }
        ImageFormat::Png => {
            rgb.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)?;
        }
    }

    Ok(bytes)
}
