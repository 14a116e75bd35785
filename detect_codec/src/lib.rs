//! Wire codec for the object detection service.
//!
//! Every payload crosses the wire in two stages: a container stage
//! (compressed image bytes, or a versioned CBOR document for detection
//! results) and a transport stage that turns those bytes into base64 text.
//! Both stages are public so each can be exercised on its own.

pub mod container;
mod detection;
mod error;
pub mod format;
mod frame;
pub mod transport;

pub use crate::detection::{BoundingBox, Detection, DetectionResult};
pub use crate::error::CodecError;
pub use crate::frame::{ChannelOrder, ImageBuffer, ImageFormat, ImageSize, CHANNELS};

/// Base64 text of a compressed image -> pixel buffer in RGB order.
pub fn decode_image(payload: &[u8]) -> Result<ImageBuffer, CodecError> {
    let bytes = transport::decode(payload)?;
    container::decode(&bytes)
}

/// Pixel buffer -> base64 text of the compressed container.
pub fn encode_image(image: &ImageBuffer, format: ImageFormat) -> Result<Vec<u8>, CodecError> {
    let bytes = container::encode(image, format)?;
    Ok(transport::encode(&bytes))
}

pub fn encode_detection(result: &DetectionResult) -> Result<Vec<u8>, CodecError> {
    let bytes = format::to_cbor(result)?;
    Ok(transport::encode(&bytes))
}

pub fn decode_detection(payload: &[u8]) -> Result<DetectionResult, CodecError> {
    let bytes = transport::decode(payload)?;
    format::from_cbor(&bytes)
}
