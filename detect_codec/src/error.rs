use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("payload is not valid base64: {0}")]
    Transport(#[from] base64::DecodeError),
    #[error("failed to read image container: {0}")]
    Io(#[from] std::io::Error),
    #[error("image container error: {0}")]
    Image(#[from] image::ImageError),
    #[error("failed to serialize detection result: {0}")]
    Serialize(String),
    #[error("failed to deserialize detection result: {0}")]
    Deserialize(String),
    #[error("unsupported detection format version {found}, expected {expected}")]
    UnsupportedVersion { found: u16, expected: u16 },
    #[error("pixel buffer of {len} bytes does not match a {width}x{height}x3 image")]
    Shape { len: usize, width: u32, height: u32 },
}
