//! Container stage for detection results: a versioned CBOR document.

use crate::detection::DetectionResult;
use crate::error::CodecError;
use serde::{Deserialize, Serialize};

pub const FORMAT_VERSION: u16 = 1;

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    version: u16,
    result: &'a DetectionResult,
}

#[derive(Deserialize)]
struct Envelope {
    version: u16,
    result: ciborium::Value,
}

pub fn to_cbor(result: &DetectionResult) -> Result<Vec<u8>, CodecError> {
    let envelope = EnvelopeRef {
        version: FORMAT_VERSION,
        result,
    };
    let mut buffer = Vec::new();
    ciborium::into_writer(&envelope, &mut buffer)
        .map_err(|e| CodecError::Serialize(e.to_string()))?;
    Ok(buffer)
}

/// The version is checked before the body is interpreted.
pub fn from_cbor(bytes: &[u8]) -> Result<DetectionResult, CodecError> {
    let envelope: Envelope =
        ciborium::from_reader(bytes).map_err(|e| CodecError::Deserialize(e.to_string()))?;

    if envelope.version != FORMAT_VERSION {
        return Err(CodecError::UnsupportedVersion {
            found: envelope.version,
            expected: FORMAT_VERSION,
        });
    }

    envelope
        .result
        .deserialized()
        .map_err(|e| CodecError::Deserialize(e.to_string()))
}
