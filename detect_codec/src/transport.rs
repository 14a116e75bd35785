//! Transport stage: binary <-> base64 text.

use crate::error::CodecError;
use base64::{engine::general_purpose::STANDARD, Engine as _};

pub fn encode(bytes: &[u8]) -> Vec<u8> {
    STANDARD.encode(bytes).into_bytes()
}

/// Line-wrapped encoders are tolerated: ASCII whitespace is ignored.
pub fn decode(payload: &[u8]) -> Result<Vec<u8>, CodecError> {
    if payload.iter().any(u8::is_ascii_whitespace) {
        let compact: Vec<u8> = payload
            .iter()
            .copied()
            .filter(|b| !b.is_ascii_whitespace())
            .collect();
        return Ok(STANDARD.decode(compact)?);
    }
    Ok(STANDARD.decode(payload)?)
}
