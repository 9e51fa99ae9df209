//! Frame/chunk payload decoding
//!
//! The backend ships video frames and audio chunks as text inside the JSON
//! envelope, either hex-encoded or base64-encoded. These functions turn that
//! text back into bytes for the playback sink. They are pure and stateless;
//! malformed input is reported as a [`DecodeError`] for the caller to log.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Text encoding of a media payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadEncoding {
    Hex,
    Base64,
}

/// Payload decoding failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("hex payload has odd length {0}")]
    OddLength(usize),

    #[error("invalid hex digit {digit:?} at offset {offset}")]
    InvalidHexDigit { offset: usize, digit: char },

    #[error("invalid base64 payload: {0}")]
    InvalidBase64(String),
}

/// Decode a hex string into bytes (upper or lower case digits)
pub fn decode_hex(input: &str) -> Result<Vec<u8>, DecodeError> {
    hex::decode(input).map_err(|e| match e {
        hex::FromHexError::InvalidHexCharacter { c, index } => DecodeError::InvalidHexDigit {
            offset: index,
            digit: c,
        },
        hex::FromHexError::OddLength | hex::FromHexError::InvalidStringLength => {
            DecodeError::OddLength(input.len())
        }
    })
}

/// Encode bytes as lowercase hex
pub fn encode_hex(bytes: &[u8]) -> String {
    hex::encode(bytes)
}

/// Decode a base64 payload
///
/// Accepts a `data:<mime>;base64,` URL prefix, which the backend attaches to
/// some frames meant for direct display.
pub fn decode_base64(input: &str) -> Result<Vec<u8>, DecodeError> {
    let body = match input.split_once(";base64,") {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => input,
    };
    STANDARD
        .decode(body.trim())
        .map_err(|e| DecodeError::InvalidBase64(e.to_string()))
}

/// Decode a payload with the given encoding
pub fn decode_payload(input: &str, encoding: PayloadEncoding) -> Result<Vec<u8>, DecodeError> {
    match encoding {
        PayloadEncoding::Hex => decode_hex(input),
        PayloadEncoding::Base64 => decode_base64(input),
    }
}
