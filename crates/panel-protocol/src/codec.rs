//! Base64 helpers for in-band file payloads.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

/// Length of the padded base64 encoding of `raw_len` bytes.
pub fn encoded_len(raw_len: usize) -> usize {
    raw_len.div_ceil(3) * 4
}

/// Number of raw bytes carried by `encoded_len` base64 characters, padding
/// counted as if it were data.
pub fn raw_len(encoded_len: usize) -> usize {
    encoded_len / 4 * 3
}

/// Standard, padded base64.
pub fn encode(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Decode standard, padded base64.
pub fn decode(data: &str) -> Result<Vec<u8>, base64::DecodeError> {
    STANDARD.decode(data)
}
