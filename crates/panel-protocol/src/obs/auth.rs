//! obs-websocket authentication string.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use sha2::{Digest, Sha256};

fn sha256_base64(parts: &[&[u8]]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    STANDARD.encode(hasher.finalize())
}

/// obs-websocket authentication string for the Identify message.
///
/// `secret = base64(sha256(password ‖ salt))`, then
/// `base64(sha256(secret ‖ challenge))`, concatenating raw bytes.
pub fn authenticate(password: &str, salt: &str, challenge: &str) -> String {
    let secret = sha256_base64(&[password.as_bytes(), salt.as_bytes()]);
    sha256_base64(&[secret.as_bytes(), challenge.as_bytes()])
}
