//! Sealed-box encryption for GitHub Actions secrets.
//!
//! GitHub only accepts secret values encrypted with the repository's
//! Curve25519 public key using a libsodium sealed box.

use crate::error::{Error, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use crypto_box::PublicKey;
use crypto_box::aead::OsRng;

/// Encrypt `plaintext` for the base64-encoded public key; returns base64.
pub fn seal(public_key: &str, plaintext: &str) -> Result<String> {
    let bytes = STANDARD
        .decode(public_key.trim())
        .map_err(|e| Error::Encryption(format!("public key is not base64: {e}")))?;
    let key: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
        Error::Encryption(format!("public key must be 32 bytes, got {}", bytes.len()))
    })?;

    let sealed = PublicKey::from(key)
        .seal(&mut OsRng, plaintext.as_bytes())
        .map_err(|e| Error::Encryption(e.to_string()))?;
    Ok(STANDARD.encode(sealed))
}
