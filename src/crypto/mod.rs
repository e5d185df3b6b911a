// # Crypto
//
// Symmetric crypto for the upload pipeline:
// - `stream`: chunked authenticated stream encryption for file contents,
//   thumbnails and metadata (libsodium secretstream wire format).
// - `wrap`: sealing of small secrets (file keys, collection keys, album
//   names) under another key with a random 24-byte nonce.
//
// Key hierarchy: every uploaded file gets a fresh file key; file keys are
// sealed under the owning collection's key; collection keys are sealed
// under the account master key. Only sealed forms ever leave the process.

pub mod stream;
pub mod wrap;

use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Length of every symmetric key in the hierarchy.
pub const KEY_BYTES: usize = 32;

/// A 32-byte symmetric key (file, collection, or master key).
///
/// Key material is zeroed on drop. Cloning is allowed because collection
/// keys are cached per album for the lifetime of the process.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretKey([u8; KEY_BYTES]);

impl SecretKey {
    /// Generate a fresh key from the OS entropy source.
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_BYTES];
        OsRng.fill_bytes(&mut bytes);
        SecretKey(bytes)
    }

    /// Wrap existing key material, validating its length.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        let arr: [u8; KEY_BYTES] = bytes
            .try_into()
            .map_err(|_| KeyError::InvalidLength(bytes.len()))?;
        Ok(SecretKey(arr))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_BYTES] {
        &self.0
    }
}

impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SecretKey").field(&"<redacted>").finish()
    }
}

#[derive(thiserror::Error, Debug)]
pub enum KeyError {
    #[error("key must be {KEY_BYTES} bytes, got {0}")]
    InvalidLength(usize),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_produces_distinct_keys() {
        let a = SecretKey::generate();
        let b = SecretKey::generate();
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn test_from_bytes_rejects_wrong_length() {
        assert!(SecretKey::from_bytes(&[0u8; 16]).is_err());
        assert!(SecretKey::from_bytes(&[0u8; 32]).is_ok());
    }

    #[test]
    fn test_debug_does_not_leak_key_material() {
        let key = SecretKey::generate();
        let rendered = format!("{:?}", key);
        assert!(!rendered.contains(&hex::encode(key.as_bytes())));
    }
}
