use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};
use rand::rngs::OsRng;
use rand::RngCore;
use thiserror::Error;

use super::SecretKey;

/// Length of the random nonce attached to every sealed secret.
pub const NONCE_BYTES: usize = 24;

#[derive(Error, Debug)]
pub enum WrapError {
    #[error("nonce must be {NONCE_BYTES} bytes, got {0}")]
    InvalidNonceLength(usize),
    #[error("sealing failed")]
    SealFailed,
    #[error("authentication failed")]
    AuthFailed,
}

/// Seal a small secret (a key or an album name) under `key` with a fresh
/// random 24-byte nonce. Returns the sealed bytes and the nonce; both are
/// needed to open it again.
pub fn seal(plain: &[u8], key: &SecretKey) -> Result<(Vec<u8>, [u8; NONCE_BYTES]), WrapError> {
    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());

    let mut nonce = [0u8; NONCE_BYTES];
    OsRng.fill_bytes(&mut nonce);

    let sealed = cipher
        .encrypt(XNonce::from_slice(&nonce), plain)
        .map_err(|_| WrapError::SealFailed)?;

    Ok((sealed, nonce))
}

/// Open a sealed secret. Fails with [`WrapError::AuthFailed`] if the
/// sealed bytes, the nonce, or the key do not match the seal.
pub fn open(sealed: &[u8], nonce: &[u8], key: &SecretKey) -> Result<Vec<u8>, WrapError> {
    if nonce.len() != NONCE_BYTES {
        return Err(WrapError::InvalidNonceLength(nonce.len()));
    }

    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());
    cipher
        .decrypt(XNonce::from_slice(nonce), sealed)
        .map_err(|_| WrapError::AuthFailed)
}
