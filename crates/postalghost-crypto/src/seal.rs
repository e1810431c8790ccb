//! Secret sealing using `XChaCha20-Poly1305`
//!
//! All functions are pure - the nonce must be provided by the caller. This
//! enables deterministic testing and keeps randomness sourcing out of the
//! crypto layer.

use chacha20poly1305::{
    XChaCha20Poly1305, XNonce,
    aead::{Aead, KeyInit},
};

use crate::{combine::CompositeKey, error::SealError};

/// Size of the nonce prefix on sealed data (24 bytes)
pub const NONCE_SIZE: usize = 24;

/// Poly1305 tag size (16 bytes)
pub const TAG_SIZE: usize = 16;

/// Smallest valid sealed blob: a nonce plus the tag of an empty plaintext.
pub const MIN_SEALED_SIZE: usize = NONCE_SIZE + TAG_SIZE;

/// Seal a secret under a composite key.
///
/// Output layout: `nonce(24) || ciphertext || tag(16)`. The nonce travels in
/// the clear; its only job is uniqueness. Sealed length is always plaintext
/// length plus [`MIN_SEALED_SIZE`].
///
/// # Security
///
/// - Caller MUST provide a fresh CSPRNG nonce per seal. The 24-byte XChaCha
///   nonce makes random generation safe; reuse under the same key breaks
///   confidentiality.
/// - Authenticated encryption: any bit flip anywhere in the blob makes
///   [`open`] fail.
#[must_use]
pub fn seal(plaintext: &[u8], key: &CompositeKey, nonce: [u8; NONCE_SIZE]) -> Vec<u8> {
    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());

    let Ok(ciphertext) = cipher.encrypt(XNonce::from_slice(&nonce), plaintext) else {
        unreachable!("XChaCha20-Poly1305 encryption cannot fail with valid inputs");
    };

    let mut sealed = Vec::with_capacity(NONCE_SIZE.saturating_add(ciphertext.len()));
    sealed.extend_from_slice(&nonce);
    sealed.extend_from_slice(&ciphertext);
    sealed
}

/// Open a sealed blob with a composite key.
///
/// # Errors
///
/// - `SealError::Truncated` if the blob is shorter than [`MIN_SEALED_SIZE`]
/// - `SealError::AuthenticationFailed` if the key is wrong or the blob was
///   tampered with. A composite built from a different key subset fails
///   here; it can never yield someone else's plaintext.
pub fn open(sealed: &[u8], key: &CompositeKey) -> Result<Vec<u8>, SealError> {
    if sealed.len() < MIN_SEALED_SIZE {
        return Err(SealError::Truncated { len: sealed.len(), min: MIN_SEALED_SIZE });
    }

    let (nonce, ciphertext) = sealed.split_at(NONCE_SIZE);
    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());

    cipher
        .decrypt(XNonce::from_slice(nonce), ciphertext)
        .map_err(|_| SealError::AuthenticationFailed)
}
