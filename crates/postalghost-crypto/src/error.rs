//! Sealing error types.

use thiserror::Error;

/// Errors produced while opening sealed data.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SealError {
    /// Blob is too short to contain a nonce and an authentication tag.
    #[error("sealed data truncated: {len} bytes, need at least {min}")]
    Truncated {
        /// Length of the presented blob.
        len: usize,
        /// Minimum length of any valid blob.
        min: usize,
    },

    /// Authentication failed: wrong key or tampered data.
    ///
    /// The two cases are indistinguishable; the variant carries no detail.
    #[error("authentication failed")]
    AuthenticationFailed,
}
