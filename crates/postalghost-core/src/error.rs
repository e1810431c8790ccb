//! Error types for the PostalGhost protocol core.
//!
//! Strongly-typed errors for the two session layers: identity verification
//! failures and session state machine violations. Everything here is a
//! structural fault that ends the connection; semantic rejections travel as
//! error payloads and never appear as a Rust error.

use thiserror::Error;

/// Errors from verifying a server's identity proof.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityError {
    /// Public key bytes do not decode to a valid Ed25519 point.
    #[error("invalid public key")]
    InvalidPublicKey,

    /// Signature does not verify against the expected key and challenge.
    #[error("signature verification failed")]
    BadSignature,
}

/// Errors that can occur while driving a session state machine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Server failed to prove its identity.
    ///
    /// The client raises this before sending anything that follows the
    /// handshake, so no handle ever reaches an unauthenticated peer.
    #[error("server identity proof failed: {0}")]
    AuthFailed(IdentityError),

    /// Invalid phase for the attempted call
    #[error("invalid phase: cannot {operation} in phase {phase}")]
    InvalidPhase {
        /// Phase when the call was made
        phase: &'static str,
        /// Operation that was attempted
        operation: &'static str,
    },

    /// Received unexpected frame for current phase
    #[error("unexpected frame: received opcode {opcode:#06x} in phase {phase}")]
    UnexpectedFrame {
        /// Phase when the frame arrived
        phase: &'static str,
        /// Opcode of the unexpected frame
        opcode: u16,
    },

    /// Challenge violates the accepted length bounds
    #[error("invalid challenge: {0}")]
    InvalidChallenge(String),

    /// Invalid payload for opcode
    #[error("invalid payload: expected {expected} for opcode {opcode:#06x}")]
    InvalidPayload {
        /// Expected payload type
        expected: &'static str,
        /// Opcode that was received
        opcode: u16,
    },

    /// Structural protocol error from frame parsing/validation
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl SessionError {
    /// Returns true if the peer failed authentication rather than framing.
    ///
    /// Drivers surface authentication failures prominently; everything else
    /// is reported as a generic protocol violation.
    #[must_use]
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::AuthFailed(_))
    }
}

/// Convert postalghost-proto errors to `SessionError`
impl From<postalghost_proto::ProtocolError> for SessionError {
    fn from(err: postalghost_proto::ProtocolError) -> Self {
        Self::Protocol(err.to_string())
    }
}
