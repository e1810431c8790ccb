//! Client-side error taxonomy.
//!
//! Callers need to tell four situations apart: the server failed to prove
//! its identity, the network or protocol broke, the server said no, and the
//! declared policy itself is the problem. Each gets its own variant so
//! callers can branch without parsing message strings.

use postalghost_core::SessionError;
use postalghost_proto::ProtocolError;
use thiserror::Error;

/// Errors surfaced by sender and receiver workflows.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// Server failed the identity handshake.
    ///
    /// The connection was closed before any handle or operation crossed it.
    /// Either the share package names the wrong public key for this host, or
    /// someone else is answering on it.
    #[error("server failed identity verification")]
    Auth,

    /// Connection or stream failure. Retryable: a fresh connection repeats
    /// the whole handshake, and every operation is safe to reissue.
    #[error("transport failure: {0}")]
    Transport(String),

    /// Peer violated the session protocol (bad framing, wrong opcode,
    /// malformed payload).
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// Server answered the operation with a semantic rejection.
    #[error("server rejected operation: {message} (code {code:#06x})")]
    Rejected {
        /// Machine-readable rejection code.
        code: u16,
        /// Human-readable message from the server.
        message: String,
    },

    /// Declared disclosure policy is structurally invalid (empty path,
    /// out-of-range index, duplicate member). Caught before any key is
    /// created or any byte is sealed.
    #[error("invalid policy: {0}")]
    Policy(String),

    /// No unlock path can ever complete: every path references a key that is
    /// permanently gone or seals data its composite cannot open.
    #[error("no unlock path can be satisfied")]
    Unsatisfiable,
}

impl From<SessionError> for ClientError {
    fn from(err: SessionError) -> Self {
        if err.is_auth_failure() {
            Self::Auth
        } else {
            Self::Protocol(err.to_string())
        }
    }
}

impl From<ProtocolError> for ClientError {
    fn from(err: ProtocolError) -> Self {
        Self::Protocol(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use postalghost_core::IdentityError;

    use super::*;

    #[test]
    fn auth_failures_map_to_auth() {
        let err: ClientError = SessionError::AuthFailed(IdentityError::BadSignature).into();
        assert_eq!(err, ClientError::Auth);
    }

    #[test]
    fn other_session_errors_map_to_protocol() {
        let err: ClientError =
            SessionError::UnexpectedFrame { phase: "init", opcode: 0x0010 }.into();
        assert!(matches!(err, ClientError::Protocol(_)));
    }

    #[test]
    fn proto_errors_map_to_protocol() {
        let err: ClientError = ProtocolError::InvalidMagic.into();
        assert!(matches!(err, ClientError::Protocol(_)));
    }
}
