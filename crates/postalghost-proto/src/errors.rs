//! Protocol error types.

use thiserror::Error;

/// Convenience alias for fallible protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors produced while encoding or decoding wire data.
///
/// Every variant here is a structural fault: the bytes themselves are
/// malformed. Semantic rejections (unknown handle, bad timelock) never
/// surface as a `ProtocolError`; they travel as an error payload instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Buffer is smaller than a complete frame header.
    #[error("frame too short: need {expected} bytes, got {actual}")]
    FrameTooShort {
        /// Minimum number of bytes required.
        expected: usize,
        /// Number of bytes available.
        actual: usize,
    },

    /// Header magic does not identify a PostalGhost frame.
    #[error("invalid magic number")]
    InvalidMagic,

    /// Protocol version is not supported by this implementation.
    #[error("unsupported protocol version: {0:#04x}")]
    UnsupportedVersion(u8),

    /// Reserved flag bits were set.
    #[error("reserved flags set: {0:#010b}")]
    ReservedFlags(u8),

    /// Declared payload size exceeds the protocol cap.
    #[error("payload too large: {size} bytes exceeds maximum {max}")]
    PayloadTooLarge {
        /// Declared payload size in bytes.
        size: usize,
        /// Maximum allowed payload size.
        max: usize,
    },

    /// Frame body is shorter than the header's declared payload size.
    #[error("frame truncated: expected {expected} bytes, got {actual}")]
    FrameTruncated {
        /// Total size the header promised.
        expected: usize,
        /// Number of bytes available.
        actual: usize,
    },

    /// Opcode value has no assigned meaning.
    #[error("unknown opcode: {0:#06x}")]
    UnknownOpcode(u16),

    /// CBOR serialization failed.
    #[error("CBOR encode failed: {0}")]
    CborEncode(String),

    /// CBOR deserialization failed.
    #[error("CBOR decode failed: {0}")]
    CborDecode(String),

    /// A hex-encoded field did not parse to its documented width.
    #[error("invalid hex in {field}")]
    InvalidHex {
        /// Name of the offending field.
        field: &'static str,
    },

    /// A share package violated its structural rules.
    #[error("invalid share package: {0}")]
    InvalidShare(String),
}
