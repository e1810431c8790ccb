//! PostalGhost Wire Protocol
//!
//! Frame format, opcodes, CBOR payloads, and the share package codec for the
//! PostalGhost dead-man's-switch protocol. This crate is the interoperability
//! contract between servers and clients: pure data types and codecs, no I/O
//! and no clocks.
//!
//! # Wire Format
//!
//! Every frame is a fixed 12-byte binary header followed by a CBOR payload:
//!
//! ```text
//! [magic: 4] [version: 1] [flags: 1] [opcode: 2] [payload_size: 4] [payload]
//! ```
//!
//! Binary values inside payloads (handles, keys, signatures) travel as hex
//! strings, so every payload is printable and diffable.
//!
//! # Session Shape
//!
//! A connection carries exactly two request/response round trips: the
//! identity handshake (Challenge/ChallengeReply), then one key operation and
//! its response. The server never sends an unsolicited frame and never sends
//! a third one.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod errors;
mod frame;
mod handle;
mod header;
pub mod hexfmt;
mod opcode;
mod payloads;
mod share;

pub use errors::{ProtocolError, Result};
pub use frame::Frame;
pub use handle::Handle;
pub use header::FrameHeader;
pub use opcode::Opcode;
pub use payloads::{
    Challenge, ChallengeReply, ErrorPayload, GetRequest, GetResponse, KeyStatus, Payload,
    PingRequest, PingResponse, SetRequest, SetResponse,
};
pub use share::{KeyDescriptor, SharePackage, UnlockPath};

/// ALPN identifier negotiated during the QUIC/TLS handshake.
pub const ALPN_PROTOCOL: &[u8] = b"postalghost";
