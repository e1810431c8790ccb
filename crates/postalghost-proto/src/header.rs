//! Frame header implementation with zero-copy parsing.
//!
//! The `FrameHeader` is a fixed 12-byte structure serialized as raw binary
//! (Big Endian). A reader pulls exactly 12 bytes off the stream, validates
//! them, learns the payload length, and only then reads the payload.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::{
    Opcode,
    errors::{ProtocolError, Result},
};

/// Fixed 12-byte frame header (Big Endian network byte order)
///
/// All multi-byte integers are stored in Big Endian format to match network
/// byte order. Fields are stored as raw byte arrays to avoid alignment issues.
///
/// The header carries framing data only: protocol identification, the opcode
/// selecting the payload type, and the payload length. Everything semantic
/// lives in the CBOR payload, so the header never needs to change when a
/// payload grows a field.
///
/// # Security
///
/// The #[repr(C, packed)] layout with zerocopy traits ensures this struct can
/// be safely cast from untrusted network bytes - all 12-byte patterns are
/// valid, preventing undefined behavior. Magic, version, reserved flags, and
/// the payload-size cap are all validated before any payload byte is read, so
/// a peer cannot drive allocation from a forged length field.
#[repr(C, packed)]
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct FrameHeader {
    magic: [u8; 4],                   // 0x504F4748 ("POGH" in ASCII)
    version: u8,                      // 0x01
    flags: u8,                        // reserved, must be zero
    pub(crate) opcode: [u8; 2],       // u16 operation code
    pub(crate) payload_size: [u8; 4], // u32 payload length
}

impl FrameHeader {
    /// Size of the serialized header (12 bytes)
    pub const SIZE: usize = 12;

    /// Magic number: "POGH" in ASCII (0x504F4748)
    pub const MAGIC: u32 = 0x504F_4748;

    /// Current protocol version
    pub const VERSION: u8 = 0x01;

    /// Maximum payload size (64 KiB)
    ///
    /// The largest legitimate payload is a `GetResponse` or share-sized
    /// error message, far below this cap. Anything bigger is a broken or
    /// hostile peer.
    pub const MAX_PAYLOAD_SIZE: u32 = 64 * 1024;

    /// Create a new header with the specified opcode.
    #[must_use]
    pub fn new(opcode: Opcode) -> Self {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0..4].copy_from_slice(&Self::MAGIC.to_be_bytes());
        bytes[4] = Self::VERSION;
        bytes[6..8].copy_from_slice(&opcode.to_u16().to_be_bytes());

        // SAFETY: We just constructed valid bytes with correct magic, version,
        // and zero flags. from_bytes will validate these and return a valid
        // header.
        Self::from_bytes(&bytes)
            .ok()
            .unwrap_or_else(|| unreachable!("constructed valid header with correct magic/version"))
            .to_owned()
    }

    /// Parse header from network bytes (zero-copy, safe)
    ///
    /// This function casts raw bytes directly to a `FrameHeader` reference
    /// using compile-time layout verification from `zerocopy`. No data is
    /// copied.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::FrameTooShort` if buffer is too short (< 12 bytes)
    /// - `ProtocolError::InvalidMagic` if magic number is invalid
    /// - `ProtocolError::UnsupportedVersion` if protocol version is unsupported
    /// - `ProtocolError::ReservedFlags` if any reserved flag bit is set
    /// - `ProtocolError::PayloadTooLarge` if payload size exceeds maximum
    ///
    /// # Security
    ///
    /// - Zero-Copy Safety: The `zerocopy` crate verifies at compile-time that
    ///   `FrameHeader` has a stable memory layout. All bit patterns are valid
    ///   (no invalid representations), so casting arbitrary bytes cannot cause
    ///   undefined behavior.
    ///
    /// - Validation Order: We validate cheapest-to-check properties first
    ///   (size, magic) before more expensive ones (version, flags, payload
    ///   size). This fails fast on garbage data.
    ///
    /// - No Identity Verification: This function does NOT authenticate the
    ///   peer. Headers are structurally valid but unauthenticated; the
    ///   challenge/signature exchange happens at the session layer.
    pub fn from_bytes(bytes: &[u8]) -> Result<&Self> {
        let header = Self::ref_from_prefix(bytes)
            .map_err(|_| ProtocolError::FrameTooShort {
                expected: Self::SIZE,
                actual: bytes.len(),
            })?
            .0;

        if u32::from_be_bytes(header.magic) != Self::MAGIC {
            return Err(ProtocolError::InvalidMagic);
        }

        if header.version != Self::VERSION {
            return Err(ProtocolError::UnsupportedVersion(header.version));
        }

        if header.flags != 0 {
            return Err(ProtocolError::ReservedFlags(header.flags));
        }

        let payload_size = u32::from_be_bytes(header.payload_size);
        if payload_size > Self::MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                size: payload_size as usize,
                max: Self::MAX_PAYLOAD_SIZE as usize,
            });
        }

        Ok(header)
    }

    /// Serialize header to bytes (zero-copy)
    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let bytes = IntoBytes::as_bytes(self);
        let mut arr = [0u8; Self::SIZE];
        arr.copy_from_slice(bytes);
        arr
    }

    /// Protocol magic number (0x504F4748 = "POGH").
    #[must_use]
    pub fn magic(&self) -> u32 {
        u32::from_be_bytes(self.magic)
    }

    /// Protocol version byte (currently 0x01).
    #[must_use]
    pub fn version(&self) -> u8 {
        self.version
    }

    /// Reserved flags byte (always zero in version 0x01).
    #[must_use]
    pub fn flags(&self) -> u8 {
        self.flags
    }

    /// Operation code as raw u16.
    #[must_use]
    pub fn opcode(&self) -> u16 {
        u16::from_be_bytes(self.opcode)
    }

    /// Operation code as enum. `None` if unrecognized.
    #[must_use]
    pub fn opcode_enum(&self) -> Option<Opcode> {
        Opcode::from_u16(self.opcode())
    }

    /// Payload size in bytes (max 64 KiB).
    #[must_use]
    pub fn payload_size(&self) -> u32 {
        u32::from_be_bytes(self.payload_size)
    }

    /// Set payload size (done automatically when building a frame).
    pub fn set_payload_size(&mut self, size: u32) {
        self.payload_size = size.to_be_bytes();
    }
}

// Manual Debug implementation (can't derive due to packed repr)
impl std::fmt::Debug for FrameHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameHeader")
            .field("magic", &format!("{:#010x}", self.magic()))
            .field("version", &self.version())
            .field("flags", &self.flags())
            .field("opcode", &format!("{:#06x}", self.opcode()))
            .field("payload_size", &self.payload_size())
            .finish()
    }
}

// Manual PartialEq implementation (can't derive due to packed repr)
impl PartialEq for FrameHeader {
    fn eq(&self, other: &Self) -> bool {
        self.to_bytes() == other.to_bytes()
    }
}

impl Eq for FrameHeader {}
