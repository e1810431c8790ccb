//! CBOR-encoded protocol messages.
//!
//! Frame headers are raw binary, but payloads use CBOR for type safety and
//! forward compatibility. The `Payload` enum covers all nine message types:
//! the identity handshake (Challenge, ChallengeReply), the three key
//! operations with their responses, and the error frame.
//!
//! We chose CBOR over alternatives because it's self-describing (field names
//! embedded), compact, and doesn't need code generation. Binary values
//! (handles, keys, signatures) travel as hex strings so a captured payload is
//! printable as-is.
//!
//! # Invariants
//!
//! Each payload variant maps to exactly one opcode (enforced by match
//! exhaustiveness). Round-trip encoding must produce identical values.

use bytes::BufMut;
use serde::{Deserialize, Serialize};

use crate::{
    Frame, FrameHeader, Handle, Opcode, hexfmt,
    errors::{ProtocolError, Result},
};

/// Client nonce opening the identity handshake.
///
/// The challenge is a client-chosen single-use string; this implementation
/// sends 32 CSPRNG bytes as 64 hex characters. Servers treat the string as
/// opaque bytes and only bound its length.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge {
    /// Single-use string the server must sign.
    pub challenge: String,
}

impl Challenge {
    /// Shortest challenge a server accepts (bytes).
    pub const MIN_LEN: usize = 1;

    /// Longest challenge a server accepts (bytes).
    ///
    /// Long enough for any reasonable nonce encoding, short enough that a
    /// server never signs attacker-sized inputs.
    pub const MAX_LEN: usize = 128;
}

/// Server's proof of identity: a signature over the client's challenge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeReply {
    /// Ed25519 signature over the domain-separated challenge bytes.
    #[serde(with = "hexfmt::array")]
    pub sig: [u8; 64],
}

/// Create a timelocked key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetRequest {
    /// Timelock duration in seconds. Must be positive.
    pub timelock: i64,
}

/// Handles and key material for a freshly created key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetResponse {
    /// Capability handle for `ping`. Held by the sender only.
    pub sender: Handle,
    /// Capability handle for `get`. Travels to the receiver in the share.
    pub receiver: Handle,
    /// The 32-byte key material this server now holds.
    #[serde(with = "hexfmt::array")]
    pub key: [u8; 32],
}

/// Liveness signal refreshing a key's unlock deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingRequest {
    /// Sender handle of the key to refresh.
    pub id: Handle,
}

/// Key status after a ping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingResponse {
    /// `Locked` if the deadline was refreshed, `Unlocked` if it had already
    /// passed (the key is permanently released and pings no longer matter).
    pub status: KeyStatus,
}

/// Receiver query for key status and material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetRequest {
    /// Receiver handle of the key to query.
    pub id: Handle,
}

/// Key status, with material once unlocked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetResponse {
    /// Current lock state.
    pub status: KeyStatus,
    /// Key material. Present exactly when `status` is `Unlocked`; the field
    /// is absent from the wire while the key is locked.
    #[serde(
        with = "hexfmt::array_opt",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub key: Option<[u8; 32]>,
}

/// Derived lock state of a key record.
///
/// Never stored: always computed from the current time and the record's
/// unlock deadline, so reads cannot observe a stale cached state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyStatus {
    /// Deadline in the future; pings still matter and `get` returns no key.
    Locked,
    /// Deadline passed; the key is released forever.
    Unlocked,
}

impl KeyStatus {
    /// True while the key is still withheld.
    #[must_use]
    pub const fn is_locked(self) -> bool {
        matches!(self, Self::Locked)
    }
}

impl std::fmt::Display for KeyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Locked => write!(f, "locked"),
            Self::Unlocked => write!(f, "unlocked"),
        }
    }
}

/// Error payload for semantic rejections.
///
/// Sent in place of the normal response when an operation is well-formed but
/// cannot succeed. Structural faults (bad framing, broken CBOR, handshake
/// violations) never produce this payload; they close the connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Error code identifying the type of error.
    pub code: u16,
    /// Human-readable error message.
    pub message: String,
}

impl ErrorPayload {
    /// Operation parameters failed validation.
    pub const VALIDATION: u16 = 0x0001;
    /// No record matches the presented handle for this operation.
    pub const NOT_FOUND: u16 = 0x0002;

    /// Create a validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self { code: Self::VALIDATION, message: msg.into() }
    }

    /// Create a not-found error.
    ///
    /// The message is a fixed string: an unknown handle, a known handle
    /// presented for the wrong operation, and a deleted record all produce
    /// byte-identical responses, so the error leaks nothing about which case
    /// occurred.
    #[must_use]
    pub fn not_found() -> Self {
        Self { code: Self::NOT_FOUND, message: "unknown id".to_owned() }
    }
}

/// All possible frame payloads
///
/// The payload type is determined by the `Opcode` in the frame header,
/// so we serialize only the inner struct content (no variant tag in CBOR).
///
/// # Invariants
///
/// - Opcode Uniqueness: Each payload variant corresponds to exactly one
///   `Opcode`. The `opcode()` method returns a unique opcode for each
///   variant.
///
/// - Serialization Consistency: Encoding a `Payload` and then decoding it
///   with the same opcode MUST produce an equivalent value. This is verified
///   by round-trip tests.
///
/// # Security
///
/// - No Variant Tag: Unlike typical Rust enum serialization, we do NOT
///   serialize the variant discriminator. The frame header's `opcode` field
///   already identifies the payload type. This prevents attackers from
///   sending mismatched opcode/payload pairs.
///
/// - Exhaustive Matching: All methods use exhaustive `match` statements.
///   Adding a new variant will cause compile errors in `encode()`,
///   `decode()`, and `opcode()`, ensuring no variant is accidentally left
///   unhandled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    // Identity handshake
    /// Client nonce the server must sign.
    Challenge(Challenge),
    /// Server signature over the challenge.
    ChallengeReply(ChallengeReply),

    // Key operations
    /// Create a timelocked key.
    SetRequest(SetRequest),
    /// Handles and key material for a created key.
    SetResponse(SetResponse),
    /// Refresh a key's unlock deadline.
    PingRequest(PingRequest),
    /// Post-ping key status.
    PingResponse(PingResponse),
    /// Query key status and material.
    GetRequest(GetRequest),
    /// Key status, with material once unlocked.
    GetResponse(GetResponse),

    // Error frame
    /// Semantic rejection of an operation.
    Error(ErrorPayload),
}

impl Payload {
    /// Opcode corresponding to this payload type.
    #[must_use]
    pub const fn opcode(&self) -> Opcode {
        match self {
            Self::Challenge(_) => Opcode::Challenge,
            Self::ChallengeReply(_) => Opcode::ChallengeReply,
            Self::SetRequest(_) => Opcode::SetRequest,
            Self::SetResponse(_) => Opcode::SetResponse,
            Self::PingRequest(_) => Opcode::PingRequest,
            Self::PingResponse(_) => Opcode::PingResponse,
            Self::GetRequest(_) => Opcode::GetRequest,
            Self::GetResponse(_) => Opcode::GetResponse,
            Self::Error(_) => Opcode::Error,
        }
    }

    /// Encode payload to buffer
    ///
    /// Serializes only the inner struct, NOT the variant tag.
    /// The frame header's opcode already identifies the payload type.
    ///
    /// # Security
    ///
    /// - No Size Limit Enforcement: This function does NOT check if the
    ///   encoded size exceeds [`FrameHeader::MAX_PAYLOAD_SIZE`]. Size
    ///   validation happens later in [`Frame::encode`]. This separation
    ///   allows encoding for testing or inspection without artificial limits.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::CborEncode` if serialization fails
    pub fn encode(&self, dst: &mut impl BufMut) -> Result<()> {
        let mut writer = dst.writer();

        match self {
            Self::Challenge(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::ChallengeReply(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::SetRequest(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::SetResponse(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::PingRequest(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::PingResponse(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::GetRequest(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::GetResponse(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::Error(inner) => ciborium::ser::into_writer(inner, &mut writer),
        }
        .map_err(|e| ProtocolError::CborEncode(e.to_string()))
    }

    /// Decode payload from bytes based on opcode
    ///
    /// # Security
    ///
    /// - Size Validation First: The size check happens BEFORE CBOR parsing
    ///   begins. This prevents the CBOR parser from processing maliciously
    ///   large inputs that could exhaust memory or CPU.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::PayloadTooLarge` if bytes exceed `MAX_PAYLOAD_SIZE`
    ///   (64 KiB)
    /// - `ProtocolError::CborDecode` if CBOR deserialization fails
    pub fn decode(opcode: Opcode, bytes: &[u8]) -> Result<Self> {
        if bytes.len() > FrameHeader::MAX_PAYLOAD_SIZE as usize {
            return Err(ProtocolError::PayloadTooLarge {
                size: bytes.len(),
                max: FrameHeader::MAX_PAYLOAD_SIZE as usize,
            });
        }

        let payload = match opcode {
            Opcode::Challenge => Self::Challenge(
                ciborium::de::from_reader(bytes)
                    .map_err(|e| ProtocolError::CborDecode(e.to_string()))?,
            ),
            Opcode::ChallengeReply => Self::ChallengeReply(
                ciborium::de::from_reader(bytes)
                    .map_err(|e| ProtocolError::CborDecode(e.to_string()))?,
            ),
            Opcode::SetRequest => Self::SetRequest(
                ciborium::de::from_reader(bytes)
                    .map_err(|e| ProtocolError::CborDecode(e.to_string()))?,
            ),
            Opcode::SetResponse => Self::SetResponse(
                ciborium::de::from_reader(bytes)
                    .map_err(|e| ProtocolError::CborDecode(e.to_string()))?,
            ),
            Opcode::PingRequest => Self::PingRequest(
                ciborium::de::from_reader(bytes)
                    .map_err(|e| ProtocolError::CborDecode(e.to_string()))?,
            ),
            Opcode::PingResponse => Self::PingResponse(
                ciborium::de::from_reader(bytes)
                    .map_err(|e| ProtocolError::CborDecode(e.to_string()))?,
            ),
            Opcode::GetRequest => Self::GetRequest(
                ciborium::de::from_reader(bytes)
                    .map_err(|e| ProtocolError::CborDecode(e.to_string()))?,
            ),
            Opcode::GetResponse => Self::GetResponse(
                ciborium::de::from_reader(bytes)
                    .map_err(|e| ProtocolError::CborDecode(e.to_string()))?,
            ),
            Opcode::Error => Self::Error(
                ciborium::de::from_reader(bytes)
                    .map_err(|e| ProtocolError::CborDecode(e.to_string()))?,
            ),
        };

        Ok(payload)
    }

    /// Convert payload into a transport frame
    ///
    /// This method handles the logic-to-transport conversion:
    /// - Encodes the payload to CBOR bytes
    /// - Sets the correct opcode in the header
    /// - Creates a Frame with automatic `payload_size` calculation
    ///
    /// # Errors
    ///
    /// - `ProtocolError::CborEncode` if serialization fails
    pub fn into_frame(self, mut header: FrameHeader) -> Result<Frame> {
        let mut buf = Vec::new();
        self.encode(&mut buf)?;
        header.opcode = self.opcode().to_u16().to_be_bytes();
        Ok(Frame::new(header, buf))
    }

    /// Parse payload from a raw transport frame
    ///
    /// This method handles the transport-to-logic conversion:
    /// - Extracts the opcode from the frame header
    /// - Decodes the payload bytes based on the opcode
    ///
    /// # Errors
    ///
    /// - `ProtocolError::UnknownOpcode` if the header opcode is unassigned
    /// - `ProtocolError::CborDecode` if CBOR deserialization fails
    /// - `ProtocolError::PayloadTooLarge` if payload exceeds maximum size
    pub fn from_frame(frame: &Frame) -> Result<Self> {
        let opcode = frame
            .header
            .opcode_enum()
            .ok_or(ProtocolError::UnknownOpcode(frame.header.opcode()))?;
        Self::decode(opcode, &frame.payload)
    }
}
