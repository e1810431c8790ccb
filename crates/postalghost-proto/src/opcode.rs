//! Operation codes identifying payload types.

/// Frame operation codes.
///
/// The low byte groups related frames: `0x000x` handshake, `0x001x` key
/// operations, `0x00FF` error. Requests use even low bits, responses odd,
/// and every server frame is a direct reply to the client frame before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Opcode {
    /// Client nonce opening the identity handshake.
    Challenge = 0x0001,
    /// Server signature over the challenge.
    ChallengeReply = 0x0002,
    /// Create a timelocked key.
    SetRequest = 0x0010,
    /// Handles and key material for a freshly created key.
    SetResponse = 0x0011,
    /// Liveness signal refreshing a key's unlock deadline.
    PingRequest = 0x0012,
    /// Key status after a ping.
    PingResponse = 0x0013,
    /// Receiver query for key status and material.
    GetRequest = 0x0014,
    /// Key status, with material once unlocked.
    GetResponse = 0x0015,
    /// Semantic rejection of an operation.
    Error = 0x00FF,
}

impl Opcode {
    /// Parses an opcode from its wire value.
    ///
    /// Returns `None` for unassigned values; the caller decides whether
    /// that closes the connection.
    #[must_use]
    pub const fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x0001 => Some(Self::Challenge),
            0x0002 => Some(Self::ChallengeReply),
            0x0010 => Some(Self::SetRequest),
            0x0011 => Some(Self::SetResponse),
            0x0012 => Some(Self::PingRequest),
            0x0013 => Some(Self::PingResponse),
            0x0014 => Some(Self::GetRequest),
            0x0015 => Some(Self::GetResponse),
            0x00FF => Some(Self::Error),
            _ => None,
        }
    }

    /// Wire value of this opcode.
    #[must_use]
    pub const fn to_u16(self) -> u16 {
        self as u16
    }

    /// True for opcodes only a client sends.
    #[must_use]
    pub const fn is_request(self) -> bool {
        matches!(
            self,
            Self::Challenge | Self::SetRequest | Self::PingRequest | Self::GetRequest
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Opcode; 9] = [
        Opcode::Challenge,
        Opcode::ChallengeReply,
        Opcode::SetRequest,
        Opcode::SetResponse,
        Opcode::PingRequest,
        Opcode::PingResponse,
        Opcode::GetRequest,
        Opcode::GetResponse,
        Opcode::Error,
    ];

    #[test]
    fn opcode_round_trip() {
        for opcode in ALL {
            assert_eq!(Opcode::from_u16(opcode.to_u16()), Some(opcode));
        }
    }

    #[test]
    fn unknown_values_rejected() {
        for value in [0x0000, 0x0003, 0x0016, 0x00FE, 0x0100, 0xFFFF] {
            assert_eq!(Opcode::from_u16(value), None);
        }
    }

    #[test]
    fn request_response_split() {
        let requests: Vec<_> = ALL.iter().filter(|op| op.is_request()).collect();
        assert_eq!(requests.len(), 4);
        assert!(!Opcode::Error.is_request());
        assert!(!Opcode::ChallengeReply.is_request());
    }
}
