//! Session layer state machines.
//!
//! Both ends of a connection run a small state machine covering exactly two
//! request/response round trips: the identity handshake, then one key
//! operation. Uses the action pattern: methods take frames as input and
//! return actions for the driver to execute. This keeps the machines pure
//! (no I/O, no clocks) and makes testing straightforward.
//!
//! # State Machine
//!
//! ```text
//!         Client                                Server
//!        ┌──────┐      Challenge ────────> ┌────────────────┐
//!        │ Init │                          │ AwaitChallenge │
//!        └──────┘ <──── ChallengeReply     └────────────────┘
//!            │ verify against pinned pk            │ sign
//!            ▼                                     ▼
//!    ┌───────────────┐  operation ───────> ┌────────────────┐
//!    │ OperationSent │                     │ AwaitOperation │
//!    └───────────────┘ <──── response      └────────────────┘
//!            │                                     │ Execute
//!            ▼                                     ▼
//!       ┌──────────┐                           ┌──────┐
//!       │ Complete │                           │ Done │
//!       └──────────┘                           └──────┘
//! ```
//!
//! Any deviation (wrong opcode, failed verification, malformed payload)
//! drops the machine into `Closed`; there is no recovery within a
//! connection. The client sends no handle until the server's signature has
//! verified, so a fake server learns nothing it can replay.

use postalghost_proto::{
    Challenge, ChallengeReply, Frame, FrameHeader, GetRequest, Handle, KeyStatus, Opcode, Payload,
    PingRequest, SetRequest,
};

use crate::{
    error::SessionError,
    identity::{ServerIdentity, verify_challenge},
};

/// Actions returned by the client state machine.
///
/// The driver (test harness or production client) executes these actions:
/// - `SendFrame`: Serialize and send the frame over the transport
/// - `Close`: Close the connection with the given reason
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientAction {
    /// Send this frame to the server
    SendFrame(Frame),

    /// Close the connection with this reason. Emitted once the outcome is
    /// in; failures surface as errors instead, and the driver closes on
    /// those itself.
    Close {
        /// Reason for closing the connection
        reason: String,
    },
}

/// Actions returned by the server state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerAction {
    /// Send this frame to the client
    SendFrame(Frame),

    /// Run this operation against the key store, then call
    /// [`ServerSession::complete`] with the response payload
    Execute(OperationRequest),

    /// Close the connection with this reason
    Close {
        /// Reason for closing the connection
        reason: String,
    },
}

/// One key operation, decoded and ready for execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationRequest {
    /// Create a timelocked key.
    Set {
        /// Requested timelock duration in seconds.
        timelock_secs: i64,
    },
    /// Refresh the deadline behind a sender handle.
    Ping {
        /// Presented sender handle.
        id: Handle,
    },
    /// Query the key behind a receiver handle.
    Get {
        /// Presented receiver handle.
        id: Handle,
    },
}

/// Result of a completed session, as seen by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationOutcome {
    /// Key created.
    Set {
        /// Handle for future pings. Stays with the sender.
        sender: Handle,
        /// Handle for future gets. Travels to the receiver in the share.
        receiver: Handle,
        /// Key material held by the server.
        key: [u8; 32],
    },
    /// Deadline refresh result.
    Ping {
        /// Status after the refresh attempt.
        status: KeyStatus,
    },
    /// Key query result.
    Get {
        /// Current lock status.
        status: KeyStatus,
        /// Key material, present once unlocked.
        key: Option<[u8; 32]>,
    },
    /// Server rejected the operation with an error payload.
    Rejected {
        /// Machine-readable error code.
        code: u16,
        /// Human-readable message.
        message: String,
    },
}

/// Client session phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientPhase {
    /// Initial phase - nothing sent yet
    Init,
    /// Challenge sent, waiting for the server's signature
    ChallengeSent,
    /// Signature verified, operation sent, waiting for the response
    OperationSent,
    /// Response received, outcome available
    Complete,
    /// Session aborted (verification failure or protocol violation)
    Closed,
}

impl ClientPhase {
    /// Lowercase phase name for error messages.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::ChallengeSent => "challenge-sent",
            Self::OperationSent => "operation-sent",
            Self::Complete => "complete",
            Self::Closed => "closed",
        }
    }
}

/// Server session phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerPhase {
    /// Waiting for the client's challenge
    AwaitChallenge,
    /// Challenge signed, waiting for the single operation
    AwaitOperation,
    /// Operation handed to the driver, waiting for `complete`
    Executing,
    /// Response sent, session over
    Done,
    /// Session aborted (protocol violation)
    Closed,
}

impl ServerPhase {
    /// Lowercase phase name for error messages.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::AwaitChallenge => "await-challenge",
            Self::AwaitOperation => "await-operation",
            Self::Executing => "executing",
            Self::Done => "done",
            Self::Closed => "closed",
        }
    }
}

impl Default for ServerPhase {
    fn default() -> Self {
        Self::AwaitChallenge
    }
}

/// Client session state machine
///
/// Authenticates the server, then performs exactly one operation. The
/// expected public key is pinned at construction; it never comes from the
/// connection.
///
/// This is a pure state machine - no I/O, no Environment storage. The
/// challenge randomness is passed into [`ClientSession::start`].
#[derive(Debug, Clone)]
pub struct ClientSession {
    phase: ClientPhase,
    server_pk: [u8; 32],
    challenge: String,
    request: OperationRequest,
    outcome: Option<OperationOutcome>,
}

impl ClientSession {
    /// Create a session that will run `request` against a server expected
    /// to hold the private half of `server_pk`.
    #[must_use]
    pub fn new(server_pk: [u8; 32], request: OperationRequest) -> Self {
        Self {
            phase: ClientPhase::Init,
            server_pk,
            challenge: String::new(),
            request,
            outcome: None,
        }
    }

    /// Current session phase
    #[must_use]
    pub fn phase(&self) -> ClientPhase {
        self.phase
    }

    /// Result of the operation. `None` until the phase is `Complete`.
    #[must_use]
    pub fn outcome(&self) -> Option<&OperationOutcome> {
        self.outcome.as_ref()
    }

    /// Take ownership of the outcome, leaving `None` behind.
    ///
    /// Drivers call this once after the session completes instead of cloning
    /// key material out of the session.
    #[must_use]
    pub fn take_outcome(&mut self) -> Option<OperationOutcome> {
        self.outcome.take()
    }

    /// Open the session by sending the challenge.
    ///
    /// `challenge_bytes` must come from a CSPRNG and be fresh per session;
    /// they are hex-encoded into the challenge string so the wire value is
    /// printable.
    ///
    /// # Errors
    ///
    /// - `SessionError::InvalidPhase` if not in Init phase
    pub fn start(&mut self, challenge_bytes: [u8; 32]) -> Result<Vec<ClientAction>, SessionError> {
        if self.phase != ClientPhase::Init {
            return Err(SessionError::InvalidPhase {
                phase: self.phase.name(),
                operation: "start",
            });
        }

        self.challenge = hex::encode(challenge_bytes);
        self.phase = ClientPhase::ChallengeSent;

        let payload = Payload::Challenge(Challenge { challenge: self.challenge.clone() });
        let frame = payload.into_frame(FrameHeader::new(Opcode::Challenge))?;

        Ok(vec![ClientAction::SendFrame(frame)])
    }

    /// Process incoming frame and update phase.
    ///
    /// A valid operation response (or an error payload in its place) stores
    /// the outcome and returns a `Close` action; there is never a third
    /// round trip. Every error drops the session into `Closed`: a single
    /// unexpected frame ends the conversation.
    ///
    /// # Errors
    ///
    /// - `SessionError::AuthFailed` if the server's signature does not
    ///   verify; the operation frame (and the handle inside it) is never
    ///   produced in that case
    /// - `SessionError::UnexpectedFrame` if the opcode is invalid for the
    ///   current phase
    /// - `SessionError::Protocol` if payload deserialization fails
    pub fn handle_frame(&mut self, frame: &Frame) -> Result<Vec<ClientAction>, SessionError> {
        let phase_name = self.phase.name();

        let Some(opcode) = frame.header.opcode_enum() else {
            self.phase = ClientPhase::Closed;
            return Err(SessionError::UnexpectedFrame {
                phase: phase_name,
                opcode: frame.header.opcode(),
            });
        };

        match (self.phase, opcode) {
            (ClientPhase::ChallengeSent, Opcode::ChallengeReply) => {
                let payload = match Payload::from_frame(frame) {
                    Ok(payload) => payload,
                    Err(err) => {
                        self.phase = ClientPhase::Closed;
                        return Err(err.into());
                    },
                };

                let Payload::ChallengeReply(ChallengeReply { sig }) = payload else {
                    self.phase = ClientPhase::Closed;
                    return Err(SessionError::InvalidPayload {
                        expected: "ChallengeReply",
                        opcode: Opcode::ChallengeReply.to_u16(),
                    });
                };

                if let Err(err) = verify_challenge(&self.server_pk, self.challenge.as_bytes(), &sig)
                {
                    self.phase = ClientPhase::Closed;
                    return Err(SessionError::AuthFailed(err));
                }

                self.phase = ClientPhase::OperationSent;

                let payload = match self.request {
                    OperationRequest::Set { timelock_secs } => {
                        Payload::SetRequest(SetRequest { timelock: timelock_secs })
                    },
                    OperationRequest::Ping { id } => Payload::PingRequest(PingRequest { id }),
                    OperationRequest::Get { id } => Payload::GetRequest(GetRequest { id }),
                };
                let opcode = payload.opcode();
                let frame = payload.into_frame(FrameHeader::new(opcode))?;

                Ok(vec![ClientAction::SendFrame(frame)])
            },

            (ClientPhase::OperationSent, Opcode::SetResponse)
                if matches!(self.request, OperationRequest::Set { .. }) =>
            {
                let payload = self.decode_or_close(frame)?;

                match payload {
                    Payload::SetResponse(response) => {
                        self.outcome = Some(OperationOutcome::Set {
                            sender: response.sender,
                            receiver: response.receiver,
                            key: response.key,
                        });
                        self.complete()
                    },
                    _ => {
                        self.phase = ClientPhase::Closed;
                        Err(SessionError::InvalidPayload {
                            expected: "SetResponse",
                            opcode: Opcode::SetResponse.to_u16(),
                        })
                    },
                }
            },

            (ClientPhase::OperationSent, Opcode::PingResponse)
                if matches!(self.request, OperationRequest::Ping { .. }) =>
            {
                let payload = self.decode_or_close(frame)?;

                match payload {
                    Payload::PingResponse(response) => {
                        self.outcome = Some(OperationOutcome::Ping { status: response.status });
                        self.complete()
                    },
                    _ => {
                        self.phase = ClientPhase::Closed;
                        Err(SessionError::InvalidPayload {
                            expected: "PingResponse",
                            opcode: Opcode::PingResponse.to_u16(),
                        })
                    },
                }
            },

            (ClientPhase::OperationSent, Opcode::GetResponse)
                if matches!(self.request, OperationRequest::Get { .. }) =>
            {
                let payload = self.decode_or_close(frame)?;

                match payload {
                    Payload::GetResponse(response) => {
                        self.outcome = Some(OperationOutcome::Get {
                            status: response.status,
                            key: response.key,
                        });
                        self.complete()
                    },
                    _ => {
                        self.phase = ClientPhase::Closed;
                        Err(SessionError::InvalidPayload {
                            expected: "GetResponse",
                            opcode: Opcode::GetResponse.to_u16(),
                        })
                    },
                }
            },

            // Semantic rejection in place of the normal response
            (ClientPhase::OperationSent, Opcode::Error) => {
                let payload = self.decode_or_close(frame)?;

                match payload {
                    Payload::Error(error) => {
                        self.outcome = Some(OperationOutcome::Rejected {
                            code: error.code,
                            message: error.message,
                        });
                        self.complete()
                    },
                    _ => {
                        self.phase = ClientPhase::Closed;
                        Err(SessionError::InvalidPayload {
                            expected: "Error",
                            opcode: Opcode::Error.to_u16(),
                        })
                    },
                }
            },

            // Default: unexpected frame for current phase
            (_, opcode) => {
                self.phase = ClientPhase::Closed;
                Err(SessionError::UnexpectedFrame { phase: phase_name, opcode: opcode.to_u16() })
            },
        }
    }

    fn decode_or_close(&mut self, frame: &Frame) -> Result<Payload, SessionError> {
        match Payload::from_frame(frame) {
            Ok(payload) => Ok(payload),
            Err(err) => {
                self.phase = ClientPhase::Closed;
                Err(err.into())
            },
        }
    }

    /// The response is in; tell the driver to hang up.
    fn complete(&mut self) -> Result<Vec<ClientAction>, SessionError> {
        self.phase = ClientPhase::Complete;
        Ok(vec![ClientAction::Close { reason: "session complete".to_owned() }])
    }
}

/// Server session state machine
///
/// Signs the client's challenge, then decodes exactly one operation and
/// hands it to the driver as an [`ServerAction::Execute`]. The driver runs
/// the operation and finishes via [`ServerSession::complete`].
///
/// This is a pure state machine - no I/O, no store access.
#[derive(Debug, Clone, Default)]
pub struct ServerSession {
    phase: ServerPhase,
}

impl ServerSession {
    /// Create a session awaiting its challenge.
    #[must_use]
    pub fn new() -> Self {
        Self { phase: ServerPhase::AwaitChallenge }
    }

    /// Current session phase
    #[must_use]
    pub fn phase(&self) -> ServerPhase {
        self.phase
    }

    /// Process incoming frame and update phase.
    ///
    /// Every error drops the session into `Closed`; the driver closes the
    /// connection without sending a payload.
    ///
    /// # Errors
    ///
    /// - `SessionError::InvalidChallenge` if the challenge length is outside
    ///   the accepted bounds
    /// - `SessionError::UnexpectedFrame` if the opcode is invalid for the
    ///   current phase
    /// - `SessionError::Protocol` if payload deserialization fails
    pub fn handle_frame(
        &mut self,
        frame: &Frame,
        identity: &ServerIdentity,
    ) -> Result<Vec<ServerAction>, SessionError> {
        let phase_name = self.phase.name();

        let Some(opcode) = frame.header.opcode_enum() else {
            self.phase = ServerPhase::Closed;
            return Err(SessionError::UnexpectedFrame {
                phase: phase_name,
                opcode: frame.header.opcode(),
            });
        };

        match (self.phase, opcode) {
            (ServerPhase::AwaitChallenge, Opcode::Challenge) => {
                let payload = match Payload::from_frame(frame) {
                    Ok(payload) => payload,
                    Err(err) => {
                        self.phase = ServerPhase::Closed;
                        return Err(err.into());
                    },
                };

                let Payload::Challenge(Challenge { challenge }) = payload else {
                    self.phase = ServerPhase::Closed;
                    return Err(SessionError::InvalidPayload {
                        expected: "Challenge",
                        opcode: Opcode::Challenge.to_u16(),
                    });
                };

                let len = challenge.len();
                if len < Challenge::MIN_LEN || len > Challenge::MAX_LEN {
                    self.phase = ServerPhase::Closed;
                    return Err(SessionError::InvalidChallenge(format!(
                        "challenge length {len} outside {}..={}",
                        Challenge::MIN_LEN,
                        Challenge::MAX_LEN
                    )));
                }

                let sig = identity.sign_challenge(challenge.as_bytes());
                self.phase = ServerPhase::AwaitOperation;

                let reply = Payload::ChallengeReply(ChallengeReply { sig });
                let frame = reply.into_frame(FrameHeader::new(Opcode::ChallengeReply))?;

                Ok(vec![ServerAction::SendFrame(frame)])
            },

            (ServerPhase::AwaitOperation, Opcode::SetRequest) => {
                let payload = self.decode_or_close(frame)?;

                match payload {
                    Payload::SetRequest(request) => {
                        self.phase = ServerPhase::Executing;
                        Ok(vec![ServerAction::Execute(OperationRequest::Set {
                            timelock_secs: request.timelock,
                        })])
                    },
                    _ => {
                        self.phase = ServerPhase::Closed;
                        Err(SessionError::InvalidPayload {
                            expected: "SetRequest",
                            opcode: Opcode::SetRequest.to_u16(),
                        })
                    },
                }
            },

            (ServerPhase::AwaitOperation, Opcode::PingRequest) => {
                let payload = self.decode_or_close(frame)?;

                match payload {
                    Payload::PingRequest(request) => {
                        self.phase = ServerPhase::Executing;
                        Ok(vec![ServerAction::Execute(OperationRequest::Ping {
                            id: request.id,
                        })])
                    },
                    _ => {
                        self.phase = ServerPhase::Closed;
                        Err(SessionError::InvalidPayload {
                            expected: "PingRequest",
                            opcode: Opcode::PingRequest.to_u16(),
                        })
                    },
                }
            },

            (ServerPhase::AwaitOperation, Opcode::GetRequest) => {
                let payload = self.decode_or_close(frame)?;

                match payload {
                    Payload::GetRequest(request) => {
                        self.phase = ServerPhase::Executing;
                        Ok(vec![ServerAction::Execute(OperationRequest::Get { id: request.id })])
                    },
                    _ => {
                        self.phase = ServerPhase::Closed;
                        Err(SessionError::InvalidPayload {
                            expected: "GetRequest",
                            opcode: Opcode::GetRequest.to_u16(),
                        })
                    },
                }
            },

            // Default: unexpected frame for current phase
            (_, opcode) => {
                self.phase = ServerPhase::Closed;
                Err(SessionError::UnexpectedFrame { phase: phase_name, opcode: opcode.to_u16() })
            },
        }
    }

    /// Finish the operation with its response payload.
    ///
    /// Returns the frame to send followed by a Close: a session carries
    /// exactly one operation, so the response is always the last frame.
    ///
    /// # Errors
    ///
    /// - `SessionError::InvalidPhase` unless an operation is executing
    pub fn complete(&mut self, response: Payload) -> Result<Vec<ServerAction>, SessionError> {
        if self.phase != ServerPhase::Executing {
            return Err(SessionError::InvalidPhase {
                phase: self.phase.name(),
                operation: "complete",
            });
        }

        self.phase = ServerPhase::Done;

        let opcode = response.opcode();
        let frame = response.into_frame(FrameHeader::new(opcode))?;

        Ok(vec![ServerAction::SendFrame(frame), ServerAction::Close {
            reason: "session complete".to_string(),
        }])
    }

    fn decode_or_close(&mut self, frame: &Frame) -> Result<Payload, SessionError> {
        match Payload::from_frame(frame) {
            Ok(payload) => Ok(payload),
            Err(err) => {
                self.phase = ServerPhase::Closed;
                Err(err.into())
            },
        }
    }
}
