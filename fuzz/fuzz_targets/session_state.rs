//! Fuzz target for the session state machines.
//!
//! Builds structurally valid frames carrying arbitrary opcodes and payload
//! bytes and feeds them to a server session and a client session, hunting
//! for:
//! - Panics on out-of-phase or unknown opcodes
//! - Frames accepted after a terminal phase
//! - Payloads that crash signature verification
//!
//! Sessions must answer every frame with actions or a structured error.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use postalghost_core::{ClientSession, OperationRequest, ServerIdentity, ServerSession};
use postalghost_proto::{Frame, FrameHeader};

#[derive(Debug, Arbitrary)]
struct SessionInput {
    frames: Vec<FuzzFrame>,
}

#[derive(Debug, Arbitrary)]
struct FuzzFrame {
    opcode: u16,
    payload: Vec<u8>,
}

impl FuzzFrame {
    /// Raw frame bytes with valid magic, version, and flags so the frame
    /// survives header validation and reaches the session layer.
    fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(FrameHeader::SIZE + self.payload.len());
        buf.extend_from_slice(&FrameHeader::MAGIC.to_be_bytes());
        buf.push(FrameHeader::VERSION);
        buf.push(0);
        buf.extend_from_slice(&self.opcode.to_be_bytes());
        buf.extend_from_slice(&(self.payload.len() as u32).to_be_bytes());
        buf.extend_from_slice(&self.payload);
        buf
    }
}

fn fresh_client(identity: &ServerIdentity) -> ClientSession {
    let mut client =
        ClientSession::new(identity.verifying_key(), OperationRequest::Set { timelock_secs: 60 });
    let _ = client.start([7u8; 32]);
    client
}

fuzz_target!(|input: SessionInput| {
    let identity = ServerIdentity::from_seed([42u8; 32]);
    let mut server = ServerSession::new();
    let mut client = fresh_client(&identity);

    for fuzz_frame in &input.frames {
        let Ok(frame) = Frame::decode(&fuzz_frame.encode()) else {
            continue;
        };

        // A session that errors is dead; restart it so later frames still
        // exercise the early phases.
        if server.handle_frame(&frame, &identity).is_err() {
            server = ServerSession::new();
        }
        if client.handle_frame(&frame).is_err() {
            client = fresh_client(&identity);
        }
    }
});
