//! Property-based tests for the session state machines.
//!
//! These drive complete client/server transcripts over arbitrary inputs and
//! verify that both machines agree on the decoded operation, that forged
//! signatures never unlock the operation phase, and that frames outside the
//! expected order always close the session.

use postalghost_core::{
    ClientAction, ClientPhase, ClientSession, OperationOutcome, OperationRequest, ServerAction,
    ServerIdentity, ServerPhase, ServerSession, SessionError,
};
use postalghost_proto::{
    Challenge, ChallengeReply, Frame, FrameHeader, GetResponse, Handle, KeyStatus, Opcode,
    Payload, PingResponse, SetResponse,
};
use proptest::prelude::*;

/// Strategy for generating arbitrary 32-byte seeds
fn arbitrary_seed() -> impl Strategy<Value = [u8; 32]> {
    prop::collection::vec(any::<u8>(), 32).prop_map(|v| {
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&v);
        arr
    })
}

/// Strategy for generating arbitrary handles
fn arbitrary_handle() -> impl Strategy<Value = Handle> {
    prop::collection::vec(any::<u8>(), 16).prop_map(|v| {
        let mut arr = [0u8; 16];
        arr.copy_from_slice(&v);
        Handle::from_bytes(arr)
    })
}

/// Strategy covering all three operation requests
fn arbitrary_request() -> impl Strategy<Value = OperationRequest> {
    prop_oneof![
        any::<i64>().prop_map(|timelock_secs| OperationRequest::Set { timelock_secs }),
        arbitrary_handle().prop_map(|id| OperationRequest::Ping { id }),
        arbitrary_handle().prop_map(|id| OperationRequest::Get { id }),
    ]
}

fn sent(actions: &[ClientAction]) -> Frame {
    match actions.first().expect("client emitted an action") {
        ClientAction::SendFrame(frame) => frame.clone(),
        ClientAction::Close { reason } => panic!("expected SendFrame, got Close: {reason}"),
    }
}

fn served(actions: &[ServerAction]) -> Frame {
    match actions.first().expect("server emitted an action") {
        ServerAction::SendFrame(frame) => frame.clone(),
        other => panic!("expected SendFrame, got {other:?}"),
    }
}

/// Builds a structurally valid empty frame carrying a raw opcode value,
/// including values no `Opcode` variant is assigned to.
fn raw_frame(opcode: u16) -> Frame {
    let mut bytes = Vec::with_capacity(FrameHeader::SIZE);
    bytes.extend_from_slice(&FrameHeader::MAGIC.to_be_bytes());
    bytes.push(FrameHeader::VERSION);
    bytes.push(0); // flags
    bytes.extend_from_slice(&opcode.to_be_bytes());
    bytes.extend_from_slice(&0u32.to_be_bytes());
    Frame::decode(&bytes).expect("header is structurally valid")
}

#[test]
fn prop_any_request_survives_the_transcript() {
    proptest!(|(seed in arbitrary_seed(), request in arbitrary_request())| {
        let identity = ServerIdentity::from_seed([11; 32]);
        let mut client = ClientSession::new(identity.verifying_key(), request);
        let mut server = ServerSession::new();

        let challenge = sent(&client.start(seed).expect("start should succeed"));
        let reply =
            served(&server.handle_frame(&challenge, &identity).expect("challenge accepted"));
        let op_frame = sent(&client.handle_frame(&reply).expect("signature verifies"));

        let actions = server.handle_frame(&op_frame, &identity).expect("operation accepted");
        let ServerAction::Execute(decoded) = actions[0] else {
            panic!("expected Execute, got {:?}", actions[0]);
        };

        // PROPERTY: The server decodes exactly the operation the client sent
        prop_assert_eq!(decoded, request);
        prop_assert_eq!(server.phase(), ServerPhase::Executing);

        let (response, expected) = match request {
            OperationRequest::Set { .. } => (
                Payload::SetResponse(SetResponse {
                    sender: Handle::from_bytes([1; 16]),
                    receiver: Handle::from_bytes([2; 16]),
                    key: [3; 32],
                }),
                OperationOutcome::Set {
                    sender: Handle::from_bytes([1; 16]),
                    receiver: Handle::from_bytes([2; 16]),
                    key: [3; 32],
                },
            ),
            OperationRequest::Ping { .. } => (
                Payload::PingResponse(PingResponse { status: KeyStatus::Locked }),
                OperationOutcome::Ping { status: KeyStatus::Locked },
            ),
            OperationRequest::Get { .. } => (
                Payload::GetResponse(GetResponse {
                    status: KeyStatus::Unlocked,
                    key: Some([7; 32]),
                }),
                OperationOutcome::Get { status: KeyStatus::Unlocked, key: Some([7; 32]) },
            ),
        };

        let actions = server.complete(response).expect("complete should succeed");
        client.handle_frame(&served(&actions)).expect("response accepted");

        // PROPERTY: The client ends Complete with the matching outcome
        prop_assert_eq!(client.phase(), ClientPhase::Complete);
        prop_assert_eq!(client.take_outcome(), Some(expected));
    });
}

#[test]
fn prop_forged_signature_never_reaches_the_operation() {
    proptest!(|(
        seed in arbitrary_seed(),
        request in arbitrary_request(),
        sig in prop::collection::vec(any::<u8>(), 64),
    )| {
        let identity = ServerIdentity::from_seed([22; 32]);
        let mut client = ClientSession::new(identity.verifying_key(), request);

        let challenge_frame = sent(&client.start(seed).expect("start should succeed"));
        let Payload::Challenge(Challenge { challenge }) =
            Payload::from_frame(&challenge_frame).expect("challenge decodes")
        else {
            panic!("client opened with a non-challenge frame");
        };

        // Ed25519 with strict verification accepts exactly one signature for
        // a given key and message; anything else must fail.
        let genuine = identity.sign_challenge(challenge.as_bytes());
        let mut forged_sig = [0u8; 64];
        forged_sig.copy_from_slice(&sig);
        prop_assume!(forged_sig != genuine);

        let forged = Payload::ChallengeReply(ChallengeReply { sig: forged_sig })
            .into_frame(FrameHeader::new(Opcode::ChallengeReply))
            .expect("reply encodes");

        // PROPERTY: Authentication fails and no operation frame is produced
        let err = client.handle_frame(&forged).expect_err("forged signature rejected");
        prop_assert!(err.is_auth_failure());
        prop_assert_eq!(client.phase(), ClientPhase::Closed);
        prop_assert!(client.outcome().is_none());
    });
}

#[test]
fn prop_unassigned_opcodes_always_close() {
    proptest!(|(seed in arbitrary_seed(), opcode in any::<u16>())| {
        prop_assume!(Opcode::from_u16(opcode).is_none());
        let identity = ServerIdentity::from_seed([33; 32]);
        let frame = raw_frame(opcode);

        // PROPERTY: A server drops the session on any unassigned opcode
        let mut server = ServerSession::new();
        let err = server.handle_frame(&frame, &identity).expect_err("unassigned rejected");
        let is_unexpected_frame = matches!(err, SessionError::UnexpectedFrame { .. });
        prop_assert!(is_unexpected_frame);
        prop_assert_eq!(server.phase(), ServerPhase::Closed);

        // PROPERTY: So does a client, at any point after start
        let mut client = ClientSession::new(
            identity.verifying_key(),
            OperationRequest::Set { timelock_secs: 60 },
        );
        client.start(seed).expect("start should succeed");
        let err = client.handle_frame(&frame).expect_err("unassigned rejected");
        let is_unexpected_frame = matches!(err, SessionError::UnexpectedFrame { .. });
        prop_assert!(is_unexpected_frame);
        prop_assert_eq!(client.phase(), ClientPhase::Closed);
    });
}

#[test]
fn prop_challenge_length_bounds_are_exact() {
    proptest!(|(challenge in "[ -~]{0,200}")| {
        let identity = ServerIdentity::from_seed([44; 32]);
        let mut server = ServerSession::new();
        let in_bounds =
            challenge.len() >= Challenge::MIN_LEN && challenge.len() <= Challenge::MAX_LEN;

        let frame = Payload::Challenge(Challenge { challenge })
            .into_frame(FrameHeader::new(Opcode::Challenge))
            .expect("challenge encodes");

        // PROPERTY: Acceptance depends on length bounds and nothing else
        match server.handle_frame(&frame, &identity) {
            Ok(actions) => {
                prop_assert!(in_bounds);
                prop_assert!(matches!(actions.first(), Some(ServerAction::SendFrame(_))));
                prop_assert_eq!(server.phase(), ServerPhase::AwaitOperation);
            },
            Err(err) => {
                prop_assert!(!in_bounds);
                prop_assert!(matches!(err, SessionError::InvalidChallenge(_)));
                prop_assert_eq!(server.phase(), ServerPhase::Closed);
            },
        }
    });
}
