//! Property-based tests for wire encoding/decoding
//!
//! These tests verify that frame and payload serialization is correct for ALL
//! valid inputs, not just specific examples. Uses proptest to generate
//! arbitrary values and verify round-trip properties.

use bytes::Bytes;
use postalghost_proto::{
    Challenge, ChallengeReply, ErrorPayload, Frame, FrameHeader, GetRequest, GetResponse, Handle,
    KeyStatus, Opcode, Payload, PingRequest, PingResponse, SetRequest, SetResponse,
};
use proptest::prelude::*;

/// Strategy for generating arbitrary opcodes
fn arbitrary_opcode() -> impl Strategy<Value = Opcode> {
    prop_oneof![
        Just(Opcode::Challenge),
        Just(Opcode::ChallengeReply),
        Just(Opcode::SetRequest),
        Just(Opcode::SetResponse),
        Just(Opcode::PingRequest),
        Just(Opcode::PingResponse),
        Just(Opcode::GetRequest),
        Just(Opcode::GetResponse),
        Just(Opcode::Error),
    ]
}

/// Strategy for generating arbitrary handles
fn arbitrary_handle() -> impl Strategy<Value = Handle> {
    prop::collection::vec(any::<u8>(), 16).prop_map(|v| {
        let mut arr = [0u8; 16];
        arr.copy_from_slice(&v);
        Handle::from_bytes(arr)
    })
}

/// Strategy for generating arbitrary 32-byte keys
fn arbitrary_key() -> impl Strategy<Value = [u8; 32]> {
    prop::collection::vec(any::<u8>(), 32).prop_map(|v| {
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&v);
        arr
    })
}

fn arbitrary_status() -> impl Strategy<Value = KeyStatus> {
    prop_oneof![Just(KeyStatus::Locked), Just(KeyStatus::Unlocked)]
}

/// Strategy for generating arbitrary payloads across every opcode
fn arbitrary_payload() -> impl Strategy<Value = Payload> {
    prop_oneof![
        "[0-9a-f]{2,64}".prop_map(|challenge| Payload::Challenge(Challenge { challenge })),
        prop::collection::vec(any::<u8>(), 64).prop_map(|v| {
            let mut sig = [0u8; 64];
            sig.copy_from_slice(&v);
            Payload::ChallengeReply(ChallengeReply { sig })
        }),
        any::<i64>().prop_map(|timelock| Payload::SetRequest(SetRequest { timelock })),
        (arbitrary_handle(), arbitrary_handle(), arbitrary_key()).prop_map(
            |(sender, receiver, key)| Payload::SetResponse(SetResponse { sender, receiver, key })
        ),
        arbitrary_handle().prop_map(|id| Payload::PingRequest(PingRequest { id })),
        arbitrary_status().prop_map(|status| Payload::PingResponse(PingResponse { status })),
        arbitrary_handle().prop_map(|id| Payload::GetRequest(GetRequest { id })),
        (arbitrary_status(), prop::option::of(arbitrary_key()))
            .prop_map(|(status, key)| Payload::GetResponse(GetResponse { status, key })),
        ("[ -~]{0,64}", any::<u16>())
            .prop_map(|(message, code)| Payload::Error(ErrorPayload { code, message })),
    ]
}

/// Strategy for generating arbitrary frames with payloads
fn arbitrary_frame() -> impl Strategy<Value = Frame> {
    (
        arbitrary_opcode(),
        prop::collection::vec(any::<u8>(), 0..1024), // payload up to 1KB
    )
        .prop_map(|(opcode, payload)| Frame::new(FrameHeader::new(opcode), Bytes::from(payload)))
}

#[test]
fn prop_frame_encode_decode_roundtrip() {
    proptest!(|(frame in arbitrary_frame())| {
        // Encode frame to bytes
        let mut buf = Vec::new();
        frame.encode(&mut buf).expect("encode should succeed");

        // Decode bytes back to frame
        let decoded = Frame::decode(&buf).expect("decode should succeed");

        // PROPERTY: Round-trip must be identity
        prop_assert_eq!(decoded.header, frame.header, "Header mismatch after round-trip");
        prop_assert_eq!(decoded.payload, frame.payload, "Payload content mismatch");
    });
}

#[test]
fn prop_frame_empty_payload() {
    proptest!(|(opcode in arbitrary_opcode())| {
        // Create frame with empty payload
        let frame = Frame::new(FrameHeader::new(opcode), Bytes::new());

        // Encode and decode
        let mut buf = Vec::new();
        frame.encode(&mut buf).expect("encode should succeed");

        let decoded = Frame::decode(&buf).expect("decode should succeed");

        // PROPERTY: Empty payload preserved
        prop_assert_eq!(decoded.payload.len(), 0, "Empty payload should remain empty");
        prop_assert_eq!(decoded.header.payload_size(), 0, "Header should show 0 payload");
    });
}

#[test]
fn prop_frame_opcode_preservation() {
    proptest!(|(opcode in arbitrary_opcode())| {
        let frame = Frame::new(FrameHeader::new(opcode), Bytes::new());

        // Encode and decode
        let mut buf = Vec::new();
        frame.encode(&mut buf).expect("encode should succeed");

        let decoded = Frame::decode(&buf).expect("decode should succeed");

        // PROPERTY: Opcode must be preserved exactly
        prop_assert_eq!(
            decoded.header.opcode_enum(),
            Some(opcode),
            "Opcode not preserved: expected {:?}, got {:?}",
            opcode,
            decoded.header.opcode_enum()
        );
    });
}

#[test]
fn prop_frame_encoded_size_correct() {
    proptest!(|(frame in arbitrary_frame())| {
        // Encode frame
        let mut buf = Vec::new();
        frame.encode(&mut buf).expect("encode should succeed");

        // PROPERTY: Encoded size must equal header size + payload size
        #[allow(clippy::arithmetic_side_effects)] // Test code: values bounded by property test
        let expected_size = FrameHeader::SIZE + frame.payload.len();
        prop_assert_eq!(
            buf.len(),
            expected_size,
            "Encoded size mismatch: expected {}, got {}",
            expected_size,
            buf.len()
        );
    });
}

#[test]
fn prop_payload_frame_roundtrip() {
    proptest!(|(payload in arbitrary_payload())| {
        let header = FrameHeader::new(payload.opcode());
        let frame = payload.clone().into_frame(header).expect("into_frame should succeed");

        // Send over the wire and back
        let mut buf = Vec::new();
        frame.encode(&mut buf).expect("encode should succeed");
        let received = Frame::decode(&buf).expect("decode should succeed");

        let decoded = Payload::from_frame(&received).expect("from_frame should succeed");

        // PROPERTY: The payload survives the full wire trip unchanged
        prop_assert_eq!(decoded, payload);
    });
}

#[test]
fn prop_payload_opcode_matches_frame() {
    proptest!(|(payload in arbitrary_payload())| {
        // Build the frame with a header whose opcode disagrees on purpose;
        // into_frame must overwrite it with the payload's own opcode.
        let header = FrameHeader::new(Opcode::Error);
        let expected = payload.opcode();
        let frame = payload.into_frame(header).expect("into_frame should succeed");

        // PROPERTY: Frame opcode always comes from the payload
        prop_assert_eq!(frame.header.opcode_enum(), Some(expected));
    });
}

#[test]
fn prop_decode_never_panics_on_arbitrary_bytes() {
    proptest!(|(bytes in prop::collection::vec(any::<u8>(), 0..256))| {
        // PROPERTY: Malformed input produces errors, never panics
        let _ = Frame::decode(&bytes);
    });
}
