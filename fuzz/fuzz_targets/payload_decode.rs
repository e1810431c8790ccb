//! Fuzz target for `Payload::decode`.
//!
//! Runs arbitrary bytes through the CBOR payload decoder under every
//! opcode, hunting for:
//! - Malformed CBOR that panics instead of erroring
//! - Type confusion between payload variants
//! - Oversized strings or collections
//!
//! Every input must produce `Ok` or a structured error, never a panic.

#![no_main]

use libfuzzer_sys::fuzz_target;
use postalghost_proto::{Opcode, Payload};

fuzz_target!(|data: &[u8]| {
    let opcodes = [
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

    for opcode in opcodes {
        let _ = Payload::decode(opcode, data);
    }
});
