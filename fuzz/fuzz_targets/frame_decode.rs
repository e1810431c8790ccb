//! Fuzz target for `Frame::decode`.
//!
//! Feeds arbitrary byte sequences to the frame parser hunting for:
//! - Panics or crashes in header validation
//! - Integer overflows in the size arithmetic
//! - Buffer over-reads past the payload boundary
//!
//! Every input must produce `Ok` or a structured error, never a panic.

#![no_main]

use libfuzzer_sys::fuzz_target;
use postalghost_proto::Frame;

fuzz_target!(|data: &[u8]| {
    let _ = Frame::decode(data);
});
