//! Fuzz target for `SharePackage::from_bytes`.
//!
//! Share packages travel out of band and get pasted into the receiver's
//! tool, so the decoder sees fully attacker-controlled input. Hunts for:
//! - Panics in CBOR deserialization or hex decoding
//! - Validation that accepts out-of-range path indices
//! - Re-encoding failures for accepted packages
//!
//! Every input must produce `Ok` or a structured error, never a panic.

#![no_main]

use libfuzzer_sys::fuzz_target;
use postalghost_proto::SharePackage;

fuzz_target!(|data: &[u8]| {
    let Ok(package) = SharePackage::from_bytes(data) else {
        return;
    };

    // Anything that decodes must also validate and re-encode without
    // panicking.
    let _ = package.validate();
    let _ = package.to_bytes();
});
