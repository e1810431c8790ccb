//! PostalGhost Cryptographic Primitives
//!
//! Key composition and authenticated sealing for unlock paths. Pure
//! functions with deterministic outputs. Callers provide random bytes for
//! deterministic testing.
//!
//! # Key Flow
//!
//! Each server hands out one 32-byte key at `set` time. The client combines
//! a chosen subset of those keys into a composite and seals the secret under
//! it. Sealing the same secret under several different subsets expresses
//! OR-of-AND policies without any server learning the policy.
//!
//! ```text
//! Server Keys (one per set)
//!        │
//!        ▼
//! combine → Composite Key (byte-wise sum mod 256)
//!        │
//!        ▼
//! seal → nonce(24) || ciphertext || tag(16)
//! ```
//!
//! # Security
//!
//! Key Composition:
//! - A composite is recoverable only with EVERY key in its subset; missing
//!   one leaves each output byte uniformly distributed
//! - Commutative and associative, so recovery order never matters
//!
//! Authenticity:
//! - XChaCha20-Poly1305 AEAD provides tamper-proof sealing
//! - Opening with the wrong composite fails authentication; it never
//!   produces wrong plaintext
//!
//! Hygiene:
//! - Composite keys are zeroized on drop
//! - `Debug` never prints key bytes

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod combine;
mod error;
mod seal;

pub use combine::{CompositeKey, combine};
pub use error::SealError;
pub use seal::{MIN_SEALED_SIZE, NONCE_SIZE, TAG_SIZE, open, seal};
