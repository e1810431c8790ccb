//! PostalGhost Core
//!
//! Shared session logic for servers and clients: the Ed25519 server
//! identity, the challenge signature scheme, and the two pure state
//! machines that drive a connection's two round trips. Transport and
//! storage live in the server and client crates; this crate owns the
//! protocol's behavior.
//!
//! # Design
//!
//! - State machines return actions instead of performing I/O
//!   ([`ClientSession`], [`ServerSession`])
//! - Time and randomness come through the [`Environment`] trait, so tests
//!   run against a deterministic clock and RNG
//! - [`SystemEnv`] is the production implementation backed by the OS

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod env;
mod error;
mod identity;
mod session;
mod system_env;

pub use env::Environment;
pub use error::{IdentityError, SessionError};
pub use identity::{CHALLENGE_CONTEXT, ServerIdentity, verify_challenge};
pub use session::{
    ClientAction, ClientPhase, ClientSession, OperationOutcome, OperationRequest, ServerAction,
    ServerPhase, ServerSession,
};
pub use system_env::SystemEnv;
