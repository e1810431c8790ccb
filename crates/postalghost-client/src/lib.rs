//! PostalGhost Client
//!
//! Sender and receiver workflows for the PostalGhost dead-man's switch.
//!
//! # Sender
//!
//! [`create_package`] places one timelocked key on each server and seals
//! the secret under every declared unlock path. The resulting
//! [`SharePackage`] travels to the receiver out of band; the
//! [`PingTarget`]s stay with the sender, who calls [`ping_all`] on cadence
//! to keep the deadlines ahead of the clock.
//!
//! # Receiver
//!
//! [`Receiver::recover`] polls the listed servers until every key of some
//! path unlocks, then decrypts. Unreachable servers are treated as
//! unknown, never as locked or failed, so they cannot block paths that do
//! not need them.
//!
//! # Trust Model
//!
//! Every connection authenticates the server in-band: the client sends a
//! fresh challenge and verifies the Ed25519 signature against the public
//! key it already holds, before any handle crosses the wire. TLS
//! certificates are deliberately not verified; see [`transport`] for why
//! that is sound here.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod composer;
mod connection;
mod error;
mod receiver;
mod recovery;
mod sender;
pub mod transport;

pub use composer::{compose_paths, validate_policy};
pub use connection::{KeyServer, perform};
pub use error::ClientError;
pub use postalghost_core::{Environment, SystemEnv};
pub use postalghost_proto::{Handle, KeyStatus, SharePackage};
pub use receiver::Receiver;
pub use recovery::{ProbeOutcome, RecoveryStatus, RecoveryTracker};
pub use sender::{CreatedShare, PingReport, PingTarget, create_package, ping_all};
