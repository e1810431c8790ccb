//! Key store abstraction for PostalGhost servers.
//!
//! Trait-based abstraction for persisting key records. The trait is
//! synchronous (no async) to maintain a clean synchronous API design; all
//! operations are short point lookups and single-record writes.
//!
//! A record is indexed by both of its handles. The sender handle doubles as
//! the record key; the receiver handle resolves to it through a second
//! index. Records are never deleted: an unlocked key stays retrievable
//! indefinitely.

mod error;
mod memory;
mod redb;

pub use error::StoreError;
use postalghost_proto::{Handle, KeyStatus};
use serde::{Deserialize, Serialize};

pub use self::{memory::MemoryStore, redb::RedbStore};

/// Which side of a record a handle belongs to.
///
/// A handle works only for its own role: pinging a receiver handle or
/// getting a sender handle is treated exactly like an unknown handle, so a
/// stolen receiver handle reveals nothing about ping access and vice versa.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleRole {
    /// Handle used by the sender to refresh the deadline
    Sender,
    /// Handle used by the receiver to query the key
    Receiver,
}

/// One timelocked key held by this server.
///
/// `unlocks_at_ms` only ever moves forward, and only while the record is
/// still locked. Status is never stored; it is derived from the clock via
/// [`KeyRecord::status`].
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRecord {
    /// Sender handle; also the record key.
    pub sender: Handle,
    /// Receiver handle.
    pub receiver: Handle,
    /// Key material, generated once at creation, immutable.
    pub key: [u8; 32],
    /// Timelock duration in milliseconds.
    pub timelock_ms: u64,
    /// Creation time (unix epoch milliseconds).
    pub created_at_ms: u64,
    /// Current deadline (unix epoch milliseconds).
    pub unlocks_at_ms: u64,
}

impl KeyRecord {
    /// Lock status as derived at `now_ms`.
    #[must_use]
    pub const fn status(&self, now_ms: u64) -> KeyStatus {
        if now_ms >= self.unlocks_at_ms { KeyStatus::Unlocked } else { KeyStatus::Locked }
    }
}

impl std::fmt::Debug for KeyRecord {
    // Key material is deliberately omitted.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyRecord")
            .field("sender", &self.sender)
            .field("receiver", &self.receiver)
            .field("timelock_ms", &self.timelock_ms)
            .field("created_at_ms", &self.created_at_ms)
            .field("unlocks_at_ms", &self.unlocks_at_ms)
            .finish_non_exhaustive()
    }
}

/// Result of a conditional deadline update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Deadline was extended
    Updated,

    /// Record was already unlocked at `now_ms`; nothing was written
    ///
    /// Once a record unlocks it is frozen forever, so the store refuses
    /// the extension rather than relocking.
    AlreadyUnlocked,

    /// Stored deadline differs from the expected value; nothing was written
    Conflict {
        /// Deadline currently stored; retry the update against this value
        current_unlocks_at_ms: u64,
    },

    /// No record exists under this sender handle
    Missing,
}

/// Key store abstraction
///
/// Must be Clone (shared across connection tasks), Send + Sync
/// (thread-safe), and synchronous (no async methods). Implementations
/// typically share internal state via Arc, so clones access the same
/// underlying store.
///
/// # Panics
///
/// Implementations may panic if internal synchronization primitives are
/// poisoned (a thread panicked while holding a lock). Acceptable for
/// test/simulation code, but production implementations should handle
/// poisoned mutexes gracefully.
pub trait KeyStore: Clone + Send + Sync + 'static {
    /// Register a new record under both of its handles
    ///
    /// # Invariants
    ///
    /// - Pre: neither `record.sender` nor `record.receiver` is registered
    /// - Post: `lookup` resolves both handles to this record, atomically
    ///
    /// Returns [`StoreError::HandleInUse`] if either handle is taken; the
    /// caller regenerates handles and retries.
    fn insert(&self, record: &KeyRecord) -> Result<(), StoreError>;

    /// Resolve a handle to its role and record
    ///
    /// Returns `None` if the handle is not registered. Works for both
    /// sender and receiver handles; the caller enforces role restrictions.
    fn lookup(&self, handle: &Handle) -> Result<Option<(HandleRole, KeyRecord)>, StoreError>;

    /// Atomically extend a record's deadline
    ///
    /// `id` must be a sender handle (receiver handles resolve to
    /// [`UpdateOutcome::Missing`]). The whole read-compare-write runs
    /// inside one atomic section:
    ///
    /// - no record: `Missing`
    /// - `now_ms >= unlocks_at_ms`: `AlreadyUnlocked`, no write
    /// - `unlocks_at_ms != expected_unlocks_at_ms`: `Conflict`, no write
    /// - otherwise: write `new_unlocks_at_ms`, return `Updated`
    ///
    /// # Invariants
    ///
    /// - Post: `unlocks_at_ms` never decreases and an unlocked record is
    ///   never modified, even under concurrent updates
    fn compare_and_update(
        &self,
        id: &Handle,
        expected_unlocks_at_ms: u64,
        new_unlocks_at_ms: u64,
        now_ms: u64,
    ) -> Result<UpdateOutcome, StoreError>;
}
