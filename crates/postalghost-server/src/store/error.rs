//! Key store error types.

/// Errors from key store operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// I/O error from the underlying database
    #[error("store I/O error: {0}")]
    Io(String),

    /// Record could not be serialized or deserialized
    #[error("store serialization error: {0}")]
    Serialization(String),

    /// Stored data violates an internal invariant
    ///
    /// Indicates on-disk corruption or a bug. The affected record is
    /// unusable; other records are unaffected.
    #[error("store corruption: {0}")]
    Corrupt(String),

    /// A handle in the record is already registered
    ///
    /// Handles are random 128-bit values, so a collision on insert means
    /// the caller should regenerate and retry.
    #[error("handle already in use")]
    HandleInUse,
}
