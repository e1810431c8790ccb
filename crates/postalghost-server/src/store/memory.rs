#![allow(clippy::disallowed_types, reason = "Synchronous in-memory operations only")]

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use postalghost_proto::Handle;

use super::{HandleRole, KeyRecord, KeyStore, StoreError, UpdateOutcome};

/// In-memory key store for testing and ephemeral deployments
///
/// Uses `HashMap` for both indexes. All state is wrapped in Arc<Mutex<>> to
/// allow Clone and concurrent access. Thread-safe through Mutex, but uses
/// `lock().expect()` which will panic if the mutex is poisoned - acceptable
/// for test code. The mutex also makes every operation atomic, which is
/// exactly what `compare_and_update` requires.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryStoreInner>>,
}

struct MemoryStoreInner {
    /// Handle index, maps any handle -> (role, sender handle)
    handles: HashMap<Handle, (HandleRole, Handle)>,

    /// Records keyed by sender handle
    records: HashMap<Handle, KeyRecord>,
}

impl MemoryStore {
    /// Create a new empty `MemoryStore`
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MemoryStoreInner {
                handles: HashMap::new(),
                records: HashMap::new(),
            })),
        }
    }

    /// Number of stored records.
    ///
    /// Useful for debugging and testing.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned (a thread panicked while
    /// holding the lock). This is acceptable for test/simulation code.
    #[allow(clippy::expect_used)]
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.inner.lock().expect("Mutex poisoned").records.len()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyStore for MemoryStore {
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned. This is acceptable for test
    /// code.
    #[allow(clippy::expect_used)]
    fn insert(&self, record: &KeyRecord) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("Mutex poisoned");

        if inner.handles.contains_key(&record.sender)
            || inner.handles.contains_key(&record.receiver)
        {
            return Err(StoreError::HandleInUse);
        }

        inner.handles.insert(record.sender, (HandleRole::Sender, record.sender));
        inner.handles.insert(record.receiver, (HandleRole::Receiver, record.sender));
        inner.records.insert(record.sender, record.clone());

        Ok(())
    }

    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned. This is acceptable for test
    /// code.
    #[allow(clippy::expect_used)]
    fn lookup(&self, handle: &Handle) -> Result<Option<(HandleRole, KeyRecord)>, StoreError> {
        let inner = self.inner.lock().expect("Mutex poisoned");

        let Some(&(role, sender)) = inner.handles.get(handle) else {
            return Ok(None);
        };

        let record = inner.records.get(&sender).ok_or_else(|| {
            StoreError::Corrupt(format!("handle {handle:?} resolves to a missing record"))
        })?;

        Ok(Some((role, record.clone())))
    }

    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned. This is acceptable for test
    /// code.
    #[allow(clippy::expect_used)]
    fn compare_and_update(
        &self,
        id: &Handle,
        expected_unlocks_at_ms: u64,
        new_unlocks_at_ms: u64,
        now_ms: u64,
    ) -> Result<UpdateOutcome, StoreError> {
        let mut inner = self.inner.lock().expect("Mutex poisoned");

        let Some(record) = inner.records.get_mut(id) else {
            return Ok(UpdateOutcome::Missing);
        };

        if now_ms >= record.unlocks_at_ms {
            return Ok(UpdateOutcome::AlreadyUnlocked);
        }

        if record.unlocks_at_ms != expected_unlocks_at_ms {
            return Ok(UpdateOutcome::Conflict { current_unlocks_at_ms: record.unlocks_at_ms });
        }

        record.unlocks_at_ms = new_unlocks_at_ms;

        Ok(UpdateOutcome::Updated)
    }
}
