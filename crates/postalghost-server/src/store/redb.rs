//! Redb-backed durable key store.
//!
//! Uses Redb's ACID transactions with Copy-on-Write for crash safety.
//! Records survive server restarts, which a dead-man's-switch requires:
//! losing a record would silently void the sender's policy.

use std::{path::Path, sync::Arc};

use postalghost_proto::Handle;
use redb::{Database, ReadableTable, TableDefinition};

use super::{HandleRole, KeyRecord, KeyStore, StoreError, UpdateOutcome};

/// Table: handles
/// Key: handle bytes [16 bytes]
/// Value: role byte + sender handle bytes [17 bytes]
const HANDLES: TableDefinition<&[u8], &[u8]> = TableDefinition::new("handles");

/// Table: records
/// Key: sender handle bytes [16 bytes]
/// Value: CBOR-encoded KeyRecord
const RECORDS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("records");

const ROLE_SENDER: u8 = 1;
const ROLE_RECEIVER: u8 = 2;

/// Durable key store backed by Redb.
///
/// Thread-safe through Redb's internal locking; write transactions are
/// serialized, which makes `compare_and_update` a single atomic
/// read-compare-write. Clone is cheap (Arc).
#[derive(Clone)]
pub struct RedbStore {
    db: Arc<Database>,
}

impl RedbStore {
    /// Open or create a Redb database at the given path.
    ///
    /// Creates tables if they don't exist (HANDLES, RECORDS).
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Io` if the database cannot be opened or created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = Database::create(path.as_ref()).map_err(|e| StoreError::Io(e.to_string()))?;

        let txn = db.begin_write().map_err(|e| StoreError::Io(e.to_string()))?;
        {
            let _ = txn.open_table(HANDLES).map_err(|e| StoreError::Io(e.to_string()))?;
            let _ = txn.open_table(RECORDS).map_err(|e| StoreError::Io(e.to_string()))?;
        }
        txn.commit().map_err(|e| StoreError::Io(e.to_string()))?;

        Ok(Self { db: Arc::new(db) })
    }
}

impl KeyStore for RedbStore {
    fn insert(&self, record: &KeyRecord) -> Result<(), StoreError> {
        let txn = self.db.begin_write().map_err(|e| StoreError::Io(e.to_string()))?;

        {
            let mut handles = txn.open_table(HANDLES).map_err(|e| StoreError::Io(e.to_string()))?;

            // Uncommitted transactions abort on drop, so returning early
            // leaves the store untouched.
            let sender_taken = handles
                .get(record.sender.as_bytes().as_slice())
                .map_err(|e| StoreError::Io(e.to_string()))?
                .is_some();
            let receiver_taken = handles
                .get(record.receiver.as_bytes().as_slice())
                .map_err(|e| StoreError::Io(e.to_string()))?
                .is_some();

            if sender_taken || receiver_taken {
                return Err(StoreError::HandleInUse);
            }

            handles
                .insert(
                    record.sender.as_bytes().as_slice(),
                    encode_handle_entry(ROLE_SENDER, &record.sender).as_slice(),
                )
                .map_err(|e| StoreError::Io(e.to_string()))?;
            handles
                .insert(
                    record.receiver.as_bytes().as_slice(),
                    encode_handle_entry(ROLE_RECEIVER, &record.sender).as_slice(),
                )
                .map_err(|e| StoreError::Io(e.to_string()))?;
        }

        {
            let mut records = txn.open_table(RECORDS).map_err(|e| StoreError::Io(e.to_string()))?;

            let mut bytes = Vec::new();
            ciborium::into_writer(record, &mut bytes)
                .map_err(|e| StoreError::Serialization(e.to_string()))?;

            records
                .insert(record.sender.as_bytes().as_slice(), bytes.as_slice())
                .map_err(|e| StoreError::Io(e.to_string()))?;
        }

        txn.commit().map_err(|e| StoreError::Io(e.to_string()))?;

        Ok(())
    }

    fn lookup(&self, handle: &Handle) -> Result<Option<(HandleRole, KeyRecord)>, StoreError> {
        let txn = self.db.begin_read().map_err(|e| StoreError::Io(e.to_string()))?;

        let handles = txn.open_table(HANDLES).map_err(|e| StoreError::Io(e.to_string()))?;

        let entry = match handles
            .get(handle.as_bytes().as_slice())
            .map_err(|e| StoreError::Io(e.to_string()))?
        {
            Some(value) => decode_handle_entry(value.value())?,
            None => return Ok(None),
        };
        let (role, sender) = entry;

        let records = txn.open_table(RECORDS).map_err(|e| StoreError::Io(e.to_string()))?;

        match records
            .get(sender.as_bytes().as_slice())
            .map_err(|e| StoreError::Io(e.to_string()))?
        {
            Some(value) => Ok(Some((role, decode_record(value.value())?))),
            None => Err(StoreError::Corrupt(format!(
                "handle {handle:?} resolves to a missing record"
            ))),
        }
    }

    fn compare_and_update(
        &self,
        id: &Handle,
        expected_unlocks_at_ms: u64,
        new_unlocks_at_ms: u64,
        now_ms: u64,
    ) -> Result<UpdateOutcome, StoreError> {
        let txn = self.db.begin_write().map_err(|e| StoreError::Io(e.to_string()))?;

        {
            let mut records = txn.open_table(RECORDS).map_err(|e| StoreError::Io(e.to_string()))?;

            let stored = match records
                .get(id.as_bytes().as_slice())
                .map_err(|e| StoreError::Io(e.to_string()))?
            {
                Some(value) => Some(decode_record(value.value())?),
                None => None,
            };

            let Some(mut record) = stored else {
                return Ok(UpdateOutcome::Missing);
            };

            if now_ms >= record.unlocks_at_ms {
                return Ok(UpdateOutcome::AlreadyUnlocked);
            }

            if record.unlocks_at_ms != expected_unlocks_at_ms {
                return Ok(UpdateOutcome::Conflict {
                    current_unlocks_at_ms: record.unlocks_at_ms,
                });
            }

            record.unlocks_at_ms = new_unlocks_at_ms;

            let mut bytes = Vec::new();
            ciborium::into_writer(&record, &mut bytes)
                .map_err(|e| StoreError::Serialization(e.to_string()))?;

            records
                .insert(id.as_bytes().as_slice(), bytes.as_slice())
                .map_err(|e| StoreError::Io(e.to_string()))?;
        }

        txn.commit().map_err(|e| StoreError::Io(e.to_string()))?;

        Ok(UpdateOutcome::Updated)
    }
}

/// Encode a handle index entry as role byte + sender handle.
fn encode_handle_entry(role: u8, sender: &Handle) -> [u8; 17] {
    let mut entry = [0u8; 17];
    entry[0] = role;
    entry[1..].copy_from_slice(sender.as_bytes());
    entry
}

/// Decode a handle index entry back to (role, sender handle).
fn decode_handle_entry(bytes: &[u8]) -> Result<(HandleRole, Handle), StoreError> {
    if bytes.len() != 17 {
        return Err(StoreError::Corrupt(format!(
            "handle entry has {} bytes, expected 17",
            bytes.len()
        )));
    }

    let role = match bytes[0] {
        ROLE_SENDER => HandleRole::Sender,
        ROLE_RECEIVER => HandleRole::Receiver,
        other => {
            return Err(StoreError::Corrupt(format!("unknown handle role byte {other:#04x}")));
        },
    };

    let mut sender = [0u8; Handle::SIZE];
    sender.copy_from_slice(&bytes[1..]);

    Ok((role, Handle::from_bytes(sender)))
}

/// Decode a CBOR record value.
fn decode_record(bytes: &[u8]) -> Result<KeyRecord, StoreError> {
    ciborium::from_reader(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    fn test_record(seed: u8, unlocks_at_ms: u64) -> KeyRecord {
        KeyRecord {
            sender: Handle::from_bytes([seed; 16]),
            receiver: Handle::from_bytes([seed.wrapping_add(100); 16]),
            key: [seed; 32],
            timelock_ms: 1_000,
            created_at_ms: 0,
            unlocks_at_ms,
        }
    }

    #[test]
    fn test_handle_entry_encoding() {
        let sender = Handle::from_bytes([0xAB; 16]);

        let entry = encode_handle_entry(ROLE_RECEIVER, &sender);
        assert_eq!(entry.len(), 17);

        let (role, decoded) = decode_handle_entry(&entry).unwrap();
        assert_eq!(role, HandleRole::Receiver);
        assert_eq!(decoded, sender);
    }

    #[test]
    fn test_handle_entry_rejects_bad_role() {
        let mut entry = encode_handle_entry(ROLE_SENDER, &Handle::from_bytes([1; 16]));
        entry[0] = 0x7F;

        match decode_handle_entry(&entry) {
            Err(StoreError::Corrupt(_)) => {},
            other => panic!("Expected Corrupt error, got: {other:?}"),
        }
    }

    #[test]
    fn test_insert_and_lookup_both_roles() {
        let dir = tempdir().unwrap();
        let store = RedbStore::open(dir.path().join("test.redb")).unwrap();

        let record = test_record(1, 5_000);
        store.insert(&record).unwrap();

        let (role, found) = store.lookup(&record.sender).unwrap().unwrap();
        assert_eq!(role, HandleRole::Sender);
        assert_eq!(found, record);

        let (role, found) = store.lookup(&record.receiver).unwrap().unwrap();
        assert_eq!(role, HandleRole::Receiver);
        assert_eq!(found, record);
    }

    #[test]
    fn test_lookup_unknown_handle() {
        let dir = tempdir().unwrap();
        let store = RedbStore::open(dir.path().join("test.redb")).unwrap();

        assert!(store.lookup(&Handle::from_bytes([9; 16])).unwrap().is_none());
    }

    #[test]
    fn test_insert_rejects_taken_handle() {
        let dir = tempdir().unwrap();
        let store = RedbStore::open(dir.path().join("test.redb")).unwrap();

        let record = test_record(1, 5_000);
        store.insert(&record).unwrap();

        let mut clash = test_record(2, 5_000);
        clash.receiver = record.sender;
        assert_eq!(store.insert(&clash), Err(StoreError::HandleInUse));

        // The aborted insert registered nothing.
        assert!(store.lookup(&clash.sender).unwrap().is_none());
    }

    #[test]
    fn test_compare_and_update_extends_deadline() {
        let dir = tempdir().unwrap();
        let store = RedbStore::open(dir.path().join("test.redb")).unwrap();

        let record = test_record(1, 5_000);
        store.insert(&record).unwrap();

        let outcome = store.compare_and_update(&record.sender, 5_000, 9_000, 4_000).unwrap();
        assert_eq!(outcome, UpdateOutcome::Updated);

        let (_, found) = store.lookup(&record.sender).unwrap().unwrap();
        assert_eq!(found.unlocks_at_ms, 9_000);
        // Everything else is untouched.
        assert_eq!(found.key, record.key);
        assert_eq!(found.timelock_ms, record.timelock_ms);
    }

    #[test]
    fn test_compare_and_update_detects_conflict() {
        let dir = tempdir().unwrap();
        let store = RedbStore::open(dir.path().join("test.redb")).unwrap();

        let record = test_record(1, 5_000);
        store.insert(&record).unwrap();

        let outcome = store.compare_and_update(&record.sender, 4_000, 9_000, 1_000).unwrap();
        assert_eq!(outcome, UpdateOutcome::Conflict { current_unlocks_at_ms: 5_000 });

        let (_, found) = store.lookup(&record.sender).unwrap().unwrap();
        assert_eq!(found.unlocks_at_ms, 5_000);
    }

    #[test]
    fn test_compare_and_update_refuses_unlocked_record() {
        let dir = tempdir().unwrap();
        let store = RedbStore::open(dir.path().join("test.redb")).unwrap();

        let record = test_record(1, 5_000);
        store.insert(&record).unwrap();

        let outcome = store.compare_and_update(&record.sender, 5_000, 99_000, 6_000).unwrap();
        assert_eq!(outcome, UpdateOutcome::AlreadyUnlocked);

        let (_, found) = store.lookup(&record.sender).unwrap().unwrap();
        assert_eq!(found.unlocks_at_ms, 5_000);
    }

    #[test]
    fn test_records_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.redb");

        let record = test_record(1, 5_000);
        {
            let store = RedbStore::open(&path).unwrap();
            store.insert(&record).unwrap();
            store.compare_and_update(&record.sender, 5_000, 8_000, 1_000).unwrap();
        }

        // Reopen: the record and its refreshed deadline are still there.
        let store = RedbStore::open(&path).unwrap();
        let (role, found) = store.lookup(&record.receiver).unwrap().unwrap();
        assert_eq!(role, HandleRole::Receiver);
        assert_eq!(found.unlocks_at_ms, 8_000);
        assert_eq!(found.key, record.key);
    }
}
