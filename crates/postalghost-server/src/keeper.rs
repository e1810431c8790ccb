//! Key keeper.
//!
//! Executes the three key operations against a [`KeyStore`]. The keeper is
//! purely reactive: no background timers, no sweeps. Unlocking is a lazily
//! evaluated predicate over the server's own clock, so a record transitions
//! locked to unlocked simply by being observed after its deadline.
//!
//! Semantic rejections (bad timelock, unknown handle) come back as
//! [`Payload::Error`] responses; only real store failures surface as
//! [`StoreError`], and those close the connection without a payload.

use postalghost_core::{Environment, OperationRequest};
use postalghost_proto::{
    ErrorPayload, GetResponse, Handle, KeyStatus, Payload, PingResponse, SetResponse,
};

use crate::store::{HandleRole, KeyRecord, KeyStore, StoreError, UpdateOutcome};

/// Upper bound on the timelock duration, in seconds (100 years).
///
/// Anything longer is a client mistake, not a plausible policy.
pub const MAX_TIMELOCK_SECS: i64 = 3_155_760_000;

/// Attempts to find unused random handles before giving up.
///
/// Handles carry 128 bits of entropy, so a single collision already means
/// the RNG or the store is broken.
const MAX_INSERT_ATTEMPTS: usize = 8;

/// Executes key operations against a store.
///
/// Stateless apart from its store and environment; clones share both, so
/// one keeper can serve every connection task.
#[derive(Clone)]
pub struct Keeper<S, E> {
    store: S,
    env: E,
}

impl<S: KeyStore, E: Environment> Keeper<S, E> {
    /// Create a keeper over the given store and environment.
    pub fn new(store: S, env: E) -> Self {
        Self { store, env }
    }

    /// Execute one decoded operation and produce its response payload.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` only for store I/O failures; semantic
    /// rejections are `Ok` with an error payload.
    pub fn execute(&self, request: OperationRequest) -> Result<Payload, StoreError> {
        match request {
            OperationRequest::Set { timelock_secs } => self.set(timelock_secs),
            OperationRequest::Ping { id } => self.ping(id),
            OperationRequest::Get { id } => self.get(id),
        }
    }

    /// Create a new timelocked key.
    ///
    /// Generates the key material and two distinct handles, stores the
    /// record with its deadline at `now + timelock`, and returns all three
    /// secrets to the caller. This is the only time the server ever sends
    /// the key to the sender.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the store rejects the insert for reasons
    /// other than a handle collision.
    pub fn set(&self, timelock_secs: i64) -> Result<Payload, StoreError> {
        if timelock_secs <= 0 || timelock_secs > MAX_TIMELOCK_SECS {
            return Ok(Payload::Error(ErrorPayload::validation(format!(
                "timelock must be between 1 and {MAX_TIMELOCK_SECS} seconds"
            ))));
        }
        let timelock_ms = timelock_secs as u64 * 1000;

        let now = self.env.now_ms();
        let key: [u8; 32] = self.env.random_array();

        for _ in 0..MAX_INSERT_ATTEMPTS {
            let sender = Handle::from_bytes(self.env.random_array());
            let mut receiver = Handle::from_bytes(self.env.random_array());
            // The handles must differ so each stays bound to one role.
            while receiver == sender {
                receiver = Handle::from_bytes(self.env.random_array());
            }

            let record = KeyRecord {
                sender,
                receiver,
                key,
                timelock_ms,
                created_at_ms: now,
                unlocks_at_ms: now + timelock_ms,
            };

            match self.store.insert(&record) {
                Ok(()) => {
                    return Ok(Payload::SetResponse(SetResponse { sender, receiver, key }));
                },
                Err(StoreError::HandleInUse) => {},
                Err(err) => return Err(err),
            }
        }

        Err(StoreError::Corrupt(format!(
            "no unused handles after {MAX_INSERT_ATTEMPTS} attempts"
        )))
    }

    /// Refresh the deadline behind a sender handle.
    ///
    /// While the record is locked, pushes the deadline to `now + timelock`.
    /// The deadline never moves backward, so a clock regression between two
    /// pings cannot shorten it. An unlocked record is frozen: the ping
    /// reports `unlocked` and writes nothing.
    ///
    /// A receiver handle (or an unknown one) gets the error payload every
    /// unknown id gets, so the two cases cannot be told apart.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the store fails.
    pub fn ping(&self, id: Handle) -> Result<Payload, StoreError> {
        let Some((role, record)) = self.store.lookup(&id)? else {
            return Ok(Payload::Error(ErrorPayload::not_found()));
        };
        if role != HandleRole::Sender {
            return Ok(Payload::Error(ErrorPayload::not_found()));
        }

        let mut current = record.unlocks_at_ms;
        loop {
            let now = self.env.now_ms();
            if now >= current {
                return Ok(Payload::PingResponse(PingResponse { status: KeyStatus::Unlocked }));
            }

            let refreshed = current.max(now + record.timelock_ms);

            match self.store.compare_and_update(&id, current, refreshed, now)? {
                UpdateOutcome::Updated => {
                    return Ok(Payload::PingResponse(PingResponse {
                        status: KeyStatus::Locked,
                    }));
                },
                UpdateOutcome::AlreadyUnlocked => {
                    return Ok(Payload::PingResponse(PingResponse {
                        status: KeyStatus::Unlocked,
                    }));
                },
                UpdateOutcome::Conflict { current_unlocks_at_ms } => {
                    // A concurrent ping moved the deadline; retry against
                    // the value it left behind.
                    current = current_unlocks_at_ms;
                },
                UpdateOutcome::Missing => {
                    return Ok(Payload::Error(ErrorPayload::not_found()));
                },
            }
        }
    }

    /// Query the key behind a receiver handle.
    ///
    /// Pure read: reports the derived status and, once unlocked, the key
    /// material. A locked response carries no key field at all.
    ///
    /// A sender handle (or an unknown one) gets the error payload every
    /// unknown id gets, so the two cases cannot be told apart.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the store fails.
    pub fn get(&self, id: Handle) -> Result<Payload, StoreError> {
        let Some((role, record)) = self.store.lookup(&id)? else {
            return Ok(Payload::Error(ErrorPayload::not_found()));
        };
        if role != HandleRole::Receiver {
            return Ok(Payload::Error(ErrorPayload::not_found()));
        }

        let status = record.status(self.env.now_ms());
        let key = if status == KeyStatus::Unlocked { Some(record.key) } else { None };

        Ok(Payload::GetResponse(GetResponse { status, key }))
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_types, reason = "tests share a seeded RNG behind a plain mutex")]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    };

    use rand::{RngCore, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    use super::*;
    use crate::store::MemoryStore;

    /// Deterministic environment: a settable clock and a seeded RNG.
    #[derive(Clone)]
    struct TestEnv {
        now_ms: Arc<AtomicU64>,
        rng: Arc<std::sync::Mutex<ChaCha8Rng>>,
    }

    impl TestEnv {
        fn new(start_ms: u64) -> Self {
            Self {
                now_ms: Arc::new(AtomicU64::new(start_ms)),
                rng: Arc::new(std::sync::Mutex::new(ChaCha8Rng::seed_from_u64(42))),
            }
        }

        fn advance(&self, ms: u64) {
            self.now_ms.fetch_add(ms, Ordering::SeqCst);
        }

        fn rewind(&self, ms: u64) {
            self.now_ms.fetch_sub(ms, Ordering::SeqCst);
        }
    }

    impl Environment for TestEnv {
        fn now_ms(&self) -> u64 {
            self.now_ms.load(Ordering::SeqCst)
        }

        fn sleep(&self, _duration: std::time::Duration) -> impl std::future::Future<Output = ()> + Send {
            std::future::ready(())
        }

        fn random_bytes(&self, buffer: &mut [u8]) {
            self.rng.lock().expect("Mutex poisoned").fill_bytes(buffer);
        }
    }

    fn keeper(start_ms: u64) -> (Keeper<MemoryStore, TestEnv>, MemoryStore, TestEnv) {
        let store = MemoryStore::new();
        let env = TestEnv::new(start_ms);
        (Keeper::new(store.clone(), env.clone()), store, env)
    }

    fn set_handles(keeper: &Keeper<MemoryStore, TestEnv>, timelock_secs: i64) -> SetResponse {
        match keeper.set(timelock_secs).expect("set failed") {
            Payload::SetResponse(response) => response,
            other => panic!("expected SetResponse, got {other:?}"),
        }
    }

    #[test]
    fn set_creates_locked_record() {
        let (keeper, store, _) = keeper(10_000);

        let response = set_handles(&keeper, 60);
        assert_ne!(response.sender, response.receiver);

        let (role, record) = store.lookup(&response.sender).unwrap().expect("record");
        assert_eq!(role, HandleRole::Sender);
        assert_eq!(record.key, response.key);
        assert_eq!(record.timelock_ms, 60_000);
        assert_eq!(record.created_at_ms, 10_000);
        assert_eq!(record.unlocks_at_ms, 70_000);
        assert_eq!(record.status(10_000), KeyStatus::Locked);
    }

    #[test]
    fn set_generates_distinct_keys() {
        let (keeper, _, _) = keeper(0);

        let a = set_handles(&keeper, 60);
        let b = set_handles(&keeper, 60);

        assert_ne!(a.key, b.key);
        assert_ne!(a.sender, b.sender);
        assert_ne!(a.receiver, b.receiver);
    }

    #[test]
    fn set_rejects_non_positive_timelock() {
        let (keeper, store, _) = keeper(0);

        for timelock in [0, -1, i64::MIN] {
            match keeper.set(timelock).expect("set failed") {
                Payload::Error(error) => assert_eq!(error.code, ErrorPayload::VALIDATION),
                other => panic!("expected Error payload, got {other:?}"),
            }
        }

        assert_eq!(store.record_count(), 0);
    }

    #[test]
    fn set_rejects_oversized_timelock() {
        let (keeper, store, _) = keeper(0);

        match keeper.set(MAX_TIMELOCK_SECS + 1).expect("set failed") {
            Payload::Error(error) => assert_eq!(error.code, ErrorPayload::VALIDATION),
            other => panic!("expected Error payload, got {other:?}"),
        }
        assert_eq!(store.record_count(), 0);

        // The maximum itself is accepted.
        let response = set_handles(&keeper, MAX_TIMELOCK_SECS);
        let (_, record) = store.lookup(&response.sender).unwrap().expect("record");
        assert_eq!(record.timelock_ms, MAX_TIMELOCK_SECS as u64 * 1000);
    }

    #[test]
    fn ping_extends_deadline_while_locked() {
        let (keeper, store, env) = keeper(0);
        let response = set_handles(&keeper, 60);

        env.advance(30_000);
        match keeper.ping(response.sender).unwrap() {
            Payload::PingResponse(ping) => assert_eq!(ping.status, KeyStatus::Locked),
            other => panic!("expected PingResponse, got {other:?}"),
        }

        let (_, record) = store.lookup(&response.sender).unwrap().expect("record");
        assert_eq!(record.unlocks_at_ms, 90_000);
    }

    #[test]
    fn ping_after_deadline_reports_unlocked_without_extending() {
        let (keeper, store, env) = keeper(0);
        let response = set_handles(&keeper, 60);

        env.advance(61_000);
        match keeper.ping(response.sender).unwrap() {
            Payload::PingResponse(ping) => assert_eq!(ping.status, KeyStatus::Unlocked),
            other => panic!("expected PingResponse, got {other:?}"),
        }

        // Frozen: the deadline did not move.
        let (_, record) = store.lookup(&response.sender).unwrap().expect("record");
        assert_eq!(record.unlocks_at_ms, 60_000);
    }

    #[test]
    fn ping_never_shortens_deadline_on_clock_regression() {
        let (keeper, store, env) = keeper(100_000);
        let response = set_handles(&keeper, 60);
        // Deadline: 160_000.

        // Clock steps backward (NTP correction) and the sender pings.
        env.rewind(50_000);
        match keeper.ping(response.sender).unwrap() {
            Payload::PingResponse(ping) => assert_eq!(ping.status, KeyStatus::Locked),
            other => panic!("expected PingResponse, got {other:?}"),
        }

        // 50_000 + 60_000 < 160_000, so the stored deadline wins.
        let (_, record) = store.lookup(&response.sender).unwrap().expect("record");
        assert_eq!(record.unlocks_at_ms, 160_000);
    }

    #[test]
    fn ping_rejects_receiver_handle() {
        let (keeper, store, _) = keeper(0);
        let response = set_handles(&keeper, 60);

        match keeper.ping(response.receiver).unwrap() {
            Payload::Error(error) => {
                assert_eq!(error.code, ErrorPayload::NOT_FOUND);
                // Byte-identical to the unknown-handle rejection.
                let unknown = match keeper.ping(Handle::from_bytes([0xCC; 16])).unwrap() {
                    Payload::Error(error) => error,
                    other => panic!("expected Error payload, got {other:?}"),
                };
                assert_eq!(error, unknown);
            },
            other => panic!("expected Error payload, got {other:?}"),
        }

        // The rejected ping wrote nothing.
        let (_, record) = store.lookup(&response.sender).unwrap().expect("record");
        assert_eq!(record.unlocks_at_ms, 60_000);
    }

    #[test]
    fn get_locked_reports_status_without_key() {
        let (keeper, _, env) = keeper(0);
        let response = set_handles(&keeper, 60);

        env.advance(59_999);
        match keeper.get(response.receiver).unwrap() {
            Payload::GetResponse(get) => {
                assert_eq!(get.status, KeyStatus::Locked);
                assert_eq!(get.key, None);
            },
            other => panic!("expected GetResponse, got {other:?}"),
        }
    }

    #[test]
    fn get_unlocked_releases_key() {
        let (keeper, _, env) = keeper(0);
        let response = set_handles(&keeper, 60);

        env.advance(60_000);
        match keeper.get(response.receiver).unwrap() {
            Payload::GetResponse(get) => {
                assert_eq!(get.status, KeyStatus::Unlocked);
                assert_eq!(get.key, Some(response.key));
            },
            other => panic!("expected GetResponse, got {other:?}"),
        }
    }

    #[test]
    fn get_rejects_sender_handle_even_after_unlock() {
        let (keeper, _, env) = keeper(0);
        let response = set_handles(&keeper, 60);

        env.advance(120_000);
        match keeper.get(response.sender).unwrap() {
            Payload::Error(error) => assert_eq!(error.code, ErrorPayload::NOT_FOUND),
            other => panic!("expected Error payload, got {other:?}"),
        }
    }

    #[test]
    fn get_is_pure() {
        let (keeper, store, env) = keeper(0);
        let response = set_handles(&keeper, 60);

        env.advance(30_000);
        for _ in 0..5 {
            keeper.get(response.receiver).unwrap();
        }

        let (_, record) = store.lookup(&response.sender).unwrap().expect("record");
        assert_eq!(record.unlocks_at_ms, 60_000);
    }

    #[test]
    fn unlock_is_permanent_across_operations() {
        let (keeper, _, env) = keeper(0);
        let response = set_handles(&keeper, 60);

        env.advance(61_000);
        // Observed unlocked once...
        match keeper.get(response.receiver).unwrap() {
            Payload::GetResponse(get) => assert_eq!(get.status, KeyStatus::Unlocked),
            other => panic!("expected GetResponse, got {other:?}"),
        }

        // ...then pinged, then observed again: still unlocked.
        keeper.ping(response.sender).unwrap();
        match keeper.get(response.receiver).unwrap() {
            Payload::GetResponse(get) => {
                assert_eq!(get.status, KeyStatus::Unlocked);
                assert_eq!(get.key, Some(response.key));
            },
            other => panic!("expected GetResponse, got {other:?}"),
        }
    }

    #[test]
    fn execute_dispatches_all_operations() {
        let (keeper, _, _) = keeper(0);
        let response = set_handles(&keeper, 60);

        let ping = keeper.execute(OperationRequest::Ping { id: response.sender }).unwrap();
        assert!(matches!(ping, Payload::PingResponse(_)));

        let get = keeper.execute(OperationRequest::Get { id: response.receiver }).unwrap();
        assert!(matches!(get, Payload::GetResponse(_)));

        let set = keeper.execute(OperationRequest::Set { timelock_secs: 30 }).unwrap();
        assert!(matches!(set, Payload::SetResponse(_)));
    }
}
