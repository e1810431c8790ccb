//! Recovery accumulator: probe outcomes in, decrypt attempts out.
//!
//! The receiver's only shared state. Probes run wherever and in whatever
//! order the driver likes; each reports its outcome here, and [`attempt`]
//! answers whether any path has become decryptable. No I/O, no clock, no
//! ordering assumptions.
//!
//! [`attempt`]: RecoveryTracker::attempt

use postalghost_crypto::{combine, open};
use postalghost_proto::{SharePackage, UnlockPath};
use zeroize::{Zeroize, Zeroizing};

use crate::error::ClientError;

/// Result of probing one key on its server.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// Key released; material in hand.
    Unlocked([u8; 32]),

    /// Deadline still ahead. Probe again later.
    Locked,

    /// Server unreachable, identity unproven, or the session broke off.
    /// This is "unknown", never "locked" or "failed": the probe carries no
    /// information and is freely retryable because `get` has no side
    /// effects.
    Unreachable,

    /// Server answered and rejected the handle. Rejections are
    /// deterministic, so retrying cannot help and every path through this
    /// key is dead.
    Failed,
}

/// Key material is deliberately omitted.
impl std::fmt::Debug for ProbeOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unlocked(_) => f.write_str("Unlocked(..)"),
            Self::Locked => f.write_str("Locked"),
            Self::Unreachable => f.write_str("Unreachable"),
            Self::Failed => f.write_str("Failed"),
        }
    }
}

/// Overall recovery status after a decrypt attempt.
#[derive(Clone, PartialEq, Eq)]
pub enum RecoveryStatus {
    /// A path decrypted. The secret is recovered.
    Recovered(Vec<u8>),

    /// No path is complete yet, but at least one still can be.
    Waiting,

    /// Every path is dead: a member key is permanently rejected, or the
    /// path's ciphertext failed authentication under its complete
    /// composite. More probing cannot change the answer.
    Unsatisfiable,
}

/// The recovered plaintext is deliberately omitted.
impl std::fmt::Debug for RecoveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Recovered(_) => f.write_str("Recovered(..)"),
            Self::Waiting => f.write_str("Waiting"),
            Self::Unsatisfiable => f.write_str("Unsatisfiable"),
        }
    }
}

/// Last known state of one key.
#[derive(Clone, Copy, PartialEq, Eq)]
enum KeyState {
    Unknown,
    Locked,
    Unlocked([u8; 32]),
    Failed,
}

/// Per-path completeness accumulator.
///
/// Holds the share package, the last known state of every key, and which
/// paths have been proven dead. Key material collected here is wiped on
/// drop.
pub struct RecoveryTracker {
    package: SharePackage,
    states: Vec<KeyState>,
    dead_paths: Vec<bool>,
}

impl RecoveryTracker {
    /// Create a tracker over a share package.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Protocol` if the package fails structural
    /// validation. A validated package is what makes the internal index
    /// arithmetic safe.
    pub fn new(package: SharePackage) -> Result<Self, ClientError> {
        package.validate()?;

        let states = vec![KeyState::Unknown; package.keys.len()];
        let dead_paths = vec![false; package.paths.len()];
        Ok(Self { package, states, dead_paths })
    }

    /// The package this tracker is recovering.
    #[must_use]
    pub fn package(&self) -> &SharePackage {
        &self.package
    }

    /// Record a probe outcome for the key at `key_index`.
    ///
    /// `Unlocked` and `Failed` are sticky: servers release keys permanently
    /// and reject unknown handles deterministically, so a later outcome
    /// never erases either. `Unreachable` carries no information and leaves
    /// the state untouched. Indices outside the package's key list are
    /// ignored.
    pub fn record(&mut self, key_index: usize, outcome: ProbeOutcome) {
        let Some(state) = self.states.get_mut(key_index) else {
            return;
        };

        match (*state, outcome) {
            (KeyState::Unlocked(_) | KeyState::Failed, _)
            | (_, ProbeOutcome::Unreachable) => {},
            (_, ProbeOutcome::Unlocked(material)) => *state = KeyState::Unlocked(material),
            (_, ProbeOutcome::Failed) => *state = KeyState::Failed,
            (_, ProbeOutcome::Locked) => *state = KeyState::Locked,
        }
    }

    /// Key indices still worth probing: members of a live path whose
    /// material is not yet in hand. Sorted, without duplicates.
    #[must_use]
    pub fn pending_keys(&self) -> Vec<usize> {
        let mut pending = std::collections::BTreeSet::new();

        for (path_index, path) in self.package.paths.iter().enumerate() {
            if self.path_is_dead(path_index, path) {
                continue;
            }
            for &key_index in &path.keys {
                if matches!(
                    self.states.get(key_index as usize),
                    Some(KeyState::Unknown | KeyState::Locked)
                ) {
                    pending.insert(key_index as usize);
                }
            }
        }

        pending.into_iter().collect()
    }

    /// Try to decrypt every complete path.
    ///
    /// A complete path whose ciphertext fails authentication is marked dead
    /// and never retried: with a full member set in hand, authentication
    /// failure means the package itself is wrong for that path.
    pub fn attempt(&mut self) -> RecoveryStatus {
        let mut newly_dead = Vec::new();
        let mut recovered = None;

        for (path_index, path) in self.package.paths.iter().enumerate() {
            if self.path_is_dead(path_index, path) {
                continue;
            }
            let Some(members) = self.complete_members(path) else {
                continue;
            };

            // CompositeKey zeroizes itself on drop.
            let composite = combine(&members);
            match open(&path.data, &composite) {
                Ok(secret) => {
                    recovered = Some(secret);
                    break;
                },
                Err(_) => newly_dead.push(path_index),
            }
        }

        for path_index in newly_dead {
            if let Some(dead) = self.dead_paths.get_mut(path_index) {
                *dead = true;
            }
        }

        if let Some(secret) = recovered {
            return RecoveryStatus::Recovered(secret);
        }

        let all_dead = self
            .package
            .paths
            .iter()
            .enumerate()
            .all(|(path_index, path)| self.path_is_dead(path_index, path));

        if all_dead {
            RecoveryStatus::Unsatisfiable
        } else {
            RecoveryStatus::Waiting
        }
    }

    fn path_is_dead(&self, path_index: usize, path: &UnlockPath) -> bool {
        self.dead_paths.get(path_index).copied().unwrap_or(false)
            || path
                .keys
                .iter()
                .any(|&k| matches!(self.states.get(k as usize), Some(KeyState::Failed)))
    }

    /// Member materials for a path, or `None` while any member is missing.
    fn complete_members(&self, path: &UnlockPath) -> Option<Zeroizing<Vec<[u8; 32]>>> {
        let mut members = Zeroizing::new(Vec::with_capacity(path.keys.len()));
        for &key_index in &path.keys {
            match self.states.get(key_index as usize) {
                Some(KeyState::Unlocked(material)) => members.push(*material),
                _ => return None,
            }
        }
        Some(members)
    }
}

impl Drop for RecoveryTracker {
    fn drop(&mut self) {
        for state in &mut self.states {
            if let KeyState::Unlocked(material) = state {
                material.zeroize();
            }
        }
    }
}
