//! Path Composer: a declared disclosure policy becomes sealed ciphertexts.
//!
//! The policy language is deliberately tiny: a list of index sets over the
//! created keys. Each set is an AND (every member key is needed), the list
//! is an OR (any one set suffices). Boolean structure never exists at
//! runtime; it is compiled away here into one independent ciphertext per
//! path, and a path "evaluates" by either decrypting or not.

use std::collections::HashSet;

use postalghost_core::Environment;
use postalghost_crypto::{NONCE_SIZE, combine, seal};
use postalghost_proto::UnlockPath;
use zeroize::Zeroizing;

use crate::error::ClientError;

/// Validate a declared policy against the number of available keys.
///
/// Called before any key is created or any byte sealed, so a bad policy
/// fails without leaving orphaned keys on servers.
///
/// # Errors
///
/// Returns `ClientError::Policy` for an empty policy, an empty path, an
/// out-of-range index, or a duplicate index within one path.
pub fn validate_policy(policy: &[Vec<u32>], key_count: usize) -> Result<(), ClientError> {
    if policy.is_empty() {
        return Err(ClientError::Policy("no unlock paths declared".to_owned()));
    }

    for (index, path) in policy.iter().enumerate() {
        if path.is_empty() {
            return Err(ClientError::Policy(format!("path {index} references no keys")));
        }

        let mut seen = HashSet::new();
        for &key_index in path {
            if key_index as usize >= key_count {
                return Err(ClientError::Policy(format!(
                    "path {index} references key {key_index} but only {key_count} exist"
                )));
            }
            if !seen.insert(key_index) {
                return Err(ClientError::Policy(format!(
                    "path {index} references key {key_index} twice"
                )));
            }
        }
    }

    Ok(())
}

/// Seal one secret under every declared path.
///
/// Each path gets its own composite key (byte-wise sum of its member
/// materials) and a fresh nonce from the environment. The returned paths
/// carry ciphertexts only; member materials and composites are wiped before
/// this function returns.
///
/// # Errors
///
/// Returns `ClientError::Policy` if the policy fails [`validate_policy`].
pub fn compose_paths<E: Environment>(
    env: &E,
    secret: &[u8],
    materials: &[[u8; 32]],
    policy: &[Vec<u32>],
) -> Result<Vec<UnlockPath>, ClientError> {
    validate_policy(policy, materials.len())?;

    let mut paths = Vec::with_capacity(policy.len());
    for declared in policy {
        let mut members = Zeroizing::new(Vec::with_capacity(declared.len()));
        for &key_index in declared {
            let material = materials.get(key_index as usize).ok_or_else(|| {
                ClientError::Policy(format!("path references key {key_index} out of range"))
            })?;
            members.push(*material);
        }

        // CompositeKey zeroizes itself on drop.
        let composite = combine(&members);
        let data = seal(secret, &composite, env.random_array::<NONCE_SIZE>());

        paths.push(UnlockPath { keys: declared.clone(), data });
    }

    Ok(paths)
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicU8, Ordering},
    };

    use postalghost_crypto::open;

    use super::*;

    /// Deterministic nonce source: every draw fills with the next counter
    /// value, so successive nonces are distinct but reproducible.
    #[derive(Clone, Default)]
    struct CountingEnv {
        counter: Arc<AtomicU8>,
    }

    impl Environment for CountingEnv {
        fn now_ms(&self) -> u64 {
            0
        }

        fn sleep(
            &self,
            _duration: std::time::Duration,
        ) -> impl std::future::Future<Output = ()> + Send {
            std::future::ready(())
        }

        fn random_bytes(&self, buffer: &mut [u8]) {
            buffer.fill(self.counter.fetch_add(1, Ordering::SeqCst));
        }
    }

    fn materials() -> Vec<[u8; 32]> {
        vec![[0x10; 32], [0x20; 32], [0x30; 32]]
    }

    #[test]
    fn seals_one_ciphertext_per_path() {
        let env = CountingEnv::default();
        let policy = vec![vec![0, 1], vec![2]];

        let paths = compose_paths(&env, b"hello", &materials(), &policy).unwrap();

        assert_eq!(paths.len(), 2);
        assert_eq!(paths[0].keys, vec![0, 1]);
        assert_eq!(paths[1].keys, vec![2]);

        let both = combine(&[[0x10; 32], [0x20; 32]]);
        let single = combine(&[[0x30; 32]]);
        assert_eq!(open(&paths[0].data, &both).unwrap(), b"hello");
        assert_eq!(open(&paths[1].data, &single).unwrap(), b"hello");
    }

    #[test]
    fn paths_use_distinct_nonces() {
        let env = CountingEnv::default();
        let policy = vec![vec![0], vec![0]];

        let paths = compose_paths(&env, b"same secret, same subset", &materials(), &policy)
            .unwrap();

        assert_ne!(paths[0].data, paths[1].data);
    }

    #[test]
    fn composite_from_other_path_cannot_open() {
        let env = CountingEnv::default();
        let policy = vec![vec![0, 1], vec![2]];

        let paths = compose_paths(&env, b"isolated", &materials(), &policy).unwrap();

        let wrong = combine(&[[0x30; 32]]);
        assert!(open(&paths[0].data, &wrong).is_err());
    }

    #[test]
    fn member_order_does_not_matter() {
        let env = CountingEnv::default();

        let forward = compose_paths(&env, b"ordered", &materials(), &[vec![0, 1, 2]]).unwrap();

        let reversed = combine(&[[0x30; 32], [0x20; 32], [0x10; 32]]);
        assert_eq!(open(&forward[0].data, &reversed).unwrap(), b"ordered");
    }

    #[test]
    fn rejects_empty_policy() {
        let result = validate_policy(&[], 3);
        assert!(matches!(result, Err(ClientError::Policy(_))));
    }

    #[test]
    fn rejects_empty_path() {
        let result = validate_policy(&[vec![0], vec![]], 3);
        assert!(matches!(result, Err(ClientError::Policy(_))));
    }

    #[test]
    fn rejects_out_of_range_index() {
        let result = validate_policy(&[vec![0, 3]], 3);
        assert!(matches!(result, Err(ClientError::Policy(_))));
    }

    #[test]
    fn rejects_duplicate_index_within_path() {
        let result = validate_policy(&[vec![1, 1]], 3);
        assert!(matches!(result, Err(ClientError::Policy(_))));
    }

    #[test]
    fn same_index_may_appear_in_different_paths() {
        assert!(validate_policy(&[vec![0, 1], vec![0, 2]], 3).is_ok());
    }

    #[test]
    fn compose_validates_before_sealing() {
        let env = CountingEnv::default();
        let result = compose_paths(&env, b"secret", &materials(), &[vec![9]]);
        assert!(matches!(result, Err(ClientError::Policy(_))));
    }

    mod properties {
        use proptest::prelude::*;

        use super::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(64))]

            /// Property: every declared path opens with the combination of
            /// exactly its member materials, in any order.
            #[test]
            fn prop_each_path_opens_with_its_members(
                secret in prop::collection::vec(any::<u8>(), 0..256),
                materials in prop::collection::vec(any::<[u8; 32]>(), 1..5),
                seed in any::<u8>(),
            ) {
                let env = CountingEnv { counter: Arc::new(AtomicU8::new(seed)) };

                // One path per prefix of the key list, so paths of every
                // length get exercised.
                let policy: Vec<Vec<u32>> =
                    (1..=materials.len()).map(|n| (0..n as u32).collect()).collect();

                let paths = compose_paths(&env, &secret, &materials, &policy).unwrap();

                for path in &paths {
                    let mut members: Vec<[u8; 32]> =
                        path.keys.iter().map(|&k| materials[k as usize]).collect();
                    members.reverse();
                    let composite = combine(&members);
                    prop_assert_eq!(open(&path.data, &composite).unwrap(), secret.clone());
                }
            }

            /// Property: dropping any single member from a multi-key path
            /// makes its ciphertext unopenable.
            #[test]
            fn prop_missing_member_cannot_open(
                secret in prop::collection::vec(any::<u8>(), 1..128),
                materials in prop::collection::vec(any::<[u8; 32]>(), 2..5),
            ) {
                // An all-zero material would not change the byte-wise sum.
                prop_assume!(materials.iter().all(|m| m.iter().any(|&b| b != 0)));

                let env = CountingEnv::default();
                let all: Vec<u32> = (0..materials.len() as u32).collect();

                let paths = compose_paths(&env, &secret, &materials, &[all]).unwrap();

                for drop_index in 0..materials.len() {
                    let partial: Vec<[u8; 32]> = materials
                        .iter()
                        .enumerate()
                        .filter(|&(i, _)| i != drop_index)
                        .map(|(_, m)| *m)
                        .collect();
                    let composite = combine(&partial);
                    prop_assert!(open(&paths[0].data, &composite).is_err());
                }
            }
        }
    }
}
