//! Receiver-side orchestration.
//!
//! A receiver holds a share package and nothing else. It probes the listed
//! servers, feeds outcomes into the [`RecoveryTracker`], and either walks
//! away with the secret or learns that no path can ever complete. Probes
//! are independent and side-effect free, so every round is safe to repeat
//! and partial failure costs nothing but time.

use std::time::Duration;

use postalghost_core::{Environment, OperationOutcome, OperationRequest};
use postalghost_proto::{KeyDescriptor, KeyStatus, SharePackage};

use crate::{
    connection,
    error::ClientError,
    recovery::{ProbeOutcome, RecoveryStatus, RecoveryTracker},
};

/// Recovery driver over one share package.
pub struct Receiver {
    tracker: RecoveryTracker,
}

impl Receiver {
    /// Create a receiver over a share package.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Protocol` if the package fails structural
    /// validation.
    pub fn new(package: SharePackage) -> Result<Self, ClientError> {
        Ok(Self { tracker: RecoveryTracker::new(package)? })
    }

    /// Key indices still worth probing.
    #[must_use]
    pub fn pending_keys(&self) -> Vec<usize> {
        self.tracker.pending_keys()
    }

    /// Probe every pending key once, in parallel, then attempt decryption.
    pub async fn probe_round(&mut self) -> RecoveryStatus {
        let pending = self.tracker.pending_keys();
        let mut handles = Vec::with_capacity(pending.len());

        for key_index in pending {
            let Some(descriptor) = self.tracker.package().keys.get(key_index) else {
                continue;
            };
            let descriptor = descriptor.clone();
            handles.push(tokio::spawn(async move { (key_index, probe(&descriptor).await) }));
        }

        for handle in handles {
            // A panicked probe task records nothing; the key stays pending
            // and the next round probes it again.
            if let Ok((key_index, outcome)) = handle.await {
                self.tracker.record(key_index, outcome);
            }
        }

        self.tracker.attempt()
    }

    /// Poll until the secret is recovered or provably unrecoverable.
    ///
    /// Sleeps `interval` between rounds. This can run for days: the normal
    /// case is a receiver waiting out a timelock that the sender keeps
    /// refreshing. Callers wanting a deadline should wrap it in a timeout.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Unsatisfiable` once every path is dead.
    pub async fn recover<E: Environment>(
        &mut self,
        env: &E,
        interval: Duration,
    ) -> Result<Vec<u8>, ClientError> {
        loop {
            match self.probe_round().await {
                RecoveryStatus::Recovered(secret) => return Ok(secret),
                RecoveryStatus::Unsatisfiable => return Err(ClientError::Unsatisfiable),
                RecoveryStatus::Waiting => env.sleep(interval).await,
            }
        }
    }
}

/// Probe one key: a `get` round trip folded into the accumulator's
/// vocabulary.
async fn probe(descriptor: &KeyDescriptor) -> ProbeOutcome {
    let request = OperationRequest::Get { id: descriptor.id };
    let outcome = match connection::perform(&descriptor.host, descriptor.pk, request).await {
        Ok(OperationOutcome::Get { status: KeyStatus::Unlocked, key: Some(material) }) => {
            ProbeOutcome::Unlocked(material)
        },
        Ok(OperationOutcome::Get { status: KeyStatus::Locked, .. }) => ProbeOutcome::Locked,
        // An unlocked answer without material violates the response
        // contract; treat the server as faulty, not the path as dead.
        Ok(_) => ProbeOutcome::Unreachable,
        Err(ClientError::Rejected { .. }) => ProbeOutcome::Failed,
        // Auth failures stay "unknown" too: an interceptor must not be able
        // to kill a path by answering probes with bad signatures.
        Err(_) => ProbeOutcome::Unreachable,
    };

    tracing::debug!(host = %descriptor.host, ?outcome, "Probe complete");
    outcome
}
