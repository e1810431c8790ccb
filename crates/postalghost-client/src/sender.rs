//! Sender-side orchestration.
//!
//! Two workflows: `create_package` places one timelocked key on every
//! server and seals the secret into a share package, and `ping_all` keeps
//! the deadlines ahead of the clock. Between the two calls the sender holds
//! the only state in the whole system that must stay private: the ping
//! targets with their sender handles.

use postalghost_core::{OperationOutcome, OperationRequest, SystemEnv};
use postalghost_proto::{Handle, KeyDescriptor, KeyStatus, SharePackage};
use zeroize::Zeroizing;

use crate::{
    composer,
    connection::{self, KeyServer},
    error::ClientError,
};

/// One key the sender must keep alive: where it lives and the handle that
/// refreshes it.
///
/// Never part of the share package. A receiver who obtains a sender handle
/// could silence the switch by pinging forever, so these stay with the
/// sender alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PingTarget {
    /// Server address in `host:port` form.
    pub host: String,
    /// Ed25519 verifying key the server must prove.
    pub pk: [u8; 32],
    /// Sender handle for `ping` on this server.
    pub id: Handle,
}

/// Everything `create_package` leaves behind.
#[derive(Debug, Clone)]
pub struct CreatedShare {
    /// Hand this to the receiver, out of band.
    pub package: SharePackage,
    /// Keep these private and ping them on cadence.
    pub ping_targets: Vec<PingTarget>,
}

/// One server's answer to a liveness ping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PingReport {
    /// Server that was pinged.
    pub host: String,
    /// `Ok(status)` if the round trip completed, the failure otherwise.
    pub outcome: Result<KeyStatus, ClientError>,
}

impl PingReport {
    /// True when the ping did its job: the server answered and the key is
    /// still locked.
    ///
    /// `Ok(Unlocked)` is unhealthy. The deadline already passed, the key is
    /// released for good, and no amount of pinging brings it back.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        matches!(self.outcome, Ok(KeyStatus::Locked))
    }
}

/// Create one timelocked key per server and seal `secret` along every
/// declared path.
///
/// The policy is validated before the first connection is opened, so a
/// malformed policy never leaves keys behind. Keys are then created
/// sequentially; once all exist, the secret is sealed and packaged. Nothing
/// retains the plaintext or the key materials afterwards.
///
/// # Errors
///
/// - `ClientError::Policy` if the timelock is not positive or the policy
///   fails validation against `servers`
/// - any [`connection::perform`] error if a server cannot be reached,
///   authenticated, or refuses the `set`
///
/// A failure partway through leaves already-created keys on the servers
/// visited so far. They are referenced by nothing and protect nothing;
/// unpinged, they expire on their own.
pub async fn create_package(
    servers: &[KeyServer],
    timelock_secs: i64,
    secret: &[u8],
    policy: &[Vec<u32>],
) -> Result<CreatedShare, ClientError> {
    if timelock_secs <= 0 {
        return Err(ClientError::Policy("timelock must be positive".to_owned()));
    }
    composer::validate_policy(policy, servers.len())?;

    let env = SystemEnv::new();
    let mut materials = Zeroizing::new(Vec::with_capacity(servers.len()));
    let mut descriptors = Vec::with_capacity(servers.len());
    let mut ping_targets = Vec::with_capacity(servers.len());

    for server in servers {
        let request = OperationRequest::Set { timelock_secs };
        let outcome = connection::perform(&server.host, server.pk, request).await?;

        let OperationOutcome::Set { sender, receiver, key } = outcome else {
            return Err(ClientError::Protocol(
                "set answered with a different operation's response".to_owned(),
            ));
        };

        tracing::debug!(host = %server.host, "Key created");

        materials.push(key);
        descriptors.push(KeyDescriptor {
            host: server.host.clone(),
            pk: server.pk,
            id: receiver,
        });
        ping_targets.push(PingTarget { host: server.host.clone(), pk: server.pk, id: sender });
    }

    let paths = composer::compose_paths(&env, secret, &materials, policy)?;

    Ok(CreatedShare { package: SharePackage { keys: descriptors, paths }, ping_targets })
}

/// Ping every target in parallel.
///
/// Always returns one report per target, in target order, whether the ping
/// succeeded or not. Treat any unhealthy report as urgent: a key that
/// misses its cadence unlocks, and once unlocked it stays that way.
pub async fn ping_all(targets: &[PingTarget]) -> Vec<PingReport> {
    let mut handles = Vec::with_capacity(targets.len());
    for target in targets {
        let target = target.clone();
        handles.push(tokio::spawn(async move {
            let request = OperationRequest::Ping { id: target.id };
            let outcome = match connection::perform(&target.host, target.pk, request).await {
                Ok(OperationOutcome::Ping { status }) => Ok(status),
                Ok(_) => Err(ClientError::Protocol(
                    "ping answered with a different operation's response".to_owned(),
                )),
                Err(err) => Err(err),
            };
            PingReport { host: target.host, outcome }
        }));
    }

    let mut reports = Vec::with_capacity(handles.len());
    for (handle, target) in handles.into_iter().zip(targets) {
        match handle.await {
            Ok(report) => {
                if !report.is_healthy() {
                    tracing::warn!(host = %report.host, "Ping unhealthy");
                }
                reports.push(report);
            },
            Err(err) => reports.push(PingReport {
                host: target.host.clone(),
                outcome: Err(ClientError::Transport(format!("ping task failed: {err}"))),
            }),
        }
    }
    reports
}

#[cfg(test)]
mod tests {
    use super::*;

    fn servers() -> Vec<KeyServer> {
        vec![
            KeyServer { host: "server1.example.net:4850".to_owned(), pk: [1; 32] },
            KeyServer { host: "server2.example.net:4850".to_owned(), pk: [2; 32] },
        ]
    }

    #[tokio::test]
    async fn rejects_non_positive_timelock_before_connecting() {
        let result = create_package(&servers(), 0, b"secret", &[vec![0]]).await;
        assert!(matches!(result, Err(ClientError::Policy(_))));
    }

    #[tokio::test]
    async fn rejects_bad_policy_before_connecting() {
        let result = create_package(&servers(), 60, b"secret", &[vec![0, 7]]).await;
        assert!(matches!(result, Err(ClientError::Policy(_))));
    }

    #[tokio::test]
    async fn rejects_empty_policy_before_connecting() {
        let result = create_package(&servers(), 60, b"secret", &[]).await;
        assert!(matches!(result, Err(ClientError::Policy(_))));
    }

    #[test]
    fn healthy_means_answered_and_locked() {
        let locked = PingReport {
            host: "a:1".to_owned(),
            outcome: Ok(KeyStatus::Locked),
        };
        let unlocked = PingReport {
            host: "a:1".to_owned(),
            outcome: Ok(KeyStatus::Unlocked),
        };
        let failed = PingReport {
            host: "a:1".to_owned(),
            outcome: Err(ClientError::Transport("unreachable".to_owned())),
        };

        assert!(locked.is_healthy());
        assert!(!unlocked.is_healthy());
        assert!(!failed.is_healthy());
    }
}
