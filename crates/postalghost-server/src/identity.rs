//! Server identity persistence.
//!
//! The Ed25519 seed lives in a small text file next to the store. Clients
//! pin the corresponding public key inside their share packages, so losing
//! the file re-keys the server and permanently fails their handshakes:
//! guard the file like the key material it is.

use std::path::Path;

use postalghost_core::{Environment, ServerIdentity};

use crate::error::ServerError;

/// Load the identity seed from `path`, generating and persisting a fresh
/// one on first start.
///
/// The file holds the 32-byte seed as 64 hex characters (surrounding
/// whitespace is tolerated).
///
/// # Errors
///
/// Returns `ServerError::Config` if the file cannot be read or written, or
/// if its contents are not a valid seed.
pub fn load_or_generate<E: Environment>(
    path: &Path,
    env: &E,
) -> Result<ServerIdentity, ServerError> {
    if path.exists() {
        let text = std::fs::read_to_string(path).map_err(|e| {
            ServerError::Config(format!("failed to read identity file '{}': {e}", path.display()))
        })?;

        let seed = parse_seed(text.trim()).ok_or_else(|| {
            ServerError::Config(format!(
                "identity file '{}' must hold exactly 64 hex characters",
                path.display()
            ))
        })?;

        return Ok(ServerIdentity::from_seed(seed));
    }

    let identity = ServerIdentity::generate(env);

    let encoded = hex::encode(identity.seed());
    std::fs::write(path, format!("{encoded}\n")).map_err(|e| {
        ServerError::Config(format!("failed to write identity file '{}': {e}", path.display()))
    })?;

    tracing::info!(path = %path.display(), "Generated new server identity");

    Ok(identity)
}

fn parse_seed(text: &str) -> Option<[u8; 32]> {
    let bytes = hex::decode(text).ok()?;
    bytes.try_into().ok()
}
