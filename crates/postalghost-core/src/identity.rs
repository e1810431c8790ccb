//! Server identity and challenge signatures.
//!
//! Servers authenticate themselves to clients, never the other way around.
//! A server's identity is a long-lived Ed25519 key whose public half travels
//! to clients out of band (sender configuration, share packages). Possession
//! of the private half is proven per connection by signing the client's
//! challenge.

use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};

use crate::{env::Environment, error::IdentityError};

/// Domain separation prefix for challenge signatures.
///
/// The signature covers `CHALLENGE_CONTEXT || challenge`, so a signature
/// produced here can never double as a valid signature over some other
/// protocol's message, and vice versa.
pub const CHALLENGE_CONTEXT: &[u8] = b"postalghost handshake v1";

/// Long-lived Ed25519 identity of a server.
#[derive(Clone)]
pub struct ServerIdentity {
    signing_key: SigningKey,
}

impl ServerIdentity {
    /// Rebuild an identity from a stored 32-byte seed.
    #[must_use]
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self { signing_key: SigningKey::from_bytes(&seed) }
    }

    /// Generate a fresh identity from environment randomness.
    #[must_use]
    pub fn generate<E: Environment>(env: &E) -> Self {
        Self::from_seed(env.random_array())
    }

    /// Seed bytes for persistence.
    ///
    /// # Security
    ///
    /// The seed IS the private key. It must never travel over the wire or
    /// appear in logs.
    #[must_use]
    pub fn seed(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }

    /// Public key clients authenticate this server against.
    #[must_use]
    pub fn verifying_key(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    /// Sign a client challenge.
    ///
    /// The signature covers [`CHALLENGE_CONTEXT`] followed by the challenge
    /// bytes exactly as received.
    #[must_use]
    pub fn sign_challenge(&self, challenge: &[u8]) -> [u8; 64] {
        self.signing_key.sign(&challenge_message(challenge)).to_bytes()
    }
}

impl std::fmt::Debug for ServerIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerIdentity")
            .field("verifying_key", &hex::encode(self.verifying_key()))
            .finish_non_exhaustive()
    }
}

/// Verify a server's signature over a challenge.
///
/// This is the client-side half of the handshake: the expected `pk` comes
/// from local configuration or the share package, never from the connection
/// itself.
///
/// # Errors
///
/// - `IdentityError::InvalidPublicKey` if `pk` does not decode to a valid
///   Ed25519 point
/// - `IdentityError::BadSignature` if the signature does not verify
pub fn verify_challenge(
    pk: &[u8; 32],
    challenge: &[u8],
    sig: &[u8; 64],
) -> Result<(), IdentityError> {
    let verifying_key =
        VerifyingKey::from_bytes(pk).map_err(|_| IdentityError::InvalidPublicKey)?;

    let signature = Signature::from_bytes(sig);
    verifying_key
        .verify_strict(&challenge_message(challenge), &signature)
        .map_err(|_| IdentityError::BadSignature)
}

fn challenge_message(challenge: &[u8]) -> Vec<u8> {
    let mut message = Vec::with_capacity(CHALLENGE_CONTEXT.len() + challenge.len());
    message.extend_from_slice(CHALLENGE_CONTEXT);
    message.extend_from_slice(challenge);
    message
}
