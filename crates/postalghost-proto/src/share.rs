//! Share package codec.
//!
//! The share package is the out-of-band artifact a sender hands to the
//! receiver: which servers hold keys, how to authenticate each one, and the
//! sealed ciphertexts with the key subsets that open them. Same conventions
//! as the wire payloads: CBOR on the outside, hex strings for binary fields.
//!
//! The package contains no plaintext secret and no sender handles. Leaking it
//! early reveals nothing until enough servers release their keys, and a
//! receiver who finds it can never ping.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::{
    Handle, hexfmt,
    errors::{ProtocolError, Result},
};

/// One server a receiver must contact during recovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyDescriptor {
    /// Server address in `host:port` form.
    pub host: String,
    /// Ed25519 public key the server must prove during the handshake.
    #[serde(with = "hexfmt::array")]
    pub pk: [u8; 32],
    /// Receiver handle for `get` on this server.
    pub id: Handle,
}

/// One decryption route through the key set.
///
/// `data` opens with the composite of exactly the keys at the listed indices.
/// Multiple paths encrypt the same secret under different subsets, which is
/// how OR-of-AND policies are expressed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnlockPath {
    /// Indices into the package's `keys` list (AND set for this path).
    pub keys: Vec<u32>,
    /// Sealed secret: `nonce(24) || ciphertext || tag(16)`.
    #[serde(with = "hexfmt::vec")]
    pub data: Vec<u8>,
}

/// Complete recovery instructions for one secret.
///
/// # Invariants
///
/// - At least one key descriptor and at least one path.
/// - Every path references at least one key, by valid index, without
///   duplicates.
///
/// Both codec directions enforce these: [`SharePackage::to_bytes`] refuses to
/// emit a malformed package and [`SharePackage::from_bytes`] refuses to
/// accept one, so a package that round-trips is structurally sound.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharePackage {
    /// Servers holding the timelocked keys.
    pub keys: Vec<KeyDescriptor>,
    /// Decryption routes, tried in order during recovery.
    pub paths: Vec<UnlockPath>,
}

impl SharePackage {
    /// Serialize to CBOR bytes.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::InvalidShare` if the package violates its
    ///   structural rules
    /// - `ProtocolError::CborEncode` if serialization fails
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        self.validate()?;

        let mut buf = Vec::new();
        ciborium::ser::into_writer(self, &mut buf)
            .map_err(|e| ProtocolError::CborEncode(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize from CBOR bytes.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::CborDecode` if the bytes are not a well-formed
    ///   package
    /// - `ProtocolError::InvalidShare` if the decoded package violates its
    ///   structural rules
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let package: Self = ciborium::de::from_reader(bytes)
            .map_err(|e| ProtocolError::CborDecode(e.to_string()))?;
        package.validate()?;
        Ok(package)
    }

    /// Check the package's structural rules.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError::InvalidShare` naming the first violation
    /// found.
    pub fn validate(&self) -> Result<()> {
        if self.keys.is_empty() {
            return Err(ProtocolError::InvalidShare("no key descriptors".to_owned()));
        }
        if self.paths.is_empty() {
            return Err(ProtocolError::InvalidShare("no unlock paths".to_owned()));
        }

        for (index, path) in self.paths.iter().enumerate() {
            if path.keys.is_empty() {
                return Err(ProtocolError::InvalidShare(format!(
                    "path {index} references no keys"
                )));
            }

            let mut seen = HashSet::new();
            for &key_index in &path.keys {
                if key_index as usize >= self.keys.len() {
                    return Err(ProtocolError::InvalidShare(format!(
                        "path {index} references key {key_index} but only {} exist",
                        self.keys.len()
                    )));
                }
                if !seen.insert(key_index) {
                    return Err(ProtocolError::InvalidShare(format!(
                        "path {index} references key {key_index} twice"
                    )));
                }
            }
        }

        Ok(())
    }
}
