//! Opaque capability handles.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer, de::Error as _};

use crate::errors::{ProtocolError, Result};

/// Opaque 16-byte capability token addressing one key record.
///
/// Possession is the only authentication a server performs: knowing the
/// sender handle grants `ping`, knowing the receiver handle grants `get`.
/// Handles carry no internal structure and the two handles of a record are
/// drawn independently, so holding one reveals nothing about the other.
///
/// On the wire and in share packages a handle is its 32-character hex form.
///
/// # Security
///
/// A handle is a bearer credential. `Debug` prints only a short prefix so
/// handles do not leak into logs; use [`Handle::to_hex`] where the full
/// value is genuinely needed.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle([u8; Handle::SIZE]);

impl Handle {
    /// Width of a handle in bytes (128 bits of entropy).
    pub const SIZE: usize = 16;

    /// Wraps raw bytes as a handle.
    ///
    /// The bytes must come from a CSPRNG; guessable handles break the scheme.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; Self::SIZE]) -> Self {
        Self(bytes)
    }

    /// Raw bytes of the handle.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; Self::SIZE] {
        &self.0
    }

    /// Parses a handle from its hex form.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidHex`] unless the input is exactly 32
    /// hex characters.
    pub fn from_hex(text: &str) -> Result<Self> {
        let raw = hex::decode(text).map_err(|_| ProtocolError::InvalidHex { field: "handle" })?;
        let bytes: [u8; Self::SIZE] = raw
            .as_slice()
            .try_into()
            .map_err(|_| ProtocolError::InvalidHex { field: "handle" })?;
        Ok(Self(bytes))
    }

    /// Lowercase hex form of the handle (32 characters).
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = self.to_hex();
        let (prefix, _) = hex.split_at(8);
        write!(f, "Handle({prefix}..)")
    }
}

impl Serialize for Handle {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Handle {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        Self::from_hex(&text).map_err(D::Error::custom)
    }
}
