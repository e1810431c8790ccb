//! Serde adapters for hex-encoded binary fields.
//!
//! Binary values inside CBOR payloads and share packages travel as hex
//! strings, so every message is printable, diffable, and safe to paste into
//! logs or tickets. These adapters keep the Rust side as byte arrays while
//! the wire stays text. Encoding always emits lowercase; decoding accepts
//! either case but rejects wrong widths and non-hex characters.

/// Adapter for fixed-width byte arrays: `#[serde(with = "hexfmt::array")]`.
pub mod array {
    use serde::{Deserialize, Deserializer, Serializer, de::Error as _};

    /// Serializes the array as a lowercase hex string.
    ///
    /// # Errors
    ///
    /// Propagates serializer failures.
    pub fn serialize<S, const N: usize>(bytes: &[u8; N], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    /// Deserializes a hex string into an exactly `N`-byte array.
    ///
    /// # Errors
    ///
    /// Fails on non-hex input or any width other than `2 * N` characters.
    pub fn deserialize<'de, D, const N: usize>(deserializer: D) -> Result<[u8; N], D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        let raw = hex::decode(&text).map_err(D::Error::custom)?;
        raw.as_slice()
            .try_into()
            .map_err(|_| D::Error::custom(format!("expected {N} bytes, got {}", raw.len())))
    }
}

/// Adapter for optional fixed-width byte arrays: `#[serde(with = "hexfmt::array_opt")]`.
///
/// Pair with `skip_serializing_if = "Option::is_none"` and `default` so an
/// absent value encodes as an absent field rather than an explicit null.
pub mod array_opt {
    use serde::{Deserialize, Deserializer, Serializer, de::Error as _};

    /// Serializes `Some` as a lowercase hex string and `None` as none.
    ///
    /// # Errors
    ///
    /// Propagates serializer failures.
    pub fn serialize<S, const N: usize>(
        value: &Option<[u8; N]>,
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(bytes) => serializer.serialize_some(&hex::encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    /// Deserializes an optional hex string into an optional `N`-byte array.
    ///
    /// # Errors
    ///
    /// Fails on non-hex input or any width other than `2 * N` characters.
    pub fn deserialize<'de, D, const N: usize>(deserializer: D) -> Result<Option<[u8; N]>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let Some(text) = Option::<String>::deserialize(deserializer)? else {
            return Ok(None);
        };
        let raw = hex::decode(&text).map_err(D::Error::custom)?;
        let bytes: [u8; N] = raw
            .as_slice()
            .try_into()
            .map_err(|_| D::Error::custom(format!("expected {N} bytes, got {}", raw.len())))?;
        Ok(Some(bytes))
    }
}

/// Adapter for variable-length byte strings: `#[serde(with = "hexfmt::vec")]`.
pub mod vec {
    use serde::{Deserialize, Deserializer, Serializer, de::Error as _};

    /// Serializes the bytes as a lowercase hex string.
    ///
    /// # Errors
    ///
    /// Propagates serializer failures.
    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    /// Deserializes a hex string of any even length.
    ///
    /// # Errors
    ///
    /// Fails on non-hex input or odd-length strings.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        hex::decode(&text).map_err(D::Error::custom)
    }
}
