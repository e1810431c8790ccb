//! Key composition for unlock paths.

use zeroize::{Zeroize, ZeroizeOnDrop};

/// Symmetric key formed by combining server-held key material.
///
/// Zeroized on drop. `Debug` prints no key bytes.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct CompositeKey([u8; CompositeKey::SIZE]);

impl CompositeKey {
    /// Width of a composite key in bytes.
    pub const SIZE: usize = 32;

    /// Wraps raw bytes as a composite key.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; Self::SIZE]) -> Self {
        Self(bytes)
    }

    /// Raw bytes of the key.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; Self::SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for CompositeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CompositeKey(..)")
    }
}

/// Combines server keys into one composite key.
///
/// Byte-wise sum mod 256: `out[i]` is the wrapping sum of byte `i` across
/// all inputs. The operation is commutative and associative, so a receiver
/// may recombine keys in whatever order servers released them. A single key
/// combines to itself.
///
/// An empty slice yields the all-zero key; callers validate path membership
/// before combining.
///
/// # Security
///
/// Missing any one input leaves every output byte offset by that input's
/// byte, so a partial subset recovers nothing. Each server key must be
/// independently random for this to hold.
#[must_use]
pub fn combine(keys: &[[u8; 32]]) -> CompositeKey {
    let mut out = [0u8; CompositeKey::SIZE];
    for key in keys {
        for (acc, byte) in out.iter_mut().zip(key.iter()) {
            *acc = acc.wrapping_add(*byte);
        }
    }
    CompositeKey::from_bytes(out)
}
