//! Scoped secret buffers
//!
//! Every buffer that holds entropy, a mixed seed, or a raw private scalar is
//! wrapped in [`SecretBytes`]. The wrapper overwrites its contents when it is
//! dropped, so early returns and error paths release nothing readable.

use std::fmt;

use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{Error, Result};
use crate::{RAW_KEY_SIZE, SEED_SIZE};

/// Fixed-size secret, zeroed on drop
pub struct SecretBytes<const N: usize>([u8; N]);

/// 32-byte digest of mixed entropy, used as the master key seed
pub type Digest32 = SecretBytes<SEED_SIZE>;

/// Raw 32-byte secp256k1 private scalar
pub type RawKey = SecretBytes<RAW_KEY_SIZE>;

impl<const N: usize> SecretBytes<N> {
    /// An all-zero buffer, to be filled in place
    pub fn zeroed() -> Self {
        Self([0u8; N])
    }

    /// Take ownership of `bytes`, zeroing the source array
    pub fn from_array(bytes: &mut [u8; N]) -> Self {
        let secret = Self(*bytes);
        bytes.zeroize();
        secret
    }

    /// Copy from a slice of exactly `N` bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != N {
            return Err(Error::InvalidLength {
                expected: N,
                actual: bytes.len(),
            });
        }
        let mut secret = Self::zeroed();
        secret.0.copy_from_slice(bytes);
        Ok(secret)
    }

    pub fn expose(&self) -> &[u8; N] {
        &self.0
    }

    pub fn expose_mut(&mut self) -> &mut [u8; N] {
        &mut self.0
    }

    /// True when every byte is zero
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }

    /// Constant-time equality
    pub fn ct_eq(&self, other: &Self) -> bool {
        self.0[..].ct_eq(&other.0[..]).into()
    }
}

impl<const N: usize> Zeroize for SecretBytes<N> {
    fn zeroize(&mut self) {
        self.0.zeroize();
    }
}

impl<const N: usize> Drop for SecretBytes<N> {
    fn drop(&mut self) {
        self.zeroize();
    }
}

impl<const N: usize> ZeroizeOnDrop for SecretBytes<N> {}

impl<const N: usize> fmt::Debug for SecretBytes<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretBytes<{}>(REDACTED)", N)
    }
}
