//! Entropy health testing and mixing
//!
//! Hardware entropy passes a monobit frequency test before use: the share of
//! set bits must fall within [0.45, 0.55]. A pass only rules out grossly
//! broken sources (stuck-at-zero, stuck-at-one) and says nothing about
//! unpredictability.
//!
//! Mixing combines the hardware bytes with the user's dropped file so that
//! neither source alone fixes the resulting seed.

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::digest::generic_array::GenericArray;
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use zeroize::{Zeroize, Zeroizing};

use crate::error::{Error, Result};
use crate::secret::Digest32;

/// Lower bound of the accepted set-bit share, in percent
pub const MIN_ONES_PERCENT: usize = 45;

/// Upper bound of the accepted set-bit share, in percent
pub const MAX_ONES_PERCENT: usize = 55;

/// Supported hardware entropy request sizes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntropyLength {
    Bits128,
    Bits192,
    Bits256,
}

impl EntropyLength {
    pub fn bytes(&self) -> usize {
        match self {
            EntropyLength::Bits128 => 16,
            EntropyLength::Bits192 => 24,
            EntropyLength::Bits256 => 32,
        }
    }
}

impl TryFrom<usize> for EntropyLength {
    type Error = Error;

    fn try_from(len: usize) -> Result<Self> {
        match len {
            16 => Ok(EntropyLength::Bits128),
            24 => Ok(EntropyLength::Bits192),
            32 => Ok(EntropyLength::Bits256),
            other => Err(Error::InvalidEntropyLength(other)),
        }
    }
}

/// Result of a passing frequency test
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthReport {
    pub ones: usize,
    pub bits: usize,
}

impl HealthReport {
    pub fn fraction(&self) -> f64 {
        self.ones as f64 / self.bits as f64
    }
}

/// Number of set bits across the buffer
pub fn count_ones(bytes: &[u8]) -> usize {
    bytes.iter().map(|b| b.count_ones() as usize).sum()
}

/// Monobit frequency test
///
/// Integer arithmetic keeps the bounds exact: 116..=140 ones pass for a
/// 32-byte buffer. An empty buffer fails.
pub fn frequency_check(bytes: &[u8]) -> Result<HealthReport> {
    let bits = bytes.len() * 8;
    let ones = count_ones(bytes);

    let scaled = ones * 100;
    if bits == 0 || scaled < MIN_ONES_PERCENT * bits || scaled > MAX_ONES_PERCENT * bits {
        return Err(Error::HealthCheckFailed { ones, bits });
    }

    Ok(HealthReport { ones, bits })
}

/// Variable-length entropy buffer, zeroed on drop
pub struct EntropyMaterial(Zeroizing<Vec<u8>>);

impl EntropyMaterial {
    /// A zero-filled buffer of the requested length
    pub fn zeroed(length: EntropyLength) -> Self {
        Self(Zeroizing::new(vec![0u8; length.bytes()]))
    }

    /// Take ownership of `bytes`
    pub fn from_vec(bytes: Vec<u8>) -> Self {
        Self(Zeroizing::new(bytes))
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for EntropyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntropyMaterial({} bytes, REDACTED)", self.0.len())
    }
}

/// How hardware and external entropy are combined into the seed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntropyMixing {
    /// SHA-256(hardware || external)
    #[default]
    Sha256Concat,
    /// HMAC-SHA256 keyed with the hardware bytes over the external bytes
    HmacExtract,
}

impl fmt::Display for EntropyMixing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntropyMixing::Sha256Concat => write!(f, "sha256-concat"),
            EntropyMixing::HmacExtract => write!(f, "hmac-extract"),
        }
    }
}

impl FromStr for EntropyMixing {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sha256-concat" => Ok(EntropyMixing::Sha256Concat),
            "hmac-extract" => Ok(EntropyMixing::HmacExtract),
            other => Err(Error::Mixing(format!("Unknown mixing policy: {}", other))),
        }
    }
}

/// Combine external and hardware entropy into a 32-byte seed
pub fn mix_entropy(external: &[u8], hardware: &[u8], mixing: EntropyMixing) -> Result<Digest32> {
    let mut digest = Digest32::zeroed();

    match mixing {
        EntropyMixing::Sha256Concat => {
            let mut hasher = Sha256::new();
            hasher.update(hardware);
            hasher.update(external);
            hasher.finalize_into(GenericArray::from_mut_slice(digest.expose_mut()));
        }
        EntropyMixing::HmacExtract => {
            let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(hardware)
                .map_err(|e| Error::Mixing(e.to_string()))?;
            mac.update(external);
            let mut output = mac.finalize().into_bytes();
            digest.expose_mut().copy_from_slice(&output);
            output.as_mut_slice().zeroize();
        }
    }

    Ok(digest)
}
