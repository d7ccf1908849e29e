//! Cryptographic primitives for Mint

use k256::elliptic_curve::sec1::ToEncodedPoint;
use ripemd::Ripemd160;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::types::hex_array;
use crate::CHECKSUM_SIZE;

/// secp256k1 point in 33-byte compressed SEC1 form
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKey(#[serde(with = "hex_array")] pub [u8; 33]);

impl PublicKey {
    /// Parse a SEC1 point, compressed (33 bytes) or uncompressed (65 bytes),
    /// checking that it lies on secp256k1
    pub fn from_sec1(bytes: &[u8]) -> Result<Self> {
        let point = k256::PublicKey::from_sec1_bytes(bytes)
            .map_err(|e| Error::InvalidPublicKey(e.to_string()))?;
        let encoded = point.to_encoded_point(true);
        encoded
            .as_bytes()
            .try_into()
            .map(Self)
            .map_err(|_| Error::InvalidPublicKey("compression produced a bad length".into()))
    }

    pub fn as_bytes(&self) -> &[u8; 33] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a hex-encoded SEC1 point
    pub fn from_hex(s: &str) -> Result<Self> {
        let raw = hex::decode(s).map_err(|e| Error::InvalidPublicKey(e.to_string()))?;
        Self::from_sec1(&raw)
    }

    /// RIPEMD-160(SHA-256(pubkey)), the witness program of P2WPKH
    pub fn hash160(&self) -> [u8; 20] {
        hash160(&self.0)
    }
}

impl AsRef<[u8]> for PublicKey {
    fn as_ref(&self) -> &[u8] {
        self.0.as_slice()
    }
}

/// BIP32-style derivation path
///
/// The device derives a single address from its single master key, so the
/// path is validated and carried along but not applied to the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DerivationPath {
    indices: [u32; DerivationPath::MAX_DEPTH],
    len: u8,
}

impl DerivationPath {
    /// High bit marking a hardened child index
    pub const HARDENED: u32 = 1 << 31;

    pub const MAX_DEPTH: usize = 5;

    /// Build a path from raw child indices (hardened bit already applied)
    pub fn new(indices: &[u32]) -> Result<Self> {
        if indices.len() > Self::MAX_DEPTH {
            return Err(Error::InvalidDerivationPath(format!(
                "{} levels given, at most {} supported",
                indices.len(),
                Self::MAX_DEPTH
            )));
        }
        let mut buf = [0u32; Self::MAX_DEPTH];
        buf[..indices.len()].copy_from_slice(indices);
        Ok(Self {
            indices: buf,
            len: indices.len() as u8,
        })
    }

    fn account_path(purpose: u32, coin_type: u32, index: u32) -> Self {
        let h = Self::HARDENED;
        Self {
            indices: [purpose | h, coin_type | h, h, 0, index],
            len: 5,
        }
    }

    /// BIP84 native segwit path: m/84'/coin'/0'/0/i
    pub fn bip84(coin_type: u32, index: u32) -> Self {
        Self::account_path(84, coin_type, index)
    }

    /// BIP44 legacy path: m/44'/coin'/0'/0/i
    pub fn bip44(coin_type: u32, index: u32) -> Self {
        Self::account_path(44, coin_type, index)
    }

    /// Number of levels below the master key
    pub fn depth(&self) -> usize {
        usize::from(self.len)
    }

    /// Child indices in order, hardened bit included
    pub fn indices(&self) -> &[u32] {
        &self.indices[..self.depth()]
    }

    /// Parse a path string such as "m/84'/0'/0'/0/0" ("h" also marks hardened)
    pub fn parse(path: &str) -> Result<Self> {
        let mut levels = path.split('/');
        if levels.next() != Some("m") {
            return Err(Error::InvalidDerivationPath(format!(
                "{:?} does not start at the master key",
                path
            )));
        }

        let indices = levels.map(parse_level).collect::<Result<Vec<_>>>()?;
        Self::new(&indices)
    }

    /// Canonical rendering with `'` for hardened levels
    pub fn to_string_path(&self) -> String {
        self.to_string()
    }
}

fn parse_level(level: &str) -> Result<u32> {
    let (digits, hardened) = match level.strip_suffix(['\'', 'h']) {
        Some(digits) => (digits, true),
        None => (level, false),
    };
    let index = digits
        .parse::<u32>()
        .ok()
        .filter(|i| i & DerivationPath::HARDENED == 0)
        .ok_or_else(|| Error::InvalidDerivationPath(format!("bad path level {:?}", level)))?;
    Ok(if hardened {
        index | DerivationPath::HARDENED
    } else {
        index
    })
}

impl Default for DerivationPath {
    fn default() -> Self {
        Self::bip84(0, 0)
    }
}

impl fmt::Display for DerivationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("m")?;
        for &index in self.indices() {
            match index & Self::HARDENED {
                0 => write!(f, "/{}", index)?,
                _ => write!(f, "/{}'", index & !Self::HARDENED)?,
            }
        }
        Ok(())
    }
}

impl FromStr for DerivationPath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for DerivationPath {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DerivationPath {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// Single SHA-256
pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// SHA-256 over several slices fed in order
pub fn sha256_multi(parts: &[&[u8]]) -> [u8; 32] {
    parts
        .iter()
        .fold(Sha256::new(), |hasher, part| hasher.chain_update(part))
        .finalize()
        .into()
}

/// SHA256 applied twice
pub fn double_sha256(data: &[u8]) -> [u8; 32] {
    sha256(&sha256(data))
}

/// Base58Check checksum: first four bytes of the double hash
pub fn checksum(data: &[u8]) -> [u8; CHECKSUM_SIZE] {
    let hash = double_sha256(data);
    let mut out = [0u8; CHECKSUM_SIZE];
    out.copy_from_slice(&hash[..CHECKSUM_SIZE]);
    out
}

/// RIPEMD-160 of SHA-256
pub fn hash160(data: &[u8]) -> [u8; 20] {
    let mut hasher = Ripemd160::new();
    hasher.update(sha256(data));
    hasher.finalize().into()
}
