//! Display address formatting
//!
//! The device shows exactly one receive address, derived from the HSM's
//! public key. Two schemes are supported: native segwit v0 (bech32 P2WPKH,
//! the default) and legacy Base58Check P2PKH.

use bech32::{u5, FromBase32, ToBase32, Variant};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::base58;
use crate::crypto::PublicKey;
use crate::error::{Error, Result};
use crate::network::Network;

const WITNESS_VERSION: u8 = 0;
const PUBKEY_HASH_SIZE: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressKind {
    /// bech32 `bc1q…` / `tb1q…`
    #[default]
    P2wpkh,
    /// Base58Check `1…` / `m…` / `n…`
    P2pkh,
}

impl fmt::Display for AddressKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressKind::P2wpkh => write!(f, "p2wpkh"),
            AddressKind::P2pkh => write!(f, "p2pkh"),
        }
    }
}

impl FromStr for AddressKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "p2wpkh" | "segwit" => Ok(AddressKind::P2wpkh),
            "p2pkh" | "legacy" => Ok(AddressKind::P2pkh),
            other => Err(Error::AddressEncoding(format!(
                "Unknown address kind: {}",
                other
            ))),
        }
    }
}

/// Format the display address for a public key
pub fn format_address(pubkey: &PublicKey, network: Network, kind: AddressKind) -> Result<String> {
    let hash = pubkey.hash160();
    match kind {
        AddressKind::P2wpkh => {
            let version =
                u5::try_from_u8(WITNESS_VERSION).map_err(|e| Error::AddressEncoding(e.to_string()))?;
            let mut data = vec![version];
            data.extend(hash.to_base32());
            bech32::encode(network.bech32_hrp(), data, Variant::Bech32)
                .map_err(|e| Error::AddressEncoding(e.to_string()))
        }
        AddressKind::P2pkh => {
            let mut payload = Vec::with_capacity(1 + PUBKEY_HASH_SIZE);
            payload.push(network.p2pkh_version());
            payload.extend_from_slice(&hash);
            base58::encode_check(&payload)
        }
    }
}

/// Check that `address` is well formed for the given network and scheme
pub fn is_valid_address(address: &str, network: Network, kind: AddressKind) -> bool {
    match kind {
        AddressKind::P2wpkh => {
            let Ok((hrp, data, variant)) = bech32::decode(address) else {
                return false;
            };
            if hrp != network.bech32_hrp() || variant != Variant::Bech32 {
                return false;
            }
            let Some((version, program)) = data.split_first() else {
                return false;
            };
            version.to_u8() == WITNESS_VERSION
                && Vec::<u8>::from_base32(program)
                    .map(|p| p.len() == PUBKEY_HASH_SIZE)
                    .unwrap_or(false)
        }
        AddressKind::P2pkh => match base58::decode_check(address) {
            Ok(payload) => {
                payload.len() == 1 + PUBKEY_HASH_SIZE && payload[0] == network.p2pkh_version()
            }
            Err(_) => false,
        },
    }
}
