//! Wallet Import Format

use zeroize::Zeroizing;

use crate::base58;
use crate::crypto::checksum;
use crate::error::{Error, Result};
use crate::network::Network;
use crate::secret::RawKey;
use crate::{CHECKSUM_SIZE, RAW_KEY_SIZE};

/// Marker byte appended to the payload when the public key is compressed
pub const COMPRESSED_FLAG: u8 = 0x01;

/// Largest framed payload: prefix, key, compression flag, checksum
pub const MAX_FRAMED_SIZE: usize = 1 + RAW_KEY_SIZE + 1 + CHECKSUM_SIZE;

/// Output capacity for any WIF string
pub const WIF_CAPACITY: usize = base58::encoded_capacity(MAX_FRAMED_SIZE);

/// Encode a raw private key as WIF
///
/// The returned string is zeroed when dropped.
pub fn encode(key: &[u8; RAW_KEY_SIZE], compressed: bool, prefix: u8) -> Result<Zeroizing<String>> {
    let mut framed: Zeroizing<Vec<u8>> = Zeroizing::new(Vec::with_capacity(MAX_FRAMED_SIZE));
    framed.push(prefix);
    framed.extend_from_slice(key);
    if compressed {
        framed.push(COMPRESSED_FLAG);
    }
    let check = checksum(&framed);
    framed.extend_from_slice(&check);

    base58::encode_bounded(&framed, WIF_CAPACITY).map(Zeroizing::new)
}

/// A decoded WIF key
#[derive(Debug)]
pub struct DecodedWif {
    pub key: RawKey,
    pub compressed: bool,
    pub prefix: u8,
}

impl DecodedWif {
    /// Network implied by the prefix, if it is a known one
    pub fn network(&self) -> Option<Network> {
        Network::from_wif_prefix(self.prefix)
    }
}

/// Decode and verify a WIF string
pub fn decode(wif: &str) -> Result<DecodedWif> {
    let payload = Zeroizing::new(base58::decode_check(wif)?);

    let compressed = match payload.len() {
        33 => false,
        34 if payload[33] == COMPRESSED_FLAG => true,
        34 => {
            return Err(Error::InvalidWif(format!(
                "Unexpected compression flag 0x{:02x}",
                payload[33]
            )))
        }
        other => {
            return Err(Error::InvalidWif(format!(
                "Payload is {} bytes, expected 33 or 34",
                other
            )))
        }
    };

    let prefix = payload[0];
    let key = RawKey::from_slice(&payload[1..1 + RAW_KEY_SIZE])?;

    Ok(DecodedWif {
        key,
        compressed,
        prefix,
    })
}
