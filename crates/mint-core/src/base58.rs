//! Base58 and Base58Check
//!
//! Encoding runs a big-number conversion over a growable digit buffer whose
//! length is checked against an explicit capacity. The working buffers are
//! zeroed on drop since the input is often a private key payload.

use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::crypto::checksum;
use crate::error::{Error, Result};
use crate::CHECKSUM_SIZE;

/// The Bitcoin alphabet (no `0`, `O`, `I` or `l`)
pub const ALPHABET: &[u8; 58] = b"123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

const INVALID: u8 = 0xFF;

const DECODE_MAP: [u8; 128] = {
    let mut map = [INVALID; 128];
    let mut i = 0;
    while i < ALPHABET.len() {
        map[ALPHABET[i] as usize] = i as u8;
        i += 1;
    }
    map
};

/// Worst-case encoded length for `len` input bytes, including one spare slot
///
/// log(256) / log(58) is just under 1.38.
pub const fn encoded_capacity(len: usize) -> usize {
    (len * 138 + 99) / 100 + 1
}

/// Encode bytes, sizing the output for the worst case
pub fn encode(bytes: &[u8]) -> Result<String> {
    encode_bounded(bytes, encoded_capacity(bytes.len()))
}

/// Encode bytes into at most `capacity` characters
pub fn encode_bounded(bytes: &[u8], capacity: usize) -> Result<String> {
    let required = encoded_capacity(bytes.len());
    if required > capacity {
        return Err(Error::Capacity { required, capacity });
    }

    let zeros = bytes.iter().take_while(|&&b| b == 0).count();

    // Little-endian base-58 digits of the non-zero tail
    let mut digits: Zeroizing<Vec<u8>> = Zeroizing::new(Vec::with_capacity(required));
    for &byte in &bytes[zeros..] {
        let mut carry = byte as u32;
        for digit in digits.iter_mut() {
            carry += (*digit as u32) << 8;
            *digit = (carry % 58) as u8;
            carry /= 58;
        }
        while carry > 0 {
            if zeros + digits.len() >= capacity {
                return Err(Error::Capacity { required, capacity });
            }
            digits.push((carry % 58) as u8);
            carry /= 58;
        }
    }

    let mut out = String::with_capacity(zeros + digits.len());
    out.extend(std::iter::repeat('1').take(zeros));
    out.extend(digits.iter().rev().map(|&d| ALPHABET[d as usize] as char));
    Ok(out)
}

/// Decode a Base58 string
///
/// Each leading `'1'` becomes one leading zero byte.
pub fn decode(s: &str) -> Result<Vec<u8>> {
    let mut zeros = 0;
    let mut leading = true;
    let mut bytes: Zeroizing<Vec<u8>> = Zeroizing::new(Vec::with_capacity(s.len()));

    for (position, character) in s.chars().enumerate() {
        let value = match character {
            c if c.is_ascii() => DECODE_MAP[c as usize],
            _ => INVALID,
        };
        if value == INVALID {
            return Err(Error::InvalidBase58Character {
                character,
                position,
            });
        }

        if leading && value == 0 {
            zeros += 1;
            continue;
        }
        leading = false;

        let mut carry = value as u32;
        for byte in bytes.iter_mut() {
            carry += (*byte as u32) * 58;
            *byte = (carry & 0xFF) as u8;
            carry >>= 8;
        }
        while carry > 0 {
            bytes.push((carry & 0xFF) as u8);
            carry >>= 8;
        }
    }

    let mut out = vec![0u8; zeros];
    out.extend(bytes.iter().rev());
    Ok(out)
}

/// Append the double-SHA256 checksum and encode
pub fn encode_check(payload: &[u8]) -> Result<String> {
    let mut framed: Zeroizing<Vec<u8>> =
        Zeroizing::new(Vec::with_capacity(payload.len() + CHECKSUM_SIZE));
    framed.extend_from_slice(payload);
    framed.extend_from_slice(&checksum(payload));
    encode(&framed)
}

/// Decode and verify the trailing checksum, returning the payload
pub fn decode_check(s: &str) -> Result<Vec<u8>> {
    let mut decoded = Zeroizing::new(decode(s)?);
    if decoded.len() < CHECKSUM_SIZE {
        return Err(Error::ChecksumMismatch);
    }

    let split = decoded.len() - CHECKSUM_SIZE;
    let expected = checksum(&decoded[..split]);
    if !bool::from(expected[..].ct_eq(&decoded[split..])) {
        return Err(Error::ChecksumMismatch);
    }

    decoded.truncate(split);
    Ok(decoded.to_vec())
}
