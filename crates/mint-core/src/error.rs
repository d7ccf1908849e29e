//! Error types for Mint core

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Encoded output needs {required} characters but capacity is {capacity}")]
    Capacity { required: usize, capacity: usize },

    #[error("Invalid Base58 character {character:?} at position {position}")]
    InvalidBase58Character { character: char, position: usize },

    #[error("Checksum mismatch")]
    ChecksumMismatch,

    #[error("Invalid WIF: {0}")]
    InvalidWif(String),

    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("Invalid derivation path: {0}")]
    InvalidDerivationPath(String),

    #[error("Address encoding error: {0}")]
    AddressEncoding(String),

    #[error("Invalid length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("Invalid entropy length: {0} bytes (expected 16, 24 or 32)")]
    InvalidEntropyLength(usize),

    #[error("Entropy health check failed: {ones} of {bits} bits set")]
    HealthCheckFailed { ones: usize, bits: usize },

    #[error("Unknown network: {0}")]
    UnknownNetwork(String),

    #[error("Entropy mixing failed: {0}")]
    Mixing(String),
}
