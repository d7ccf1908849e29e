//! Mint Core - Key encoding, entropy checks, and shared types
//!
//! This crate holds everything on the Mint bearer device that does not touch
//! hardware: Base58/WIF/address encoding of key material, the entropy
//! frequency health test, entropy mixing, and scoped secret buffers that are
//! overwritten when they go out of scope.

pub mod address;
pub mod base58;
pub mod crypto;
pub mod entropy;
pub mod error;
pub mod network;
pub mod secret;
pub mod types;
pub mod wif;

pub use address::{format_address, is_valid_address, AddressKind};
pub use crypto::{DerivationPath, PublicKey};
pub use entropy::{EntropyLength, EntropyMaterial, EntropyMixing, HealthReport};
pub use error::{Error, Result};
pub use network::Network;
pub use secret::{Digest32, RawKey, SecretBytes};

/// Size of a raw secp256k1 private scalar
pub const RAW_KEY_SIZE: usize = 32;

/// Size of the mixed entropy digest used to seed the master key
pub const SEED_SIZE: usize = 32;

/// Number of checksum bytes appended by Base58Check framing
pub const CHECKSUM_SIZE: usize = 4;
