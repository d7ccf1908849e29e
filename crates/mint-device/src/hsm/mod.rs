//! Secure element abstraction
//!
//! Commands mirror what the device's secure element offers over its applet
//! interface: a TRNG, SHA-256, EC key objects addressed by 32-bit ids, and
//! one-time-programmable memory. Key objects are created non-exportable; the
//! only way out for a private scalar is [`SecureElement::reveal_private`],
//! which the element itself refuses until the OTP byte named at creation has
//! been burned.

pub mod soft;

pub use soft::{Fault, PatternRng, SoftFaults, SoftSecureElement};

use mint_core::{Digest32, RawKey};

use crate::error::Result;

/// Key object id of the master key
pub const MASTER_KEY_ID: ObjectId = ObjectId(0x1000_0001);

/// OTP address holding the tamper byte
pub const OTP_TAMPER_ADDRESS: u32 = 0x7F_FFF0;

/// OTP value of an unburned byte
pub const OTP_ERASED: u8 = 0xFF;

/// OTP value once the tamper bit has been burned
pub const OTP_TAMPERED: u8 = 0x00;

/// Identifier of an object stored in the secure element
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId(pub u32);

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

/// Commands the device needs from its secure element
///
/// Calls are synchronous; the device runs a single cooperative loop.
pub trait SecureElement: Send {
    /// Open the session
    fn open(&mut self) -> Result<()>;

    /// Fill `out` from the hardware TRNG
    fn random_bytes(&mut self, out: &mut [u8]) -> Result<()>;

    /// SHA-256 over the concatenation of `parts`
    fn sha256(&mut self, parts: &[&[u8]]) -> Result<Digest32>;

    fn object_exists(&self, id: ObjectId) -> Result<bool>;

    fn delete_object(&mut self, id: ObjectId) -> Result<()>;

    /// Create a secp256k1 key pair from `seed`
    ///
    /// The private scalar can be read back only after the OTP byte at
    /// `reveal_gate` reads [`OTP_TAMPERED`].
    fn create_ec_keypair(&mut self, id: ObjectId, seed: &Digest32, reveal_gate: u32) -> Result<()>;

    /// Uncompressed SEC1 public key (65 bytes)
    fn public_key(&self, id: ObjectId) -> Result<[u8; 65]>;

    /// Read out the private scalar of an unlocked key
    fn reveal_private(&mut self, id: ObjectId) -> Result<RawKey>;

    fn read_otp(&self, address: u32) -> Result<u8>;

    /// Program an OTP byte; bits can only be cleared, never set again
    fn write_otp(&mut self, address: u32, value: u8) -> Result<()>;
}
