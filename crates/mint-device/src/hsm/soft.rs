//! Software secure element
//!
//! Stands in for the hardware element on a host. Key objects and OTP bytes
//! live in an NV image that can be persisted as JSON, so a tamper bit burned
//! in one run is still burned in the next.

use k256::elliptic_curve::sec1::ToEncodedPoint;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::digest::generic_array::GenericArray;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use mint_core::types::hex_array;
use mint_core::{Digest32, RawKey};

use super::{ObjectId, SecureElement, OTP_ERASED, OTP_TAMPERED};
use crate::error::{DeviceError, Result};

/// A key object as stored in NV memory
#[derive(Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
struct KeyObject {
    #[serde(with = "hex_array")]
    secret: [u8; 32],
    reveal_gate: u32,
}

/// Contents of non-volatile memory
#[derive(Default, Serialize, Deserialize)]
struct NvImage {
    otp: BTreeMap<u32, u8>,
    objects: BTreeMap<u32, KeyObject>,
}

/// Commands that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    Open,
    Random,
    CreateKey,
    OtpWrite,
}

/// Shared fault switches for a [`SoftSecureElement`]
#[derive(Debug, Default)]
pub struct SoftFaults {
    flags: [AtomicBool; 4],
}

impl SoftFaults {
    pub fn inject(&self, fault: Fault) {
        self.flags[fault as usize].store(true, Ordering::SeqCst);
    }

    pub fn clear(&self, fault: Fault) {
        self.flags[fault as usize].store(false, Ordering::SeqCst);
    }

    pub fn is_set(&self, fault: Fault) -> bool {
        self.flags[fault as usize].load(Ordering::SeqCst)
    }

    fn check(&self, fault: Fault, what: &str) -> Result<()> {
        if self.is_set(fault) {
            return Err(DeviceError::Hsm(format!("{} failed", what)));
        }
        Ok(())
    }
}

/// Deterministic, bit-balanced byte source
///
/// Every byte of the default pattern has four bits set, so any output passes
/// the frequency test. Used for tests and `mint-sim --deterministic`.
#[derive(Debug, Clone)]
pub struct PatternRng {
    pattern: Vec<u8>,
    position: usize,
}

impl PatternRng {
    pub const BALANCED: [u8; 8] = [0x0F, 0xF0, 0x33, 0xCC, 0x55, 0xAA, 0x69, 0x96];

    pub fn balanced() -> Self {
        Self::new(&Self::BALANCED)
    }

    /// Cycle through `pattern`; an empty pattern yields zeros
    pub fn new(pattern: &[u8]) -> Self {
        let pattern = if pattern.is_empty() {
            vec![0]
        } else {
            pattern.to_vec()
        };
        Self {
            pattern,
            position: 0,
        }
    }
}

impl RngCore for PatternRng {
    fn next_u32(&mut self) -> u32 {
        let mut bytes = [0u8; 4];
        self.fill_bytes(&mut bytes);
        u32::from_le_bytes(bytes)
    }

    fn next_u64(&mut self) -> u64 {
        let mut bytes = [0u8; 8];
        self.fill_bytes(&mut bytes);
        u64::from_le_bytes(bytes)
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for byte in dest.iter_mut() {
            *byte = self.pattern[self.position];
            self.position = (self.position + 1) % self.pattern.len();
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> std::result::Result<(), rand::Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}

/// Software implementation of [`SecureElement`]
pub struct SoftSecureElement {
    rng: Box<dyn RngCore + Send>,
    nv: NvImage,
    state_path: Option<PathBuf>,
    faults: Arc<SoftFaults>,
    open: bool,
}

impl SoftSecureElement {
    /// Element backed by the OS RNG, NV memory in RAM only
    pub fn new() -> Self {
        Self::with_rng(OsRng)
    }

    pub fn with_rng(rng: impl RngCore + Send + 'static) -> Self {
        Self {
            rng: Box::new(rng),
            nv: NvImage::default(),
            state_path: None,
            faults: Arc::new(SoftFaults::default()),
            open: false,
        }
    }

    /// Persist NV memory to `path`, loading it on `open` if present
    pub fn persist_to(mut self, path: impl Into<PathBuf>) -> Self {
        self.state_path = Some(path.into());
        self
    }

    /// Handle for switching faults on and off
    pub fn faults(&self) -> Arc<SoftFaults> {
        Arc::clone(&self.faults)
    }

    fn ensure_open(&self) -> Result<()> {
        if !self.open {
            return Err(DeviceError::Hsm("session not open".to_string()));
        }
        Ok(())
    }

    fn object(&self, id: ObjectId) -> Result<&KeyObject> {
        self.nv
            .objects
            .get(&id.0)
            .ok_or_else(|| DeviceError::Hsm(format!("object {} not found", id)))
    }

    fn load_image(path: &Path) -> Result<NvImage> {
        let content = Zeroizing::new(std::fs::read_to_string(path)?);
        let image: NvImage = serde_json::from_str(&content)?;
        Ok(image)
    }

    fn save_image(&self) -> Result<()> {
        let Some(path) = &self.state_path else {
            return Ok(());
        };
        let content = Zeroizing::new(serde_json::to_string_pretty(&self.nv)?);

        // Write to temp file first, then rename for atomicity
        let temp_path = path.with_extension("json.tmp");
        std::fs::write(&temp_path, content.as_bytes())?;
        std::fs::rename(&temp_path, path)?;

        debug!("Secure element NV image saved to {:?}", path);
        Ok(())
    }
}

impl Default for SoftSecureElement {
    fn default() -> Self {
        Self::new()
    }
}

impl SecureElement for SoftSecureElement {
    fn open(&mut self) -> Result<()> {
        self.faults.check(Fault::Open, "session open")?;

        if let Some(path) = &self.state_path {
            if path.exists() {
                self.nv = Self::load_image(path)?;
                info!("Loaded secure element NV image from {:?}", path);
            }
        }

        self.open = true;
        Ok(())
    }

    fn random_bytes(&mut self, out: &mut [u8]) -> Result<()> {
        self.ensure_open()?;
        self.faults.check(Fault::Random, "TRNG read")?;
        self.rng
            .try_fill_bytes(out)
            .map_err(|e| DeviceError::Hsm(e.to_string()))
    }

    fn sha256(&mut self, parts: &[&[u8]]) -> Result<Digest32> {
        self.ensure_open()?;
        let mut hasher = Sha256::new();
        for part in parts {
            hasher.update(part);
        }
        let mut digest = Digest32::zeroed();
        hasher.finalize_into(GenericArray::from_mut_slice(digest.expose_mut()));
        Ok(digest)
    }

    fn object_exists(&self, id: ObjectId) -> Result<bool> {
        self.ensure_open()?;
        Ok(self.nv.objects.contains_key(&id.0))
    }

    fn delete_object(&mut self, id: ObjectId) -> Result<()> {
        self.ensure_open()?;
        if self.nv.objects.remove(&id.0).is_none() {
            return Err(DeviceError::Hsm(format!("object {} not found", id)));
        }
        self.save_image()
    }

    fn create_ec_keypair(&mut self, id: ObjectId, seed: &Digest32, reveal_gate: u32) -> Result<()> {
        self.ensure_open()?;
        self.faults.check(Fault::CreateKey, "key pair creation")?;

        if self.nv.objects.contains_key(&id.0) {
            return Err(DeviceError::Hsm(format!("object {} already exists", id)));
        }

        let key = k256::SecretKey::from_slice(seed.expose())
            .map_err(|_| DeviceError::Hsm("seed is not a valid secp256k1 scalar".to_string()))?;

        let mut scalar = key.to_bytes();
        let mut object = KeyObject {
            secret: [0u8; 32],
            reveal_gate,
        };
        object.secret.copy_from_slice(&scalar);
        scalar[..].zeroize();

        self.nv.objects.insert(id.0, object);
        self.save_image()
    }

    fn public_key(&self, id: ObjectId) -> Result<[u8; 65]> {
        self.ensure_open()?;
        let object = self.object(id)?;
        let key = k256::SecretKey::from_slice(&object.secret)
            .map_err(|e| DeviceError::Hsm(e.to_string()))?;

        let point = key.public_key().to_encoded_point(false);
        let mut out = [0u8; 65];
        if point.as_bytes().len() != out.len() {
            return Err(DeviceError::Hsm("unexpected public key encoding".to_string()));
        }
        out.copy_from_slice(point.as_bytes());
        Ok(out)
    }

    fn reveal_private(&mut self, id: ObjectId) -> Result<RawKey> {
        self.ensure_open()?;
        let object = self.object(id)?;
        if self.read_otp(object.reveal_gate)? != OTP_TAMPERED {
            return Err(DeviceError::Hsm(format!(
                "object {} policy denies export",
                id
            )));
        }
        Ok(RawKey::from_slice(&object.secret)?)
    }

    fn read_otp(&self, address: u32) -> Result<u8> {
        self.ensure_open()?;
        Ok(self.nv.otp.get(&address).copied().unwrap_or(OTP_ERASED))
    }

    fn write_otp(&mut self, address: u32, value: u8) -> Result<()> {
        self.ensure_open()?;
        self.faults.check(Fault::OtpWrite, "OTP write")?;

        let programmed = self.read_otp(address)? & value;
        self.nv.otp.insert(address, programmed);
        self.save_image()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hsm::{MASTER_KEY_ID, OTP_TAMPER_ADDRESS};
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    fn open_element() -> SoftSecureElement {
        let mut element = SoftSecureElement::with_rng(PatternRng::balanced());
        element.open().unwrap();
        element
    }

    fn seed(byte: u8) -> Digest32 {
        Digest32::from_slice(&[byte; 32]).unwrap()
    }

    #[test]
    fn test_commands_require_open_session() {
        let mut element = SoftSecureElement::new();
        let mut buf = [0u8; 4];
        assert!(element.random_bytes(&mut buf).is_err());
        assert!(element.read_otp(OTP_TAMPER_ADDRESS).is_err());
    }

    #[test]
    fn test_pattern_rng_cycles() {
        let mut rng = PatternRng::new(&[1, 2, 3]);
        let mut out = [0u8; 7];
        rng.fill_bytes(&mut out);
        assert_eq!(out, [1, 2, 3, 1, 2, 3, 1]);
    }

    #[test]
    fn test_seeded_rng_is_reproducible() {
        let mut a = SoftSecureElement::with_rng(ChaCha20Rng::seed_from_u64(7));
        let mut b = SoftSecureElement::with_rng(ChaCha20Rng::seed_from_u64(7));
        a.open().unwrap();
        b.open().unwrap();

        let mut out_a = [0u8; 32];
        let mut out_b = [0u8; 32];
        a.random_bytes(&mut out_a).unwrap();
        b.random_bytes(&mut out_b).unwrap();
        assert_eq!(out_a, out_b);
    }

    #[test]
    fn test_sha256_concatenates_parts() {
        let mut element = open_element();
        let split = element.sha256(&["ab".as_bytes(), "c".as_bytes()]).unwrap();
        let whole = element.sha256(&["abc".as_bytes()]).unwrap();
        assert!(split.ct_eq(&whole));
        assert_eq!(
            hex::encode(whole.expose()),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_otp_bits_only_clear() {
        let mut element = open_element();
        assert_eq!(element.read_otp(OTP_TAMPER_ADDRESS).unwrap(), OTP_ERASED);

        element.write_otp(OTP_TAMPER_ADDRESS, 0x0F).unwrap();
        assert_eq!(element.read_otp(OTP_TAMPER_ADDRESS).unwrap(), 0x0F);

        // Trying to set bits back has no effect
        element.write_otp(OTP_TAMPER_ADDRESS, 0xFF).unwrap();
        assert_eq!(element.read_otp(OTP_TAMPER_ADDRESS).unwrap(), 0x0F);

        element.write_otp(OTP_TAMPER_ADDRESS, OTP_TAMPERED).unwrap();
        assert_eq!(element.read_otp(OTP_TAMPER_ADDRESS).unwrap(), OTP_TAMPERED);
    }

    #[test]
    fn test_keypair_lifecycle() {
        let mut element = open_element();
        assert!(!element.object_exists(MASTER_KEY_ID).unwrap());

        element
            .create_ec_keypair(MASTER_KEY_ID, &seed(0x11), OTP_TAMPER_ADDRESS)
            .unwrap();
        assert!(element.object_exists(MASTER_KEY_ID).unwrap());
        assert!(element
            .create_ec_keypair(MASTER_KEY_ID, &seed(0x22), OTP_TAMPER_ADDRESS)
            .is_err());

        let public = element.public_key(MASTER_KEY_ID).unwrap();
        assert_eq!(public[0], 0x04);

        element.delete_object(MASTER_KEY_ID).unwrap();
        assert!(!element.object_exists(MASTER_KEY_ID).unwrap());
        assert!(element.delete_object(MASTER_KEY_ID).is_err());
    }

    #[test]
    fn test_scalar_out_of_range_rejected() {
        let mut element = open_element();
        assert!(element
            .create_ec_keypair(MASTER_KEY_ID, &seed(0x00), OTP_TAMPER_ADDRESS)
            .is_err());
        assert!(element
            .create_ec_keypair(MASTER_KEY_ID, &seed(0xFF), OTP_TAMPER_ADDRESS)
            .is_err());
    }

    #[test]
    fn test_reveal_gated_by_otp() {
        let mut element = open_element();
        element
            .create_ec_keypair(MASTER_KEY_ID, &seed(0x11), OTP_TAMPER_ADDRESS)
            .unwrap();
        assert!(element.reveal_private(MASTER_KEY_ID).is_err());

        element.write_otp(OTP_TAMPER_ADDRESS, OTP_TAMPERED).unwrap();
        let key = element.reveal_private(MASTER_KEY_ID).unwrap();
        assert_eq!(key.expose(), &[0x11; 32]);
    }

    #[test]
    fn test_faults() {
        let mut element = SoftSecureElement::new();
        let faults = element.faults();
        faults.inject(Fault::Open);
        assert!(element.open().is_err());
        faults.clear(Fault::Open);
        element.open().unwrap();

        faults.inject(Fault::OtpWrite);
        assert!(element.write_otp(OTP_TAMPER_ADDRESS, OTP_TAMPERED).is_err());
        assert_eq!(element.read_otp(OTP_TAMPER_ADDRESS).unwrap(), OTP_ERASED);
    }

    #[test]
    fn test_nv_image_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hsm.json");

        {
            let mut element = SoftSecureElement::new().persist_to(&path);
            element.open().unwrap();
            element
                .create_ec_keypair(MASTER_KEY_ID, &seed(0x42), OTP_TAMPER_ADDRESS)
                .unwrap();
            element.write_otp(OTP_TAMPER_ADDRESS, OTP_TAMPERED).unwrap();
        }
        assert!(!path.with_extension("json.tmp").exists());

        let mut reopened = SoftSecureElement::new().persist_to(&path);
        reopened.open().unwrap();
        assert!(reopened.object_exists(MASTER_KEY_ID).unwrap());
        assert_eq!(reopened.read_otp(OTP_TAMPER_ADDRESS).unwrap(), OTP_TAMPERED);
        assert_eq!(reopened.reveal_private(MASTER_KEY_ID).unwrap().expose(), &[0x42; 32]);
    }
}
