//! Secure element adapter
//!
//! Owns the secure element session, the master key slot and the write-once
//! tamper bit. Every command failure is turned into a [`DeviceError`] here;
//! nothing above this layer sees raw element errors.
//!
//! # Tamper bit
//!
//! The bit has one edge, not-tampered to tampered, and the edge is only taken
//! while the circuit physically reads broken. There is no code path that
//! writes the erased value back; the OTP cell could not accept it anyway.

use std::sync::Arc;
use tracing::{debug, info, warn};

use mint_core::entropy::{self, EntropyLength, EntropyMaterial, EntropyMixing};
use mint_core::{AddressKind, DerivationPath, Digest32, Network, PublicKey, RawKey};

use crate::error::{DeviceError, Result, TamperRefusal};
use crate::hal::TamperPin;
use crate::hsm::{SecureElement, MASTER_KEY_ID, OTP_TAMPERED, OTP_TAMPER_ADDRESS};

pub struct SecureElementAdapter {
    hsm: Box<dyn SecureElement>,
    circuit: Arc<dyn TamperPin>,
    mixing: EntropyMixing,
    tampered: bool,
    has_wallet: bool,
}

impl SecureElementAdapter {
    pub fn new(
        hsm: Box<dyn SecureElement>,
        circuit: Arc<dyn TamperPin>,
        mixing: EntropyMixing,
    ) -> Self {
        Self {
            hsm,
            circuit,
            mixing,
            tampered: false,
            has_wallet: false,
        }
    }

    /// Open the session, cache the tamper bit and look for a master key
    pub fn initialize(&mut self) -> Result<()> {
        self.hsm
            .open()
            .map_err(|e| DeviceError::init("secure element", e))?;

        self.tampered = self
            .hsm
            .read_otp(OTP_TAMPER_ADDRESS)
            .map_err(|e| DeviceError::init("secure element", e))?
            == OTP_TAMPERED;

        self.has_wallet = self
            .hsm
            .object_exists(MASTER_KEY_ID)
            .map_err(|e| DeviceError::init("secure element", e))?;

        info!(
            "Secure element ready (tampered: {}, wallet: {})",
            self.tampered, self.has_wallet
        );
        Ok(())
    }

    /// Hardware entropy that passed the frequency test
    pub fn generate_entropy(&mut self, length: EntropyLength) -> Result<EntropyMaterial> {
        let mut material = EntropyMaterial::zeroed(length);
        self.hsm.random_bytes(material.as_mut_slice())?;

        match entropy::frequency_check(material.as_slice()) {
            Ok(report) => {
                debug!("Entropy health check passed ({}/{} bits set)", report.ones, report.bits);
                Ok(material)
            }
            Err(mint_core::Error::HealthCheckFailed { ones, bits }) => {
                warn!("Entropy health check failed ({}/{} bits set)", ones, bits);
                Err(DeviceError::EntropyHealthCheck { ones, bits })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Combine hardware and external entropy into the master key seed
    ///
    /// The concatenation policy hashes inside the secure element; the HMAC
    /// extractor runs on the host.
    pub fn mix_entropy(&mut self, external: &[u8], hardware: &[u8]) -> Result<Digest32> {
        match self.mixing {
            EntropyMixing::Sha256Concat => self.hsm.sha256(&[hardware, external]),
            EntropyMixing::HmacExtract => Ok(entropy::mix_entropy(external, hardware, self.mixing)?),
        }
    }

    /// Replace the master key with one created from `seed`
    pub fn create_master_key(&mut self, seed: &Digest32) -> Result<()> {
        if self.tampered {
            return Err(DeviceError::KeyCreation(
                "key slot is frozen after tamper".to_string(),
            ));
        }

        let exists = self
            .hsm
            .object_exists(MASTER_KEY_ID)
            .map_err(|e| DeviceError::KeyCreation(e.to_string()))?;
        if exists {
            self.hsm
                .delete_object(MASTER_KEY_ID)
                .map_err(|e| DeviceError::KeyCreation(e.to_string()))?;
            self.has_wallet = false;
        }

        self.hsm
            .create_ec_keypair(MASTER_KEY_ID, seed, OTP_TAMPER_ADDRESS)
            .map_err(|e| DeviceError::KeyCreation(e.to_string()))?;

        self.has_wallet = true;
        info!("Master key created in slot {}", MASTER_KEY_ID);
        Ok(())
    }

    /// Burn the tamper bit
    ///
    /// Refused while the circuit reads intact or once the bit is set.
    pub fn record_tamper(&mut self) -> Result<()> {
        if self.circuit.reads_intact() {
            return Err(TamperRefusal::CircuitIntact.into());
        }
        if self.tampered {
            return Err(TamperRefusal::AlreadyTampered.into());
        }

        self.hsm
            .write_otp(OTP_TAMPER_ADDRESS, OTP_TAMPERED)
            .map_err(|e| TamperRefusal::WriteFailed(e.to_string()))?;

        let readback = self
            .hsm
            .read_otp(OTP_TAMPER_ADDRESS)
            .map_err(|e| TamperRefusal::WriteFailed(e.to_string()))?;
        if readback != OTP_TAMPERED {
            return Err(TamperRefusal::WriteFailed(format!(
                "OTP reads 0x{:02x} after programming",
                readback
            ))
            .into());
        }

        self.tampered = true;
        warn!("Tamper bit burned; private key is now revealable");
        Ok(())
    }

    /// Raw private scalar; only after the tamper bit is set
    pub fn reveal_private_key(&mut self) -> Result<RawKey> {
        if !self.tampered {
            return Err(DeviceError::RevealDenied(
                "tamper bit is not set".to_string(),
            ));
        }
        if !self.has_wallet {
            return Err(DeviceError::NoWallet);
        }
        self.hsm.reveal_private(MASTER_KEY_ID)
    }

    pub fn public_key(&self) -> Result<PublicKey> {
        if !self.has_wallet {
            return Err(DeviceError::NoWallet);
        }
        let uncompressed = self.hsm.public_key(MASTER_KEY_ID)?;
        Ok(PublicKey::from_sec1(&uncompressed)?)
    }

    /// Display address of the master key
    ///
    /// The path is recorded for the log only: the device has a single key
    /// and shows a single address for it.
    pub fn address_for(
        &self,
        path: &DerivationPath,
        network: Network,
        kind: AddressKind,
    ) -> Result<String> {
        let public_key = self.public_key()?;
        debug!("Formatting {} address for {}", kind, path);
        Ok(mint_core::format_address(&public_key, network, kind)?)
    }

    /// Cached tamper bit
    pub fn is_tampered(&self) -> bool {
        self.tampered
    }

    pub fn has_wallet(&self) -> bool {
        self.has_wallet
    }

    /// Read the tamper bit from OTP, bypassing the cache
    pub fn persisted_tamper_bit(&self) -> Result<bool> {
        Ok(self.hsm.read_otp(OTP_TAMPER_ADDRESS)? == OTP_TAMPERED)
    }
}
