//! Device configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use mint_core::entropy::EntropyMixing;
use mint_core::{AddressKind, DerivationPath, Network};

use crate::error::{DeviceError, Result};

/// Device configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Network whose WIF prefix and address parameters are used
    pub network: Network,

    /// Display-address scheme
    pub address_kind: AddressKind,

    /// Whether WIF keys carry the compression flag
    pub compressed_keys: bool,

    /// Path recorded for the display address
    pub derivation_path: DerivationPath,

    /// GPIO of the tamper circuit (LOW = intact)
    pub circuit_pin: u8,

    /// GPIO of the status LED
    pub status_pin: u8,

    /// Circuit debounce window (milliseconds)
    pub debounce_ms: u64,

    /// Smallest accepted file drop
    pub file_drop_min_bytes: usize,

    /// Largest accepted file drop
    pub file_drop_max_bytes: usize,

    /// Quiet period after the last host write before a drop is delivered
    pub storage_settle_ms: u64,

    /// Hardware entropy requests per generation
    pub entropy_attempts: u32,

    /// How hardware and dropped entropy are combined
    pub mixing: EntropyMixing,

    /// Control-loop period of the simulator (milliseconds)
    pub loop_interval_ms: u64,

    /// Where the software secure element keeps its NV image
    pub state_path: Option<PathBuf>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            network: Network::Mainnet,
            address_kind: AddressKind::P2wpkh,
            compressed_keys: true,
            derivation_path: DerivationPath::default(),
            circuit_pin: 14,
            status_pin: 16,
            debounce_ms: crate::circuit::DEFAULT_DEBOUNCE_MS,
            file_drop_min_bytes: 1,
            file_drop_max_bytes: 512,
            storage_settle_ms: 1_000,
            entropy_attempts: 3,
            mixing: EntropyMixing::Sha256Concat,
            loop_interval_ms: 10,
            state_path: None,
        }
    }
}

impl DeviceConfig {
    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject settings the device cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.file_drop_min_bytes == 0 {
            return Err(DeviceError::Config(
                "file_drop_min_bytes must be at least 1".to_string(),
            ));
        }
        if self.file_drop_min_bytes > self.file_drop_max_bytes {
            return Err(DeviceError::Config(format!(
                "file_drop_min_bytes ({}) exceeds file_drop_max_bytes ({})",
                self.file_drop_min_bytes, self.file_drop_max_bytes
            )));
        }
        if self.entropy_attempts == 0 {
            return Err(DeviceError::Config(
                "entropy_attempts must be at least 1".to_string(),
            ));
        }
        if self.loop_interval_ms == 0 {
            return Err(DeviceError::Config(
                "loop_interval_ms must be at least 1".to_string(),
            ));
        }
        if self.circuit_pin == self.status_pin {
            return Err(DeviceError::Config(format!(
                "circuit_pin and status_pin both use GPIO {}",
                self.circuit_pin
            )));
        }
        Ok(())
    }

    /// Whether `len` bytes is an acceptable file drop
    pub fn accepts_drop_len(&self, len: usize) -> bool {
        (self.file_drop_min_bytes..=self.file_drop_max_bytes).contains(&len)
    }

    /// `$XDG_CONFIG_HOME/mint/device.json`
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("mint")
            .join("device.json")
    }
}

/// Helper module for dirs crate functionality
mod dirs {
    use std::path::PathBuf;

    pub fn config_dir() -> Option<PathBuf> {
        std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config")))
    }
}
