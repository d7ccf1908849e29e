//! Error types for the Mint device

use thiserror::Error;

/// Result type alias for device operations
pub type Result<T> = std::result::Result<T, DeviceError>;

/// Why a tamper record was refused
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TamperRefusal {
    #[error("circuit reads intact")]
    CircuitIntact,

    #[error("tamper bit already set")]
    AlreadyTampered,

    #[error("OTP write failed: {0}")]
    WriteFailed(String),
}

/// Errors that can occur on the device
#[derive(Debug, Error)]
pub enum DeviceError {
    /// A mandatory subsystem failed to come up; needs a physical reset
    #[error("{subsystem} initialization failed: {reason}")]
    Initialization {
        subsystem: &'static str,
        reason: String,
    },

    /// Hardware entropy failed the frequency test
    #[error("Entropy health check failed: {ones} of {bits} bits set")]
    EntropyHealthCheck { ones: usize, bits: usize },

    /// The master key could not be deleted or created
    #[error("Key creation failed: {0}")]
    KeyCreation(String),

    /// The tamper bit was not written
    #[error("Tamper record refused: {0}")]
    TamperRecord(#[from] TamperRefusal),

    /// Private key requested outside the tampered state
    #[error("Reveal denied: {0}")]
    RevealDenied(String),

    /// Secure element command failed
    #[error("Secure element error: {0}")]
    Hsm(String),

    /// No master key exists
    #[error("No wallet generated")]
    NoWallet,

    /// A file drop was rejected
    #[error("File drop rejected: {0}")]
    InvalidFileDrop(String),

    /// Core library error
    #[error("Core error: {0}")]
    Core(#[from] mint_core::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<serde_json::Error> for DeviceError {
    fn from(e: serde_json::Error) -> Self {
        DeviceError::Serialization(e.to_string())
    }
}

impl DeviceError {
    /// Wrap any error as an initialization failure of `subsystem`
    pub fn init(subsystem: &'static str, err: impl std::fmt::Display) -> Self {
        DeviceError::Initialization {
            subsystem,
            reason: err.to_string(),
        }
    }
}
