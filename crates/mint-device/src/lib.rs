//! Mint Device - Firmware core of the Mint bearer device
//!
//! This crate provides:
//! - Debounced tamper-circuit monitoring
//! - The secure element adapter: entropy, master key, write-once tamper bit
//! - The device state machine that ties circuit, entropy drops and key
//!   reveal together
//! - Host-side stand-ins for the hardware: a software secure element, an
//!   in-memory FAT12 disk, a drop-directory storage and status indicators

pub mod circuit;
pub mod config;
pub mod device;
pub mod error;
pub mod hal;
pub mod hsm;
pub mod indicator;
pub mod secure;
pub mod state;
pub mod storage;

pub use circuit::{CircuitMonitor, CircuitReading};
pub use config::DeviceConfig;
pub use device::DeviceStateMachine;
pub use error::{DeviceError, Result, TamperRefusal};
pub use hal::{Clock, ManualClock, MonotonicClock, SimulatedPin, TamperPin};
pub use hsm::{SecureElement, SoftSecureElement};
pub use indicator::{LogIndicator, RecordingIndicator, StatusIndicator, StatusSignal};
pub use secure::SecureElementAdapter;
pub use state::DeviceState;
pub use storage::{BreakSentinel, DropDirStorage, FileDropHandler, VirtualDisk, VirtualStorage};
