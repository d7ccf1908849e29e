//! Hardware abstraction: the tamper line and a millisecond clock
//!
//! The tamper circuit pulls its GPIO LOW while the loop is intact. Breaking
//! the loop lets the pull-up drive it HIGH.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

use crate::error::{DeviceError, Result};

/// GPIO carrying the tamper circuit
pub trait TamperPin: Send + Sync {
    /// Configure the pin as an input with pull-up
    fn configure(&self) -> Result<()>;

    /// Raw level; HIGH means the circuit is open
    fn is_high(&self) -> bool;

    /// Raw reading, no debounce
    fn reads_intact(&self) -> bool {
        !self.is_high()
    }
}

/// Monotonic millisecond time source
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

/// Clock backed by `Instant`
#[derive(Debug)]
pub struct MonotonicClock {
    start: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

/// Clock advanced by hand, for tests
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: AtomicU64::new(start_ms),
        }
    }

    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }

    pub fn set(&self, ms: u64) {
        self.now.store(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Pin whose level is set by the test or simulator
#[derive(Debug)]
pub struct SimulatedPin {
    high: AtomicBool,
    available: bool,
}

impl SimulatedPin {
    /// A pin reading an intact circuit
    pub fn intact() -> Self {
        Self {
            high: AtomicBool::new(false),
            available: true,
        }
    }

    /// A pin reading a broken circuit
    pub fn broken() -> Self {
        Self {
            high: AtomicBool::new(true),
            available: true,
        }
    }

    /// A pin that fails to configure
    pub fn unavailable() -> Self {
        Self {
            high: AtomicBool::new(false),
            available: false,
        }
    }

    pub fn break_circuit(&self) {
        self.high.store(true, Ordering::SeqCst);
    }

    pub fn restore_circuit(&self) {
        self.high.store(false, Ordering::SeqCst);
    }
}

impl TamperPin for SimulatedPin {
    fn configure(&self) -> Result<()> {
        if !self.available {
            return Err(DeviceError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "GPIO not available",
            )));
        }
        Ok(())
    }

    fn is_high(&self) -> bool {
        self.high.load(Ordering::SeqCst)
    }
}
