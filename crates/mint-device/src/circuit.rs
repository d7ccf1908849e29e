//! Debounced tamper-circuit monitor
//!
//! A raw level that differs from the committed one arms a timer; the new
//! level is committed only once it has held for the whole debounce window.
//! A read that falls back to the committed level disarms the timer, so a
//! single glitch never reaches the irreversible tamper path.

use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{DeviceError, Result};
use crate::hal::{Clock, TamperPin};

/// Default debounce window
pub const DEFAULT_DEBOUNCE_MS: u64 = 50;

/// Debounced circuit state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitReading {
    pub intact: bool,
    /// Clock time of the last committed change
    pub last_changed_ms: u64,
}

pub struct CircuitMonitor {
    pin: Arc<dyn TamperPin>,
    clock: Arc<dyn Clock>,
    debounce_ms: u64,
    committed: bool,
    armed_at: Option<u64>,
    last_changed_ms: u64,
    changed: bool,
}

impl CircuitMonitor {
    pub fn new(pin: Arc<dyn TamperPin>, clock: Arc<dyn Clock>, debounce_ms: u64) -> Self {
        Self {
            pin,
            clock,
            debounce_ms,
            committed: true,
            armed_at: None,
            last_changed_ms: 0,
            changed: false,
        }
    }

    /// Configure the pin and take the first reading as committed
    pub fn initialize(&mut self) -> Result<()> {
        self.pin
            .configure()
            .map_err(|e| DeviceError::init("tamper circuit", e))?;

        self.committed = self.pin.reads_intact();
        self.armed_at = None;
        self.changed = false;
        self.last_changed_ms = self.clock.now_ms();

        info!(
            "Tamper circuit initialized ({})",
            if self.committed { "intact" } else { "broken" }
        );
        Ok(())
    }

    /// Sample the pin and return the debounced state
    pub fn is_intact(&mut self) -> bool {
        let raw = self.pin.reads_intact();
        let now = self.clock.now_ms();

        if raw == self.committed {
            if self.armed_at.take().is_some() {
                debug!("Circuit glitch ignored");
            }
            return self.committed;
        }

        let armed = *self.armed_at.get_or_insert(now);
        if now.saturating_sub(armed) >= self.debounce_ms {
            self.committed = raw;
            self.armed_at = None;
            self.last_changed_ms = now;
            self.changed = true;
            info!(
                "Circuit state committed: {}",
                if raw { "intact" } else { "broken" }
            );
        }

        self.committed
    }

    /// Whether a committed change is waiting to be acknowledged
    pub fn has_changed(&self) -> bool {
        self.changed
    }

    pub fn acknowledge_change(&mut self) {
        self.changed = false;
    }

    /// Last committed state, without sampling
    pub fn reading(&self) -> CircuitReading {
        CircuitReading {
            intact: self.committed,
            last_changed_ms: self.last_changed_ms,
        }
    }
}
