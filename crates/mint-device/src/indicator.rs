//! Status indicator
//!
//! One RGB pixel. The device picks a [`StatusSignal`] purely from its state;
//! drivers decide how to render it.

use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use crate::error::Result;

/// Semantic signals shown by the status LED
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusSignal {
    Initializing,
    NoWallet,
    Generating,
    Sealed,
    Tampered,
    Error,
}

impl StatusSignal {
    /// 0xRRGGBB colour at the pixel's working brightness
    pub fn color(&self) -> u32 {
        match self {
            StatusSignal::Initializing => 0x00_00_20,
            StatusSignal::NoWallet => 0x20_20_20,
            StatusSignal::Generating => 0x20_20_00,
            StatusSignal::Sealed => 0x20_00_00,
            StatusSignal::Tampered => 0x00_20_00,
            StatusSignal::Error => 0x20_00_00,
        }
    }

    /// Rapid flashing, used only for the error signal
    pub fn blinks(&self) -> bool {
        matches!(self, StatusSignal::Error)
    }
}

impl fmt::Display for StatusSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StatusSignal::Initializing => "initializing",
            StatusSignal::NoWallet => "no wallet",
            StatusSignal::Generating => "generating",
            StatusSignal::Sealed => "sealed",
            StatusSignal::Tampered => "tampered",
            StatusSignal::Error => "error",
        };
        f.write_str(name)
    }
}

/// Driver for the status LED
pub trait StatusIndicator: Send {
    fn begin(&mut self) -> Result<()>;

    fn show(&mut self, signal: StatusSignal);
}

/// Indicator that logs each change of signal
#[derive(Debug)]
pub struct LogIndicator {
    pin: u8,
    current: Option<StatusSignal>,
}

impl LogIndicator {
    pub fn new(pin: u8) -> Self {
        Self { pin, current: None }
    }
}

impl StatusIndicator for LogIndicator {
    fn begin(&mut self) -> Result<()> {
        debug!("Status LED on GPIO {}", self.pin);
        Ok(())
    }

    fn show(&mut self, signal: StatusSignal) {
        if self.current == Some(signal) {
            return;
        }
        self.current = Some(signal);
        info!(
            "LED: {} (#{:06x}{})",
            signal,
            signal.color(),
            if signal.blinks() { ", flashing" } else { "" }
        );
    }
}

/// Indicator that records every distinct signal it was asked to show
#[derive(Debug, Clone, Default)]
pub struct RecordingIndicator {
    history: Arc<Mutex<Vec<StatusSignal>>>,
}

impl RecordingIndicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signals shown so far, repeats collapsed
    pub fn history(&self) -> Vec<StatusSignal> {
        self.history
            .lock()
            .map(|history| history.clone())
            .unwrap_or_default()
    }

    pub fn current(&self) -> Option<StatusSignal> {
        self.history().last().copied()
    }
}

impl StatusIndicator for RecordingIndicator {
    fn begin(&mut self) -> Result<()> {
        Ok(())
    }

    fn show(&mut self, signal: StatusSignal) {
        if let Ok(mut history) = self.history.lock() {
            if history.last() != Some(&signal) {
                history.push(signal);
            }
        }
    }
}
