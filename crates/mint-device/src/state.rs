//! Device states

use std::fmt;

use crate::indicator::StatusSignal;

/// Lifecycle of the device
///
/// `Initializing` leads to `ReadyNoWallet`, `ReadyWithWallet` or `Tampered`.
/// A file drop moves `ReadyNoWallet` through `GeneratingWallet`, ending in
/// `ReadyWithWallet` or back in `ReadyNoWallet`. `Tampered` is terminal and
/// reachable from every other state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DeviceState {
    #[default]
    Initializing,
    ReadyNoWallet,
    GeneratingWallet,
    /// Sealed; the address is cached for display
    ReadyWithWallet { address: String },
    /// Circuit broken; `address` is set when a wallet exists
    Tampered { address: Option<String> },
}

impl DeviceState {
    pub fn is_tampered(&self) -> bool {
        matches!(self, DeviceState::Tampered { .. })
    }

    /// Cached display address, if the state carries one
    pub fn address(&self) -> Option<&str> {
        match self {
            DeviceState::ReadyWithWallet { address } => Some(address),
            DeviceState::Tampered { address } => address.as_deref(),
            _ => None,
        }
    }

    /// Whether the state is a resting point worth publishing
    pub fn is_settled(&self) -> bool {
        !matches!(
            self,
            DeviceState::Initializing | DeviceState::GeneratingWallet
        )
    }

    pub fn signal(&self) -> StatusSignal {
        match self {
            DeviceState::Initializing => StatusSignal::Initializing,
            DeviceState::ReadyNoWallet => StatusSignal::NoWallet,
            DeviceState::GeneratingWallet => StatusSignal::Generating,
            DeviceState::ReadyWithWallet { .. } => StatusSignal::Sealed,
            DeviceState::Tampered { .. } => StatusSignal::Tampered,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DeviceState::Initializing => "INITIALIZING",
            DeviceState::ReadyNoWallet => "READY_NO_WALLET",
            DeviceState::GeneratingWallet => "GENERATING_WALLET",
            DeviceState::ReadyWithWallet { .. } => "READY_WITH_WALLET",
            DeviceState::Tampered { .. } => "TAMPERED",
        }
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
