//! Device state machine
//!
//! Ties the tamper circuit, the secure element and the storage collaborator
//! together. One call to [`DeviceStateMachine::tick`] is one iteration of the
//! control loop: poll the circuit, service storage and any queued file drops,
//! then refresh the status indicator.
//!
//! File drops reach the machine through a bounded queue. The storage
//! collaborator only holds the sending half inside its registered handler, so
//! it never calls back into the machine while a generation is running.

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use zeroize::Zeroizing;

use mint_core::entropy::{EntropyLength, EntropyMaterial};
use mint_core::wif;

use crate::circuit::CircuitMonitor;
use crate::config::DeviceConfig;
use crate::error::{DeviceError, Result, TamperRefusal};
use crate::indicator::{StatusIndicator, StatusSignal};
use crate::secure::SecureElementAdapter;
use crate::state::DeviceState;
use crate::storage::{FileDropHandler, VirtualStorage, BOOT_README};

/// File drops that may wait for the next tick
const DROP_QUEUE_DEPTH: usize = 4;

fn sealed_text(address: &str) -> String {
    format!(
        "MINT DEVICE - SEALED STATE\n\n\
         This device is securely sealed. To access the private key,\n\
         you must physically break the security circuit.\n\n\
         Bitcoin Address:\n{}\n\n\
         WARNING: Breaking the circuit is IRREVERSIBLE and will\n\
         permanently expose the private key.",
        address
    )
}

fn tampered_text(wif: &str, address: &str) -> Zeroizing<String> {
    Zeroizing::new(format!(
        "MINT DEVICE - TAMPERED STATE\n\n\
         This device has been opened and the private key is exposed.\n\n\
         Bitcoin Private Key (WIF format):\n{}\n\n\
         Bitcoin Address:\n{}\n\n\
         CAUTION: Anyone with access to the private key can spend the funds.",
        wif, address
    ))
}

fn tamper_pending_text(address: &str) -> String {
    format!(
        "MINT DEVICE - TAMPERED STATE\n\n\
         This device has been opened. The tamper record is not yet written,\n\
         so the private key stays locked until it is.\n\n\
         Bitcoin Address:\n{}",
        address
    )
}

const TAMPERED_NO_WALLET_TEXT: &str = "MINT DEVICE - TAMPERED STATE\n\n\
     This device has been opened. No wallet was generated on it.";

/// Handler that queues each drop for the control loop
fn queueing_handler(tx: mpsc::Sender<Zeroizing<Vec<u8>>>) -> FileDropHandler {
    Box::new(move |contents: &[u8]| {
        match tx.try_send(Zeroizing::new(contents.to_vec())) {
            Ok(()) => debug!("File drop queued ({} bytes)", contents.len()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("File drop ignored: queue is full")
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("File drop ignored: device is shut down")
            }
        }
    })
}

pub struct DeviceStateMachine {
    config: DeviceConfig,
    state: DeviceState,
    circuit: CircuitMonitor,
    secure: SecureElementAdapter,
    storage: Box<dyn VirtualStorage>,
    indicator: Box<dyn StatusIndicator>,
    drops: Option<mpsc::Receiver<Zeroizing<Vec<u8>>>>,
    /// Set for the duration of a wallet generation
    processing: bool,
    /// Display text must be republished once the state settles
    display_dirty: bool,
    /// `begin` failed; the device waits for a physical reset
    halted: bool,
}

impl DeviceStateMachine {
    pub fn new(
        config: DeviceConfig,
        circuit: CircuitMonitor,
        secure: SecureElementAdapter,
        storage: Box<dyn VirtualStorage>,
        indicator: Box<dyn StatusIndicator>,
    ) -> Self {
        Self {
            config,
            state: DeviceState::Initializing,
            circuit,
            secure,
            storage,
            indicator,
            drops: None,
            processing: false,
            display_dirty: false,
            halted: false,
        }
    }

    /// Bring up every subsystem and settle into the initial state
    ///
    /// A failure leaves the device in `Initializing` with the error signal
    /// showing; only a wallet that cannot be read is tolerated.
    pub fn begin(&mut self) -> Result<()> {
        match self.bring_up() {
            Ok(()) => {
                info!("Device ready in state {}", self.state);
                Ok(())
            }
            Err(e) => {
                error!("Device initialization failed: {}", e);
                self.halted = true;
                self.indicator.show(StatusSignal::Error);
                Err(e)
            }
        }
    }

    fn bring_up(&mut self) -> Result<()> {
        self.config.validate()?;

        self.indicator
            .begin()
            .map_err(|e| DeviceError::init("status indicator", e))?;
        self.indicator.show(StatusSignal::Initializing);

        self.secure.initialize()?;
        self.circuit.initialize()?;
        let address = self.begin_wallet();

        self.storage.begin().map_err(|e| match e {
            e @ DeviceError::Initialization { .. } => e,
            other => DeviceError::init("storage", other),
        })?;
        let (tx, rx) = mpsc::channel(DROP_QUEUE_DEPTH);
        self.storage.register_file_changed_callback(queueing_handler(tx));
        self.drops = Some(rx);

        let intact = self.circuit.is_intact();
        let initial = if self.secure.is_tampered() {
            info!("Tamper bit already set; device stays tampered");
            DeviceState::Tampered { address }
        } else if !intact {
            warn!("Security circuit broken at boot");
            self.record_tamper();
            DeviceState::Tampered { address }
        } else {
            match address {
                Some(address) => DeviceState::ReadyWithWallet { address },
                None => DeviceState::ReadyNoWallet,
            }
        };
        self.transition(initial);
        self.publish_display();
        Ok(())
    }

    /// Display address of an existing wallet; failure here is not fatal
    fn begin_wallet(&mut self) -> Option<String> {
        if !self.secure.has_wallet() {
            debug!("No wallet present");
            return None;
        }
        match self.secure.address_for(
            &self.config.derivation_path,
            self.config.network,
            self.config.address_kind,
        ) {
            Ok(address) => Some(address),
            Err(e) => {
                warn!("Wallet unavailable, continuing without it: {}", e);
                None
            }
        }
    }

    /// One iteration of the control loop
    pub fn tick(&mut self) {
        if self.halted || self.state == DeviceState::Initializing {
            return;
        }

        self.poll_circuit();

        if let Err(e) = self.storage.task() {
            warn!("Storage task failed: {}", e);
        }
        self.drain_file_drops();
        self.publish_display();

        self.indicator.show(self.state.signal());
    }

    fn poll_circuit(&mut self) {
        let intact = self.circuit.is_intact();
        if self.circuit.has_changed() {
            self.circuit.acknowledge_change();
            if intact && self.state.is_tampered() {
                info!("Circuit reads intact again; tampered state is permanent");
            }
        }
        if intact {
            return;
        }

        if !self.state.is_tampered() {
            warn!("Security circuit broken");
            self.record_tamper();
            let address = self.state.address().map(str::to_string);
            self.transition(DeviceState::Tampered { address });
        } else if !self.secure.is_tampered() {
            // An earlier burn failed; keep trying while the circuit is open
            if self.record_tamper() {
                self.display_dirty = true;
            }
        }
    }

    /// Burn the tamper bit, logging the outcome
    fn record_tamper(&mut self) -> bool {
        match self.secure.record_tamper() {
            Ok(()) => true,
            Err(DeviceError::TamperRecord(TamperRefusal::AlreadyTampered)) => {
                debug!("Tamper bit was already set");
                true
            }
            Err(e) => {
                error!("Failed to record tamper: {}", e);
                false
            }
        }
    }

    fn drain_file_drops(&mut self) {
        let mut queued = Vec::new();
        if let Some(rx) = self.drops.as_mut() {
            while let Ok(contents) = rx.try_recv() {
                queued.push(contents);
            }
        }

        for contents in queued {
            match self.process_file_drop(&contents) {
                Ok(_) => {}
                Err(DeviceError::InvalidFileDrop(reason)) => info!("File drop ignored: {}", reason),
                Err(e) => debug!("File drop failed: {}", e),
            }
        }
    }

    /// Generate the wallet from a dropped file's contents
    ///
    /// Returns the new display address. Drops are only taken in
    /// `ReadyNoWallet`; on any failure the device returns there.
    pub fn process_file_drop(&mut self, contents: &[u8]) -> Result<String> {
        if self.processing {
            return Err(DeviceError::InvalidFileDrop(
                "wallet generation already in progress".to_string(),
            ));
        }
        if self.state != DeviceState::ReadyNoWallet {
            return Err(DeviceError::InvalidFileDrop(format!(
                "not accepted in state {}",
                self.state
            )));
        }
        if !self.config.accepts_drop_len(contents.len()) {
            return Err(DeviceError::InvalidFileDrop(format!(
                "{} bytes is outside {}..={}",
                contents.len(),
                self.config.file_drop_min_bytes,
                self.config.file_drop_max_bytes
            )));
        }

        self.processing = true;
        self.transition(DeviceState::GeneratingWallet);
        let result = self.generate_wallet(contents);
        self.processing = false;

        match result {
            Ok(address) => {
                info!("Wallet generated");
                self.transition(DeviceState::ReadyWithWallet {
                    address: address.clone(),
                });
                Ok(address)
            }
            Err(e) => {
                warn!("Wallet generation failed: {}", e);
                self.transition(DeviceState::ReadyNoWallet);
                Err(e)
            }
        }
    }

    fn generate_wallet(&mut self, external: &[u8]) -> Result<String> {
        let seed = {
            let hardware = self.hardware_entropy()?;
            self.secure.mix_entropy(external, hardware.as_slice())?
        };
        self.secure.create_master_key(&seed)?;
        drop(seed);

        self.secure.address_for(
            &self.config.derivation_path,
            self.config.network,
            self.config.address_kind,
        )
    }

    /// 32 bytes of hardware entropy, retrying health-check failures
    fn hardware_entropy(&mut self) -> Result<EntropyMaterial> {
        let mut attempt = 1;
        loop {
            match self.secure.generate_entropy(EntropyLength::Bits256) {
                Err(e @ DeviceError::EntropyHealthCheck { .. })
                    if attempt < self.config.entropy_attempts =>
                {
                    debug!("Entropy attempt {} rejected: {}", attempt, e);
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    fn transition(&mut self, next: DeviceState) {
        if self.state.is_tampered() && !next.is_tampered() {
            warn!("Refusing to leave the tampered state for {}", next);
            return;
        }
        if self.state == next {
            return;
        }

        info!("State: {} -> {}", self.state, next);
        self.state = next;
        self.indicator.show(self.state.signal());
        if self.state.is_settled() {
            self.display_dirty = true;
        }
    }

    fn publish_display(&mut self) {
        if !self.display_dirty || !self.state.is_settled() {
            return;
        }

        let text = match self.display_text() {
            Ok(text) => text,
            Err(e) => {
                warn!("Display text unavailable: {}", e);
                return;
            }
        };
        match self.storage.update_display_text(&text) {
            Ok(()) => {
                self.display_dirty = false;
                debug!("Display text published for {}", self.state);
            }
            Err(e) => warn!("Failed to publish display text: {}", e),
        }
    }

    fn display_text(&mut self) -> Result<Zeroizing<String>> {
        match self.state.clone() {
            DeviceState::ReadyWithWallet { address } => Ok(Zeroizing::new(sealed_text(&address))),
            DeviceState::Tampered {
                address: Some(address),
            } if !self.secure.is_tampered() => Ok(Zeroizing::new(tamper_pending_text(&address))),
            DeviceState::Tampered {
                address: Some(address),
            } => {
                let wif = self.get_private_key()?;
                Ok(tampered_text(&wif, &address))
            }
            DeviceState::Tampered { address: None } => {
                Ok(Zeroizing::new(TAMPERED_NO_WALLET_TEXT.to_string()))
            }
            _ => Ok(Zeroizing::new(BOOT_README.to_string())),
        }
    }

    /// WIF private key; only in the tampered state and only for a wallet
    /// the device booted or generated with a valid address
    pub fn get_private_key(&mut self) -> Result<Zeroizing<String>> {
        if !self.state.is_tampered() {
            return Err(DeviceError::RevealDenied(
                "Device not in tampered state".to_string(),
            ));
        }
        if self.state.address().is_none() {
            return Err(DeviceError::NoWallet);
        }
        let key = self.secure.reveal_private_key()?;
        Ok(wif::encode(
            key.expose(),
            self.config.compressed_keys,
            self.config.network.wif_prefix(),
        )?)
    }

    /// Display address of the wallet
    pub fn get_public_address(&self) -> Result<String> {
        self.state
            .address()
            .map(str::to_string)
            .ok_or(DeviceError::NoWallet)
    }

    pub fn state(&self) -> &DeviceState {
        &self.state
    }

    /// Whether a usable wallet backs the current state
    pub fn has_wallet(&self) -> bool {
        self.state.address().is_some()
    }

    /// Whether `begin` failed
    pub fn is_halted(&self) -> bool {
        self.halted
    }
}
