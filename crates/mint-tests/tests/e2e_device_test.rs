//! End-to-end scenario tests for the Mint device
//!
//! Each test assembles a device from host stand-ins: a simulated tamper pin,
//! a manual clock, the software secure element with a fixed TRNG pattern,
//! and either the in-memory FAT12 disk or a drop directory.

use std::path::Path;
use std::sync::Arc;

use k256::elliptic_curve::sec1::ToEncodedPoint;
use tempfile::TempDir;

use mint_core::{entropy, format_address, is_valid_address, wif, AddressKind, Network, PublicKey};
use mint_device::hsm::PatternRng;
use mint_device::storage::virtual_disk::HostPort;
use mint_device::{
    CircuitMonitor, DeviceConfig, DeviceError, DeviceState, DeviceStateMachine, DropDirStorage,
    ManualClock, RecordingIndicator, SecureElementAdapter, SimulatedPin, SoftSecureElement,
    StatusSignal, VirtualDisk, VirtualStorage,
};

struct Device {
    pin: Arc<SimulatedPin>,
    clock: Arc<ManualClock>,
    leds: RecordingIndicator,
    machine: DeviceStateMachine,
}

impl Device {
    fn assemble(
        pin: SimulatedPin,
        element: SoftSecureElement,
        storage: impl FnOnce(Arc<ManualClock>) -> Box<dyn VirtualStorage>,
    ) -> Self {
        let config = DeviceConfig::default();
        let pin = Arc::new(pin);
        let clock = Arc::new(ManualClock::new(0));
        let leds = RecordingIndicator::new();

        let circuit = CircuitMonitor::new(pin.clone(), clock.clone(), config.debounce_ms);
        let secure = SecureElementAdapter::new(Box::new(element), pin.clone(), config.mixing);
        let machine = DeviceStateMachine::new(
            config,
            circuit,
            secure,
            storage(clock.clone()),
            Box::new(leds.clone()),
        );
        Self {
            pin,
            clock,
            leds,
            machine,
        }
    }

    /// Device on the in-memory disk; returns the host's port to it
    fn on_disk(pin: SimulatedPin, element: SoftSecureElement) -> (Self, HostPort) {
        let mut host = None;
        let device = Self::assemble(pin, element, |clock| {
            let disk = VirtualDisk::new(clock, 1_000);
            host = Some(disk.host());
            Box::new(disk)
        });
        (device, host.unwrap())
    }

    fn in_dir(pin: SimulatedPin, element: SoftSecureElement, dir: &Path) -> Self {
        Self::assemble(pin, element, |clock| {
            Box::new(DropDirStorage::new(dir, clock, 1_000))
        })
    }

    /// Advance time one loop period and run one tick
    fn step(&mut self, ms: u64) {
        self.clock.advance(ms);
        self.machine.tick();
    }

    fn break_circuit(&mut self) {
        self.pin.break_circuit();
        self.step(10);
        self.step(50);
    }
}

fn element() -> SoftSecureElement {
    SoftSecureElement::with_rng(PatternRng::balanced())
}

/// Address recomputed from a WIF key, independent of the device
fn address_of_wif(wif_key: &str, network: Network) -> String {
    let decoded = wif::decode(wif_key).unwrap();
    assert!(decoded.compressed);
    let secret = k256::SecretKey::from_slice(decoded.key.expose()).unwrap();
    let point = secret.public_key().to_encoded_point(true);
    let public_key = PublicKey::from_sec1(point.as_bytes()).unwrap();
    format_address(&public_key, network, AddressKind::P2wpkh).unwrap()
}

#[test]
fn test_full_device_lifecycle() {
    // ==========================================
    // STEP 1: Boot with the circuit intact and no key
    // ==========================================
    let (mut device, host) = Device::on_disk(SimulatedPin::intact(), element());
    device.machine.begin().unwrap();
    assert_eq!(device.machine.state(), &DeviceState::ReadyNoWallet);
    assert!(host.readme().unwrap().starts_with("MINT DEVICE"));

    // ==========================================
    // STEP 2: Host drops 32 bytes of entropy
    // ==========================================
    let user_entropy: Vec<u8> = (0u8..32).map(|i| i.wrapping_mul(37) ^ 0x5A).collect();
    host.drop_file(&user_entropy).unwrap();
    device.step(500);
    assert_eq!(device.machine.state(), &DeviceState::ReadyNoWallet);
    device.step(500);

    let address = match device.machine.state() {
        DeviceState::ReadyWithWallet { address } => address.clone(),
        other => panic!("expected a sealed wallet, got {}", other),
    };
    assert!(is_valid_address(&address, Network::Mainnet, AddressKind::P2wpkh));
    assert_eq!(device.machine.get_public_address().unwrap(), address);
    assert!(matches!(
        device.machine.get_private_key(),
        Err(DeviceError::RevealDenied(_))
    ));

    let readme = host.readme().unwrap();
    assert!(readme.contains("SEALED STATE"));
    assert!(readme.contains(&address));

    assert_eq!(
        device.leds.history(),
        vec![
            StatusSignal::Initializing,
            StatusSignal::NoWallet,
            StatusSignal::Generating,
            StatusSignal::Sealed,
        ]
    );

    // ==========================================
    // STEP 3: Break the circuit
    // ==========================================
    device.break_circuit();
    assert_eq!(
        device.machine.state(),
        &DeviceState::Tampered {
            address: Some(address.clone())
        }
    );

    let wif_key = device.machine.get_private_key().unwrap();
    assert!(wif_key.starts_with('K') || wif_key.starts_with('L'));
    assert_eq!(wif_key.len(), 52);
    assert_eq!(address_of_wif(&wif_key, Network::Mainnet), address);
    assert_eq!(device.machine.get_public_address().unwrap(), address);

    let readme = host.readme().unwrap();
    assert!(readme.contains("TAMPERED STATE"));
    assert!(readme.contains(wif_key.as_str()));
    assert_eq!(device.leds.current(), Some(StatusSignal::Tampered));

    // ==========================================
    // STEP 4: Nothing leaves the tampered state
    // ==========================================
    device.pin.restore_circuit();
    device.step(100);
    host.drop_file(b"more entropy").unwrap();
    device.step(1_000);
    device.step(1_000);
    assert!(device.machine.state().is_tampered());
    assert_eq!(device.machine.get_private_key().unwrap(), wif_key);
}

#[test]
fn test_duplicate_drops_create_one_wallet() {
    let dir = TempDir::new().unwrap();
    let mut device = Device::in_dir(SimulatedPin::intact(), element(), dir.path());
    device.machine.begin().unwrap();

    // Both files settle in the same tick and are queued together
    std::fs::write(dir.path().join("a.bin"), b"first entropy file").unwrap();
    std::fs::write(dir.path().join("b.bin"), b"second entropy file").unwrap();
    device.step(10);
    device.step(1_000);

    let address = device.machine.get_public_address().unwrap();
    assert!(matches!(
        device.machine.state(),
        DeviceState::ReadyWithWallet { .. }
    ));
    let generating = device
        .leds
        .history()
        .iter()
        .filter(|s| **s == StatusSignal::Generating)
        .count();
    assert_eq!(generating, 1);

    // The wallet came from the first drop alone
    let (mut reference, _) = Device::on_disk(SimulatedPin::intact(), element());
    reference.machine.begin().unwrap();
    let expected = reference
        .machine
        .process_file_drop(b"first entropy file")
        .unwrap();
    assert_eq!(address, expected);

    let readme = std::fs::read_to_string(dir.path().join("README.TXT")).unwrap();
    assert!(readme.contains(&address));
}

#[test]
fn test_tamper_survives_reboot() {
    let dir = TempDir::new().unwrap();
    let nv_path = dir.path().join("nv.json");

    let address = {
        let (mut device, _) =
            Device::on_disk(SimulatedPin::intact(), element().persist_to(&nv_path));
        device.machine.begin().unwrap();
        let address = device.machine.process_file_drop(b"entropy").unwrap();
        device.break_circuit();
        assert!(device.machine.state().is_tampered());
        address
    };

    // The enclosure is closed again, but the OTP byte remembers
    let (mut device, host) =
        Device::on_disk(SimulatedPin::intact(), element().persist_to(&nv_path));
    device.machine.begin().unwrap();
    assert_eq!(
        device.machine.state(),
        &DeviceState::Tampered {
            address: Some(address.clone())
        }
    );
    let wif_key = device.machine.get_private_key().unwrap();
    assert_eq!(address_of_wif(&wif_key, Network::Mainnet), address);
    assert!(host.readme().unwrap().contains(wif_key.as_str()));
}

#[test]
fn test_sealed_wallet_survives_reboot() {
    let dir = TempDir::new().unwrap();
    let nv_path = dir.path().join("nv.json");

    let address = {
        let (mut device, _) =
            Device::on_disk(SimulatedPin::intact(), element().persist_to(&nv_path));
        device.machine.begin().unwrap();
        device.machine.process_file_drop(b"entropy").unwrap()
    };

    let (mut device, host) =
        Device::on_disk(SimulatedPin::intact(), element().persist_to(&nv_path));
    device.machine.begin().unwrap();
    assert_eq!(
        device.machine.state(),
        &DeviceState::ReadyWithWallet {
            address: address.clone()
        }
    );
    assert!(host.readme().unwrap().contains(&address));

    // Sealed: a new drop does not replace the key
    host.drop_file(b"replacement entropy").unwrap();
    device.step(1_000);
    assert_eq!(device.machine.get_public_address().unwrap(), address);
}

/// NV image holding a key object whose secret is not a valid scalar
fn write_corrupt_wallet(nv_path: &Path) {
    std::fs::write(
        nv_path,
        format!(
            r#"{{ "otp": {{}}, "objects": {{ "268435457": {{ "secret": "{}", "reveal_gate": 8388592 }} }} }}"#,
            "00".repeat(32)
        ),
    )
    .unwrap();
}

#[test]
fn test_unreadable_wallet_is_not_fatal() {
    let dir = TempDir::new().unwrap();
    let nv_path = dir.path().join("nv.json");
    write_corrupt_wallet(&nv_path);

    let (mut device, _) = Device::on_disk(SimulatedPin::intact(), element().persist_to(&nv_path));
    device.machine.begin().unwrap();
    assert_eq!(device.machine.state(), &DeviceState::ReadyNoWallet);
    assert!(!device.machine.has_wallet());
    assert!(matches!(
        device.machine.get_public_address(),
        Err(DeviceError::NoWallet)
    ));

    // A drop replaces the broken key object
    let address = device.machine.process_file_drop(b"entropy").unwrap();
    assert!(address.starts_with("bc1q"));
    assert!(device.machine.has_wallet());
}

#[test]
fn test_unreadable_wallet_is_never_revealed() {
    let dir = TempDir::new().unwrap();
    let nv_path = dir.path().join("nv.json");
    write_corrupt_wallet(&nv_path);

    let (mut device, host) =
        Device::on_disk(SimulatedPin::intact(), element().persist_to(&nv_path));
    device.machine.begin().unwrap();
    device.break_circuit();

    assert_eq!(device.machine.state(), &DeviceState::Tampered { address: None });
    assert!(!device.machine.has_wallet());
    assert!(matches!(
        device.machine.get_private_key(),
        Err(DeviceError::NoWallet)
    ));
    assert!(host.readme().unwrap().contains("No wallet was generated"));
}

#[test]
fn test_storage_failure_is_fatal() {
    let dir = TempDir::new().unwrap();
    let not_a_dir = dir.path().join("occupied");
    std::fs::write(&not_a_dir, b"file").unwrap();

    let mut device = Device::in_dir(SimulatedPin::intact(), element(), &not_a_dir);
    assert!(matches!(
        device.machine.begin(),
        Err(DeviceError::Initialization { subsystem: "storage", .. })
    ));
    assert!(device.machine.is_halted());
    assert_eq!(device.leds.current(), Some(StatusSignal::Error));
}

#[test]
fn test_degenerate_entropy_fails_health_check() {
    assert!(entropy::frequency_check(&[0x00; 32]).is_err());
    assert!(entropy::frequency_check(&[0xFF; 32]).is_err());
    assert!(entropy::frequency_check(&[0x0F; 32]).is_ok());

    let (mut device, _) =
        Device::on_disk(SimulatedPin::intact(), SoftSecureElement::with_rng(PatternRng::new(&[0xFF])));
    device.machine.begin().unwrap();
    assert!(matches!(
        device.machine.process_file_drop(b"entropy"),
        Err(DeviceError::EntropyHealthCheck { .. })
    ));
    assert_eq!(device.machine.state(), &DeviceState::ReadyNoWallet);
    assert!(!device.machine.has_wallet());
}

#[test]
fn test_break_without_wallet() {
    let (mut device, host) = Device::on_disk(SimulatedPin::intact(), element());
    device.machine.begin().unwrap();
    device.break_circuit();

    assert_eq!(device.machine.state(), &DeviceState::Tampered { address: None });
    assert!(matches!(
        device.machine.get_private_key(),
        Err(DeviceError::NoWallet)
    ));
    assert!(host.readme().unwrap().contains("No wallet"));
}
