#![no_main]

use std::sync::Arc;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use mint_device::hsm::PatternRng;
use mint_device::{
    CircuitMonitor, DeviceConfig, DeviceState, DeviceStateMachine, ManualClock,
    RecordingIndicator, SecureElementAdapter, SimulatedPin, SoftSecureElement, VirtualDisk,
};

#[derive(Debug, Arbitrary)]
enum Event {
    Drop(Vec<u8>),
    Wait(u16),
    Break,
    Restore,
}

fuzz_target!(|events: Vec<Event>| {
    let config = DeviceConfig::default();
    let pin = Arc::new(SimulatedPin::intact());
    let clock = Arc::new(ManualClock::new(0));
    let circuit = CircuitMonitor::new(pin.clone(), clock.clone(), config.debounce_ms);
    let secure = SecureElementAdapter::new(
        Box::new(SoftSecureElement::with_rng(PatternRng::balanced())),
        pin.clone(),
        config.mixing,
    );
    let disk = VirtualDisk::new(clock.clone(), config.storage_settle_ms);
    let host = disk.host();
    let mut device = DeviceStateMachine::new(
        config,
        circuit,
        secure,
        Box::new(disk),
        Box::new(RecordingIndicator::new()),
    );
    device.begin().unwrap();

    let mut was_tampered = false;
    for event in events.into_iter().take(64) {
        match event {
            Event::Drop(contents) => {
                let _ = host.drop_file(&contents);
            }
            Event::Wait(ms) => clock.advance(u64::from(ms)),
            Event::Break => pin.break_circuit(),
            Event::Restore => pin.restore_circuit(),
        }
        device.tick();

        let state = device.state();
        assert!(state.is_settled());
        if was_tampered {
            assert!(state.is_tampered());
        }
        was_tampered = state.is_tampered();

        if !state.is_tampered() {
            assert!(device.get_private_key().is_err());
        }
        if let DeviceState::ReadyWithWallet { address } = device.state().clone() {
            assert_eq!(device.get_public_address().unwrap(), address);
        }
    }
});
