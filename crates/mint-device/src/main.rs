//! Mint Simulator - runs the device firmware core on a host
//!
//! A directory stands in for the removable disk: files written into it are
//! file drops, `README.TXT` shows the device's display text, and creating a
//! `BREAK` file opens the tamper circuit.

use clap::Parser;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mint_device::hsm::PatternRng;
use mint_device::{
    BreakSentinel, CircuitMonitor, Clock, DeviceConfig, DeviceStateMachine, DropDirStorage,
    LogIndicator, MonotonicClock, SecureElementAdapter, SoftSecureElement, TamperPin,
};

#[derive(Parser, Debug)]
#[command(name = "mint-sim")]
#[command(about = "Host simulator for the Mint bearer device")]
#[command(version)]
struct Args {
    /// Configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory acting as the device's disk
    #[arg(long, default_value = "mint-drop")]
    drop_dir: PathBuf,

    /// Where the secure element keeps its NV image (overrides the config)
    #[arg(long)]
    state_path: Option<PathBuf>,

    /// Use a fixed, bit-balanced TRNG pattern (demos only)
    #[arg(long, conflicts_with = "rng_seed")]
    deterministic: bool,

    /// Seed a ChaCha20 TRNG (reproducible runs)
    #[arg(long)]
    rng_seed: Option<u64>,
}

fn load_config(args: &Args) -> anyhow::Result<DeviceConfig> {
    let config_path = args
        .config
        .clone()
        .or_else(|| std::env::var_os("MINT_CONFIG").map(PathBuf::from))
        .unwrap_or_else(DeviceConfig::default_path);

    let config = if config_path.exists() {
        DeviceConfig::load(&config_path)?
    } else {
        let config = DeviceConfig::default();
        config.save(&config_path)?;
        info!("Created default config at {:?}", config_path);
        config
    };
    Ok(config)
}

fn secure_element(args: &Args, config: &DeviceConfig) -> SoftSecureElement {
    let element = if args.deterministic {
        warn!("Deterministic TRNG pattern in use; keys are NOT secret");
        SoftSecureElement::with_rng(PatternRng::balanced())
    } else if let Some(seed) = args.rng_seed {
        warn!("Seeded TRNG in use; keys are reproducible");
        SoftSecureElement::with_rng(ChaCha20Rng::seed_from_u64(seed))
    } else {
        SoftSecureElement::new()
    };

    match args.state_path.clone().or_else(|| config.state_path.clone()) {
        Some(path) => element.persist_to(path),
        None => element,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mint_device=info,mint_sim=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Mint simulator v{}", env!("CARGO_PKG_VERSION"));

    let args = Args::parse();
    let config = load_config(&args)?;
    std::fs::create_dir_all(&args.drop_dir)?;

    let clock: Arc<dyn Clock> = Arc::new(MonotonicClock::new());
    let pin: Arc<dyn TamperPin> = Arc::new(BreakSentinel::new(&args.drop_dir));

    let circuit = CircuitMonitor::new(Arc::clone(&pin), Arc::clone(&clock), config.debounce_ms);
    let secure = SecureElementAdapter::new(
        Box::new(secure_element(&args, &config)),
        Arc::clone(&pin),
        config.mixing,
    );
    let storage = DropDirStorage::new(&args.drop_dir, Arc::clone(&clock), config.storage_settle_ms);
    let indicator = LogIndicator::new(config.status_pin);

    let interval = Duration::from_millis(config.loop_interval_ms);
    let mut device = DeviceStateMachine::new(
        config,
        circuit,
        secure,
        Box::new(storage),
        Box::new(indicator),
    );
    device.begin()?;

    info!(
        "Drop files into {:?}; create {:?} to break the circuit",
        args.drop_dir,
        args.drop_dir.join("BREAK")
    );

    let mut ticker = tokio::time::interval(interval);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = ticker.tick() => device.tick(),
            _ = &mut shutdown => {
                info!("Received shutdown signal");
                break;
            }
        }
    }

    info!("Simulator shutting down in state {}", device.state());
    Ok(())
}
