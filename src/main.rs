//! Tick Bridge CLI entry point.
//!
//! Loads a compute module, binds its capability import set, and drives it
//! tick by tick against a file-backed state slot.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tick_bridge_common::ConfigFile;
use tick_bridge_core::{BridgeEngine, CompiledModule, HostValue};
use tick_bridge_driver::{DriverConfig, FileSlot, TickDriver};
use tick_bridge_host::instantiate_module;

#[derive(Parser, Debug)]
#[command(name = "tick-bridge", about = "Run a sandboxed compute module tick by tick")]
struct Cli {
    /// Path to the compute module (.wasm binary or .wat text)
    module: PathBuf,

    /// Path to a TOML configuration file
    #[arg(short, long, env = "TICK_BRIDGE_CONFIG")]
    config: Option<PathBuf>,

    /// Path to the persistent state slot file
    #[arg(short, long, default_value = "tick-bridge-state.txt")]
    state: PathBuf,

    /// Number of ticks to run
    #[arg(short, long, default_value_t = 1)]
    ticks: u64,
}

fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tick_bridge=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    info!("Starting Tick Bridge");

    // Load configuration
    let config_file = match &cli.config {
        Some(path) => ConfigFile::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => ConfigFile::default(),
    };
    let bridge_config = config_file.bridge;

    info!(
        capabilities = ?bridge_config.capabilities,
        root_mode = ?config_file.driver.root_mode,
        "Configuration loaded"
    );

    // Compile and instantiate the module
    let engine = BridgeEngine::new(&bridge_config.engine)?;
    let module = CompiledModule::from_file(engine.inner(), &cli.module)
        .with_context(|| format!("Failed to load module from {}", cli.module.display()))?;

    info!(
        content_hash = %module.content_hash(),
        "Module compiled"
    );

    let instance = instantiate_module(&engine, &module, &bridge_config)?;
    let expects_root = instance.expects_root();

    // Drive the ticks
    let slot = FileSlot::new(&cli.state);
    let driver_config = DriverConfig {
        root_mode: config_file.driver.root_mode,
    };
    let mut driver = TickDriver::new(instance, slot, driver_config)?;

    for _ in 0..cli.ticks {
        // Without a richer host environment the root object is just the
        // current tick number.
        let root: Option<HostValue> = expects_root
            .then(|| Box::new(driver.ticks_run()) as HostValue);

        let report = driver.tick(root)?;

        for entry in &report.logs {
            info!(tick = report.tick, guest = %entry.message, "Module log");
        }
        info!(
            tick = report.tick,
            outcome = ?report.outcome,
            bytes_out = report.bytes_out,
            duration_us = report.duration.as_micros(),
            "Tick complete"
        );
    }

    info!(
        ticks = driver.ticks_run(),
        state_file = %cli.state.display(),
        "Done"
    );

    Ok(())
}
