//! Tick driver and persistent storage slots for tick-bridge.
//!
//! This crate provides the outermost layer of the bridge: the per-tick
//! control loop ([`TickDriver`]) and the external storage slot the
//! persistent state buffer survives in between process lifetimes
//! ([`StateSlot`] with in-memory and file-backed implementations).
//!
//! # Quick Start
//!
//! ```ignore
//! use tick_bridge_common::{BridgeConfig, ConfigFile};
//! use tick_bridge_core::{BridgeEngine, CompiledModule};
//! use tick_bridge_driver::{DriverConfig, FileSlot, TickDriver};
//! use tick_bridge_host::instantiate_module;
//!
//! let config = BridgeConfig::default();
//! let engine = BridgeEngine::new(&config.engine)?;
//! let module = CompiledModule::from_file(engine.inner(), "module.wasm")?;
//! let instance = instantiate_module(&engine, &module, &config)?;
//!
//! let slot = FileSlot::new("state.txt");
//! let mut driver = TickDriver::new(instance, slot, DriverConfig::default())?;
//!
//! loop {
//!     driver.tick(None)?;
//! }
//! ```

pub mod driver;
pub mod storage;

pub use driver::{DriverConfig, DriverState, TickDriver, TickReport};
pub use storage::{FileSlot, MemorySlot, StateSlot};
