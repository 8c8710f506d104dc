//! Wasmtime engine configuration and creation.
//!
//! The [`BridgeEngine`] compiles and executes exactly one long-lived module
//! instance per host process, so it is configured for the simple synchronous
//! embedding case: no async support, no fuel metering, no interruption. CPU
//! budgeting belongs to the outer environment that schedules the ticks; the
//! bridge does not carry its own watchdog.

use tracing::info;
use wasmtime::{Config, Engine, OptLevel};

use tick_bridge_common::{BridgeError, EngineConfig};

/// Wasmtime engine wrapper for the tick bridge.
///
/// The engine holds compilation settings and the compiled-code allocator.
/// It is cheap to clone and contains no per-tick state.
#[derive(Clone)]
pub struct BridgeEngine {
    engine: Engine,
    config: EngineConfig,
}

impl BridgeEngine {
    /// Create a new WebAssembly engine with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the Wasmtime configuration is invalid.
    pub fn new(config: &EngineConfig) -> Result<Self, BridgeError> {
        let mut wasmtime_config = Config::new();

        wasmtime_config.cranelift_opt_level(if config.optimize {
            OptLevel::Speed
        } else {
            OptLevel::None
        });

        if config.debug_info {
            wasmtime_config.debug_info(true);
        }

        let engine = Engine::new(&wasmtime_config).map_err(|e| {
            BridgeError::invalid_config(format!("Failed to create Wasmtime engine: {e}"))
        })?;

        info!(
            optimize = config.optimize,
            debug_info = config.debug_info,
            "Wasmtime engine initialized"
        );

        Ok(Self {
            engine,
            config: config.clone(),
        })
    }

    /// Get a reference to the inner Wasmtime engine.
    pub fn inner(&self) -> &Engine {
        &self.engine
    }

    /// Get the engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

impl std::fmt::Debug for BridgeEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeEngine")
            .field("optimize", &self.config.optimize)
            .field("debug_info", &self.config.debug_info)
            .finish_non_exhaustive()
    }
}
