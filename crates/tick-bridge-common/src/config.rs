//! Configuration structures for the tick-bridge.
//!
//! This module defines configuration options for the bridge components:
//! - [`BridgeConfig`]: Top-level configuration containing all settings
//! - [`EngineConfig`]: Wasmtime engine settings
//! - [`ModuleConfig`]: Per-module sizing and export naming
//! - [`HandleConfig`]: Opaque reference table policies
//!
//! Capability selection is a tagged enum ([`CapabilitySet`]): each module
//! build is linked against exactly one statically enumerated import set,
//! chosen here rather than discovered structurally at instantiation time.

use serde::{Deserialize, Serialize};

/// Top-level bridge configuration.
///
/// This structure contains all configuration options for embedding one
/// compute module. It can be loaded from files (TOML, JSON).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct BridgeConfig {
    /// Wasmtime engine configuration.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Module sizing and export names.
    #[serde(default)]
    pub module: ModuleConfig,

    /// Capability import set the module is linked against.
    #[serde(default)]
    pub capabilities: CapabilitySet,

    /// Opaque reference table policies.
    #[serde(default)]
    pub handles: HandleConfig,
}

/// Wasmtime engine configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Enable Cranelift speed optimizations.
    ///
    /// The module is compiled once at cold start and then runs for the
    /// whole process lifetime, so compilation speed rarely matters.
    #[serde(default = "defaults::optimize")]
    pub optimize: bool,

    /// Emit debug info for guest stack traces in trap messages.
    #[serde(default)]
    pub debug_info: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            optimize: defaults::optimize(),
            debug_info: false,
        }
    }
}

/// Per-module sizing and export naming.
///
/// Memory and table sizes are fixed per module build and never renegotiated
/// at runtime. Under-provisioning the linear memory is a configuration
/// error, not a recoverable runtime condition.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModuleConfig {
    /// Initial linear-memory size in 64 KiB wasm pages.
    ///
    /// Must cover the module's static data plus its expected persistent
    /// state. Only used when the module imports `env.memory` instead of
    /// exporting its own.
    #[serde(default = "defaults::initial_memory_pages")]
    pub initial_memory_pages: u32,

    /// Number of elements in the host-allocated indirect-call table.
    ///
    /// Zero unless the module requires runtime-populated function pointers.
    #[serde(default)]
    pub table_elements: u32,

    /// Names of the module exports the bridge resolves.
    #[serde(default)]
    pub exports: ExportNames,
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self {
            initial_memory_pages: defaults::initial_memory_pages(),
            table_elements: 0,
            exports: ExportNames::default(),
        }
    }
}

/// Names of the module exports the bridge resolves.
///
/// The layout of the persistent region is owned by the module, which
/// declares it through two zero-argument entrypoints. These names are the
/// fixed contract for one module version.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExportNames {
    /// The per-tick run entrypoint.
    #[serde(default = "defaults::run_export")]
    pub run: String,

    /// Zero-argument entrypoint returning the persistent region's byte
    /// offset within linear memory.
    #[serde(default = "defaults::state_offset_export")]
    pub state_offset: String,

    /// Zero-argument entrypoint returning the persistent region's byte
    /// length.
    #[serde(default = "defaults::state_len_export")]
    pub state_len: String,

    /// The exported linear memory, for modules that own their own memory
    /// rather than importing `env.memory`.
    #[serde(default = "defaults::memory_export")]
    pub memory: String,
}

impl Default for ExportNames {
    fn default() -> Self {
        Self {
            run: defaults::run_export(),
            state_offset: defaults::state_offset_export(),
            state_len: defaults::state_len_export(),
            memory: defaults::memory_export(),
        }
    }
}

/// Statically enumerated capability import set variants.
///
/// Each variant lists exactly the host functions a module version may
/// import (all under the `env` namespace). A module importing anything
/// outside the selected set fails instantiation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilitySet {
    /// The module is pure: no host functions at all.
    Pure,

    /// Byte-slice logging only: `log(ptr, len)`.
    #[default]
    Logging,

    /// Logging plus the opaque reference bridge:
    /// `handle_is_live(handle) -> i32` and `handle_drop(handle) -> i32`.
    ReferenceBridge,
}

impl CapabilitySet {
    /// The function import names this set provides under `env`.
    pub fn function_imports(self) -> &'static [&'static str] {
        match self {
            CapabilitySet::Pure => &[],
            CapabilitySet::Logging => &["log"],
            CapabilitySet::ReferenceBridge => &["log", "handle_is_live", "handle_drop"],
        }
    }

    /// Returns `true` if this set wires the opaque reference table into
    /// the module's imports.
    pub fn has_reference_bridge(self) -> bool {
        matches!(self, CapabilitySet::ReferenceBridge)
    }
}

/// Opaque reference table policies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct HandleConfig {
    /// How long issued handles stay valid.
    #[serde(default)]
    pub scope: HandleScope,

    /// What a misused handle does to the current tick.
    #[serde(default)]
    pub misuse: MisusePolicy,
}

/// Handle lifetime policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HandleScope {
    /// Handles are invalidated at the end of every tick. Safe default:
    /// host objects are only guaranteed alive for the tick that
    /// registered them.
    #[default]
    Tick,

    /// Handles live until process restart and the table grows
    /// monotonically. A documented growth tradeoff, not a leak, for hosts
    /// whose root objects are stable across ticks.
    Boot,
}

/// Policy for a dereference of an unregistered or invalidated handle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MisusePolicy {
    /// The import call returns a sentinel value and the tick continues.
    #[default]
    Sentinel,

    /// The import call fails, trapping the module and ending the tick.
    Trap,
}

/// Root handle registration policy for the tick driver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RootMode {
    /// The run entrypoint takes no root handle.
    Disabled,

    /// Register the root object once at the first tick and reuse the
    /// handle forever. Only sound when the root's identity is stable.
    Reuse,

    /// Re-register the root object every tick. Safe default when the
    /// root's identity may change between ticks.
    #[default]
    PerTick,
}

/// Default value functions for serde.
mod defaults {
    pub const fn optimize() -> bool {
        true
    }

    pub const fn initial_memory_pages() -> u32 {
        256
    }

    pub fn run_export() -> String {
        "run".into()
    }

    pub fn state_offset_export() -> String {
        "state_offset".into()
    }

    pub fn state_len_export() -> String {
        "state_len".into()
    }

    pub fn memory_export() -> String {
        "memory".into()
    }
}
