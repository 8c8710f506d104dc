//! Core Wasmtime bridge runtime for tick-bridge.
//!
//! This crate provides the fundamental pieces of the host-module bridge:
//! - [`BridgeEngine`]: Configured Wasmtime engine
//! - [`CompiledModule`]: Validated, compiled module bytecode
//! - [`ModuleInstance`]: The one long-lived instance with resolved entrypoints
//! - [`HandleTable`]: The generation-tagged opaque reference table
//! - [`HostContext`]: Bridge state shared with capability imports
//! - [`sync`]: The persistent memory synchronizer
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                    BridgeEngine                      │
//! │  (compilation settings, shared, no per-tick state)   │
//! └──────────────────────────────────────────────────────┘
//!                          │
//!                          ▼
//! ┌──────────────────────────────────────────────────────┐
//! │                   CompiledModule                     │
//! │  (opaque bytecode, compiled once at cold start)      │
//! └──────────────────────────────────────────────────────┘
//!                          │
//!                          ▼
//! ┌──────────────────────────────────────────────────────┐
//! │          ModuleInstance (process lifetime)           │
//! │  Store<HostContext>: handle table + guest logs       │
//! │  linear memory  <- sync::push_in / sync::pull_out    │
//! │  entrypoints: run / state_offset / state_len         │
//! └──────────────────────────────────────────────────────┘
//! ```

pub mod engine;
pub mod handles;
pub mod instance;
pub mod module;
pub mod store;
pub mod sync;

pub use engine::BridgeEngine;
pub use handles::{Handle, HandleTable};
pub use instance::{ModuleInstance, PersistentRegion, RunOutcome};
pub use module::CompiledModule;
pub use store::{GuestLogEntry, HostContext, HostValue};
pub use sync::{SyncStatus, pull_out, push_in};
