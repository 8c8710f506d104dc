//! Capability import set implementation for tick-bridge.
//!
//! This crate provides the host-side implementations of the functions a
//! compute module may import, and their registration on a Wasmtime linker.
//! Which functions exist is a statically enumerated, configuration-selected
//! set per module version, never structural matching against arbitrary
//! host functions.
//!
//! # Capability sets
//!
//! - `Pure`: the module imports nothing
//! - `Logging`: `env.log(ptr, len)` byte-slice logging
//! - `ReferenceBridge`: logging plus `env.handle_is_live` /
//!   `env.handle_drop` over the opaque reference table
//!
//! # Trust model
//!
//! The module is sandboxed and untrusted. Every pointer it passes is
//! bounds-checked against its own linear memory; every handle goes through
//! the generation-tagged table. A misbehaving module can waste its own
//! tick, never the host's memory.

pub mod imports;
pub mod logging;

pub use imports::{instantiate_module, register_set};
pub use logging::GuestLogger;
