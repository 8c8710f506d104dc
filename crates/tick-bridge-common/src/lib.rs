//! Common types, errors, and utilities for tick-bridge.
//!
//! This crate provides shared functionality used across the tick-bridge workspace:
//! - Error types using `thiserror` for type-safe error handling
//! - Configuration structures for bridge, module, and driver settings
//! - The byte-preserving text codec for the storage boundary

pub mod codec;
pub mod config;
pub mod config_file;
pub mod error;

pub use config::{
    BridgeConfig, CapabilitySet, EngineConfig, ExportNames, HandleConfig, HandleScope,
    MisusePolicy, ModuleConfig, RootMode,
};
pub use config_file::{ConfigFile, ConfigFileError, DriverSection};
pub use error::{BridgeError, CodecError, HandleError, StorageError};
