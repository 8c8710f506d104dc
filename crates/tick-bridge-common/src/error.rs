//! Error types for the tick-bridge.
//!
//! This module defines a hierarchy of error types using `thiserror`:
//! - [`BridgeError`]: Top-level errors for the bridge
//! - [`HandleError`]: Opaque reference table lookup failures
//! - [`StorageError`]: Persistent storage slot failures
//! - [`CodecError`]: Byte/text transcoding failures
//!
//! The taxonomy follows the bridge's containment rules: startup errors
//! (bytecode, imports, exports, configuration) are fatal and abort before the
//! first tick; everything else is contained within a tick and must never
//! bring down the host process.

use std::io;

use thiserror::Error;

/// Top-level bridge errors.
///
/// These errors cover the whole lifecycle of an embedded compute module,
/// from instantiation through per-tick state synchronization.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// The supplied module bytecode is not valid WebAssembly.
    #[error("Invalid bytecode: {reason}")]
    InvalidBytecode {
        /// Description of why the bytecode was rejected.
        reason: String,
    },

    /// WebAssembly compilation failed.
    #[error("Compilation failed: {reason}")]
    CompilationFailed {
        /// Description of the compilation failure.
        reason: String,
    },

    /// The module's declared imports do not match the configured
    /// capability import set.
    #[error("Import mismatch for '{name}': {reason}")]
    ImportMismatch {
        /// Fully qualified import name (`module.field`).
        name: String,
        /// Why the import could not be satisfied.
        reason: String,
    },

    /// A required export (entrypoint or memory) is missing or has the
    /// wrong type.
    #[error("Missing or mistyped export: {name}")]
    MissingExport {
        /// The export name that could not be resolved.
        name: String,
    },

    /// Linking or instantiation failed (type mismatch, start-function
    /// trap, resource allocation).
    #[error("Instantiation failed: {reason}")]
    Instantiation {
        /// Description of the instantiation failure.
        reason: String,
    },

    /// A bridge-invoked entrypoint trapped outside of `run` (for example a
    /// persistent-region getter). Contained within the tick.
    #[error("Entrypoint trapped: {message}")]
    Trap {
        /// Description of the trap.
        message: String,
    },

    /// The module declared a persistent region that does not lie inside
    /// its current linear memory.
    #[error(
        "Persistent region out of bounds: offset {offset} + len {len} > memory size {memory_bytes}"
    )]
    RegionOutOfBounds {
        /// Declared byte offset of the persistent region.
        offset: u64,
        /// Declared byte length of the persistent region.
        len: u64,
        /// Current linear memory size in bytes.
        memory_bytes: u64,
    },

    /// An opaque handle lookup failed.
    #[error("Handle error: {0}")]
    Handle(#[from] HandleError),

    /// A persistent storage slot operation failed.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// A tick may not begin while the previous tick is still running.
    #[error("Tick already in progress")]
    TickInProgress,

    /// Invalid configuration was provided.
    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        /// Description of the configuration error.
        reason: String,
    },
}

/// Opaque reference table lookup failures.
///
/// Every variant carries enough context to diagnose a misbehaving module
/// without ever exposing host memory. None of these are fatal: policy
/// decides whether the module sees a sentinel or a trapped import call.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleError {
    /// The handle's slot index was never allocated.
    #[error("Handle index {index} out of range")]
    OutOfRange {
        /// The out-of-range slot index.
        index: u32,
    },

    /// The slot was reused since this handle was issued.
    #[error("Stale handle: index {index} is at generation {current}, handle has {held}")]
    Stale {
        /// The slot index.
        index: u32,
        /// The generation the slot is currently at.
        current: u32,
        /// The generation the handle carries.
        held: u32,
    },

    /// The slot exists at the right generation but holds no value.
    #[error("Handle index {index} points at a vacant slot")]
    Vacant {
        /// The vacant slot index.
        index: u32,
    },

    /// The raw integer crossing the wasm boundary does not decode to a
    /// handle at all.
    #[error("Malformed handle bits: {bits}")]
    Malformed {
        /// The raw value received from the module.
        bits: i64,
    },
}

/// Persistent storage slot failures.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Reading or writing the slot's backing store failed.
    #[error("Slot I/O failed for {path}: {source}")]
    Io {
        /// Path or description of the backing store.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The stored text could not be decoded back into bytes.
    #[error("Slot transcoding failed: {0}")]
    Codec(#[from] CodecError),
}

/// Byte/text transcoding failures.
///
/// Encoding can never fail (every byte maps to a code point); only decoding
/// of foreign text can.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecError {
    /// The text contains a character above U+00FF, which cannot have come
    /// from the byte-preserving encoder.
    #[error("Character {ch:?} at index {index} is not a single-byte code point")]
    UnmappableChar {
        /// Character index within the text.
        index: usize,
        /// The offending character.
        ch: char,
    },
}

impl BridgeError {
    /// Create a new `InvalidBytecode` error.
    pub fn invalid_bytecode(reason: impl Into<String>) -> Self {
        Self::InvalidBytecode {
            reason: reason.into(),
        }
    }

    /// Create a new `CompilationFailed` error.
    pub fn compilation_failed(reason: impl Into<String>) -> Self {
        Self::CompilationFailed {
            reason: reason.into(),
        }
    }

    /// Create a new `ImportMismatch` error.
    pub fn import_mismatch(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ImportMismatch {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create a new `MissingExport` error.
    pub fn missing_export(name: impl Into<String>) -> Self {
        Self::MissingExport { name: name.into() }
    }

    /// Create a new `Instantiation` error.
    pub fn instantiation(reason: impl Into<String>) -> Self {
        Self::Instantiation {
            reason: reason.into(),
        }
    }

    /// Create a new `Trap` error.
    pub fn trap(message: impl Into<String>) -> Self {
        Self::Trap {
            message: message.into(),
        }
    }

    /// Create a new `InvalidConfig` error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Returns `true` if this error must abort startup before any tick runs.
    ///
    /// Fatal errors are never retried; everything else is contained within
    /// the tick that produced it.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::InvalidBytecode { .. }
                | Self::CompilationFailed { .. }
                | Self::ImportMismatch { .. }
                | Self::MissingExport { .. }
                | Self::Instantiation { .. }
                | Self::InvalidConfig { .. }
        )
    }
}
