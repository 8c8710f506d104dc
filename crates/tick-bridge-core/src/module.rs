//! WebAssembly module compilation.
//!
//! This module provides [`CompiledModule`], a wrapper around Wasmtime's
//! [`Module`] that validates and compiles the opaque bytecode blob handed to
//! the bridge. Compilation happens exactly once per process lifetime, at
//! cold start; malformed bytecode is a fatal startup fault and is never
//! retried.

use std::hash::{DefaultHasher, Hash, Hasher};
use std::path::Path;
use std::time::Instant;

use tracing::{info, instrument};
use wasmtime::{Engine, Module};

use tick_bridge_common::BridgeError;

/// A compiled WebAssembly compute module.
///
/// Wraps a Wasmtime [`Module`] with a content hash for diagnostics. The
/// module stays opaque to the bridge beyond its import list and named
/// exports.
#[derive(Clone)]
pub struct CompiledModule {
    inner: Module,

    /// Hash of the original bytecode, for log correlation.
    content_hash: String,
}

impl CompiledModule {
    /// Compile a module from WebAssembly bytecode.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::InvalidBytecode`] for a blob that is not
    /// WebAssembly at all, and [`BridgeError::CompilationFailed`] when
    /// validation or compilation rejects it.
    #[instrument(skip(engine, bytes), fields(bytes_len = bytes.len()))]
    pub fn from_bytes(engine: &Engine, bytes: &[u8]) -> Result<Self, BridgeError> {
        let start = Instant::now();

        Self::validate_wasm_header(bytes)?;

        let module = Module::new(engine, bytes)
            .map_err(|e| BridgeError::compilation_failed(format!("Module rejected: {e}")))?;

        let content_hash = compute_hash(bytes);
        let duration = start.elapsed();

        info!(
            content_hash = %content_hash,
            duration_ms = duration.as_millis(),
            "Module compiled"
        );

        Ok(Self {
            inner: module,
            content_hash,
        })
    }

    /// Compile a module from WAT (WebAssembly Text Format).
    ///
    /// This is primarily for tests and fixture modules.
    ///
    /// # Errors
    ///
    /// Returns an error if the WAT does not parse or compile.
    #[instrument(skip(engine, wat))]
    pub fn from_wat(engine: &Engine, wat: &str) -> Result<Self, BridgeError> {
        let module = Module::new(engine, wat)
            .map_err(|e| BridgeError::compilation_failed(format!("WAT rejected: {e}")))?;

        Ok(Self {
            inner: module,
            content_hash: compute_hash(wat.as_bytes()),
        })
    }

    /// Load and compile a module from a `.wasm` or `.wat` file.
    ///
    /// The format is detected from the content: a wasm magic number means
    /// binary, anything else is treated as text format.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or the content does not
    /// compile.
    pub fn from_file(engine: &Engine, path: impl AsRef<Path>) -> Result<Self, BridgeError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| {
            BridgeError::invalid_bytecode(format!("Cannot read {}: {e}", path.display()))
        })?;

        if bytes.starts_with(WASM_MAGIC) {
            Self::from_bytes(engine, &bytes)
        } else {
            let wat = std::str::from_utf8(&bytes).map_err(|_| {
                BridgeError::invalid_bytecode(format!(
                    "{} is neither binary wasm nor text format",
                    path.display()
                ))
            })?;
            Self::from_wat(engine, wat)
        }
    }

    /// Get the inner Wasmtime module.
    pub fn inner(&self) -> &Module {
        &self.inner
    }

    /// Get the content hash of the original bytecode.
    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    /// Validate the WebAssembly header (magic number).
    fn validate_wasm_header(bytes: &[u8]) -> Result<(), BridgeError> {
        if bytes.len() < 8 {
            return Err(BridgeError::invalid_bytecode("file too small"));
        }

        if &bytes[0..4] != WASM_MAGIC {
            return Err(BridgeError::invalid_bytecode("bad magic number"));
        }

        Ok(())
    }
}

/// The `\0asm` magic prefix of binary WebAssembly.
const WASM_MAGIC: &[u8] = b"\0asm";

impl std::fmt::Debug for CompiledModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledModule")
            .field("content_hash", &self.content_hash)
            .finish_non_exhaustive()
    }
}

/// Compute a hash of the given bytes.
fn compute_hash(bytes: &[u8]) -> String {
    let mut hasher = DefaultHasher::new();
    bytes.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}
