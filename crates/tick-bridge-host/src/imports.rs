//! Capability import set registration.
//!
//! This module wires the statically enumerated capability sets onto a
//! Wasmtime linker. Every import lives under the `env` namespace and is
//! synchronous: an import call blocks the module until the host function
//! returns.
//!
//! Guest-supplied pointers and handles are untrusted. Memory reads are
//! bounds-checked against the instance's linear memory, and handle lookups
//! go through the generation-tagged table; neither can ever reach host
//! memory outside the sandboxed surfaces.

use tracing::warn;
use wasmtime::{Caller, Extern, Linker};

use crate::logging::{GuestLogger, decode_message};
use tick_bridge_common::{BridgeConfig, BridgeError, CapabilitySet, MisusePolicy};
use tick_bridge_core::{
    BridgeEngine, CompiledModule, Handle, HostContext, ModuleInstance, instance::IMPORT_MODULE,
};

/// Instantiate a module with its configured capability import set bound.
///
/// This is the one-time bind step: the import set is registered strictly
/// after the store (and its handle table) exists and strictly before the
/// first `run` invocation, and never again.
///
/// # Errors
///
/// Propagates the fatal startup errors of
/// [`ModuleInstance::instantiate`].
pub fn instantiate_module(
    engine: &BridgeEngine,
    module: &CompiledModule,
    config: &BridgeConfig,
) -> Result<ModuleInstance, BridgeError> {
    let capabilities = config.capabilities;
    ModuleInstance::instantiate(engine, module, config, |linker| {
        register_set(linker, capabilities)
    })
}

/// Register one capability set's functions on a linker.
///
/// # Errors
///
/// Returns an error if function registration fails.
pub fn register_set(
    linker: &mut Linker<HostContext>,
    set: CapabilitySet,
) -> Result<(), BridgeError> {
    match set {
        CapabilitySet::Pure => Ok(()),
        CapabilitySet::Logging => register_logging(linker),
        CapabilitySet::ReferenceBridge => {
            register_logging(linker)?;
            register_reference_bridge(linker)
        }
    }
}

/// Register the logging capability.
///
/// Registers `env::log(ptr: i32, len: i32)`: the guest passes a pointer and
/// byte length of a message in its linear memory. Out-of-bounds or negative
/// arguments drop the message with a host-side warning; logging never traps
/// the module.
pub fn register_logging(linker: &mut Linker<HostContext>) -> Result<(), BridgeError> {
    linker
        .func_wrap(
            IMPORT_MODULE,
            "log",
            |mut caller: Caller<'_, HostContext>, ptr: i32, len: i32| {
                if ptr < 0 || len < 0 {
                    warn!(ptr, len, "Guest log with negative pointer or length");
                    return;
                }

                let Some(memory) = caller.data().memory().or_else(|| {
                    caller
                        .get_export("memory")
                        .and_then(Extern::into_memory)
                }) else {
                    warn!("Guest log but no linear memory resolved");
                    return;
                };

                // Copy the message out before touching the context mutably.
                #[allow(clippy::cast_sign_loss)]
                let message = {
                    let data = memory.data(&caller);
                    let start = ptr as usize;
                    let Some(end) = start.checked_add(len as usize) else {
                        warn!(ptr, len, "Guest log pointer + length overflow");
                        return;
                    };

                    if end > data.len() {
                        warn!(
                            start,
                            end,
                            memory_size = data.len(),
                            "Guest log out of bounds"
                        );
                        return;
                    }

                    decode_message(&data[start..end])
                };

                GuestLogger::log(caller.data_mut(), &message);
            },
        )
        .map_err(|e| BridgeError::instantiation(format!("Failed to register log: {e}")))?;

    Ok(())
}

/// Register the opaque reference bridge capability.
///
/// Registers:
/// - `env::handle_is_live(handle: i64) -> i32`: 1 if the handle currently
///   dereferences, otherwise per policy a 0 sentinel or a trapped call
/// - `env::handle_drop(handle: i64) -> i32`: releases the entry; 1 on
///   success, misuse per policy
pub fn register_reference_bridge(linker: &mut Linker<HostContext>) -> Result<(), BridgeError> {
    linker
        .func_wrap(
            IMPORT_MODULE,
            "handle_is_live",
            |caller: Caller<'_, HostContext>, bits: i64| -> Result<i32, wasmtime::Error> {
                let ctx = caller.data();
                let lookup = Handle::from_bits(bits).and_then(|h| ctx.handles.get(h).map(|_| ()));

                match lookup {
                    Ok(()) => Ok(1),
                    Err(err) => misuse(ctx.misuse, err),
                }
            },
        )
        .map_err(|e| {
            BridgeError::instantiation(format!("Failed to register handle_is_live: {e}"))
        })?;

    linker
        .func_wrap(
            IMPORT_MODULE,
            "handle_drop",
            |mut caller: Caller<'_, HostContext>, bits: i64| -> Result<i32, wasmtime::Error> {
                let removed = Handle::from_bits(bits)
                    .and_then(|h| caller.data_mut().handles.remove(h).map(|_| ()));

                match removed {
                    Ok(()) => Ok(1),
                    Err(err) => misuse(caller.data().misuse, err),
                }
            },
        )
        .map_err(|e| BridgeError::instantiation(format!("Failed to register handle_drop: {e}")))?;

    Ok(())
}

/// Apply the configured misuse policy to a failed handle lookup.
fn misuse(
    policy: MisusePolicy,
    err: tick_bridge_common::HandleError,
) -> Result<i32, wasmtime::Error> {
    match policy {
        MisusePolicy::Sentinel => {
            warn!(error = %err, "Handle misuse; returning sentinel");
            Ok(0)
        }
        MisusePolicy::Trap => Err(wasmtime::Error::new(err)),
    }
}
