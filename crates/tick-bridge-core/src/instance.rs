//! Module instantiation and the live instance.
//!
//! [`ModuleInstance`] is the bridge's view of the embedded compute module:
//! the store, the resolved linear memory, and the typed entrypoints. It is
//! created exactly once at cold start and lives for the host process's
//! lifetime.
//!
//! Instantiation performs, in order:
//!
//! 1. Validation of the module's declared imports against the configured
//!    capability set (unknown or mistyped imports are fatal)
//! 2. Host-side allocation of `env.memory` and `env.table`
//! 3. Registration of the capability import set on the linker (supplied by
//!    the caller, so this crate stays independent of the host crate)
//! 4. Instantiation and resolution of the named entrypoints

use tracing::{debug, info};
use wasmtime::{
    Extern, ExternType, Instance, Linker, Memory, MemoryType, Ref, RefType, Store, Table,
    TableType, Trap, TypedFunc, ValType,
};

use crate::engine::BridgeEngine;
use crate::handles::Handle;
use crate::module::CompiledModule;
use crate::store::HostContext;
use tick_bridge_common::{BridgeConfig, BridgeError};

/// The import namespace all host-provided values live under.
pub const IMPORT_MODULE: &str = "env";

/// Name of the host-provided linear memory import.
pub const MEMORY_IMPORT: &str = "memory";

/// Name of the host-provided indirect-call table import.
pub const TABLE_IMPORT: &str = "table";

/// The module's persistent region, as declared by the module itself.
///
/// Re-read on every synchronizer call: the layout belongs to the module and
/// may change between ticks for variable-size state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistentRegion {
    /// Byte offset within linear memory.
    pub offset: u32,
    /// Byte length.
    pub len: u32,
}

/// Result of one `run` invocation.
#[derive(Debug)]
pub enum RunOutcome {
    /// The entrypoint returned normally.
    Completed,

    /// The entrypoint trapped. Contained within the tick; the host keeps
    /// running.
    Trapped {
        /// Description of the trap.
        message: String,
        /// Trap code if available.
        code: Option<String>,
    },
}

impl RunOutcome {
    /// Returns `true` if the run completed normally.
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Completed)
    }

    /// Returns `true` if the run trapped.
    pub fn is_trap(&self) -> bool {
        matches!(self, RunOutcome::Trapped { .. })
    }
}

/// The run entrypoint, in either of its two valid shapes.
enum RunEntry {
    /// `run()`: the module needs no root handle.
    Plain(TypedFunc<(), ()>),
    /// `run(root: i64)`: the module receives the root object's handle.
    WithRoot(TypedFunc<i64, ()>),
}

/// A live, instantiated compute module.
///
/// Owns the store and therefore the [`HostContext`] (handle table, guest
/// logs). All per-tick operations go through `&mut self`; the module never
/// runs concurrently with itself or with the synchronizer's copies.
pub struct ModuleInstance {
    pub(crate) store: Store<HostContext>,
    instance: Instance,
    pub(crate) memory: Memory,
    run: RunEntry,
    state_offset: TypedFunc<(), i32>,
    state_len: TypedFunc<(), i32>,
}

impl ModuleInstance {
    /// Instantiate a compiled module.
    ///
    /// `link` registers the capability import set on the linker; it runs
    /// exactly once, strictly after the store (and thus the handle table)
    /// exists and strictly before the first entrypoint can be called.
    ///
    /// # Errors
    ///
    /// All failures here are fatal startup faults: import mismatches,
    /// missing or mistyped exports, and linker/instantiation errors. None
    /// of them are retried.
    pub fn instantiate(
        engine: &BridgeEngine,
        module: &CompiledModule,
        config: &BridgeConfig,
        link: impl FnOnce(&mut Linker<HostContext>) -> Result<(), BridgeError>,
    ) -> Result<Self, BridgeError> {
        validate_imports(module, config)?;

        let mut store = Store::new(engine.inner(), HostContext::new(&config.handles));

        // Host-allocated linear memory and indirect-call table, offered to
        // the module under the fixed `env` contract. Modules that export
        // their own memory simply never import these.
        let host_memory = Memory::new(
            &mut store,
            MemoryType::new(config.module.initial_memory_pages, None),
        )
        .map_err(|e| BridgeError::instantiation(format!("memory allocation failed: {e}")))?;

        let table = Table::new(
            &mut store,
            TableType::new(RefType::FUNCREF, config.module.table_elements, None),
            Ref::Func(None),
        )
        .map_err(|e| BridgeError::instantiation(format!("table allocation failed: {e}")))?;

        let mut linker: Linker<HostContext> = Linker::new(engine.inner());
        linker
            .define(&store, IMPORT_MODULE, MEMORY_IMPORT, host_memory)
            .map_err(|e| BridgeError::instantiation(format!("defining env.memory: {e}")))?;
        linker
            .define(&store, IMPORT_MODULE, TABLE_IMPORT, table)
            .map_err(|e| BridgeError::instantiation(format!("defining env.table: {e}")))?;

        link(&mut linker)?;

        let instance = linker
            .instantiate(&mut store, module.inner())
            .map_err(|e| BridgeError::instantiation(e.to_string()))?;

        let exports = &config.module.exports;

        // Prefer the module's own exported memory; fall back to the
        // host-allocated one for import-style ABIs.
        let memory = match instance.get_memory(&mut store, &exports.memory) {
            Some(memory) => memory,
            None => host_memory,
        };
        store.data_mut().set_memory(memory);

        let state_offset = typed_export(&instance, &mut store, &exports.state_offset)?;
        let state_len = typed_export(&instance, &mut store, &exports.state_len)?;
        let run = resolve_run(&instance, &mut store, &exports.run)?;

        info!(
            instance_id = %store.data().instance_id,
            content_hash = %module.content_hash(),
            memory_pages = config.module.initial_memory_pages,
            "Module instantiated"
        );

        Ok(Self {
            store,
            instance,
            memory,
            run,
            state_offset,
            state_len,
        })
    }

    /// Returns `true` if the run entrypoint takes a root handle argument.
    pub fn expects_root(&self) -> bool {
        matches!(self.run, RunEntry::WithRoot(_))
    }

    /// Read the module-declared persistent region.
    ///
    /// Calls the module's two zero-argument declaration entrypoints and
    /// validates the region against the current linear memory size. The
    /// module owns the layout; the host never assumes a fixed one.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Trap`] if a declaration entrypoint traps, or
    /// [`BridgeError::RegionOutOfBounds`] if the declared region does not
    /// fit the current memory. Both are contained within the tick.
    pub fn persistent_region(&mut self) -> Result<PersistentRegion, BridgeError> {
        let offset = self
            .state_offset
            .call(&mut self.store, ())
            .map_err(|e| BridgeError::trap(e.to_string()))?;
        let len = self
            .state_len
            .call(&mut self.store, ())
            .map_err(|e| BridgeError::trap(e.to_string()))?;

        // Wasm pointers are unsigned; reinterpret the i32 bits.
        #[allow(clippy::cast_sign_loss)]
        let region = PersistentRegion {
            offset: offset as u32,
            len: len as u32,
        };

        let memory_bytes = self.memory.data_size(&self.store) as u64;
        let end = u64::from(region.offset) + u64::from(region.len);
        if end > memory_bytes {
            return Err(BridgeError::RegionOutOfBounds {
                offset: u64::from(region.offset),
                len: u64::from(region.len),
                memory_bytes,
            });
        }

        Ok(region)
    }

    /// Invoke the run entrypoint once.
    ///
    /// A trap is reported in the returned [`RunOutcome`], not as an error:
    /// it ends the module's tick but never the host process.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::InvalidConfig`] if the entrypoint requires a
    /// root handle and none was supplied.
    pub fn run(&mut self, root: Option<Handle>) -> Result<RunOutcome, BridgeError> {
        debug!(instance_id = %self.store.data().instance_id, "Invoking run entrypoint");

        let result = match &self.run {
            RunEntry::Plain(func) => func.call(&mut self.store, ()),
            RunEntry::WithRoot(func) => {
                let root = root.ok_or_else(|| {
                    BridgeError::invalid_config("run entrypoint requires a root handle")
                })?;
                func.call(&mut self.store, root.to_bits())
            }
        };

        match result {
            Ok(()) => Ok(RunOutcome::Completed),
            Err(trap) => {
                let (message, code) = extract_trap_info(&trap);
                Ok(RunOutcome::Trapped { message, code })
            }
        }
    }

    /// The bridge state shared with capability imports.
    pub fn context(&self) -> &HostContext {
        self.store.data()
    }

    /// Mutable access to the bridge state (handle registration, log
    /// draining). Only valid between entrypoint calls.
    pub fn context_mut(&mut self) -> &mut HostContext {
        self.store.data_mut()
    }

    /// Current linear memory size in bytes.
    pub fn memory_size(&self) -> usize {
        self.memory.data_size(&self.store)
    }

    /// The underlying Wasmtime instance.
    pub fn inner(&self) -> &Instance {
        &self.instance
    }
}

impl std::fmt::Debug for ModuleInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleInstance")
            .field("instance_id", &self.store.data().instance_id)
            .field("expects_root", &self.expects_root())
            .field("memory_bytes", &self.memory_size())
            .finish_non_exhaustive()
    }
}

/// Check the module's declared imports against what the host will provide.
///
/// Catching this before instantiation turns a generic linker error into a
/// precise startup diagnostic naming the drifting import.
fn validate_imports(module: &CompiledModule, config: &BridgeConfig) -> Result<(), BridgeError> {
    let provided = config.capabilities.function_imports();

    for import in module.inner().imports() {
        let qualified = format!("{}.{}", import.module(), import.name());

        if import.module() != IMPORT_MODULE {
            return Err(BridgeError::import_mismatch(
                qualified,
                format!("only the '{IMPORT_MODULE}' namespace is provided"),
            ));
        }

        match (import.name(), import.ty()) {
            (MEMORY_IMPORT, ExternType::Memory(_)) | (TABLE_IMPORT, ExternType::Table(_)) => {}
            (MEMORY_IMPORT | TABLE_IMPORT, _) => {
                return Err(BridgeError::import_mismatch(
                    qualified,
                    "expected a memory/table import, found a different kind",
                ));
            }
            (name, ExternType::Func(_)) if provided.contains(&name) => {}
            (name, ExternType::Func(_)) => {
                return Err(BridgeError::import_mismatch(
                    qualified,
                    format!(
                        "not provided by capability set {:?} (available: {provided:?})",
                        config.capabilities
                    ),
                ));
            }
            (_, other) => {
                return Err(BridgeError::import_mismatch(
                    qualified,
                    format!("unsupported import kind: {other:?}"),
                ));
            }
        }
    }

    Ok(())
}

/// Resolve a zero-argument `i32`-returning declaration entrypoint.
fn typed_export(
    instance: &Instance,
    store: &mut Store<HostContext>,
    name: &str,
) -> Result<TypedFunc<(), i32>, BridgeError> {
    instance
        .get_typed_func::<(), i32>(&mut *store, name)
        .map_err(|_| BridgeError::missing_export(name))
}

/// Resolve the run entrypoint, detecting which of its two valid shapes the
/// module exports.
fn resolve_run(
    instance: &Instance,
    store: &mut Store<HostContext>,
    name: &str,
) -> Result<RunEntry, BridgeError> {
    let func = match instance.get_export(&mut *store, name) {
        Some(Extern::Func(func)) => func,
        _ => return Err(BridgeError::missing_export(name)),
    };

    let ty = func.ty(&*store);
    let params: Vec<ValType> = ty.params().collect();

    match params.as_slice() {
        [] => {
            let typed = func
                .typed::<(), ()>(&*store)
                .map_err(|_| BridgeError::missing_export(name))?;
            Ok(RunEntry::Plain(typed))
        }
        [ValType::I64] => {
            let typed = func
                .typed::<i64, ()>(&*store)
                .map_err(|_| BridgeError::missing_export(name))?;
            Ok(RunEntry::WithRoot(typed))
        }
        _ => Err(BridgeError::missing_export(name)),
    }
}

/// Extract human-readable trap information.
fn extract_trap_info(error: &wasmtime::Error) -> (String, Option<String>) {
    let message = error.to_string();
    let code = error.downcast_ref::<Trap>().map(|trap| format!("{trap:?}"));

    (message, code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tick_bridge_common::{CapabilitySet, EngineConfig};

    fn engine() -> BridgeEngine {
        BridgeEngine::new(&EngineConfig::default()).unwrap()
    }

    fn pure_config() -> BridgeConfig {
        BridgeConfig {
            capabilities: CapabilitySet::Pure,
            ..Default::default()
        }
    }

    const PLAIN_MODULE: &str = r#"
        (module
            (memory (export "memory") 1)
            (func (export "state_offset") (result i32) (i32.const 16))
            (func (export "state_len") (result i32) (i32.const 4))
            (func (export "run"))
        )
    "#;

    #[test]
    fn test_instantiate_plain_module() {
        let engine = engine();
        let module = CompiledModule::from_wat(engine.inner(), PLAIN_MODULE).unwrap();
        let mut instance =
            ModuleInstance::instantiate(&engine, &module, &pure_config(), |_| Ok(())).unwrap();

        assert!(!instance.expects_root());
        let region = instance.persistent_region().unwrap();
        assert_eq!(
            region,
            PersistentRegion {
                offset: 16,
                len: 4
            }
        );
        assert!(instance.run(None).unwrap().is_success());
    }

    #[test]
    fn test_root_variant_detected() {
        let wat = r#"
            (module
                (memory (export "memory") 1)
                (func (export "state_offset") (result i32) (i32.const 0))
                (func (export "state_len") (result i32) (i32.const 0))
                (func (export "run") (param i64))
            )
        "#;
        let engine = engine();
        let module = CompiledModule::from_wat(engine.inner(), wat).unwrap();
        let mut instance =
            ModuleInstance::instantiate(&engine, &module, &pure_config(), |_| Ok(())).unwrap();

        assert!(instance.expects_root());

        // Missing root handle is a configuration error, not a trap.
        let err = instance.run(None).unwrap_err();
        assert!(matches!(err, BridgeError::InvalidConfig { .. }));
    }

    #[test]
    fn test_missing_entrypoint_is_fatal() {
        let wat = r#"
            (module
                (memory (export "memory") 1)
                (func (export "run"))
            )
        "#;
        let engine = engine();
        let module = CompiledModule::from_wat(engine.inner(), wat).unwrap();
        let err = ModuleInstance::instantiate(&engine, &module, &pure_config(), |_| Ok(()))
            .unwrap_err();

        assert!(matches!(err, BridgeError::MissingExport { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_unknown_import_is_fatal() {
        let wat = r#"
            (module
                (import "env" "launch_missiles" (func))
                (memory (export "memory") 1)
                (func (export "state_offset") (result i32) (i32.const 0))
                (func (export "state_len") (result i32) (i32.const 0))
                (func (export "run"))
            )
        "#;
        let engine = engine();
        let module = CompiledModule::from_wat(engine.inner(), wat).unwrap();
        let err = ModuleInstance::instantiate(&engine, &module, &pure_config(), |_| Ok(()))
            .unwrap_err();

        assert!(matches!(err, BridgeError::ImportMismatch { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_foreign_namespace_is_fatal() {
        let wat = r#"
            (module
                (import "wasi_snapshot_preview1" "proc_exit" (func (param i32)))
                (func (export "run"))
            )
        "#;
        let engine = engine();
        let module = CompiledModule::from_wat(engine.inner(), wat).unwrap();
        let err = ModuleInstance::instantiate(&engine, &module, &pure_config(), |_| Ok(()))
            .unwrap_err();

        assert!(matches!(err, BridgeError::ImportMismatch { .. }));
    }

    #[test]
    fn test_host_provided_memory() {
        let wat = r#"
            (module
                (import "env" "memory" (memory 1))
                (func (export "state_offset") (result i32) (i32.const 8))
                (func (export "state_len") (result i32) (i32.const 2))
                (func (export "run")
                    (i32.store8 (i32.const 8) (i32.const 0xAB)))
            )
        "#;
        let engine = engine();
        let module = CompiledModule::from_wat(engine.inner(), wat).unwrap();
        let mut config = pure_config();
        config.module.initial_memory_pages = 4;

        let mut instance =
            ModuleInstance::instantiate(&engine, &module, &config, |_| Ok(())).unwrap();

        assert_eq!(instance.memory_size(), 4 * 65536);
        assert!(instance.run(None).unwrap().is_success());
    }

    #[test]
    fn test_region_out_of_bounds() {
        let wat = r#"
            (module
                (memory (export "memory") 1)
                (func (export "state_offset") (result i32) (i32.const 65530))
                (func (export "state_len") (result i32) (i32.const 32))
                (func (export "run"))
            )
        "#;
        let engine = engine();
        let module = CompiledModule::from_wat(engine.inner(), wat).unwrap();
        let mut instance =
            ModuleInstance::instantiate(&engine, &module, &pure_config(), |_| Ok(())).unwrap();

        let err = instance.persistent_region().unwrap_err();
        assert!(matches!(err, BridgeError::RegionOutOfBounds { .. }));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_trap_is_contained() {
        let wat = r#"
            (module
                (memory (export "memory") 1)
                (func (export "state_offset") (result i32) (i32.const 0))
                (func (export "state_len") (result i32) (i32.const 0))
                (func (export "run") unreachable)
            )
        "#;
        let engine = engine();
        let module = CompiledModule::from_wat(engine.inner(), wat).unwrap();
        let mut instance =
            ModuleInstance::instantiate(&engine, &module, &pure_config(), |_| Ok(())).unwrap();

        let outcome = instance.run(None).unwrap();
        assert!(outcome.is_trap());
        if let RunOutcome::Trapped { code, .. } = outcome {
            assert!(code.unwrap().contains("Unreachable"));
        }
    }
}
