//! Integration tests for tick-bridge-core.
//!
//! These tests verify the complete bridge pipeline:
//! - WAT compilation to module
//! - Instantiation with a bound capability import set
//! - Persistent state push/run/pull round trips
//! - Containment of schema drift and traps

use tick_bridge_common::{BridgeConfig, CapabilitySet, EngineConfig, codec};
use tick_bridge_core::{
    BridgeEngine, CompiledModule, HostValue, ModuleInstance, SyncStatus, pull_out, push_in,
};
use tick_bridge_host::instantiate_module;

fn instantiate(wat: &str, capabilities: CapabilitySet) -> ModuleInstance {
    let engine = BridgeEngine::new(&EngineConfig::default()).unwrap();
    let module = CompiledModule::from_wat(engine.inner(), wat).unwrap();
    let config = BridgeConfig {
        capabilities,
        ..Default::default()
    };
    instantiate_module(&engine, &module, &config).unwrap()
}

// ============================================================================
// Test: Cold start scenario
// ============================================================================

/// Cold start with no stored state: the push is a no-op, the module's
/// zeroed region stays zeroed, and whatever the module writes during run
/// comes back out exactly.
#[test]
fn test_cold_start_scenario() {
    let wat = r#"
        (module
            (memory (export "memory") 1)
            (func (export "state_offset") (result i32) (i32.const 128))
            (func (export "state_len") (result i32) (i32.const 4))
            (func (export "run")
                (i32.store8 (i32.const 128) (i32.const 1))
                (i32.store8 (i32.const 129) (i32.const 2))
                (i32.store8 (i32.const 130) (i32.const 3))
                (i32.store8 (i32.const 131) (i32.const 4)))
        )
    "#;
    let mut instance = instantiate(wat, CapabilitySet::Pure);

    assert_eq!(push_in(&mut instance, None).unwrap(), SyncStatus::ColdStart);
    assert_eq!(pull_out(&mut instance).unwrap(), vec![0, 0, 0, 0]);

    assert!(instance.run(None).unwrap().is_success());
    assert_eq!(pull_out(&mut instance).unwrap(), vec![1, 2, 3, 4]);
}

// ============================================================================
// Test: Round-trip fidelity
// ============================================================================

/// Every byte value survives push-in / pull-out with no intervening run,
/// including the full storage transcoding path.
#[test]
fn test_round_trip_fidelity_all_bytes() {
    let wat = r#"
        (module
            (memory (export "memory") 1)
            (func (export "state_offset") (result i32) (i32.const 0))
            (func (export "state_len") (result i32) (i32.const 256))
            (func (export "run"))
        )
    "#;
    let mut instance = instantiate(wat, CapabilitySet::Pure);

    let state: Vec<u8> = (0..=255).collect();
    assert_eq!(
        push_in(&mut instance, Some(&state)).unwrap(),
        SyncStatus::Copied { len: 256 }
    );

    let pulled = pull_out(&mut instance).unwrap();
    assert_eq!(pulled, state);

    // Through the text-safe storage boundary and back in again.
    let stored_text = codec::encode(&pulled);
    let reloaded = codec::decode(&stored_text).unwrap();
    assert_eq!(
        push_in(&mut instance, Some(&reloaded)).unwrap(),
        SyncStatus::Copied { len: 256 }
    );
    assert_eq!(pull_out(&mut instance).unwrap(), state);
}

// ============================================================================
// Test: Schema drift
// ============================================================================

/// Stored state is 10 bytes, the module now declares 6: the push is
/// skipped, the tick still executes, and the pull returns the module's own
/// 6-byte view.
#[test]
fn test_shrunk_schema_scenario() {
    let wat = r#"
        (module
            (memory (export "memory") 1)
            (func (export "state_offset") (result i32) (i32.const 16))
            (func (export "state_len") (result i32) (i32.const 6))
            (func (export "run")
                (i32.store8 (i32.const 16) (i32.const 0xAA)))
        )
    "#;
    let mut instance = instantiate(wat, CapabilitySet::Pure);

    let stale = vec![7u8; 10];
    assert_eq!(
        push_in(&mut instance, Some(&stale)).unwrap(),
        SyncStatus::LengthMismatch {
            stored: 10,
            declared: 6,
        }
    );

    assert!(instance.run(None).unwrap().is_success());
    assert_eq!(pull_out(&mut instance).unwrap(), vec![0xAA, 0, 0, 0, 0, 0]);
}

// ============================================================================
// Test: Variable-size state
// ============================================================================

/// The module owns its layout and may resize its declared region between
/// runs; the synchronizer re-reads the declaration every call.
#[test]
fn test_module_resizes_its_region() {
    let wat = r#"
        (module
            (memory (export "memory") 1)
            (global $len (mut i32) (i32.const 2))
            (func (export "state_offset") (result i32) (i32.const 0))
            (func (export "state_len") (result i32) (global.get $len))
            (func (export "run")
                (global.set $len (i32.const 5)))
        )
    "#;
    let mut instance = instantiate(wat, CapabilitySet::Pure);

    assert_eq!(
        push_in(&mut instance, Some(&[1, 2])).unwrap(),
        SyncStatus::Copied { len: 2 }
    );

    assert!(instance.run(None).unwrap().is_success());

    // Pull honors the new declaration.
    assert_eq!(pull_out(&mut instance).unwrap(), vec![1, 2, 0, 0, 0]);

    // The old 2-byte buffer no longer matches.
    assert_eq!(
        push_in(&mut instance, Some(&[1, 2])).unwrap(),
        SyncStatus::LengthMismatch {
            stored: 2,
            declared: 5,
        }
    );
}

// ============================================================================
// Test: Full reference-bridge pipeline
// ============================================================================

/// A module using the complete capability set: logs a line, checks its
/// root handle, and records state, all in one run.
#[test]
fn test_reference_bridge_pipeline() {
    let wat = r#"
        (module
            (import "env" "log" (func $log (param i32 i32)))
            (import "env" "handle_is_live" (func $live (param i64) (result i32)))
            (memory (export "memory") 1)
            (data (i32.const 256) "tick ran")
            (func (export "state_offset") (result i32) (i32.const 0))
            (func (export "state_len") (result i32) (i32.const 1))
            (func (export "run") (param i64)
                (call $log (i32.const 256) (i32.const 8))
                (i32.store8 (i32.const 0) (call $live (local.get 0))))
        )
    "#;
    let mut instance = instantiate(wat, CapabilitySet::ReferenceBridge);

    let root = instance
        .context_mut()
        .handles
        .register(Box::new(42u64) as HostValue);

    assert!(instance.run(Some(root)).unwrap().is_success());

    assert_eq!(pull_out(&mut instance).unwrap(), vec![1]);

    let logs = instance.context_mut().take_logs();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].message, "tick ran");

    // The host-side view of the registered object is intact.
    let value = instance.context().handles.get(root).unwrap();
    assert_eq!(value.downcast_ref::<u64>(), Some(&42));
}

// ============================================================================
// Test: Trap containment across ticks
// ============================================================================

/// A trap mid-run leaves the instance usable: state written before the
/// trap is still pullable and the next run works.
#[test]
fn test_instance_survives_trap() {
    let wat = r#"
        (module
            (memory (export "memory") 1)
            (global $armed (mut i32) (i32.const 1))
            (func (export "state_offset") (result i32) (i32.const 0))
            (func (export "state_len") (result i32) (i32.const 1))
            (func (export "run")
                (i32.store8 (i32.const 0) (i32.const 9))
                (if (global.get $armed)
                    (then (global.set $armed (i32.const 0)) unreachable)))
        )
    "#;
    let mut instance = instantiate(wat, CapabilitySet::Pure);

    let outcome = instance.run(None).unwrap();
    assert!(outcome.is_trap());

    // The partial write before the trap is visible and the instance keeps
    // working.
    assert_eq!(pull_out(&mut instance).unwrap(), vec![9]);
    assert!(instance.run(None).unwrap().is_success());
}

// ============================================================================
// Test: Import mismatch is fatal
// ============================================================================

#[test]
fn test_capability_drift_fails_instantiation() {
    // Module built against the reference bridge, host configured for
    // logging only.
    let wat = r#"
        (module
            (import "env" "handle_is_live" (func (param i64) (result i32)))
            (memory (export "memory") 1)
            (func (export "state_offset") (result i32) (i32.const 0))
            (func (export "state_len") (result i32) (i32.const 0))
            (func (export "run"))
        )
    "#;
    let engine = BridgeEngine::new(&EngineConfig::default()).unwrap();
    let module = CompiledModule::from_wat(engine.inner(), wat).unwrap();
    let config = BridgeConfig {
        capabilities: CapabilitySet::Logging,
        ..Default::default()
    };

    let err = instantiate_module(&engine, &module, &config).unwrap_err();
    assert!(err.is_fatal());
    assert!(err.to_string().contains("handle_is_live"));
}
