//! Host-side execution context stored inside the Wasmtime store.
//!
//! This module provides:
//! - [`HostContext`]: the bridge state capability imports operate on
//! - [`HostValue`]: the opaque host object type stored in the handle table
//! - [`GuestLogEntry`]: log lines emitted by the module
//!
//! The context is an explicit object owned by the store, not process-wide
//! state, so multiple instances (tests, several embedded modules) coexist
//! without touching each other's tables.

use std::any::Any;
use std::time::Instant;

use uuid::Uuid;
use wasmtime::Memory;

use crate::handles::HandleTable;
use tick_bridge_common::{HandleConfig, HandleScope, MisusePolicy};

/// An opaque host-native object held by the reference table.
///
/// The bridge never inspects these; the host downcasts on dereference.
pub type HostValue = Box<dyn Any + Send>;

/// Per-instance bridge state, accessible from capability imports through
/// [`wasmtime::Caller`] and from the driver through the instance.
pub struct HostContext {
    /// The opaque reference table for this instance.
    pub handles: HandleTable<HostValue>,

    /// Log lines emitted by the module, drained by the driver each tick.
    pub logs: Vec<GuestLogEntry>,

    /// Policy for dereferences of dead handles.
    pub misuse: MisusePolicy,

    /// Handle lifetime policy for this instance.
    pub scope: HandleScope,

    /// Unique instance identifier for tracing.
    pub instance_id: String,

    /// The instance's linear memory, filled in right after instantiation.
    ///
    /// Kept here so imports can read guest buffers even when the module
    /// imports its memory from the host instead of exporting it.
    memory: Option<Memory>,
}

/// A single log line from the module.
#[derive(Debug, Clone)]
pub struct GuestLogEntry {
    /// Log message content (lossily decoded UTF-8).
    pub message: String,

    /// When the line was recorded.
    pub timestamp: Instant,
}

impl HostContext {
    /// Create a fresh context with the given handle policies.
    pub fn new(config: &HandleConfig) -> Self {
        Self {
            handles: HandleTable::new(),
            logs: Vec::new(),
            misuse: config.misuse,
            scope: config.scope,
            instance_id: Uuid::new_v4().to_string(),
            memory: None,
        }
    }

    /// Record a log line from the module.
    pub fn log(&mut self, message: String) {
        self.logs.push(GuestLogEntry {
            message,
            timestamp: Instant::now(),
        });
    }

    /// Drain the collected log lines.
    pub fn take_logs(&mut self) -> Vec<GuestLogEntry> {
        std::mem::take(&mut self.logs)
    }

    /// The instance's linear memory, if already resolved.
    pub fn memory(&self) -> Option<Memory> {
        self.memory
    }

    /// Record the resolved linear memory. Called once by the instantiator.
    pub(crate) fn set_memory(&mut self, memory: Memory) {
        self.memory = Some(memory);
    }
}

impl std::fmt::Debug for HostContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostContext")
            .field("instance_id", &self.instance_id)
            .field("live_handles", &self.handles.len())
            .field("pending_logs", &self.logs.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_creation() {
        let ctx = HostContext::new(&HandleConfig::default());

        assert!(ctx.handles.is_empty());
        assert!(ctx.logs.is_empty());
        assert_eq!(ctx.misuse, MisusePolicy::Sentinel);
        assert_eq!(ctx.scope, HandleScope::Tick);
        assert!(ctx.memory().is_none());
        assert!(!ctx.instance_id.is_empty());
    }

    #[test]
    fn test_context_logging() {
        let mut ctx = HostContext::new(&HandleConfig::default());

        ctx.log("hello".into());
        ctx.log("world".into());

        let logs = ctx.take_logs();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].message, "hello");
        assert_eq!(logs[1].message, "world");
        assert!(ctx.logs.is_empty());
    }

    #[test]
    fn test_context_registers_host_values() {
        let mut ctx = HostContext::new(&HandleConfig::default());

        let h = ctx.handles.register(Box::new(42u64) as HostValue);
        let value = ctx.handles.get(h).unwrap();

        assert_eq!(value.downcast_ref::<u64>(), Some(&42));
    }

    #[test]
    fn test_instance_ids_are_unique() {
        let a = HostContext::new(&HandleConfig::default());
        let b = HostContext::new(&HandleConfig::default());
        assert_ne!(a.instance_id, b.instance_id);
    }
}
