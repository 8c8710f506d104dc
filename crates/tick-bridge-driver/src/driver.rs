//! The per-tick control loop.
//!
//! [`TickDriver`] owns the module instance and the storage slot and runs
//! the two-state machine the bridge is built around:
//!
//! ```text
//! Idle -> Running : push state in, register root handle, call run
//! Running -> Idle : pull state out, invalidate tick-scoped handles,
//!                   persist the slot
//! ```
//!
//! Exactly one tick runs at a time; ticks are synchronous and never overlap.
//! Tick-recoverable faults (length drift, an unusable region declaration, a
//! trapped run, a slot write failure) are logged and contained; only fatal
//! startup errors ever propagate out of the constructor, and nothing here
//! crashes the host process mid-tick.

use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::storage::StateSlot;
use tick_bridge_common::{BridgeError, HandleScope, RootMode};
use tick_bridge_core::{
    GuestLogEntry, Handle, HostValue, ModuleInstance, RunOutcome, SyncStatus, pull_out, push_in,
};

/// Driver state, strictly alternating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    /// Between ticks.
    Idle,
    /// Inside a `run` invocation (and its surrounding sync steps).
    Running,
}

/// Configuration for the tick driver.
#[derive(Debug, Clone, Copy, Default)]
pub struct DriverConfig {
    /// Root handle registration policy.
    pub root_mode: RootMode,
}

/// Report for one completed tick.
#[derive(Debug)]
pub struct TickReport {
    /// Zero-based tick ordinal within this driver's lifetime.
    pub tick: u64,

    /// What the push-in step did.
    pub push: SyncStatus,

    /// How the run entrypoint ended.
    pub outcome: RunOutcome,

    /// Size of the freshly pulled canonical state buffer.
    pub bytes_out: usize,

    /// Wall-clock duration of the whole tick.
    pub duration: Duration,

    /// Log lines the module emitted during this tick.
    pub logs: Vec<GuestLogEntry>,
}

/// The per-tick control loop over one module instance and one storage slot.
///
/// The driver is an explicit context object: several drivers (tests,
/// multiple embedded modules) coexist without shared process state.
pub struct TickDriver<S: StateSlot> {
    instance: ModuleInstance,
    slot: S,
    config: DriverConfig,
    state: DriverState,

    /// The canonical persistent state buffer, loaded once at start and
    /// replaced by each successful pull.
    persistent: Option<Vec<u8>>,

    /// The reused root handle under [`RootMode::Reuse`].
    root: Option<Handle>,

    tick: u64,
}

impl<S: StateSlot> TickDriver<S> {
    /// Create a driver, reading the storage slot once.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::InvalidConfig`] when the root mode and the
    /// module's run signature (or the handle scope) contradict each other,
    /// and propagates slot read failures.
    pub fn new(instance: ModuleInstance, mut slot: S, config: DriverConfig) -> Result<Self, BridgeError> {
        if instance.expects_root() && config.root_mode == RootMode::Disabled {
            return Err(BridgeError::invalid_config(
                "run entrypoint takes a root handle but root_mode is disabled",
            ));
        }

        if config.root_mode == RootMode::Reuse && instance.context().scope == HandleScope::Tick {
            return Err(BridgeError::invalid_config(
                "root_mode 'reuse' requires boot-scoped handles; tick-scoped handles would \
                 invalidate the reused root every tick",
            ));
        }

        let persistent = slot.load()?;
        info!(
            instance_id = %instance.context().instance_id,
            stored_bytes = persistent.as_ref().map(Vec::len),
            "Tick driver ready"
        );

        Ok(Self {
            instance,
            slot,
            config,
            state: DriverState::Idle,
            persistent,
            root: None,
            tick: 0,
        })
    }

    /// Drive one complete tick.
    ///
    /// `root` is the host's current root object; it is registered into the
    /// opaque reference table and passed to `run` when both the module's
    /// signature and the configured [`RootMode`] call for it.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::TickInProgress`] on re-entry and
    /// [`BridgeError::InvalidConfig`] when a required root object is
    /// missing. Everything else is contained and reported in the
    /// [`TickReport`].
    pub fn tick(&mut self, root: Option<HostValue>) -> Result<TickReport, BridgeError> {
        if self.state == DriverState::Running {
            return Err(BridgeError::TickInProgress);
        }

        self.state = DriverState::Running;
        let result = self.run_tick(root);
        self.state = DriverState::Idle;
        result
    }

    fn run_tick(&mut self, root: Option<HostValue>) -> Result<TickReport, BridgeError> {
        let start = Instant::now();
        let tick = self.tick;
        debug!(tick, "Tick starting");

        // Idle -> Running: push persistent state into the module.
        let push = match push_in(&mut self.instance, self.persistent.as_deref()) {
            Ok(status) => status,
            Err(e) if !e.is_fatal() => {
                warn!(tick, error = %e, "State push failed; running on unmodified module memory");
                SyncStatus::Skipped
            }
            Err(e) => return Err(e),
        };

        let root_handle = self.resolve_root(root)?;

        let outcome = self.instance.run(root_handle)?;
        if let RunOutcome::Trapped { message, code } = &outcome {
            error!(tick, trap_message = %message, trap_code = ?code, "Run entrypoint trapped");
        }

        // Running -> Idle: pull the module's state back out. On failure the
        // previous canonical buffer stays authoritative.
        let bytes_out = match pull_out(&mut self.instance) {
            Ok(buffer) => {
                let len = buffer.len();
                self.persistent = Some(buffer);
                len
            }
            Err(e) if !e.is_fatal() => {
                warn!(tick, error = %e, "State pull failed; keeping previous canonical state");
                0
            }
            Err(e) => return Err(e),
        };

        if self.instance.context().scope == HandleScope::Tick {
            self.instance.context_mut().handles.invalidate_all();
            self.root = None;
        }

        if let Some(bytes) = &self.persistent {
            if let Err(e) = self.slot.store(bytes) {
                warn!(tick, error = %e, "Failed to persist state slot");
            }
        }

        let logs = self.instance.context_mut().take_logs();
        let duration = start.elapsed();
        self.tick += 1;

        info!(
            tick,
            push = ?push,
            trapped = outcome.is_trap(),
            bytes_out,
            duration_us = duration.as_micros(),
            guest_logs = logs.len(),
            "Tick complete"
        );

        Ok(TickReport {
            tick,
            push,
            outcome,
            bytes_out,
            duration,
            logs,
        })
    }

    /// Register (or reuse) the root handle for this tick.
    fn resolve_root(&mut self, root: Option<HostValue>) -> Result<Option<Handle>, BridgeError> {
        if !self.instance.expects_root() {
            return Ok(None);
        }

        match self.config.root_mode {
            RootMode::Disabled => Err(BridgeError::invalid_config(
                "run entrypoint takes a root handle but root_mode is disabled",
            )),
            RootMode::PerTick => {
                let value = root.ok_or_else(|| {
                    BridgeError::invalid_config("root object required for every tick")
                })?;
                Ok(Some(self.instance.context_mut().handles.register(value)))
            }
            RootMode::Reuse => {
                if self.root.is_none() {
                    let value = root.ok_or_else(|| {
                        BridgeError::invalid_config("root object required for the first tick")
                    })?;
                    self.root = Some(self.instance.context_mut().handles.register(value));
                }
                Ok(self.root)
            }
        }
    }

    /// Current driver state.
    pub fn state(&self) -> DriverState {
        self.state
    }

    /// Number of completed ticks.
    pub fn ticks_run(&self) -> u64 {
        self.tick
    }

    /// The canonical persistent state buffer, if any exists yet.
    pub fn persistent_state(&self) -> Option<&[u8]> {
        self.persistent.as_deref()
    }

    /// The embedded module instance.
    pub fn instance(&self) -> &ModuleInstance {
        &self.instance
    }

    /// Mutable access to the instance, for host-side registration between
    /// ticks.
    pub fn instance_mut(&mut self) -> &mut ModuleInstance {
        &mut self.instance
    }

    /// Tear the driver down, recovering the instance and the slot.
    pub fn into_parts(self) -> (ModuleInstance, S) {
        (self.instance, self.slot)
    }
}

impl<S: StateSlot> std::fmt::Debug for TickDriver<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TickDriver")
            .field("state", &self.state)
            .field("ticks_run", &self.tick)
            .field("stored_bytes", &self.persistent.as_ref().map(Vec::len))
            .finish_non_exhaustive()
    }
}
