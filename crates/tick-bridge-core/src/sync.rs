//! The persistent memory synchronizer.
//!
//! Moves the host-owned persistent state buffer across the module-memory
//! boundary exactly, twice per tick: [`push_in`] before the run entrypoint,
//! [`pull_out`] after it. The module declares where its persistent region
//! lives; the declaration is re-read on every call because the module may
//! move or resize its own view between ticks.
//!
//! Contract: a push followed immediately by a pull (no intervening run)
//! yields a byte-identical buffer. On a length mismatch between the stored
//! buffer and the declared region, the push is skipped entirely rather than
//! shearing state: the tick proceeds on the module's fresh (zeroed or
//! previous-tick) memory and the drift is logged.
//!
//! The synchronizer copies bytes and nothing else: it never allocates
//! handles and never touches the opaque reference table.

use tracing::{debug, warn};

use crate::instance::ModuleInstance;
use tick_bridge_common::BridgeError;

/// Outcome of one `push_in` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    /// The stored buffer was copied into the module's region.
    Copied {
        /// Number of bytes copied.
        len: usize,
    },

    /// No prior state existed; the module's zero-initialized region was
    /// left untouched.
    ColdStart,

    /// Stored and declared lengths have drifted (module schema change);
    /// nothing was written.
    LengthMismatch {
        /// Length of the host's stored buffer.
        stored: usize,
        /// Length the module currently declares.
        declared: usize,
    },

    /// The push step failed with a recoverable error and was skipped by
    /// the driver.
    Skipped,
}

/// Copy the persistent state buffer into the module's declared region.
///
/// # Errors
///
/// Returns [`BridgeError::RegionOutOfBounds`] or [`BridgeError::Trap`] when
/// the module's own declaration is unusable. Both are tick-recoverable.
pub fn push_in(
    instance: &mut ModuleInstance,
    state: Option<&[u8]>,
) -> Result<SyncStatus, BridgeError> {
    let region = instance.persistent_region()?;

    let Some(buffer) = state else {
        debug!(
            declared = region.len,
            "No stored state; leaving module memory untouched"
        );
        return Ok(SyncStatus::ColdStart);
    };

    let declared = region.len as usize;
    if buffer.len() != declared {
        warn!(
            stored = buffer.len(),
            declared,
            "Length mismatch between stored state and module region; push skipped"
        );
        return Ok(SyncStatus::LengthMismatch {
            stored: buffer.len(),
            declared,
        });
    }

    instance
        .memory
        .write(&mut instance.store, region.offset as usize, buffer)
        .map_err(|_| BridgeError::RegionOutOfBounds {
            offset: u64::from(region.offset),
            len: u64::from(region.len),
            memory_bytes: instance.memory_size() as u64,
        })?;

    debug!(len = declared, offset = region.offset, "State pushed in");
    Ok(SyncStatus::Copied { len: declared })
}

/// Copy the module's declared region out into a fresh host-owned buffer.
///
/// The returned buffer becomes the new canonical persistent state.
///
/// # Errors
///
/// Same tick-recoverable failure modes as [`push_in`].
pub fn pull_out(instance: &mut ModuleInstance) -> Result<Vec<u8>, BridgeError> {
    let region = instance.persistent_region()?;

    let mut buffer = vec![0u8; region.len as usize];
    instance
        .memory
        .read(&instance.store, region.offset as usize, &mut buffer)
        .map_err(|_| BridgeError::RegionOutOfBounds {
            offset: u64::from(region.offset),
            len: u64::from(region.len),
            memory_bytes: instance.memory_size() as u64,
        })?;

    debug!(len = buffer.len(), offset = region.offset, "State pulled out");
    Ok(buffer)
}
