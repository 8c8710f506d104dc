//! Host-side implementation of the guest logging capability.
//!
//! Guest log lines are both stored in the [`HostContext`] (for the driver
//! to surface in its tick report) and emitted through `tracing` for
//! observability.

use tick_bridge_core::HostContext;
use tracing::info;

/// Host implementation for the logging capability.
pub struct GuestLogger;

impl GuestLogger {
    /// Record a message from the module.
    pub fn log(ctx: &mut HostContext, message: &str) {
        ctx.log(message.to_string());

        info!(
            instance_id = %ctx.instance_id,
            guest_log = true,
            "{}",
            message
        );
    }
}

/// Decode a guest byte slice into a printable message.
///
/// Guest modules are untrusted; invalid UTF-8 is replaced rather than
/// rejected so a broken module can still be debugged through its logs.
pub fn decode_message(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}
