//! Construction-time tunables, grouped instead of scattered as magic
//! numbers (mirroring how the teacher groups its `MainDeviceConfig`).

use std::time::Duration;

/// Tunables for a [`crate::registry::Registry`].
#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// Default deadline for [`crate::control::send_request`]/
    /// [`crate::control::ping`] when the caller doesn't specify one.
    pub default_timeout: Duration,
    /// How long a delivered (response/pong) entry may sit in a bus's
    /// delivered queue before the reaper discards it as abandoned (spec
    /// §4.3 "a periodic reaper discards entries older than a bounded age").
    pub reap_after: Duration,
    /// Delivered-queue length at which `post_delivered` opportunistically
    /// sweeps for aged-out entries, even if nobody is currently waiting.
    pub reap_sweep_threshold: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_millis(3000),
            reap_after: Duration::from_secs(5),
            reap_sweep_threshold: 16,
        }
    }
}
