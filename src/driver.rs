//! Drivers: a set of callbacks bound to devices by name-table match (spec §3
//! "Driver", §4.4).

use crate::device::Device;

/// A device-class driver.
///
/// Drivers are process-global and outlive devices (spec §3): a `Registry`
/// holds each registered driver behind an `Arc` and devices only ever refer
/// to drivers by index (see [`crate::device::Device`]).
pub trait Driver: Send + Sync {
    /// Device names this driver claims (matched in order, first match wins —
    /// spec §4.4 "the first driver whose name table contains the device's
    /// name wins").
    fn names(&self) -> &[&str];

    /// Called once when a device with a matching name is bound.
    fn probe(&self, device: &Device);

    /// Called once when a bound device is being removed, before it leaves
    /// the bus's device list.
    fn remove(&self, device: &Device);

    /// Called from the worker when a control request arrives for a bound
    /// device. Must not block on [`crate::control::send_request`] — that
    /// would deadlock the single worker (spec §4.5).
    fn report(&self, device: &Device, control_code: u8, detail: &[u8]);

    /// Whether this driver's name table contains `name`.
    fn matches(&self, name: &str) -> bool {
        self.names().iter().any(|n| *n == name)
    }
}
