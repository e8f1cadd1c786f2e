//! A device: a member of exactly one bus, addressable by a single byte
//! (spec §3 "Device").

/// Largest device name the driver name table matches against. Names longer
/// than this are truncated at construction, mirroring the original driver's
/// fixed `char name[MCU_NAME_SIZE]` field (filled via `strlcpy`, which
/// truncates rather than rejecting an oversized source string).
pub const NAME_SIZE: usize = 20;

/// A device bound (or not yet bound) to a bus.
#[derive(Debug, Clone)]
pub struct Device {
    pub(crate) device_id: u8,
    pub(crate) name: String,
    /// Index into the registry's driver table, once a driver has claimed
    /// this device by name. An index rather than an owning pointer back to
    /// the driver — see spec §9 "Reference cycles".
    pub(crate) driver_index: Option<usize>,
}

impl Device {
    pub(crate) fn new(device_id: u8, name: impl Into<String>) -> Self {
        let mut name = name.into();
        if name.len() > NAME_SIZE {
            let mut cut = NAME_SIZE;
            while !name.is_char_boundary(cut) {
                cut -= 1;
            }
            name.truncate(cut);
        }

        Self {
            device_id,
            name,
            driver_index: None,
        }
    }

    /// This device's bus-unique id.
    pub fn device_id(&self) -> u8 {
        self.device_id
    }

    /// The name used to match this device against a driver's name table.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether a driver currently claims this device.
    pub fn is_bound(&self) -> bool {
        self.driver_index.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_within_limit_is_untouched() {
        let device = Device::new(3, "gauge");
        assert_eq!(device.name(), "gauge");
    }

    #[test]
    fn oversized_name_is_truncated_to_name_size() {
        let long = "a".repeat(NAME_SIZE + 5);
        let device = Device::new(3, long);
        assert_eq!(device.name().len(), NAME_SIZE);
    }

    #[test]
    fn truncation_lands_on_a_char_boundary() {
        // Each 'é' is 2 bytes; NAME_SIZE (20) is even, so a string of 11
        // of them (22 bytes) forces the cut point one byte earlier.
        let long = "é".repeat(11);
        let device = Device::new(3, long);
        assert!(device.name().len() <= NAME_SIZE);
        assert!(String::from_utf8(device.name().as_bytes().to_vec()).is_ok());
    }
}
