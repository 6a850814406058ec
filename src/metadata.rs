//! Device metadata and identity.
//!
//! [`DeviceMeta`] is a lightweight, cloneable description of a device suitable
//! for UI display, logging, and persistence. Sources populate what they know;
//! unknown fields remain `None`.
//!
//! [`DeviceIdentity`] is the subset of metadata that survives reconnects. Its
//! [`unique_identifier`](DeviceIdentity::unique_identifier) is the key bindings
//! are saved under, so it must not change for the same physical device.
//!
//! ## Persistence notes
//! - `vendor_id`/`product_id` and `serial_number` (when present) are stable and
//!   preferred for re-identification.
//! - `location_id` is a port/topology hint; it is only used when the device
//!   reports no serial number.

use crate::event::DeviceId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier used for the system keyboard.
pub const KEYBOARD_DEVICE_IDENTIFIER: &str = "keyboard";

/// Snapshot of metadata describing a single device.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceMeta {
    /// High-level bus classification (e.g., `"usb"`, `"bluetooth"`).
    pub bus: Option<String>,

    /// Human-readable product name from the driver/firmware.
    pub product: Option<String>,

    pub manufacturer: Option<String>,

    /// HID Usage Page (e.g., `0x01` for Generic Desktop), if known.
    pub usage_page: Option<u16>,

    /// HID Usage within the page (e.g., `0x05` Gamepad), if known.
    pub usage: Option<u16>,

    /// HID interface index (platform-reported).
    pub interface_number: Option<i32>,

    /// OS/topological path to the device. Diagnostic only.
    pub path: Option<String>,
}

/// The stable part of a device's metadata.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceIdentity {
    pub vendor_id: u16,
    pub product_id: u16,
    pub serial_number: Option<String>,
    pub location_id: Option<u32>,
    #[serde(default)]
    pub is_keyboard: bool,
}

impl DeviceIdentity {
    pub fn new(vendor_id: u16, product_id: u16) -> Self {
        Self {
            vendor_id,
            product_id,
            ..Self::default()
        }
    }

    pub fn keyboard() -> Self {
        Self {
            is_keyboard: true,
            ..Self::default()
        }
    }

    pub fn with_serial(mut self, serial: impl Into<String>) -> Self {
        self.serial_number = Some(serial.into());
        self
    }

    pub fn with_location(mut self, location: u32) -> Self {
        self.location_id = Some(location);
        self
    }

    /// Location derived from an OS device path, for devices without a
    /// serial number or a port location of their own.
    pub fn with_path_location(self, path: &str) -> Self {
        self.with_location(path_location(path))
    }

    /// `"{vendor:04x}:{product:04x}:{serial|location}"`, or `"keyboard"`.
    pub fn unique_identifier(&self) -> String {
        if self.is_keyboard {
            return KEYBOARD_DEVICE_IDENTIFIER.to_string();
        }
        let tail = match (&self.serial_number, self.location_id) {
            (Some(serial), _) if !serial.is_empty() => serial.clone(),
            (_, Some(location)) => format!("{location:08x}"),
            _ => "0".to_string(),
        };
        format!("{:04x}:{:04x}:{}", self.vendor_id, self.product_id, tail)
    }

    pub fn device_id(&self) -> DeviceId {
        DeviceId::new(&self.unique_identifier())
    }
}

// FNV-1a: saved bindings key on this value, so it must not change between
// runs or toolchains the way std's hasher may.
fn path_location(path: &str) -> u32 {
    path.bytes()
        .fold(0x811c_9dc5u32, |h, b| (h ^ b as u32).wrapping_mul(0x0100_0193))
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.unique_identifier())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serial_wins_over_location() {
        let id = DeviceIdentity::new(0x045e, 0x028e)
            .with_serial("ABC")
            .with_location(0x1420_0000);
        assert_eq!(id.unique_identifier(), "045e:028e:ABC");
    }

    #[test]
    fn location_used_without_serial() {
        let id = DeviceIdentity::new(0x054c, 0x05c4).with_location(0x14200000);
        assert_eq!(id.unique_identifier(), "054c:05c4:14200000");
    }

    #[test]
    fn path_location_is_stable() {
        let id = DeviceIdentity::new(0x054c, 0x05c4).with_path_location("a");
        assert_eq!(id.unique_identifier(), "054c:05c4:e40c292c");
        let other = DeviceIdentity::new(0x054c, 0x05c4).with_path_location("/dev/hidraw3");
        assert_ne!(other.location_id, id.location_id);
        assert_eq!(other, DeviceIdentity::new(0x054c, 0x05c4).with_path_location("/dev/hidraw3"));
    }

    #[test]
    fn keyboard_identity() {
        assert_eq!(DeviceIdentity::keyboard().unique_identifier(), "keyboard");
    }
}
