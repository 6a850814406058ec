//! Static controller descriptions.
//!
//! A [`ControllerDescription`] names the physical controls of one hardware
//! model. Each [`ControlDescription`] owns the ordered list of its discrete,
//! nameable states ([`ControlValueDescription`]): two for an axis (negative,
//! positive), one for a trigger, button or key, and four or eight for a hat
//! switch. Descriptions are immutable once built and shared as `Arc`.
//!
//! Known hardware is described in TOML:
//!
//! ```toml
//! identifier = "x360"
//! name = "Xbox 360 Controller"
//!
//! [[device]]
//! vendor_id = 0x045e
//! product_id = 0x028e
//!
//! [[control]]
//! identifier = "LeftStickX"
//! name = "Left Stick X"
//! event = "axis:x:12:+"
//! ```
//!
//! Devices without a description get a *generic* one synthesized from the
//! controls they report, with system-assigned names.

use crate::error::Result;
use crate::event::{AxisDirection, ControlId, ControlValueId, EventKind, EventType, HidEvent};
use crate::hat::{HatDirection, HatSwitchType};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// One nameable state of a control.
#[derive(Clone, Debug, PartialEq)]
pub struct ControlValueDescription {
    identifier: String,
    name: String,
    control_identifier: String,
    event: HidEvent,
}

impl ControlValueDescription {
    /// Build a free-standing value description (e.g. restored from persisted bindings).
    pub fn new(identifier: impl Into<String>, name: impl Into<String>, control_identifier: impl Into<String>, event: HidEvent) -> Self {
        Self {
            identifier: identifier.into(),
            name: name.into(),
            control_identifier: control_identifier.into(),
            event,
        }
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Identifier of the owning [`ControlDescription`].
    pub fn control_identifier(&self) -> &str {
        &self.control_identifier
    }

    pub fn event(&self) -> &HidEvent {
        &self.event
    }

    pub fn value_identifier(&self) -> ControlValueId {
        self.event.control_value_identifier()
    }
}

/// One physical control (axis, trigger, button, hat switch or key).
#[derive(Clone, Debug)]
pub struct ControlDescription {
    identifier: String,
    name: String,
    generic: bool,
    generic_event: HidEvent,
    values: Vec<ControlValueDescription>,
}

impl ControlDescription {
    /// Build a control and its value list from a canonical event.
    pub fn new(identifier: impl Into<String>, name: impl Into<String>, event: HidEvent, generic: bool) -> Self {
        let identifier = identifier.into();
        let name = name.into();
        let values = value_events(&event)
            .into_iter()
            .map(|(suffix, label, ev)| {
                ControlValueDescription::new(
                    format!("{identifier}.{suffix}"),
                    if label.is_empty() {
                        name.clone()
                    } else {
                        format!("{name} {label}")
                    },
                    identifier.clone(),
                    ev,
                )
            })
            .collect();
        Self {
            identifier,
            name,
            generic,
            generic_event: event,
            values,
        }
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn event_type(&self) -> EventType {
        self.generic_event.event_type()
    }

    pub fn control_identifier(&self) -> ControlId {
        self.generic_event.control_identifier()
    }

    pub fn cookie(&self) -> u32 {
        self.generic_event.cookie()
    }

    /// `true` when the name is system-assigned rather than hardware specific.
    pub fn is_generic_control(&self) -> bool {
        self.generic
    }

    pub fn generic_event(&self) -> &HidEvent {
        &self.generic_event
    }

    pub fn control_values(&self) -> &[ControlValueDescription] {
        &self.values
    }

    /// The value of this control matching `event`, if `event` belongs to it.
    pub fn value_for_event(&self, event: &HidEvent) -> Option<&ControlValueDescription> {
        if event.control_identifier() != self.control_identifier() {
            return None;
        }
        let id = event.control_value_identifier();
        self.values.iter().find(|v| v.value_identifier() == id)
    }
}

/// Canonical events of each discrete state of the control `event` belongs to.
fn value_events(event: &HidEvent) -> Vec<(String, String, HidEvent)> {
    match event.kind() {
        EventKind::Axis { .. } => [AxisDirection::Negative, AxisDirection::Positive]
            .into_iter()
            .filter_map(|d| {
                let sign = if d == AxisDirection::Negative { "-" } else { "+" };
                event
                    .event_with_direction(d)
                    .map(|e| (sign.to_string(), sign.to_string(), e))
            })
            .collect(),
        EventKind::Trigger { .. } => event
            .event_with_direction(AxisDirection::Positive)
            .map(|e| vec![("+".to_string(), String::new(), e)])
            .unwrap_or_default(),
        EventKind::Button { .. } | EventKind::Keyboard { .. } => {
            let on = match event.state() {
                crate::event::EventState::On => event.clone(),
                crate::event::EventState::Off => toggle_on(event),
            };
            vec![("on".to_string(), String::new(), on)]
        }
        EventKind::HatSwitch { hat_type, .. } => {
            let positions = match hat_type {
                HatSwitchType::FourWays => 4,
                _ => 8,
            };
            (0..positions)
                .filter_map(|i| {
                    let d = HatDirection::from_rotation_index(i, positions);
                    event
                        .hat_event_with_direction(d)
                        .map(|e| (d.short_name().to_string(), d.to_string(), e))
                })
                .collect()
        }
    }
}

fn toggle_on(event: &HidEvent) -> HidEvent {
    match *event.kind() {
        EventKind::Button { number, .. } => HidEvent::button(
            event.device().cloned(),
            event.timestamp(),
            event.cookie(),
            number,
            crate::event::EventState::On,
        ),
        EventKind::Keyboard { keycode, .. } => HidEvent::keyboard(
            event.device().cloned(),
            event.timestamp(),
            keycode,
            crate::event::EventState::On,
        ),
        _ => event.clone(),
    }
}

/// A concrete vendor/product pair described by a controller description.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct DeviceDescription {
    pub vendor_id: u16,
    pub product_id: u16,
    #[serde(default)]
    pub product: Option<String>,
}

/// Controls of one hardware model.
#[derive(Clone, Debug)]
pub struct ControllerDescription {
    identifier: String,
    name: String,
    devices: Vec<DeviceDescription>,
    controls: Vec<ControlDescription>,
    by_control: HashMap<ControlId, usize>,
    by_value: HashMap<ControlValueId, (usize, usize)>,
}

#[derive(Deserialize)]
struct ControllerRepr {
    identifier: String,
    name: String,
    #[serde(default, rename = "device")]
    devices: Vec<DeviceDescription>,
    #[serde(default, rename = "control")]
    controls: Vec<ControlRepr>,
}

#[derive(Deserialize)]
struct ControlRepr {
    identifier: String,
    name: String,
    event: String,
}

impl ControllerDescription {
    pub fn new(
        identifier: impl Into<String>,
        name: impl Into<String>,
        devices: Vec<DeviceDescription>,
        controls: Vec<ControlDescription>,
    ) -> Self {
        let mut desc = Self {
            identifier: identifier.into(),
            name: name.into(),
            devices,
            controls: Vec::with_capacity(controls.len()),
            by_control: HashMap::new(),
            by_value: HashMap::new(),
        };
        for control in controls {
            desc.add_control(control);
        }
        desc
    }

    fn add_control(&mut self, control: ControlDescription) {
        let id = control.control_identifier();
        if self.by_control.contains_key(&id) {
            warn!(
                controller = %self.identifier,
                control = control.identifier(),
                "duplicate control ignored"
            );
            return;
        }
        let index = self.controls.len();
        self.by_control.insert(id, index);
        for (vi, value) in control.control_values().iter().enumerate() {
            self.by_value.insert(value.value_identifier(), (index, vi));
        }
        self.controls.push(control);
    }

    /// Parse a hardware description from TOML. Controls whose event string is
    /// malformed are an error: these files ship with the host, not the user.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let repr: ControllerRepr = toml::from_str(text)?;
        let mut controls = Vec::with_capacity(repr.controls.len());
        for c in repr.controls {
            let event: HidEvent = c.event.parse()?;
            controls.push(ControlDescription::new(c.identifier, c.name, event, false));
        }
        Ok(Self::new(repr.identifier, repr.name, repr.devices, controls))
    }

    /// Synthesize a description with system-assigned control names.
    pub fn generic(identifier: impl Into<String>, name: impl Into<String>, events: impl IntoIterator<Item = HidEvent>) -> Self {
        let controls = events
            .into_iter()
            .map(|event| {
                let (id, label) = generic_names(&event);
                ControlDescription::new(id, label, event, true)
            })
            .collect();
        Self::new(identifier, name, Vec::new(), controls)
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn device_descriptions(&self) -> &[DeviceDescription] {
        &self.devices
    }

    pub fn controls(&self) -> &[ControlDescription] {
        &self.controls
    }

    pub fn control_for_identifier(&self, identifier: &str) -> Option<&ControlDescription> {
        self.controls.iter().find(|c| c.identifier() == identifier)
    }

    pub fn control_for_event(&self, event: &HidEvent) -> Option<&ControlDescription> {
        self.by_control
            .get(&event.control_identifier())
            .map(|&i| &self.controls[i])
    }

    pub fn control_value_for_event(&self, event: &HidEvent) -> Option<&ControlValueDescription> {
        self.by_value
            .get(&event.control_value_identifier())
            .map(|&(c, v)| &self.controls[c].values[v])
    }

    pub fn control_value_for_identifier(&self, identifier: &str) -> Option<&ControlValueDescription> {
        self.controls
            .iter()
            .flat_map(|c| c.values.iter())
            .find(|v| v.identifier() == identifier)
    }
}

fn generic_names(event: &HidEvent) -> (String, String) {
    match *event.kind() {
        EventKind::Axis { axis, .. } => (
            format!("Axis{}_{}", axis.usage(), event.cookie()),
            format!("Axis {axis}"),
        ),
        EventKind::Trigger { axis, .. } => (
            format!("Trigger{}_{}", axis.usage(), event.cookie()),
            format!("Trigger {axis}"),
        ),
        EventKind::Button { number, .. } => (format!("Button{number}"), format!("Button {number}")),
        EventKind::HatSwitch { .. } => (
            format!("HatSwitch_{}", event.cookie()),
            "Hat Switch".to_string(),
        ),
        EventKind::Keyboard { keycode, .. } => (format!("Key{keycode}"), format!("Key {keycode:#04x}")),
    }
}

/// Known controller descriptions, looked up by vendor/product or identifier.
#[derive(Clone, Debug, Default)]
pub struct ControllerRegistry {
    by_identifier: HashMap<String, Arc<ControllerDescription>>,
    by_device: HashMap<(u16, u16), Arc<ControllerDescription>>,
}

impl ControllerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, description: ControllerDescription) -> Arc<ControllerDescription> {
        let description = Arc::new(description);
        for dev in description.device_descriptions() {
            self.by_device
                .insert((dev.vendor_id, dev.product_id), Arc::clone(&description));
        }
        self.by_identifier
            .insert(description.identifier().to_string(), Arc::clone(&description));
        description
    }

    pub fn register_toml_str(&mut self, text: &str) -> Result<Arc<ControllerDescription>> {
        Ok(self.register(ControllerDescription::from_toml_str(text)?))
    }

    pub fn for_vendor_product(&self, vendor_id: u16, product_id: u16) -> Option<Arc<ControllerDescription>> {
        self.by_device.get(&(vendor_id, product_id)).cloned()
    }

    pub fn for_identifier(&self, identifier: &str) -> Option<Arc<ControllerDescription>> {
        self.by_identifier.get(identifier).cloned()
    }

    pub fn len(&self) -> usize {
        self.by_identifier.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_identifier.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::AxisUsage;
    use std::time::Instant;

    const X360: &str = r#"
identifier = "x360"
name = "Xbox 360 Controller"

[[device]]
vendor_id = 0x045e
product_id = 0x028e

[[control]]
identifier = "LeftStickX"
name = "Left Stick X"
event = "axis:x:12:+"

[[control]]
identifier = "A"
name = "A"
event = "button:1:20:on"

[[control]]
identifier = "DPad"
name = "D-Pad"
event = "hat:4:30:n"
"#;

    #[test]
    fn parses_controls_and_values() {
        let desc = ControllerDescription::from_toml_str(X360).unwrap();
        assert_eq!(desc.controls().len(), 3);
        let stick = desc.control_for_identifier("LeftStickX").unwrap();
        assert_eq!(stick.control_values().len(), 2);
        assert_eq!(stick.control_values()[0].identifier(), "LeftStickX.-");
        let dpad = desc.control_for_identifier("DPad").unwrap();
        let names: Vec<_> = dpad.control_values().iter().map(|v| v.identifier()).collect();
        assert_eq!(names, ["DPad.n", "DPad.e", "DPad.s", "DPad.w"]);
        assert!(!dpad.is_generic_control());
    }

    #[test]
    fn control_value_lookup_by_event() {
        let desc = ControllerDescription::from_toml_str(X360).unwrap();
        let left = HidEvent::axis(None, Instant::now(), 12, AxisUsage::X, -0.8);
        let value = desc.control_value_for_event(&left).unwrap();
        assert_eq!(value.identifier(), "LeftStickX.-");

        let control = desc.control_for_event(&left).unwrap();
        let right = left.axis_event_with_opposite_direction().unwrap();
        assert_eq!(control.value_for_event(&right).unwrap().identifier(), "LeftStickX.+");

        let released = "button:1:20:off".parse::<HidEvent>().unwrap();
        assert_eq!(desc.control_value_for_event(&released).unwrap().identifier(), "A.on");
    }

    #[test]
    fn generic_description_names() {
        let now = Instant::now();
        let desc = ControllerDescription::generic(
            "generic",
            "Gamepad",
            [
                HidEvent::axis(None, now, 3, AxisUsage::Y, 1.0),
                HidEvent::button(None, now, 4, 2, crate::event::EventState::Off),
            ],
        );
        assert!(desc.controls().iter().all(|c| c.is_generic_control()));
        assert_eq!(desc.controls()[1].name(), "Button 2");
        assert_eq!(desc.controls()[1].control_values()[0].event().state(), crate::event::EventState::On);
    }

    #[test]
    fn registry_lookup() {
        let mut reg = ControllerRegistry::new();
        reg.register_toml_str(X360).unwrap();
        assert!(reg.for_vendor_product(0x045e, 0x028e).is_some());
        assert!(reg.for_identifier("x360").is_some());
        assert!(reg.for_identifier("nope").is_none());
    }
}
