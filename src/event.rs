//! Canonical input events.
//!
//! Every raw device report is normalized into one [`HidEvent`] of a small closed
//! set of kinds ([`EventKind`]). Two identifiers are derived from an event:
//!
//! - [`ControlId`]: the physical control (type + cookie + usage), regardless of
//!   its current value.
//! - [`ControlValueId`]: the control *and* its discrete state class, so
//!   "axis X negative" and "axis X positive" on the same cookie differ.
//!
//! Events hold a [`DeviceId`] (lookup key) and never own the device.
//!
//! ## Equality
//! Two events are *usage-equal* when everything except state/value matches,
//! and *equal* when they are usage-equal and their state class (axis
//! direction, hat direction, on/off) matches. Continuous values, timestamps and
//! the originating device do not take part in equality.
//!
//! ## String form
//! Events persist as short strings, e.g. `axis:x:3:+`, `trigger:rz:5:+`,
//! `button:4:12:on`, `hat:8:7:ne`, `key:40:on`. See [`HidEvent::from_str`].

use crate::hat::{HatDirection, HatSwitchType};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

/// HID usage of the hat switch control on the Generic Desktop page.
pub const HAT_SWITCH_USAGE: u16 = 0x39;

/// Keyboard usage of the Escape key.
pub const KEYCODE_ESCAPE: u16 = 0x29;

/// Pseudo keycode reported for the laptop function modifier.
pub const KEYCODE_FUNCTION: u16 = 0xE8;

/// Stable string identifier of a device (see [`DeviceIdentity`](crate::metadata::DeviceIdentity)).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(Arc<str>);

impl DeviceId {
    pub fn new(id: &str) -> Self {
        Self(Arc::from(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Event kind tag. Numeric codes are part of [`ControlId`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventType {
    Axis = 1,
    Button = 2,
    HatSwitch = 3,
    Keyboard = 4,
    /// Analog triggers only.
    Trigger = 5,
}

/// HID usage of an axis control.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AxisUsage {
    None,
    X,
    Y,
    Z,
    Rx,
    Ry,
    Rz,
    Accelerator,
    Brake,
    Other(u16),
}

impl AxisUsage {
    pub fn from_usage(usage: u16) -> Self {
        match usage {
            0x00 => AxisUsage::None,
            0x30 => AxisUsage::X,
            0x31 => AxisUsage::Y,
            0x32 => AxisUsage::Z,
            0x33 => AxisUsage::Rx,
            0x34 => AxisUsage::Ry,
            0x35 => AxisUsage::Rz,
            0xC4 => AxisUsage::Accelerator,
            0xC5 => AxisUsage::Brake,
            other => AxisUsage::Other(other),
        }
    }

    pub fn usage(self) -> u16 {
        match self {
            AxisUsage::None => 0x00,
            AxisUsage::X => 0x30,
            AxisUsage::Y => 0x31,
            AxisUsage::Z => 0x32,
            AxisUsage::Rx => 0x33,
            AxisUsage::Ry => 0x34,
            AxisUsage::Rz => 0x35,
            AxisUsage::Accelerator => 0xC4,
            AxisUsage::Brake => 0xC5,
            AxisUsage::Other(u) => u,
        }
    }

    fn short_name(self) -> String {
        match self {
            AxisUsage::None => "none".into(),
            AxisUsage::X => "x".into(),
            AxisUsage::Y => "y".into(),
            AxisUsage::Z => "z".into(),
            AxisUsage::Rx => "rx".into(),
            AxisUsage::Ry => "ry".into(),
            AxisUsage::Rz => "rz".into(),
            AxisUsage::Accelerator => "accelerator".into(),
            AxisUsage::Brake => "brake".into(),
            AxisUsage::Other(u) => format!("{u:#06x}"),
        }
    }

    fn from_short_name(name: &str) -> Option<Self> {
        Some(match name {
            "none" => AxisUsage::None,
            "x" => AxisUsage::X,
            "y" => AxisUsage::Y,
            "z" => AxisUsage::Z,
            "rx" => AxisUsage::Rx,
            "ry" => AxisUsage::Ry,
            "rz" => AxisUsage::Rz,
            "accelerator" => AxisUsage::Accelerator,
            "brake" => AxisUsage::Brake,
            other => {
                let hex = other.strip_prefix("0x")?;
                AxisUsage::from_usage(u16::from_str_radix(hex, 16).ok()?)
            }
        })
    }
}

impl fmt::Display for AxisUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AxisUsage::None => f.write_str("None"),
            AxisUsage::X => f.write_str("X"),
            AxisUsage::Y => f.write_str("Y"),
            AxisUsage::Z => f.write_str("Z"),
            AxisUsage::Rx => f.write_str("Rx"),
            AxisUsage::Ry => f.write_str("Ry"),
            AxisUsage::Rz => f.write_str("Rz"),
            AxisUsage::Accelerator => f.write_str("Accelerator"),
            AxisUsage::Brake => f.write_str("Brake"),
            AxisUsage::Other(u) => write!(f, "Axis {u:#04x}"),
        }
    }
}

/// Signed direction of an axis or trigger.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AxisDirection {
    Negative = -1,
    Null = 0,
    Positive = 1,
}

impl AxisDirection {
    pub fn of(value: f64) -> Self {
        if value > 0.0 {
            AxisDirection::Positive
        } else if value < 0.0 {
            AxisDirection::Negative
        } else {
            AxisDirection::Null
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            AxisDirection::Negative => AxisDirection::Positive,
            AxisDirection::Null => AxisDirection::Null,
            AxisDirection::Positive => AxisDirection::Negative,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            AxisDirection::Negative => "-",
            AxisDirection::Null => "0",
            AxisDirection::Positive => "+",
        }
    }

    fn from_symbol(s: &str) -> Option<Self> {
        match s {
            "-" => Some(AxisDirection::Negative),
            "0" => Some(AxisDirection::Null),
            "+" => Some(AxisDirection::Positive),
            _ => None,
        }
    }
}

/// On/off state of buttons and keys.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventState {
    Off,
    On,
}

impl EventState {
    pub fn from_pressed(pressed: bool) -> Self {
        if pressed {
            EventState::On
        } else {
            EventState::Off
        }
    }

    fn name(self) -> &'static str {
        match self {
            EventState::Off => "off",
            EventState::On => "on",
        }
    }

    fn from_name(s: &str) -> Option<Self> {
        match s {
            "off" => Some(EventState::Off),
            "on" => Some(EventState::On),
            _ => None,
        }
    }
}

/// Identifies a physical control irrespective of its value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ControlId(pub u64);

/// Identifies one discrete state class of a physical control.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ControlValueId(pub u64);

impl fmt::Display for ControlId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

impl fmt::Display for ControlValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

// Bit layout: [63..60] type, [59..48] value class, [47..16] cookie, [15..0] usage.
fn pack_identifier(ty: EventType, value_class: u16, cookie: u32, usage: u16) -> u64 {
    ((ty as u64) << 60)
        | (((value_class & 0x0FFF) as u64) << 48)
        | ((cookie as u64) << 16)
        | usage as u64
}

/// Kind-specific payload of an event.
#[derive(Clone, Copy, Debug)]
pub enum EventKind {
    /// `value` is signed in `[-1, 1]`.
    Axis {
        axis: AxisUsage,
        direction: AxisDirection,
        value: f64,
    },
    /// `direction` is `Null` or `Positive`; `value` in `[0, 1]`.
    Trigger {
        axis: AxisUsage,
        direction: AxisDirection,
        value: f64,
    },
    Button {
        number: u16,
        state: EventState,
    },
    HatSwitch {
        hat_type: HatSwitchType,
        direction: HatDirection,
    },
    Keyboard {
        keycode: u16,
        state: EventState,
    },
}

/// Immutable description of one control activation.
#[derive(Clone, Debug)]
pub struct HidEvent {
    device: Option<DeviceId>,
    timestamp: Instant,
    cookie: u32,
    kind: EventKind,
}

impl HidEvent {
    /// Axis event. The direction is derived from the sign of `value`.
    pub fn axis(device: Option<DeviceId>, timestamp: Instant, cookie: u32, axis: AxisUsage, value: f64) -> Self {
        let value = value.clamp(-1.0, 1.0);
        Self {
            device,
            timestamp,
            cookie,
            kind: EventKind::Axis {
                axis,
                direction: AxisDirection::of(value),
                value,
            },
        }
    }

    /// Axis event with an explicit direction and unit value (used for bindings).
    pub fn axis_with_direction(cookie: u32, axis: AxisUsage, direction: AxisDirection) -> Self {
        Self::axis(None, Instant::now(), cookie, axis, direction as i8 as f64)
    }

    /// Trigger event. Negative inputs collapse to the null direction.
    pub fn trigger(device: Option<DeviceId>, timestamp: Instant, cookie: u32, axis: AxisUsage, value: f64) -> Self {
        let value = value.clamp(0.0, 1.0);
        let direction = if value > 0.0 {
            AxisDirection::Positive
        } else {
            AxisDirection::Null
        };
        Self {
            device,
            timestamp,
            cookie,
            kind: EventKind::Trigger {
                axis,
                direction,
                value,
            },
        }
    }

    pub fn button(device: Option<DeviceId>, timestamp: Instant, cookie: u32, number: u16, state: EventState) -> Self {
        Self {
            device,
            timestamp,
            cookie,
            kind: EventKind::Button { number, state },
        }
    }

    /// Hat switch event. A 4-way hat drops diagonal inputs to neutral.
    pub fn hat_switch(
        device: Option<DeviceId>,
        timestamp: Instant,
        cookie: u32,
        hat_type: HatSwitchType,
        direction: HatDirection,
    ) -> Self {
        let direction = if !direction.is_valid()
            || (hat_type == HatSwitchType::FourWays && direction.is_diagonal())
        {
            HatDirection::NULL
        } else {
            direction
        };
        Self {
            device,
            timestamp,
            cookie,
            kind: EventKind::HatSwitch {
                hat_type,
                direction,
            },
        }
    }

    pub fn keyboard(device: Option<DeviceId>, timestamp: Instant, keycode: u16, state: EventState) -> Self {
        Self {
            device,
            timestamp,
            cookie: 0,
            kind: EventKind::Keyboard { keycode, state },
        }
    }

    pub fn kind(&self) -> &EventKind {
        &self.kind
    }

    pub fn device(&self) -> Option<&DeviceId> {
        self.device.as_ref()
    }

    pub fn timestamp(&self) -> Instant {
        self.timestamp
    }

    pub fn cookie(&self) -> u32 {
        self.cookie
    }

    /// Same event attributed to `device`.
    pub fn with_device(mut self, device: Option<DeviceId>) -> Self {
        self.device = device;
        self
    }

    pub fn event_type(&self) -> EventType {
        match self.kind {
            EventKind::Axis { .. } => EventType::Axis,
            EventKind::Trigger { .. } => EventType::Trigger,
            EventKind::Button { .. } => EventType::Button,
            EventKind::HatSwitch { .. } => EventType::HatSwitch,
            EventKind::Keyboard { .. } => EventType::Keyboard,
        }
    }

    fn usage(&self) -> u16 {
        match self.kind {
            EventKind::Axis { axis, .. } | EventKind::Trigger { axis, .. } => axis.usage(),
            EventKind::Button { number, .. } => number,
            EventKind::HatSwitch { .. } => HAT_SWITCH_USAGE,
            EventKind::Keyboard { keycode, .. } => keycode,
        }
    }

    fn value_class(&self) -> u16 {
        match self.kind {
            EventKind::Axis { direction, .. } | EventKind::Trigger { direction, .. } => {
                (direction as i8 + 2) as u16
            }
            EventKind::HatSwitch { direction, .. } => direction.bits() as u16 + 16,
            EventKind::Button { .. } | EventKind::Keyboard { .. } => 1,
        }
    }

    pub fn control_identifier(&self) -> ControlId {
        ControlId(pack_identifier(self.event_type(), 0, self.cookie, self.usage()))
    }

    pub fn control_value_identifier(&self) -> ControlValueId {
        ControlValueId(pack_identifier(
            self.event_type(),
            self.value_class(),
            self.cookie,
            self.usage(),
        ))
    }

    /// `false` only for events that carry no release state of their own.
    pub fn has_off_state(&self) -> bool {
        !matches!(self.kind, EventKind::Axis { .. } | EventKind::HatSwitch { .. })
    }

    pub fn axis_usage(&self) -> Option<AxisUsage> {
        match self.kind {
            EventKind::Axis { axis, .. } | EventKind::Trigger { axis, .. } => Some(axis),
            _ => None,
        }
    }

    pub fn direction(&self) -> AxisDirection {
        match self.kind {
            EventKind::Axis { direction, .. } | EventKind::Trigger { direction, .. } => direction,
            _ => AxisDirection::Null,
        }
    }

    /// Opposite of an axis direction; `Null` for everything else.
    pub fn opposite_direction(&self) -> AxisDirection {
        match self.kind {
            EventKind::Axis { direction, .. } => direction.opposite(),
            _ => AxisDirection::Null,
        }
    }

    pub fn value(&self) -> f64 {
        match self.kind {
            EventKind::Axis { value, .. } | EventKind::Trigger { value, .. } => value,
            _ => 0.0,
        }
    }

    pub fn absolute_value(&self) -> f64 {
        self.value().abs()
    }

    pub fn button_number(&self) -> Option<u16> {
        match self.kind {
            EventKind::Button { number, .. } => Some(number),
            _ => None,
        }
    }

    pub fn keycode(&self) -> Option<u16> {
        match self.kind {
            EventKind::Keyboard { keycode, .. } => Some(keycode),
            _ => None,
        }
    }

    pub fn is_escape_key_event(&self) -> bool {
        self.keycode() == Some(KEYCODE_ESCAPE)
    }

    pub fn state(&self) -> EventState {
        match self.kind {
            EventKind::Button { state, .. } | EventKind::Keyboard { state, .. } => state,
            EventKind::Axis { direction, .. } | EventKind::Trigger { direction, .. } => {
                EventState::from_pressed(direction != AxisDirection::Null)
            }
            EventKind::HatSwitch { direction, .. } => EventState::from_pressed(!direction.is_null()),
        }
    }

    pub fn hat_switch_type(&self) -> Option<HatSwitchType> {
        match self.kind {
            EventKind::HatSwitch { hat_type, .. } => Some(hat_type),
            _ => None,
        }
    }

    pub fn hat_direction(&self) -> HatDirection {
        match self.kind {
            EventKind::HatSwitch { direction, .. } => direction,
            _ => HatDirection::NULL,
        }
    }

    /// Same control with the axis direction flipped and value negated.
    pub fn axis_event_with_opposite_direction(&self) -> Option<Self> {
        match self.kind {
            EventKind::Axis { axis, direction, value } => Some(Self {
                kind: EventKind::Axis {
                    axis,
                    direction: direction.opposite(),
                    value: -value,
                },
                ..self.clone()
            }),
            _ => None,
        }
    }

    /// Same axis or trigger control pointing in `direction` with unit magnitude.
    pub fn event_with_direction(&self, direction: AxisDirection) -> Option<Self> {
        match self.kind {
            EventKind::Axis { axis, .. } => Some(Self {
                kind: EventKind::Axis {
                    axis,
                    direction,
                    value: direction as i8 as f64,
                },
                ..self.clone()
            }),
            EventKind::Trigger { axis, .. } if direction != AxisDirection::Negative => Some(Self {
                kind: EventKind::Trigger {
                    axis,
                    direction,
                    value: direction as i8 as f64,
                },
                ..self.clone()
            }),
            _ => None,
        }
    }

    /// Same hat control pointing in `direction`.
    pub fn hat_event_with_direction(&self, direction: HatDirection) -> Option<Self> {
        match self.kind {
            EventKind::HatSwitch { hat_type, .. } => Some(Self::hat_switch(
                self.device.clone(),
                self.timestamp,
                self.cookie,
                hat_type,
                direction,
            )),
            _ => None,
        }
    }

    /// Neutral/released counterpart of this event.
    pub fn null_event(&self) -> Self {
        let kind = match self.kind {
            EventKind::Axis { axis, .. } => EventKind::Axis {
                axis,
                direction: AxisDirection::Null,
                value: 0.0,
            },
            EventKind::Trigger { axis, .. } => EventKind::Trigger {
                axis,
                direction: AxisDirection::Null,
                value: 0.0,
            },
            EventKind::Button { number, .. } => EventKind::Button {
                number,
                state: EventState::Off,
            },
            EventKind::HatSwitch { hat_type, .. } => EventKind::HatSwitch {
                hat_type,
                direction: HatDirection::NULL,
            },
            EventKind::Keyboard { keycode, .. } => EventKind::Keyboard {
                keycode,
                state: EventState::Off,
            },
        };
        Self {
            kind,
            ..self.clone()
        }
    }

    /// Both events are axis events on the same control pointing opposite ways.
    pub fn is_axis_direction_opposite_to(&self, other: &HidEvent) -> bool {
        match (self.kind, other.kind) {
            (EventKind::Axis { direction: a, .. }, EventKind::Axis { direction: b, .. }) => {
                self.is_usage_equal_to(other) && a != AxisDirection::Null && a.opposite() == b
            }
            _ => false,
        }
    }

    /// Every field except the state/value matches.
    pub fn is_usage_equal_to(&self, other: &HidEvent) -> bool {
        if self.cookie != other.cookie {
            return false;
        }
        match (self.kind, other.kind) {
            (EventKind::Axis { axis: a, .. }, EventKind::Axis { axis: b, .. }) => a == b,
            (EventKind::Trigger { axis: a, .. }, EventKind::Trigger { axis: b, .. }) => a == b,
            (EventKind::Button { number: a, .. }, EventKind::Button { number: b, .. }) => a == b,
            (
                EventKind::HatSwitch { hat_type: a, .. },
                EventKind::HatSwitch { hat_type: b, .. },
            ) => a == b,
            (EventKind::Keyboard { keycode: a, .. }, EventKind::Keyboard { keycode: b, .. }) => {
                a == b
            }
            _ => false,
        }
    }

    pub fn is_equal_to(&self, other: &HidEvent) -> bool {
        self.is_usage_equal_to(other) && self.state_class() == other.state_class()
    }

    fn state_class(&self) -> u16 {
        match self.kind {
            EventKind::Button { state, .. } | EventKind::Keyboard { state, .. } => state as u16,
            _ => self.value_class(),
        }
    }

    /// Human readable label, e.g. `"Button 3"` or `"Hat Switch North-East"`.
    pub fn display_description(&self) -> String {
        match self.kind {
            EventKind::Axis { axis, direction, .. } => {
                let sign = match direction {
                    AxisDirection::Negative => "-",
                    AxisDirection::Positive => "+",
                    AxisDirection::Null => "",
                };
                format!("{axis}{sign}")
            }
            EventKind::Trigger { axis, .. } => format!("Trigger {axis}"),
            EventKind::Button { number, .. } => format!("Button {number}"),
            EventKind::HatSwitch { direction, .. } => format!("Hat Switch {direction}"),
            EventKind::Keyboard { keycode, .. } => format!("Key {keycode:#04x}"),
        }
    }
}

impl PartialEq for HidEvent {
    fn eq(&self, other: &Self) -> bool {
        self.is_equal_to(other)
    }
}

impl Eq for HidEvent {}

impl Hash for HidEvent {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.control_identifier().hash(state);
        self.state_class().hash(state);
    }
}

impl fmt::Display for HidEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            EventKind::Axis { axis, direction, .. } => write!(
                f,
                "axis:{}:{}:{}",
                axis.short_name(),
                self.cookie,
                direction.symbol()
            ),
            EventKind::Trigger { axis, direction, .. } => write!(
                f,
                "trigger:{}:{}:{}",
                axis.short_name(),
                self.cookie,
                direction.symbol()
            ),
            EventKind::Button { number, state } => {
                write!(f, "button:{}:{}:{}", number, self.cookie, state.name())
            }
            EventKind::HatSwitch {
                hat_type,
                direction,
            } => write!(
                f,
                "hat:{}:{}:{}",
                hat_type.code(),
                self.cookie,
                direction.short_name()
            ),
            EventKind::Keyboard { keycode, state } => {
                write!(f, "key:{}:{}", keycode, state.name())
            }
        }
    }
}

impl FromStr for HidEvent {
    type Err = crate::error::Error;

    /// Parses the persisted string form. The event has no device and a fresh timestamp.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || crate::error::Error::InvalidEvent(s.to_string());
        let parts: Vec<&str> = s.trim().split(':').collect();
        let now = Instant::now();

        let event = match parts.as_slice() {
            ["axis", usage, cookie, dir] => {
                let axis = AxisUsage::from_short_name(usage).ok_or_else(invalid)?;
                let cookie = cookie.parse().map_err(|_| invalid())?;
                let direction = AxisDirection::from_symbol(dir).ok_or_else(invalid)?;
                HidEvent::axis(None, now, cookie, axis, direction as i8 as f64)
            }
            ["trigger", usage, cookie, dir] => {
                let axis = AxisUsage::from_short_name(usage).ok_or_else(invalid)?;
                let cookie = cookie.parse().map_err(|_| invalid())?;
                let direction = AxisDirection::from_symbol(dir).ok_or_else(invalid)?;
                if direction == AxisDirection::Negative {
                    return Err(invalid());
                }
                HidEvent::trigger(None, now, cookie, axis, direction as i8 as f64)
            }
            ["button", number, cookie, state] => {
                let number = number.parse().map_err(|_| invalid())?;
                let cookie = cookie.parse().map_err(|_| invalid())?;
                let state = EventState::from_name(state).ok_or_else(invalid)?;
                HidEvent::button(None, now, cookie, number, state)
            }
            ["hat", ty, cookie, dir] => {
                let hat_type = ty
                    .parse::<u16>()
                    .ok()
                    .and_then(HatSwitchType::from_code)
                    .ok_or_else(invalid)?;
                let cookie = cookie.parse().map_err(|_| invalid())?;
                let direction = HatDirection::from_short_name(dir).ok_or_else(invalid)?;
                if hat_type == HatSwitchType::FourWays && direction.is_diagonal() {
                    return Err(invalid());
                }
                HidEvent::hat_switch(None, now, cookie, hat_type, direction)
            }
            ["key", keycode, state] => {
                let keycode = keycode.parse().map_err(|_| invalid())?;
                let state = EventState::from_name(state).ok_or_else(invalid)?;
                HidEvent::keyboard(None, now, keycode, state)
            }
            _ => return Err(invalid()),
        };
        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn axis(cookie: u32, value: f64) -> HidEvent {
        HidEvent::axis(None, Instant::now(), cookie, AxisUsage::X, value)
    }

    #[test]
    fn control_identifier_ignores_value() {
        let neg = axis(3, -0.7);
        let pos = axis(3, 0.4);
        assert_eq!(neg.control_identifier(), pos.control_identifier());
        assert_ne!(neg.control_value_identifier(), pos.control_value_identifier());

        let other_cookie = axis(4, 0.4);
        assert_ne!(pos.control_identifier(), other_cookie.control_identifier());
    }

    #[test]
    fn button_states_share_control_value() {
        let on = HidEvent::button(None, Instant::now(), 12, 4, EventState::On);
        let off = on.null_event();
        assert_eq!(on.control_value_identifier(), off.control_value_identifier());
        assert!(on.is_usage_equal_to(&off));
        assert_ne!(on, off);
    }

    #[test]
    fn equality_ignores_magnitude_and_device() {
        let a = axis(3, 0.3);
        let b = axis(3, 0.9).with_device(Some(DeviceId::new("pad")));
        assert_eq!(a, b);
        assert_ne!(a, axis(3, -0.3));
    }

    #[test]
    fn opposite_axis_events() {
        let pos = axis(3, 0.6);
        let neg = pos.axis_event_with_opposite_direction().unwrap();
        assert_eq!(neg.direction(), AxisDirection::Negative);
        assert!((neg.value() + 0.6).abs() < 1e-12);
        assert!(pos.is_axis_direction_opposite_to(&neg));
        assert!(!pos.is_axis_direction_opposite_to(&pos));
        assert!(!pos.is_axis_direction_opposite_to(&pos.null_event()));
        assert_eq!(pos.opposite_direction(), AxisDirection::Negative);
    }

    #[test]
    fn trigger_directions_are_null_or_positive() {
        let t = HidEvent::trigger(None, Instant::now(), 5, AxisUsage::Rz, -0.5);
        assert_eq!(t.direction(), AxisDirection::Null);
        assert!(t.event_with_direction(AxisDirection::Negative).is_none());
    }

    #[test]
    fn four_way_hat_rejects_diagonals() {
        let e = HidEvent::hat_switch(
            None,
            Instant::now(),
            7,
            HatSwitchType::FourWays,
            HatDirection::NORTH_EAST,
        );
        assert!(e.hat_direction().is_null());
    }

    #[test]
    fn string_form_round_trips() {
        let now = Instant::now();
        let events = [
            axis(3, -1.0),
            HidEvent::axis(None, now, 9, AxisUsage::Other(0x40), 1.0),
            HidEvent::trigger(None, now, 5, AxisUsage::Rz, 1.0),
            HidEvent::button(None, now, 12, 4, EventState::On),
            HidEvent::hat_switch(None, now, 7, HatSwitchType::EightWays, HatDirection::SOUTH_WEST),
            HidEvent::keyboard(None, now, 40, EventState::On),
        ];
        for e in events {
            let parsed: HidEvent = e.to_string().parse().unwrap();
            assert_eq!(parsed, e, "{e}");
            assert_eq!(parsed.control_value_identifier(), e.control_value_identifier());
        }
    }

    #[test]
    fn malformed_strings_are_rejected() {
        for s in ["", "axis:x:3", "axis:q:3:+", "button:a:1:on", "hat:4:7:ne", "trigger:z:1:-", "key:1:maybe"] {
            assert!(s.parse::<HidEvent>().is_err(), "{s}");
        }
    }

    #[test]
    fn keycodes_beyond_sixteen_bits_do_not_alias() {
        assert!("key:65540:on".parse::<HidEvent>().is_err());
        let top = HidEvent::keyboard(None, Instant::now(), u16::MAX, EventState::On);
        let low = HidEvent::keyboard(None, Instant::now(), 4, EventState::On);
        assert_ne!(top.control_identifier(), low.control_identifier());
        assert_eq!(top.to_string().parse::<HidEvent>().unwrap().keycode(), Some(u16::MAX));
    }

    #[test]
    fn escape_key_flag() {
        let esc = HidEvent::keyboard(None, Instant::now(), KEYCODE_ESCAPE, EventState::On);
        assert!(esc.is_escape_key_event());
        assert!(esc.has_off_state());
        assert!(!axis(1, 1.0).has_off_state());
    }
}
