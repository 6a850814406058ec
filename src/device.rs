//! Device sources and per-device handler state.
//!
//! Two halves live here:
//!
//! - [`Device`]: a raw input source (HID handle, scripted virtual device, ...).
//!   It reports which controls it has ([`ElementInfo`]) and yields
//!   [`RawSample`]s in device units when polled.
//! - [`DeviceHandler`]: the input layer's record of one device. It owns the
//!   calibration and dead-zone tables, turns raw samples into canonical
//!   [`HidEvent`]s, and doubles as the *placeholder* for a device that saved
//!   bindings refer to but which is not connected.
//!
//! Handlers are shared as `Arc<DeviceHandler>`. Resolving a placeholder swaps
//! the interior state under the handler's lock, so every holder of the `Arc`
//! sees the real device without any pointer swap.

use crate::calibration::{apply_dead_zone, AxisCalibration};
use crate::description::{ControlDescription, ControllerDescription};
use crate::event::{AxisUsage, DeviceId, EventState, HidEvent, HAT_SWITCH_USAGE};
use crate::hat::{hat_direction_from_raw, HatSwitchType};
use crate::metadata::{DeviceIdentity, DeviceMeta};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;
use tracing::{debug, trace};

/// Kind of a raw control element.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ElementKind {
    Axis,
    Trigger,
    Button,
    HatSwitch(HatSwitchType),
    Key,
}

/// Describes a control element exposed by a device.
///
/// Sources populate this from device descriptors so handlers can scale values
/// and so generic controller descriptions get stable names.
#[derive(Clone, Debug, PartialEq)]
pub struct ElementInfo {
    /// Per-device hardware identifier of the control.
    pub cookie: u32,
    pub kind: ElementKind,
    pub usage_page: u16,
    /// HID usage (axis usage, button number, keycode).
    pub usage: u16,
    /// Descriptor range; used as the fallback calibration.
    pub logical_min: i32,
    pub logical_max: i32,
    /// Hat values are degrees rather than slots.
    pub hat_is_degrees: bool,
    pub name: Option<String>,
}

impl ElementInfo {
    pub fn axis(cookie: u32, usage: u16, logical_min: i32, logical_max: i32) -> Self {
        Self {
            cookie,
            kind: ElementKind::Axis,
            usage_page: 0x01,
            usage,
            logical_min,
            logical_max,
            hat_is_degrees: false,
            name: None,
        }
    }

    pub fn trigger(cookie: u32, usage: u16, logical_min: i32, logical_max: i32) -> Self {
        Self {
            kind: ElementKind::Trigger,
            ..Self::axis(cookie, usage, logical_min, logical_max)
        }
    }

    pub fn button(cookie: u32, number: u16) -> Self {
        Self {
            cookie,
            kind: ElementKind::Button,
            usage_page: 0x09,
            usage: number,
            logical_min: 0,
            logical_max: 1,
            hat_is_degrees: false,
            name: None,
        }
    }

    pub fn hat_switch(cookie: u32, hat_type: HatSwitchType, logical_min: i32, logical_max: i32) -> Self {
        Self {
            cookie,
            kind: ElementKind::HatSwitch(hat_type),
            usage_page: 0x01,
            usage: HAT_SWITCH_USAGE,
            logical_min,
            logical_max,
            hat_is_degrees: false,
            name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_degrees(mut self) -> Self {
        self.hat_is_degrees = true;
        self
    }

    pub fn default_calibration(&self) -> AxisCalibration {
        AxisCalibration::new(self.logical_min as i64, self.logical_max as i64)
    }

    /// Representative event of this element, used to synthesize generic descriptions.
    pub fn generic_event(&self) -> HidEvent {
        let now = Instant::now();
        match self.kind {
            ElementKind::Axis => {
                HidEvent::axis(None, now, self.cookie, AxisUsage::from_usage(self.usage), 1.0)
            }
            ElementKind::Trigger => {
                HidEvent::trigger(None, now, self.cookie, AxisUsage::from_usage(self.usage), 1.0)
            }
            ElementKind::Button => HidEvent::button(None, now, self.cookie, self.usage, EventState::On),
            ElementKind::HatSwitch(t) => HidEvent::hat_switch(
                None,
                now,
                self.cookie,
                t,
                crate::hat::HatDirection::NORTH,
            ),
            ElementKind::Key => HidEvent::keyboard(None, now, self.usage, EventState::On),
        }
    }
}

/// One raw value reported by a source.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RawSample {
    pub cookie: u32,
    /// Keycode for keyboard sources; otherwise informational.
    pub usage: u16,
    pub value: i64,
}

impl RawSample {
    pub fn new(cookie: u32, value: i64) -> Self {
        Self {
            cookie,
            usage: 0,
            value,
        }
    }

    pub fn key(keycode: u16, pressed: bool) -> Self {
        Self {
            cookie: 0,
            usage: keycode,
            value: pressed as i64,
        }
    }
}

/// A raw input source.
pub trait Device: Send {
    /// Drain pending samples.
    fn poll(&mut self) -> Vec<RawSample>;
    fn name(&self) -> &str;
    /// Stable unique identifier (see [`DeviceIdentity::unique_identifier`]).
    fn id(&self) -> &str;
    fn identity(&self) -> DeviceIdentity;
    fn metadata(&self) -> DeviceMeta {
        DeviceMeta::default()
    }
    fn describe(&self) -> Vec<ElementInfo>;
}

#[derive(Debug)]
struct HandlerState {
    device_number: u32,
    identity: Option<DeviceIdentity>,
    meta: DeviceMeta,
    connected: bool,
    placeholder: bool,
    controller: Option<Arc<ControllerDescription>>,
    elements: HashMap<u32, ElementInfo>,
    calibrations: HashMap<u32, AxisCalibration>,
    dead_zones: HashMap<u32, f64>,
    default_dead_zone: f64,
    auto_calibrated: bool,
    pending: VecDeque<HidEvent>,
    pending_capacity: usize,
}

/// The input layer's view of one device.
#[derive(Debug)]
pub struct DeviceHandler {
    id: DeviceId,
    state: RwLock<HandlerState>,
}

/// Arguments for turning a handler into (or back into) a live device.
#[derive(Clone, Debug, Default)]
pub struct DeviceArrival {
    pub identity: DeviceIdentity,
    pub meta: DeviceMeta,
    pub elements: Vec<ElementInfo>,
    pub controller: Option<Arc<ControllerDescription>>,
}

impl DeviceHandler {
    pub(crate) fn connected(
        device_number: u32,
        arrival: DeviceArrival,
        default_dead_zone: f64,
        auto_calibrated: bool,
        pending_capacity: usize,
    ) -> Self {
        let handler = Self::placeholder(
            arrival.identity.device_id(),
            default_dead_zone,
            pending_capacity,
        );
        handler.write().auto_calibrated = auto_calibrated;
        handler.resolve(device_number, arrival);
        handler
    }

    /// A handler for a device that is referenced but not connected.
    pub fn placeholder(id: DeviceId, default_dead_zone: f64, pending_capacity: usize) -> Self {
        Self {
            id,
            state: RwLock::new(HandlerState {
                device_number: 0,
                identity: None,
                meta: DeviceMeta::default(),
                connected: false,
                placeholder: true,
                controller: None,
                elements: HashMap::new(),
                calibrations: HashMap::new(),
                dead_zones: HashMap::new(),
                default_dead_zone,
                auto_calibrated: false,
                pending: VecDeque::new(),
                pending_capacity,
            }),
        }
    }

    // A poisoned lock only means another thread panicked mid-update; the
    // tables stay structurally valid, so keep going with the inner value.
    fn read(&self) -> RwLockReadGuard<'_, HandlerState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HandlerState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Turn this handler into the live device. Returns events buffered while
    /// it was a placeholder, in arrival order, for the caller to dispatch once.
    pub(crate) fn resolve(&self, device_number: u32, arrival: DeviceArrival) -> Vec<HidEvent> {
        let mut st = self.write();
        st.device_number = device_number;
        st.meta = arrival.meta;
        st.elements = arrival
            .elements
            .into_iter()
            .map(|e| (e.cookie, e))
            .collect();
        if arrival.controller.is_some() {
            st.controller = arrival.controller;
        }
        st.identity = Some(arrival.identity);
        st.connected = true;
        let was_placeholder = std::mem::replace(&mut st.placeholder, false);
        let flushed: Vec<HidEvent> = st.pending.drain(..).collect();
        if was_placeholder {
            debug!(device = %self.id, buffered = flushed.len(), "placeholder resolved");
        }
        flushed
    }

    /// Device went away: keep every table, start buffering.
    pub(crate) fn disconnect(&self) {
        let mut st = self.write();
        st.connected = false;
        st.placeholder = true;
    }

    /// Buffer `event` if this handler is a placeholder, otherwise hand it back.
    pub(crate) fn buffer_if_placeholder(&self, event: HidEvent) -> Option<HidEvent> {
        let mut st = self.write();
        if !st.placeholder {
            return Some(event);
        }
        if st.pending_capacity == 0 {
            return None;
        }
        if st.pending.len() == st.pending_capacity {
            st.pending.pop_front();
        }
        trace!(device = %self.id, "event buffered on placeholder");
        st.pending.push_back(event);
        None
    }

    pub fn device_identifier(&self) -> &DeviceId {
        &self.id
    }

    pub fn unique_identifier(&self) -> &str {
        self.id.as_str()
    }

    pub fn device_number(&self) -> u32 {
        self.read().device_number
    }

    pub fn identity(&self) -> Option<DeviceIdentity> {
        self.read().identity.clone()
    }

    pub fn metadata(&self) -> DeviceMeta {
        self.read().meta.clone()
    }

    pub fn product(&self) -> Option<String> {
        self.read().meta.product.clone()
    }

    pub fn vendor_id(&self) -> Option<u16> {
        self.read().identity.as_ref().map(|i| i.vendor_id)
    }

    pub fn product_id(&self) -> Option<u16> {
        self.read().identity.as_ref().map(|i| i.product_id)
    }

    pub fn is_placeholder(&self) -> bool {
        self.read().placeholder
    }

    pub fn is_connected(&self) -> bool {
        self.read().connected
    }

    pub fn is_keyboard(&self) -> bool {
        self.read()
            .identity
            .as_ref()
            .map(|i| i.is_keyboard)
            .unwrap_or(false)
    }

    pub fn pending_event_count(&self) -> usize {
        self.read().pending.len()
    }

    pub fn controller_description(&self) -> Option<Arc<ControllerDescription>> {
        self.read().controller.clone()
    }

    pub fn elements(&self) -> Vec<ElementInfo> {
        let st = self.read();
        let mut out: Vec<_> = st.elements.values().cloned().collect();
        out.sort_by_key(|e| e.cookie);
        out
    }

    pub fn default_dead_zone(&self) -> f64 {
        self.read().default_dead_zone
    }

    pub fn set_default_dead_zone(&self, dead_zone: f64) {
        self.write().default_dead_zone = dead_zone;
    }

    pub fn dead_zone_for_control_cookie(&self, cookie: u32) -> f64 {
        let st = self.read();
        st.dead_zones
            .get(&cookie)
            .copied()
            .unwrap_or(st.default_dead_zone)
    }

    pub fn dead_zone_for_control(&self, control: &ControlDescription) -> f64 {
        self.dead_zone_for_control_cookie(control.cookie())
    }

    pub fn set_dead_zone_for_control(&self, control: &ControlDescription, dead_zone: f64) {
        self.set_dead_zone_for_control_cookie(control.cookie(), dead_zone);
    }

    pub fn set_dead_zone_for_control_cookie(&self, cookie: u32, dead_zone: f64) {
        self.write().dead_zones.insert(cookie, dead_zone);
    }

    pub fn is_auto_calibrated(&self) -> bool {
        self.read().auto_calibrated
    }

    pub fn set_auto_calibrated(&self, enabled: bool) {
        self.write().auto_calibrated = enabled;
    }

    pub fn calibration_for_control_cookie(&self, cookie: u32) -> Option<AxisCalibration> {
        self.read().calibrations.get(&cookie).copied()
    }

    pub fn set_calibration_for_control_cookie(&self, cookie: u32, calibration: AxisCalibration) {
        self.write().calibrations.insert(cookie, calibration);
    }

    /// Scale `raw` using the stored calibration for `cookie`, or `fallback`.
    ///
    /// With auto-calibration on, the stored calibration grows to include `raw`
    /// first (seeded from `fallback` on first sight).
    pub fn scaled_value(&self, raw: i64, cookie: u32, fallback: AxisCalibration) -> f64 {
        self.calibration_for(raw, cookie, fallback).scaled_value(raw)
    }

    pub fn apply_dead_zone_to_scaled_value(&self, value: f64, cookie: u32) -> f64 {
        apply_dead_zone(value, self.dead_zone_for_control_cookie(cookie))
    }

    /// [`scaled_value`](Self::scaled_value) followed by the dead zone.
    pub fn calibrated_value(&self, raw: i64, cookie: u32, fallback: AxisCalibration) -> f64 {
        let scaled = self.scaled_value(raw, cookie, fallback);
        self.apply_dead_zone_to_scaled_value(scaled, cookie)
    }

    fn calibration_for(&self, raw: i64, cookie: u32, fallback: AxisCalibration) -> AxisCalibration {
        {
            let st = self.read();
            if !st.auto_calibrated {
                return st.calibrations.get(&cookie).copied().unwrap_or(fallback);
            }
        }
        let mut st = self.write();
        let cal = st.calibrations.entry(cookie).or_insert(fallback);
        cal.expand_to_include(raw);
        *cal
    }

    /// Build the canonical event for a raw sample.
    ///
    /// Returns `None` for cookies this device never described.
    pub fn event_from_raw(&self, sample: &RawSample, timestamp: Instant) -> Option<HidEvent> {
        let device = Some(self.id.clone());
        if self.is_keyboard() {
            return Some(HidEvent::keyboard(
                device,
                timestamp,
                sample.usage,
                EventState::from_pressed(sample.value != 0),
            ));
        }

        let element = self.read().elements.get(&sample.cookie).cloned()?;
        let event = match element.kind {
            ElementKind::Axis => {
                let value =
                    self.calibrated_value(sample.value, element.cookie, element.default_calibration());
                HidEvent::axis(
                    device,
                    timestamp,
                    element.cookie,
                    AxisUsage::from_usage(element.usage),
                    value,
                )
            }
            ElementKind::Trigger => {
                let cal = self.calibration_for(sample.value, element.cookie, element.default_calibration());
                let value = self.apply_dead_zone_to_scaled_value(
                    cal.scaled_trigger_value(sample.value),
                    element.cookie,
                );
                HidEvent::trigger(
                    device,
                    timestamp,
                    element.cookie,
                    AxisUsage::from_usage(element.usage),
                    value,
                )
            }
            ElementKind::Button => HidEvent::button(
                device,
                timestamp,
                element.cookie,
                element.usage,
                EventState::from_pressed(sample.value != 0),
            ),
            ElementKind::HatSwitch(hat_type) => {
                let raw = sample.value.clamp(i32::MIN as i64, i32::MAX as i64) as i32;
                let direction = hat_direction_from_raw(
                    raw,
                    element.logical_min,
                    element.logical_max,
                    element.hat_is_degrees,
                    hat_type,
                );
                HidEvent::hat_switch(device, timestamp, element.cookie, hat_type, direction)
            }
            ElementKind::Key => HidEvent::keyboard(
                device,
                timestamp,
                element.usage,
                EventState::from_pressed(sample.value != 0),
            ),
        };
        Some(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{AxisDirection, EventKind};
    use crate::hat::HatDirection;

    fn pad() -> DeviceHandler {
        let arrival = DeviceArrival {
            identity: DeviceIdentity::new(0x1234, 0x5678).with_serial("S1"),
            meta: DeviceMeta::default(),
            elements: vec![
                ElementInfo::axis(3, 0x30, -32768, 32767),
                ElementInfo::trigger(5, 0x35, 0, 255),
                ElementInfo::button(9, 1),
                ElementInfo::hat_switch(11, HatSwitchType::EightWays, 0, 7),
            ],
            controller: None,
        };
        DeviceHandler::connected(1, arrival, 0.2, false, 8)
    }

    #[test]
    fn axis_samples_are_calibrated_and_dead_zoned() {
        let dev = pad();
        let e = dev.event_from_raw(&RawSample::new(3, 16384), Instant::now()).unwrap();
        assert_eq!(e.direction(), AxisDirection::Positive);
        assert!((e.value() - 0.5).abs() < 1e-3);

        let small = dev.event_from_raw(&RawSample::new(3, 3000), Instant::now()).unwrap();
        assert_eq!(small.direction(), AxisDirection::Null);
        assert_eq!(small.value(), 0.0);
    }

    #[test]
    fn per_control_dead_zone_overrides_default() {
        let dev = pad();
        dev.set_dead_zone_for_control_cookie(3, 0.05);
        assert_eq!(dev.dead_zone_for_control_cookie(3), 0.05);
        assert_eq!(dev.dead_zone_for_control_cookie(5), 0.2);
        let e = dev.event_from_raw(&RawSample::new(3, 3000), Instant::now()).unwrap();
        assert_eq!(e.direction(), AxisDirection::Positive);
    }

    #[test]
    fn stored_calibration_wins() {
        let dev = pad();
        dev.set_calibration_for_control_cookie(3, AxisCalibration::new(-100, 100));
        let e = dev.event_from_raw(&RawSample::new(3, 100), Instant::now()).unwrap();
        assert_eq!(e.value(), 1.0);
    }

    #[test]
    fn auto_calibration_expands() {
        let dev = pad();
        dev.set_auto_calibrated(true);
        dev.set_calibration_for_control_cookie(3, AxisCalibration::new(-100, 100));
        dev.event_from_raw(&RawSample::new(3, 400), Instant::now());
        assert_eq!(dev.calibration_for_control_cookie(3).unwrap().max, 400);
    }

    #[test]
    fn trigger_button_and_hat() {
        let dev = pad();
        let t = dev.event_from_raw(&RawSample::new(5, 255), Instant::now()).unwrap();
        assert!(matches!(t.kind(), EventKind::Trigger { direction: AxisDirection::Positive, .. }));
        let b = dev.event_from_raw(&RawSample::new(9, 1), Instant::now()).unwrap();
        assert_eq!(b.state(), EventState::On);
        let h = dev.event_from_raw(&RawSample::new(11, 3), Instant::now()).unwrap();
        assert_eq!(h.hat_direction(), HatDirection::SOUTH_EAST);
        assert!(dev.event_from_raw(&RawSample::new(99, 1), Instant::now()).is_none());
    }

    #[test]
    fn placeholder_buffers_until_resolved() {
        let id = DeviceId::new("1234:5678:S1");
        let ph = DeviceHandler::placeholder(id.clone(), 0.2, 2);
        ph.set_dead_zone_for_control_cookie(3, 0.4);
        for n in 0..3 {
            let ev = HidEvent::button(Some(id.clone()), Instant::now(), 9, n, EventState::On);
            assert!(ph.buffer_if_placeholder(ev).is_none());
        }
        assert_eq!(ph.pending_event_count(), 2);

        let flushed = ph.resolve(
            4,
            DeviceArrival {
                identity: DeviceIdentity::new(0x1234, 0x5678).with_serial("S1"),
                ..DeviceArrival::default()
            },
        );
        assert_eq!(flushed.len(), 2);
        assert_eq!(flushed[0].button_number(), Some(1));
        assert!(!ph.is_placeholder());
        assert_eq!(ph.pending_event_count(), 0);
        assert_eq!(ph.dead_zone_for_control_cookie(3), 0.4);
        assert_eq!(ph.device_number(), 4);
    }
}
