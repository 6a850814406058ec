//! Scripted device source.
//!
//! A [`VirtualDevice`] is fed raw values by the host (or a test) and yields them
//! on the next poll, exactly like a hardware source would. Values are in device
//! units; the handler scales them with the element's logical range.

use crate::device::{Device, ElementInfo, RawSample};
use crate::hat::HatSwitchType;
use crate::metadata::{DeviceIdentity, DeviceMeta};
use std::sync::{Arc, Mutex};

/// Queue shared between a [`VirtualDevice`] and its [`VirtualFeeder`]s.
type Queue = Arc<Mutex<Vec<RawSample>>>;

pub struct VirtualDevice {
    id: String,
    name: String,
    identity: DeviceIdentity,
    elements: Vec<ElementInfo>,
    queue: Queue,
}

/// Handle for injecting samples into a device that has been moved onto a reader thread.
#[derive(Clone)]
pub struct VirtualFeeder {
    queue: Queue,
}

impl VirtualFeeder {
    pub fn feed(&self, sample: RawSample) {
        self.queue.lock().unwrap_or_else(|e| e.into_inner()).push(sample);
    }
}

impl VirtualDevice {
    pub fn new(identity: DeviceIdentity, name: &str) -> Self {
        Self {
            id: identity.unique_identifier(),
            name: name.to_string(),
            identity,
            elements: Vec::new(),
            queue: Arc::default(),
        }
    }

    /// A keyboard source; feed it with [`VirtualDevice::press_key`].
    pub fn keyboard() -> Self {
        Self::new(DeviceIdentity::keyboard(), "Virtual Keyboard")
    }

    /// Two 16-bit sticks (cookies 1..4), eight buttons (cookies 10..17,
    /// numbered 1..8) and an 8-way hat (cookie 20, slots 0..7).
    pub fn gamepad(identity: DeviceIdentity, name: &str) -> Self {
        let mut dev = Self::new(identity, name)
            .with_element(ElementInfo::axis(1, 0x30, -32768, 32767))
            .with_element(ElementInfo::axis(2, 0x31, -32768, 32767))
            .with_element(ElementInfo::axis(3, 0x33, -32768, 32767))
            .with_element(ElementInfo::axis(4, 0x34, -32768, 32767));
        for n in 1..=8u16 {
            dev = dev.with_element(ElementInfo::button(9 + n as u32, n));
        }
        dev.with_element(ElementInfo::hat_switch(20, HatSwitchType::EightWays, 0, 7))
    }

    pub fn with_element(mut self, element: ElementInfo) -> Self {
        self.elements.push(element);
        self
    }

    pub fn feeder(&self) -> VirtualFeeder {
        VirtualFeeder {
            queue: Arc::clone(&self.queue),
        }
    }

    /// Inject a raw sample.
    pub fn feed(&self, sample: RawSample) {
        self.feeder().feed(sample);
    }

    /// Convenience method to set an axis value.
    pub fn set_axis(&self, cookie: u32, value: i64) {
        self.feed(RawSample::new(cookie, value));
    }

    pub fn press_button(&self, cookie: u32) {
        self.feed(RawSample::new(cookie, 1));
    }

    pub fn release_button(&self, cookie: u32) {
        self.feed(RawSample::new(cookie, 0));
    }

    /// Hat slot (`-1` or out of range = centered).
    pub fn set_hat(&self, cookie: u32, slot: i64) {
        self.feed(RawSample::new(cookie, slot));
    }

    pub fn press_key(&self, keycode: u16) {
        self.feed(RawSample::key(keycode, true));
    }

    pub fn release_key(&self, keycode: u16) {
        self.feed(RawSample::key(keycode, false));
    }
}

impl Device for VirtualDevice {
    fn poll(&mut self) -> Vec<RawSample> {
        std::mem::take(&mut *self.queue.lock().unwrap_or_else(|e| e.into_inner()))
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn identity(&self) -> DeviceIdentity {
        self.identity.clone()
    }

    fn metadata(&self) -> DeviceMeta {
        DeviceMeta {
            bus: Some("virtual".into()),
            product: Some(self.name.clone()),
            ..DeviceMeta::default()
        }
    }

    fn describe(&self) -> Vec<ElementInfo> {
        self.elements.clone()
    }
}
