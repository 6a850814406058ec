//! Device registry and event dispatch.
//!
//! [`DeviceManager`] is the explicitly constructed context the host hands to
//! the input layer. It owns:
//!
//! - one [`DeviceHandler`] per unique device identifier, connected or not;
//! - the [`InputEventBus`] events are dispatched through;
//! - observers told about arrivals, disconnects and placeholder resolution;
//! - polled sources and per-device reader threads.
//!
//! Unknown identifiers never fail: asking for one yields a placeholder
//! handler, which buffers events until a device with that identifier
//! connects and resolves it in place.

use crate::backends::report::{ParserRequest, ReportParser};
use crate::bindings::BindingsController;
use crate::config::InputConfig;
use crate::description::{ControllerDescription, ControllerRegistry};
use crate::device::{Device, DeviceArrival, DeviceHandler, ElementKind, RawSample};
use crate::error::{Error, Result};
use crate::event::{DeviceId, HidEvent};
use crate::eventbus::{EventFilter, EventMonitor, InputEventBus, MonitorId, MonitorScope};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// Device lifecycle changes reported to observers.
#[derive(Clone, Debug)]
pub enum DeviceNotification {
    Added(Arc<DeviceHandler>),
    /// The handler is now a placeholder; its tables are kept.
    Disconnected(Arc<DeviceHandler>),
    /// A placeholder became the live device again.
    PlaceholderResolved(Arc<DeviceHandler>),
    Removed(DeviceId),
}

pub trait DeviceObserver: Send + Sync {
    fn device_notification(&self, notification: &DeviceNotification);
}

impl DeviceObserver for BindingsController {
    fn device_notification(&self, notification: &DeviceNotification) {
        match notification {
            DeviceNotification::Added(h) | DeviceNotification::PlaceholderResolved(h) => {
                // Keyboard events bind through the per-player keyboard tables.
                if !h.is_keyboard() {
                    self.device_did_connect(h.device_identifier(), h.controller_description());
                }
            }
            DeviceNotification::Disconnected(h) => self.device_did_disconnect(h.device_identifier()),
            DeviceNotification::Removed(id) => self.device_did_disconnect(id),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

struct Source {
    device: DeviceId,
    inner: Box<dyn Device>,
}

pub struct DeviceManager {
    config: InputConfig,
    registry: RwLock<ControllerRegistry>,
    handlers: RwLock<BTreeMap<DeviceId, Arc<DeviceHandler>>>,
    next_device_number: AtomicU32,
    bus: InputEventBus,
    observers: RwLock<Vec<(ObserverId, Arc<dyn DeviceObserver>)>>,
    next_observer: AtomicU64,
    sources: Mutex<Vec<Source>>,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

impl Default for DeviceManager {
    fn default() -> Self {
        Self::new(InputConfig::default())
    }
}

impl DeviceManager {
    pub fn new(config: InputConfig) -> Self {
        Self {
            config,
            registry: RwLock::new(ControllerRegistry::new()),
            handlers: RwLock::new(BTreeMap::new()),
            next_device_number: AtomicU32::new(1),
            bus: InputEventBus::new(),
            observers: RwLock::new(Vec::new()),
            next_observer: AtomicU64::new(0),
            sources: Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &InputConfig {
        &self.config
    }

    pub fn event_bus(&self) -> &InputEventBus {
        &self.bus
    }

    pub fn register_controller(&self, description: ControllerDescription) -> Arc<ControllerDescription> {
        write(&self.registry).register(description)
    }

    pub fn register_controller_toml(&self, text: &str) -> Result<Arc<ControllerDescription>> {
        write(&self.registry).register_toml_str(text)
    }

    fn controller_for(&self, arrival: &DeviceArrival) -> Option<Arc<ControllerDescription>> {
        if arrival.controller.is_some() || arrival.identity.is_keyboard {
            return arrival.controller.clone();
        }
        let identity = &arrival.identity;
        if let Some(known) = read(&self.registry).for_vendor_product(identity.vendor_id, identity.product_id) {
            return Some(known);
        }
        let name = arrival
            .meta
            .product
            .clone()
            .unwrap_or_else(|| "Generic Controller".to_string());
        let events = arrival
            .elements
            .iter()
            .filter(|e| e.kind != ElementKind::Key)
            .map(|e| e.generic_event());
        Some(Arc::new(ControllerDescription::generic(
            format!("generic:{:04x}:{:04x}", identity.vendor_id, identity.product_id),
            name,
            events,
        )))
    }

    /// A device arrived. An existing handler for its identifier (placeholder
    /// or stale) is resolved in place; events it buffered are dispatched once,
    /// after observers have been told.
    pub fn device_did_connect(&self, mut arrival: DeviceArrival) -> Arc<DeviceHandler> {
        let id = arrival.identity.device_id();
        arrival.controller = self.controller_for(&arrival);
        let number = self.next_device_number.fetch_add(1, Ordering::Relaxed);

        let (handler, flushed, notification) = {
            let mut handlers = write(&self.handlers);
            match handlers.get(&id) {
                Some(existing) => {
                    let existing = Arc::clone(existing);
                    let was_placeholder = existing.is_placeholder();
                    let flushed = existing.resolve(number, arrival);
                    let n = if was_placeholder {
                        DeviceNotification::PlaceholderResolved(Arc::clone(&existing))
                    } else {
                        DeviceNotification::Added(Arc::clone(&existing))
                    };
                    (existing, flushed, n)
                }
                None => {
                    let handler = Arc::new(DeviceHandler::connected(
                        number,
                        arrival,
                        self.config.default_dead_zone,
                        self.config.auto_calibrate,
                        self.config.placeholder_buffer_len,
                    ));
                    handlers.insert(id.clone(), Arc::clone(&handler));
                    (Arc::clone(&handler), Vec::new(), DeviceNotification::Added(handler))
                }
            }
        };

        info!(
            device = %id,
            number,
            product = handler.product().as_deref().unwrap_or("-"),
            resolved = matches!(notification, DeviceNotification::PlaceholderResolved(_)),
            "device connected"
        );
        self.notify(&notification);
        for event in flushed {
            self.emit(&event);
        }
        handler
    }

    /// The device went away. Its handler becomes a placeholder and keeps its
    /// tables. Returns `false` for unknown identifiers.
    pub fn device_did_disconnect(&self, id: &DeviceId) -> bool {
        let Some(handler) = self.device_handler(id) else {
            return false;
        };
        handler.disconnect();
        info!(device = %id, "device disconnected");
        self.notify(&DeviceNotification::Disconnected(handler));
        true
    }

    /// Forget a device: its handler and per-device monitors are dropped.
    pub fn remove_device(&self, id: &DeviceId) -> Option<Arc<DeviceHandler>> {
        let handler = write(&self.handlers).remove(id)?;
        handler.disconnect();
        let monitors = self.bus.remove_device_monitors(id);
        info!(device = %id, monitors, "device removed");
        self.notify(&DeviceNotification::Removed(id.clone()));
        Some(handler)
    }

    pub fn device_handler(&self, id: &DeviceId) -> Option<Arc<DeviceHandler>> {
        read(&self.handlers).get(id).cloned()
    }

    /// Handler for `id`, creating a placeholder when none exists.
    pub fn device_handler_for_unique_identifier(&self, id: &str) -> Arc<DeviceHandler> {
        let id = DeviceId::new(id);
        if let Some(handler) = self.device_handler(&id) {
            return handler;
        }
        let mut handlers = write(&self.handlers);
        Arc::clone(handlers.entry(id.clone()).or_insert_with(|| {
            debug!(device = %id, "placeholder created");
            Arc::new(DeviceHandler::placeholder(
                id.clone(),
                self.config.default_dead_zone,
                self.config.placeholder_buffer_len,
            ))
        }))
    }

    /// Connected handlers in device-number order.
    pub fn device_handlers(&self) -> Vec<Arc<DeviceHandler>> {
        let mut out: Vec<_> = read(&self.handlers)
            .values()
            .filter(|h| h.is_connected())
            .cloned()
            .collect();
        out.sort_by_key(|h| h.device_number());
        out
    }

    pub fn controller_device_handlers(&self) -> Vec<Arc<DeviceHandler>> {
        self.device_handlers().into_iter().filter(|h| !h.is_keyboard()).collect()
    }

    pub fn keyboard_device_handlers(&self) -> Vec<Arc<DeviceHandler>> {
        self.device_handlers().into_iter().filter(|h| h.is_keyboard()).collect()
    }

    pub fn placeholder_device_handlers(&self) -> Vec<Arc<DeviceHandler>> {
        read(&self.handlers)
            .values()
            .filter(|h| h.is_placeholder())
            .cloned()
            .collect()
    }

    /// Build the event for a raw sample of `id` and dispatch it.
    pub fn dispatch_raw(&self, id: &DeviceId, sample: &RawSample) -> bool {
        let Some(handler) = self.device_handler(id) else {
            trace!(device = %id, "raw sample for unknown device dropped");
            return false;
        };
        match handler.event_from_raw(sample, Instant::now()) {
            Some(event) => self.dispatch_event(event),
            None => {
                trace!(device = %id, cookie = sample.cookie, "raw sample for undescribed element dropped");
                false
            }
        }
    }

    /// Dispatch an event to monitors. Events of placeholder devices are
    /// buffered instead. Returns `true` when a monitor handled it.
    pub fn dispatch_event(&self, event: HidEvent) -> bool {
        let event = match event.device() {
            Some(id) => {
                let handler = self.device_handler_for_unique_identifier(id.as_str());
                match handler.buffer_if_placeholder(event) {
                    Some(event) => event,
                    None => return false,
                }
            }
            None => event,
        };
        self.emit(&event)
    }

    fn emit(&self, event: &HidEvent) -> bool {
        trace!(event = %event, "dispatch");
        self.bus.emit(event)
    }

    pub fn add_event_monitor(
        &self,
        scope: MonitorScope,
        filter: EventFilter,
        monitor: impl EventMonitor + 'static,
    ) -> MonitorId {
        self.bus.add_monitor(scope, filter, monitor)
    }

    /// Sees every event first; returning `true` consumes it.
    pub fn add_global_event_monitor(&self, monitor: impl EventMonitor + 'static) -> MonitorId {
        self.add_event_monitor(MonitorScope::Global, EventFilter::All, monitor)
    }

    pub fn add_event_monitor_for_device(&self, device: &DeviceId, monitor: impl EventMonitor + 'static) -> MonitorId {
        self.add_event_monitor(MonitorScope::Device(device.clone()), EventFilter::All, monitor)
    }

    pub fn add_unhandled_event_monitor(&self, monitor: impl EventMonitor + 'static) -> MonitorId {
        self.add_event_monitor(MonitorScope::Unhandled, EventFilter::All, monitor)
    }

    /// Safe to call from inside any monitor callback.
    pub fn remove_monitor(&self, id: MonitorId) -> bool {
        self.bus.remove(id)
    }

    pub fn has_event_monitor(&self, id: MonitorId) -> bool {
        self.bus.contains(id)
    }

    pub fn add_observer(&self, observer: Arc<dyn DeviceObserver>) -> ObserverId {
        let id = ObserverId(self.next_observer.fetch_add(1, Ordering::Relaxed));
        write(&self.observers).push((id, observer));
        id
    }

    pub fn remove_observer(&self, id: ObserverId) -> bool {
        let mut observers = write(&self.observers);
        let before = observers.len();
        observers.retain(|(o, _)| *o != id);
        observers.len() != before
    }

    fn notify(&self, notification: &DeviceNotification) {
        let observers: Vec<_> = read(&self.observers).iter().map(|(_, o)| Arc::clone(o)).collect();
        for observer in observers {
            observer.device_notification(notification);
        }
    }

    fn arrival_of(source: &dyn Device) -> DeviceArrival {
        DeviceArrival {
            identity: source.identity(),
            meta: source.metadata(),
            elements: source.describe(),
            controller: None,
        }
    }

    fn sources(&self) -> MutexGuard<'_, Vec<Source>> {
        self.sources.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Connect `source` and poll it from [`poll_sources`](Self::poll_sources).
    pub fn add_source(&self, source: Box<dyn Device>) -> Arc<DeviceHandler> {
        let handler = self.device_did_connect(Self::arrival_of(source.as_ref()));
        self.sources().push(Source {
            device: handler.device_identifier().clone(),
            inner: source,
        });
        handler
    }

    /// Drop a polled source; its handler becomes a placeholder.
    pub fn remove_source(&self, id: &DeviceId) -> bool {
        let removed = {
            let mut sources = self.sources();
            let before = sources.len();
            sources.retain(|s| s.device != *id);
            sources.len() != before
        };
        if removed {
            self.device_did_disconnect(id);
        }
        removed
    }

    /// Open every device the enabled backends find and add it as a source.
    pub fn discover(
        &self,
        make_parser: impl Fn(&ParserRequest) -> Option<Box<dyn ReportParser>>,
    ) -> usize {
        let found = crate::backends::probe_devices(make_parser);
        let count = found.len();
        for source in found {
            self.add_source(source);
        }
        info!(count, "devices discovered");
        count
    }

    /// Poll every added source once and dispatch what they produced.
    /// Returns the number of samples dispatched.
    pub fn poll_sources(&self) -> usize {
        let cap = self.config.max_reports_per_tick.max(1);
        let batches: Vec<(DeviceId, Vec<RawSample>)> = self
            .sources()
            .iter_mut()
            .map(|s| {
                let mut samples = s.inner.poll();
                if samples.len() > cap {
                    warn!(device = %s.device, dropped = samples.len() - cap, "source produced more samples than one tick takes");
                    samples.truncate(cap);
                }
                (s.device.clone(), samples)
            })
            .collect();

        let mut count = 0;
        for (device, samples) in batches {
            for sample in &samples {
                self.dispatch_raw(&device, sample);
                count += 1;
            }
        }
        count
    }

    /// Connect `source` and read it on a dedicated thread until the returned
    /// handle is stopped or dropped, or the manager goes away. The device is
    /// disconnected when the reader ends.
    pub fn spawn_reader(self: &Arc<Self>, mut source: Box<dyn Device>) -> Result<ReaderHandle> {
        let handler = self.device_did_connect(Self::arrival_of(source.as_ref()));
        let device = handler.device_identifier().clone();
        let stop = Arc::new(AtomicBool::new(false));
        let manager: Weak<Self> = Arc::downgrade(self);
        let interval = Duration::from_millis(self.config.reader_poll_interval_ms);
        let cap = self.config.max_reports_per_tick.max(1);

        let thread = {
            let stop = Arc::clone(&stop);
            let device = device.clone();
            std::thread::Builder::new()
                .name(format!("corebind-reader-{device}"))
                .spawn(move || {
                    debug!(device = %device, "reader started");
                    while !stop.load(Ordering::Acquire) {
                        let Some(manager) = manager.upgrade() else {
                            break;
                        };
                        for sample in source.poll().iter().take(cap) {
                            manager.dispatch_raw(&device, sample);
                        }
                        drop(manager);
                        std::thread::sleep(interval);
                    }
                    if let Some(manager) = manager.upgrade() {
                        manager.device_did_disconnect(&device);
                    }
                    debug!(device = %device, "reader stopped");
                })
                .map_err(Error::Io)?
        };

        Ok(ReaderHandle {
            device,
            stop,
            thread: Some(thread),
        })
    }
}

/// Owns a reader thread started by [`DeviceManager::spawn_reader`].
pub struct ReaderHandle {
    device: DeviceId,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl ReaderHandle {
    pub fn device_identifier(&self) -> &DeviceId {
        &self.device
    }

    pub fn is_running(&self) -> bool {
        self.thread.as_ref().map(|t| !t.is_finished()).unwrap_or(false)
    }

    /// Stop the thread and wait for it to finish.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!(device = %self.device, "reader thread panicked");
            }
        }
    }
}

impl Drop for ReaderHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::virtual_input::VirtualDevice;
    use crate::device::ElementInfo;
    use crate::event::{AxisDirection, EventState};
    use crate::metadata::DeviceIdentity;
    use std::sync::atomic::AtomicUsize;

    fn pad_identity() -> DeviceIdentity {
        DeviceIdentity::new(0x054c, 0x05c4).with_serial("P1")
    }

    #[derive(Default)]
    struct Notes(Mutex<Vec<String>>);

    impl DeviceObserver for Notes {
        fn device_notification(&self, n: &DeviceNotification) {
            let line = match n {
                DeviceNotification::Added(h) => format!("added {}", h.unique_identifier()),
                DeviceNotification::Disconnected(h) => format!("disconnected {}", h.unique_identifier()),
                DeviceNotification::PlaceholderResolved(h) => format!("resolved {}", h.unique_identifier()),
                DeviceNotification::Removed(id) => format!("removed {id}"),
            };
            self.0.lock().unwrap().push(line);
        }
    }

    #[test]
    fn unknown_identifier_yields_placeholder() {
        let mgr = DeviceManager::default();
        let h = mgr.device_handler_for_unique_identifier("dead:beef:0");
        assert!(h.is_placeholder());
        assert!(!h.is_connected());
        let again = mgr.device_handler_for_unique_identifier("dead:beef:0");
        assert!(Arc::ptr_eq(&h, &again));
        assert!(mgr.device_handlers().is_empty());
        assert_eq!(mgr.placeholder_device_handlers().len(), 1);
    }

    #[test]
    fn connect_synthesizes_generic_controller() {
        let mgr = DeviceManager::default();
        let h = mgr.device_did_connect(DeviceArrival {
            identity: pad_identity(),
            elements: vec![ElementInfo::axis(1, 0x30, 0, 255), ElementInfo::button(2, 1)],
            ..DeviceArrival::default()
        });
        let controller = h.controller_description().unwrap();
        assert_eq!(controller.identifier(), "generic:054c:05c4");
        assert_eq!(controller.controls().len(), 2);
        assert_eq!(mgr.controller_device_handlers().len(), 1);
        assert!(mgr.keyboard_device_handlers().is_empty());
    }

    #[test]
    fn lifecycle_notifications() {
        let mgr = DeviceManager::default();
        let notes = Arc::new(Notes::default());
        let observer = mgr.add_observer(notes.clone());
        let arrival = DeviceArrival {
            identity: pad_identity(),
            ..DeviceArrival::default()
        };
        let id = pad_identity().device_id();
        mgr.device_did_connect(arrival.clone());
        assert!(mgr.device_did_disconnect(&id));
        mgr.device_did_connect(arrival);
        assert!(mgr.remove_device(&id).is_some());
        assert!(mgr.remove_observer(observer));
        assert_eq!(
            *notes.0.lock().unwrap(),
            vec![
                "added 054c:05c4:P1",
                "disconnected 054c:05c4:P1",
                "resolved 054c:05c4:P1",
                "removed 054c:05c4:P1",
            ]
        );
    }

    #[test]
    fn dispatch_order_and_consumption() {
        let mgr = DeviceManager::default();
        let id = pad_identity().device_id();
        mgr.device_did_connect(DeviceArrival {
            identity: pad_identity(),
            elements: vec![ElementInfo::button(2, 1)],
            ..DeviceArrival::default()
        });
        let order = Arc::new(Mutex::new(Vec::new()));
        let o = order.clone();
        mgr.add_event_monitor_for_device(&id, move |_: &HidEvent| {
            o.lock().unwrap().push("device");
            false
        });
        let o = order.clone();
        mgr.add_unhandled_event_monitor(move |_: &HidEvent| {
            o.lock().unwrap().push("unhandled");
            false
        });
        let o = order.clone();
        let global = mgr.add_global_event_monitor(move |e: &HidEvent| {
            o.lock().unwrap().push("global");
            e.state() == EventState::On
        });

        assert!(mgr.dispatch_raw(&id, &RawSample::new(2, 1)));
        assert!(!mgr.dispatch_raw(&id, &RawSample::new(2, 0)));
        assert_eq!(*order.lock().unwrap(), vec!["global", "global", "device", "unhandled"]);
        assert!(mgr.remove_monitor(global));
        assert!(!mgr.has_event_monitor(global));
    }

    #[test]
    fn poll_sources_dispatches_virtual_samples() {
        let mgr = DeviceManager::default();
        let pad = VirtualDevice::gamepad(pad_identity(), "Pad");
        let feeder = pad.feeder();
        mgr.add_source(Box::new(pad));

        let negatives = Arc::new(AtomicUsize::new(0));
        let n = negatives.clone();
        mgr.add_unhandled_event_monitor(move |e: &HidEvent| {
            if e.direction() == AxisDirection::Negative {
                n.fetch_add(1, Ordering::SeqCst);
            }
            false
        });
        feeder.feed(RawSample::new(1, -30000));
        feeder.feed(RawSample::new(10, 1));
        assert_eq!(mgr.poll_sources(), 2);
        assert_eq!(mgr.poll_sources(), 0);
        assert_eq!(negatives.load(Ordering::SeqCst), 1);

        assert!(mgr.remove_source(&pad_identity().device_id()));
        assert!(mgr.device_handler(&pad_identity().device_id()).unwrap().is_placeholder());
    }

    #[test]
    fn reader_thread_dispatches_and_disconnects_on_stop() {
        let mgr = Arc::new(DeviceManager::new(InputConfig {
            reader_poll_interval_ms: 1,
            ..InputConfig::default()
        }));
        let pad = VirtualDevice::gamepad(pad_identity(), "Pad");
        let feeder = pad.feeder();
        let seen = Arc::new(AtomicUsize::new(0));
        let s = seen.clone();
        mgr.add_unhandled_event_monitor(move |_: &HidEvent| {
            s.fetch_add(1, Ordering::SeqCst);
            false
        });

        let mut reader = mgr.spawn_reader(Box::new(pad)).unwrap();
        feeder.feed(RawSample::new(10, 1));
        let deadline = Instant::now() + Duration::from_secs(5);
        while seen.load(Ordering::SeqCst) == 0 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        reader.stop();
        assert!(!reader.is_running());
        assert!(mgr.device_handler(reader.device_identifier()).unwrap().is_placeholder());
    }
}
