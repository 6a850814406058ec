//! Event monitor registry.
//!
//! Monitors are registered in one of three scopes and see events in this
//! order:
//!
//! 1. [`MonitorScope::Global`]: every event. A global monitor returning `true`
//!    consumes the event and dispatch stops there.
//! 2. [`MonitorScope::Device`]: events of one device.
//! 3. [`MonitorScope::Unhandled`]: events no earlier monitor returned `true` for.
//!
//! Emission iterates over a snapshot of the registry taken under a short lock,
//! so a monitor may add or remove monitors (itself included) from inside its
//! own callback. A monitor removed mid-dispatch is not called again, even for
//! the event being dispatched.

use crate::event::{DeviceId, EventKind, HidEvent};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::trace;

/// Reacts to dispatched events. Returns `true` when it handled the event.
pub trait EventMonitor: Send + Sync {
    fn on_event(&self, event: &HidEvent) -> bool;
}

impl<F> EventMonitor for F
where
    F: Fn(&HidEvent) -> bool + Send + Sync,
{
    fn on_event(&self, event: &HidEvent) -> bool {
        self(event)
    }
}

/// Handle returned by registration; pass it to [`InputEventBus::remove`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MonitorId(u64);

/// Which kinds of events a monitor wants to receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventFilter {
    All,
    AxisOnly,
    ButtonsOnly,
    HatsOnly,
    KeysOnly,
    Custom(fn(&HidEvent) -> bool),
}

impl EventFilter {
    pub fn matches(&self, event: &HidEvent) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::AxisOnly => matches!(
                event.kind(),
                EventKind::Axis { .. } | EventKind::Trigger { .. }
            ),
            EventFilter::ButtonsOnly => matches!(event.kind(), EventKind::Button { .. }),
            EventFilter::HatsOnly => matches!(event.kind(), EventKind::HatSwitch { .. }),
            EventFilter::KeysOnly => matches!(event.kind(), EventKind::Keyboard { .. }),
            EventFilter::Custom(f) => f(event),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorScope {
    Global,
    Device(DeviceId),
    Unhandled,
}

struct MonitorEntry {
    id: MonitorId,
    scope: MonitorScope,
    filter: EventFilter,
    enabled: AtomicBool,
    removed: AtomicBool,
    monitor: Box<dyn EventMonitor>,
}

impl MonitorEntry {
    fn live(&self) -> bool {
        self.enabled.load(Ordering::Acquire) && !self.removed.load(Ordering::Acquire)
    }
}

#[derive(Default)]
pub struct InputEventBus {
    next_id: AtomicU64,
    monitors: Mutex<Vec<Arc<MonitorEntry>>>,
}

impl InputEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn monitors(&self) -> MutexGuard<'_, Vec<Arc<MonitorEntry>>> {
        self.monitors.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Registers a monitor in `scope`.
    pub fn add_monitor(
        &self,
        scope: MonitorScope,
        filter: EventFilter,
        monitor: impl EventMonitor + 'static,
    ) -> MonitorId {
        let id = MonitorId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.monitors().push(Arc::new(MonitorEntry {
            id,
            scope,
            filter,
            enabled: AtomicBool::new(true),
            removed: AtomicBool::new(false),
            monitor: Box::new(monitor),
        }));
        id
    }

    fn find(&self, id: MonitorId) -> Option<Arc<MonitorEntry>> {
        self.monitors().iter().find(|e| e.id == id).cloned()
    }

    /// Enables a previously registered monitor.
    pub fn enable(&self, id: MonitorId) {
        if let Some(entry) = self.find(id) {
            entry.enabled.store(true, Ordering::Release);
        }
    }

    /// Mutes a monitor without removing it.
    pub fn disable(&self, id: MonitorId) {
        if let Some(entry) = self.find(id) {
            entry.enabled.store(false, Ordering::Release);
        }
    }

    /// Unregisters a monitor. Safe from inside any callback, including its own.
    pub fn remove(&self, id: MonitorId) -> bool {
        let mut monitors = self.monitors();
        let Some(pos) = monitors.iter().position(|e| e.id == id) else {
            return false;
        };
        let entry = monitors.remove(pos);
        entry.removed.store(true, Ordering::Release);
        true
    }

    /// Drops every monitor scoped to `device`.
    pub fn remove_device_monitors(&self, device: &DeviceId) -> usize {
        let mut monitors = self.monitors();
        let before = monitors.len();
        monitors.retain(|e| {
            let keep = !matches!(&e.scope, MonitorScope::Device(d) if d == device);
            if !keep {
                e.removed.store(true, Ordering::Release);
            }
            keep
        });
        before - monitors.len()
    }

    pub fn contains(&self, id: MonitorId) -> bool {
        self.find(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.monitors().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Emits one event. Returns `true` when some monitor handled it.
    pub fn emit(&self, event: &HidEvent) -> bool {
        let snapshot: Vec<Arc<MonitorEntry>> = self.monitors().clone();

        for entry in snapshot.iter().filter(|e| e.scope == MonitorScope::Global) {
            if entry.live() && entry.filter.matches(event) && entry.monitor.on_event(event) {
                trace!(monitor = entry.id.0, "event consumed by global monitor");
                return true;
            }
        }

        let mut handled = false;
        if let Some(device) = event.device() {
            for entry in &snapshot {
                let MonitorScope::Device(ref wanted) = entry.scope else {
                    continue;
                };
                if wanted == device && entry.live() && entry.filter.matches(event) {
                    handled |= entry.monitor.on_event(event);
                }
            }
        }

        if !handled {
            for entry in snapshot.iter().filter(|e| e.scope == MonitorScope::Unhandled) {
                if entry.live() && entry.filter.matches(event) {
                    handled |= entry.monitor.on_event(event);
                }
            }
        }
        handled
    }

    /// Emits a batch of events in order.
    pub fn emit_all(&self, events: &[HidEvent]) {
        for event in events {
            self.emit(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{AxisUsage, EventState};
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    fn button(device: &str) -> HidEvent {
        HidEvent::button(Some(DeviceId::new(device)), Instant::now(), 1, 1, EventState::On)
    }

    #[test]
    fn global_monitor_consumes() {
        let bus = InputEventBus::new();
        let seen = Arc::new(AtomicUsize::new(0));
        bus.add_monitor(MonitorScope::Global, EventFilter::All, |_: &HidEvent| true);
        let s = seen.clone();
        bus.add_monitor(MonitorScope::Unhandled, EventFilter::All, move |_: &HidEvent| {
            s.fetch_add(1, Ordering::SeqCst);
            false
        });
        assert!(bus.emit(&button("a")));
        assert_eq!(seen.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn device_monitors_only_see_their_device() {
        let bus = InputEventBus::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let s = seen.clone();
        bus.add_monitor(
            MonitorScope::Device(DeviceId::new("a")),
            EventFilter::All,
            move |_: &HidEvent| {
                s.fetch_add(1, Ordering::SeqCst);
                true
            },
        );
        bus.emit(&button("a"));
        bus.emit(&button("b"));
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(bus.remove_device_monitors(&DeviceId::new("a")), 1);
        assert!(bus.is_empty());
    }

    #[test]
    fn filters_and_disable() {
        let bus = InputEventBus::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let s = seen.clone();
        let id = bus.add_monitor(MonitorScope::Unhandled, EventFilter::AxisOnly, move |_: &HidEvent| {
            s.fetch_add(1, Ordering::SeqCst);
            false
        });
        bus.emit(&button("a"));
        let axis = HidEvent::axis(None, Instant::now(), 2, AxisUsage::X, 0.5);
        bus.emit(&axis);
        bus.disable(id);
        bus.emit(&axis);
        bus.enable(id);
        bus.emit(&axis);
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn monitor_can_remove_itself_and_later_monitors() {
        let bus = Arc::new(InputEventBus::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let ids = Arc::new(Mutex::new(Vec::<MonitorId>::new()));

        let (b, c, i) = (bus.clone(), calls.clone(), ids.clone());
        let first = bus.add_monitor(MonitorScope::Unhandled, EventFilter::All, move |_: &HidEvent| {
            c.fetch_add(1, Ordering::SeqCst);
            for id in i.lock().unwrap().iter() {
                b.remove(*id);
            }
            false
        });
        let c = calls.clone();
        let second = bus.add_monitor(MonitorScope::Unhandled, EventFilter::All, move |_: &HidEvent| {
            c.fetch_add(100, Ordering::SeqCst);
            false
        });
        ids.lock().unwrap().extend([first, second]);

        bus.emit(&button("a"));
        bus.emit(&button("a"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!bus.contains(first));
        assert!(!bus.contains(second));
    }
}
