use corebind::{
    BindingSource, BindingsController, DeviceArrival, DeviceIdentity, DeviceManager, ElementInfo, EventState,
    HidEvent, InputConfig, MonitorId, RawSample, SystemDescription,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

fn identity() -> DeviceIdentity {
    DeviceIdentity::new(0x2dc8, 0x6101).with_serial("X")
}

fn arrival() -> DeviceArrival {
    DeviceArrival {
        identity: identity(),
        elements: vec![ElementInfo::button(10, 1), ElementInfo::axis(1, 0x30, 0, 255)],
        ..DeviceArrival::default()
    }
}

fn press(cookie: u32) -> HidEvent {
    HidEvent::button(Some(identity().device_id()), Instant::now(), cookie, 1, EventState::On)
}

fn counter(manager: &DeviceManager) -> Arc<AtomicUsize> {
    let seen = Arc::new(AtomicUsize::new(0));
    let s = seen.clone();
    manager.add_unhandled_event_monitor(move |_: &HidEvent| {
        s.fetch_add(1, Ordering::SeqCst);
        false
    });
    seen
}

#[test]
fn placeholder_resolves_in_place_without_duplicates() {
    let system = Arc::new(
        SystemDescription::builder("sys", "Sys")
            .players(2)
            .keys(["A", "B"])
            .build()
            .unwrap(),
    );
    let bindings = Arc::new(BindingsController::new());
    let table = bindings.register_system(system);
    bindings
        .from_json_str(r#"{ "sys": { "devices": { "2dc8:6101:X": { "player": 2, "bindings": { "A": "button:1:10:on" } } } } }"#)
        .unwrap();

    let manager = DeviceManager::default();
    manager.add_observer(bindings.clone());
    let seen = counter(&manager);

    let placeholder = manager.device_handler_for_unique_identifier("2dc8:6101:X");
    assert!(placeholder.is_placeholder());

    assert!(!manager.dispatch_event(press(10)));
    assert!(!manager.dispatch_event(press(10)));
    assert_eq!(seen.load(Ordering::SeqCst), 0);
    assert_eq!(placeholder.pending_event_count(), 2);

    let real = manager.device_did_connect(arrival());
    assert!(Arc::ptr_eq(&placeholder, &real));
    assert!(!real.is_placeholder());
    assert_eq!(real.pending_event_count(), 0);
    assert_eq!(seen.load(Ordering::SeqCst), 2);

    // Live events go straight through now.
    manager.dispatch_event(press(10));
    assert_eq!(seen.load(Ordering::SeqCst), 3);

    let sb = table.read().unwrap();
    assert_eq!(sb.device_identifiers(), vec![identity().device_id()]);
    assert_eq!(sb.player_for_device(&identity().device_id()), Some(2));
    let source = BindingSource::Device(identity().device_id());
    assert_eq!(sb.binding_for_key(&source, 2, "A").unwrap().event().button_number(), Some(1));
    assert_eq!(manager.device_handlers().len(), 1);
    assert!(manager.placeholder_device_handlers().is_empty());
}

#[test]
fn disconnect_buffers_and_reconnect_replays_once() {
    let manager = DeviceManager::new(InputConfig {
        placeholder_buffer_len: 2,
        ..InputConfig::default()
    });
    let seen = counter(&manager);
    let handler = manager.device_did_connect(arrival());
    handler.set_dead_zone_for_control_cookie(1, 0.5);

    assert!(manager.device_did_disconnect(&identity().device_id()));
    assert!(handler.is_placeholder());
    for _ in 0..3 {
        manager.dispatch_event(press(10));
    }
    assert_eq!(handler.pending_event_count(), 2);
    assert_eq!(seen.load(Ordering::SeqCst), 0);

    manager.device_did_connect(arrival());
    assert_eq!(seen.load(Ordering::SeqCst), 2);
    // Tables survive the round trip through placeholder state.
    assert_eq!(handler.dead_zone_for_control_cookie(1), 0.5);
}

#[test]
fn unknown_device_events_create_a_placeholder() {
    let manager = DeviceManager::default();
    let seen = counter(&manager);
    manager.dispatch_event(press(10));
    assert_eq!(seen.load(Ordering::SeqCst), 0);
    let h = manager.device_handler(&identity().device_id()).unwrap();
    assert!(h.is_placeholder());
    assert_eq!(h.pending_event_count(), 1);
}

#[test]
fn monitor_removes_itself_from_its_callback() {
    let manager = Arc::new(DeviceManager::default());
    manager.device_did_connect(arrival());
    let calls = Arc::new(AtomicUsize::new(0));
    let own_id: Arc<Mutex<Option<MonitorId>>> = Arc::default();

    let (m, c, slot) = (Arc::downgrade(&manager), calls.clone(), own_id.clone());
    let id = manager.add_event_monitor_for_device(&identity().device_id(), move |_: &HidEvent| {
        c.fetch_add(1, Ordering::SeqCst);
        if let (Some(manager), Some(id)) = (m.upgrade(), *slot.lock().unwrap()) {
            assert!(manager.remove_monitor(id));
        }
        true
    });
    *own_id.lock().unwrap() = Some(id);

    assert!(manager.dispatch_raw(&identity().device_id(), &RawSample::new(10, 1)));
    assert!(!manager.dispatch_raw(&identity().device_id(), &RawSample::new(10, 0)));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(!manager.has_event_monitor(id));
}

#[test]
fn removing_a_device_drops_its_monitors() {
    let manager = DeviceManager::default();
    manager.device_did_connect(arrival());
    let id = manager.add_event_monitor_for_device(&identity().device_id(), |_: &HidEvent| true);
    assert!(manager.remove_device(&identity().device_id()).is_some());
    assert!(!manager.has_event_monitor(id));
    assert!(manager.device_handler(&identity().device_id()).is_none());
}

#[test]
fn raw_axis_samples_honour_calibration() {
    let manager = DeviceManager::default();
    let handler = manager.device_did_connect(arrival());
    let values = Arc::new(Mutex::new(Vec::new()));
    let v = values.clone();
    manager.add_unhandled_event_monitor(move |e: &HidEvent| {
        v.lock().unwrap().push(e.value());
        false
    });
    // center = (0 + 255 + 1) / 2 = 128
    manager.dispatch_raw(&identity().device_id(), &RawSample::new(1, 255));
    manager.dispatch_raw(&identity().device_id(), &RawSample::new(1, 140));
    manager.dispatch_raw(&identity().device_id(), &RawSample::new(1, 0));
    assert_eq!(*values.lock().unwrap(), vec![1.0, 0.0, -1.0]);
    assert_eq!(handler.calibration_for_control_cookie(1), None);
}
