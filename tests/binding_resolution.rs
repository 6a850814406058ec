use corebind::backends::virtual_input::VirtualDevice;
use corebind::{
    AxisDirection, AxisUsage, BindingDescription, BindingSource, BindingsController, DeviceId, DeviceIdentity,
    DeviceManager, HatDirection, HatSwitchType, HidEvent, SystemBindings, SystemDescription, SystemKey,
    SystemResponder, SystemResponderClient,
};
use std::sync::{Arc, Mutex};
use std::time::Instant;

const SNES: &str = r#"
identifier = "openemu.system.snes"
name = "Super Nintendo"
players = 2
keys = ["Up", "Right", "Down", "Left", "A", "B", "Start"]

[hat_switches]
DPad = ["Up", "Right", "Down", "Left"]

[axes]
Horizontal = ["Left", "Right"]
Vertical = ["Up", "Down"]
"#;

fn snes() -> Arc<SystemDescription> {
    Arc::new(SystemDescription::from_toml_str(SNES).unwrap())
}

fn pad_identity() -> DeviceIdentity {
    DeviceIdentity::new(0x057e, 0x2009).with_serial("PRO1")
}

fn pad() -> BindingSource {
    BindingSource::Device(pad_identity().device_id())
}

#[derive(Default)]
struct Core {
    log: Mutex<Vec<String>>,
}

impl Core {
    fn take_sorted(&self) -> Vec<String> {
        let mut log = std::mem::take(&mut *self.log.lock().unwrap());
        log.sort();
        log
    }
}

impl SystemResponderClient for Core {
    fn did_push_key(&self, key: SystemKey) {
        self.log.lock().unwrap().push(format!("push {}:{}", key.player, key.key));
    }

    fn did_release_key(&self, key: SystemKey) {
        self.log.lock().unwrap().push(format!("release {}:{}", key.player, key.key));
    }
}

#[test]
fn axis_on_down_keeps_left_and_right_of_hat_group() {
    let mut sb = SystemBindings::new(snes());
    let hat = HidEvent::hat_switch(None, Instant::now(), 20, HatSwitchType::FourWays, HatDirection::NORTH);
    sb.assign_event(&pad(), 1, "Up", hat).unwrap();

    let axis = HidEvent::axis_with_direction(2, AxisUsage::Y, AxisDirection::Positive);
    let bound = sb.assign_event(&pad(), 1, "Down", axis).unwrap();
    assert!(matches!(bound, BindingDescription::OrientedGroup(_)));

    let left = sb.binding_for_key(&pad(), 1, "Left").unwrap();
    let right = sb.binding_for_key(&pad(), 1, "Right").unwrap();
    assert_eq!(left.event().hat_direction(), HatDirection::WEST);
    assert_eq!(right.event().hat_direction(), HatDirection::EAST);

    let down = sb.binding_for_key(&pad(), 1, "Down").unwrap();
    let up = sb.binding_for_key(&pad(), 1, "Up").unwrap();
    assert_eq!(down.event().direction(), AxisDirection::Positive);
    assert_eq!(up.event().direction(), AxisDirection::Negative);
    assert!(up.event().is_axis_direction_opposite_to(down.event()));
}

#[test]
fn one_motion_never_drives_two_keys() {
    let mut sb = SystemBindings::new(snes());
    let x = HidEvent::axis_with_direction(1, AxisUsage::X, AxisDirection::Negative);
    sb.assign_event(&pad(), 1, "Left", x.clone()).unwrap();
    // Rebinding the same control elsewhere drops the first orientation.
    sb.assign_event(&pad(), 1, "Up", x.clone()).unwrap();

    let live = HidEvent::axis(Some(pad_identity().device_id()), Instant::now(), 1, AxisUsage::X, -0.9);
    let active: Vec<_> = sb
        .resolve_event(&live)
        .into_iter()
        .filter(|r| r.is_activated_by(&live))
        .collect();
    assert_eq!(active.len(), 1);
    assert!(sb.binding_for_key(&pad(), 1, "Left").is_none());
}

#[test]
fn hat_diagonals_press_both_neighbours_through_the_manager() {
    let bindings = Arc::new(BindingsController::new());
    let table = bindings.register_system(snes());
    let manager = DeviceManager::default();
    manager.add_observer(bindings.clone());

    let device = VirtualDevice::gamepad(pad_identity(), "Pro Controller");
    let feeder = device.feeder();
    manager.add_source(Box::new(device));
    assert_eq!(table.read().unwrap().player_for_device(&pad_identity().device_id()), Some(1));

    let up = HidEvent::hat_switch(None, Instant::now(), 20, HatSwitchType::EightWays, HatDirection::NORTH);
    table.write().unwrap().assign_event(&pad(), 1, "Up", up).unwrap();

    let core = Arc::new(Core::default());
    let responder = SystemResponder::new(Arc::clone(&table));
    responder.set_client(Some(core.clone()));
    manager.add_global_event_monitor(responder);

    feeder.feed(corebind::RawSample::new(20, 1)); // NE
    manager.poll_sources();
    assert_eq!(core.take_sorted(), vec!["push 1:0", "push 1:1"]);

    feeder.feed(corebind::RawSample::new(20, 2)); // E
    manager.poll_sources();
    assert_eq!(core.take_sorted(), vec!["release 1:0"]);

    feeder.feed(corebind::RawSample::new(20, -1));
    manager.poll_sources();
    assert_eq!(core.take_sorted(), vec!["release 1:1"]);
}

#[test]
fn second_device_drives_player_two() {
    let bindings = Arc::new(BindingsController::new());
    let table = bindings.register_system(snes());
    let manager = DeviceManager::default();
    manager.add_observer(bindings.clone());

    let second = DeviceIdentity::new(0x057e, 0x2009).with_serial("PRO2");
    let first_feed = {
        let d = VirtualDevice::gamepad(pad_identity(), "P1");
        let f = d.feeder();
        manager.add_source(Box::new(d));
        f
    };
    let second_feed = {
        let d = VirtualDevice::gamepad(second.clone(), "P2");
        let f = d.feeder();
        manager.add_source(Box::new(d));
        f
    };

    let a = HidEvent::button(None, Instant::now(), 10, 1, corebind::EventState::On);
    {
        let mut sb = table.write().unwrap();
        sb.assign_event(&pad(), 1, "A", a.clone()).unwrap();
        sb.assign_event(&BindingSource::Device(second.device_id()), 2, "A", a).unwrap();
    }

    let core = Arc::new(Core::default());
    let responder = SystemResponder::new(table);
    responder.set_client(Some(core.clone()));
    manager.add_global_event_monitor(responder);

    second_feed.feed(corebind::RawSample::new(10, 1));
    first_feed.feed(corebind::RawSample::new(10, 1));
    manager.poll_sources();
    assert_eq!(core.take_sorted(), vec!["push 1:4", "push 2:4"]);
    assert_eq!(manager.controller_device_handlers().len(), 2);
    let ids: Vec<DeviceId> = manager
        .device_handlers()
        .iter()
        .map(|h| h.device_identifier().clone())
        .collect();
    assert_eq!(ids, vec![pad_identity().device_id(), second.device_id()]);
}
