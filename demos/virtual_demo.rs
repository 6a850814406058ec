use corebind::backends::virtual_input::VirtualDevice;
use corebind::{
    BindingSource, BindingsController, DeviceIdentity, DeviceManager, EventLogger, EventState, HatDirection,
    HatSwitchType, HidEvent, SystemDescription, SystemKey, SystemResponder, SystemResponderClient,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

const SYSTEM: &str = r#"
identifier = "demo.system"
name = "Demo Console"
players = 2
keys = ["Up", "Right", "Down", "Left", "A", "B", "Start"]

[hat_switches]
DPad = ["Up", "Right", "Down", "Left"]
"#;

struct PrintingCore;

impl SystemResponderClient for PrintingCore {
    fn did_push_key(&self, key: SystemKey) {
        println!("(Core) player {} pressed key {}", key.player, key.key);
    }

    fn did_release_key(&self, key: SystemKey) {
        println!("(Core) player {} released key {}", key.player, key.key);
    }
}

fn main() -> corebind::Result<()> {
    FmtSubscriber::builder()
        .with_max_level(Level::DEBUG)
        .with_target(false)
        .init();

    let system = Arc::new(SystemDescription::from_toml_str(SYSTEM)?);
    let bindings = Arc::new(BindingsController::new());
    let table = bindings.register_system(system);

    let manager = DeviceManager::default();
    manager.add_observer(bindings.clone());
    manager.add_unhandled_event_monitor(EventLogger::new());

    let identity = DeviceIdentity::new(0x1209, 0x0001).with_serial("demo");
    let pad = VirtualDevice::gamepad(identity.clone(), "Demo Virtual Pad");
    let feeder = pad.feeder();
    manager.add_source(Box::new(pad));

    {
        let source = BindingSource::Device(identity.device_id());
        let now = Instant::now();
        let mut sb = table.write().expect("bindings lock");
        sb.assign_event(
            &source,
            1,
            "Up",
            HidEvent::hat_switch(None, now, 20, HatSwitchType::EightWays, HatDirection::NORTH),
        )?;
        sb.assign_event(&source, 1, "A", HidEvent::button(None, now, 10, 1, EventState::On))?;
    }

    let responder = SystemResponder::new(Arc::clone(&table));
    responder.set_client(Some(Arc::new(PrintingCore)));
    manager.add_global_event_monitor(responder);

    // Diagonal, then button A, then let go of everything.
    feeder.feed(corebind::RawSample::new(20, 7));
    feeder.feed(corebind::RawSample::new(10, 1));
    manager.poll_sources();
    feeder.feed(corebind::RawSample::new(20, -1));
    feeder.feed(corebind::RawSample::new(10, 0));
    // Unbound: reaches the logger.
    feeder.feed(corebind::RawSample::new(12, 1));
    manager.poll_sources();

    info!("saved bindings follow");
    println!("{}", bindings.to_json_string()?);
    Ok(())
}
