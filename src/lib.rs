//! # corebind
//!
//! Input-binding layer for emulator game cores.
//!
//! Raw device reports flow leaf to root through four layers:
//!
//! 1. **Devices** ([`device`], [`calibration`], [`metadata`], [`manager`]):
//!    sources yield raw samples; a [`DeviceHandler`] scales them with its
//!    calibration and dead-zone tables.
//! 2. **Events** ([`event`], [`hat`], [`eventbus`]): every sample becomes a
//!    canonical [`HidEvent`] carrying a [`ControlId`] and a [`ControlValueId`],
//!    dispatched to monitors.
//! 3. **Descriptions** ([`description`], [`system`]): static per-system key
//!    names, key groups and controller layouts.
//! 4. **Bindings** ([`bindings`], [`plist`], [`responder`]): per-player
//!    assignments of keys to events, persisted as a property-list style
//!    dictionary, and the responder that presses keys on a game core.
//!
//! ```no_run
//! use corebind::backends::virtual_input::VirtualDevice;
//! use corebind::{BindingsController, DeviceManager, DeviceIdentity, SystemDescription, SystemResponder};
//! use std::sync::Arc;
//!
//! let system = Arc::new(SystemDescription::from_toml_str(r#"
//!     identifier = "demo"
//!     name = "Demo"
//!     players = 1
//!     keys = ["Up", "Right", "Down", "Left", "A"]
//!     [hat_switches]
//!     DPad = ["Up", "Right", "Down", "Left"]
//! "#)?);
//!
//! let bindings = Arc::new(BindingsController::new());
//! let table = bindings.register_system(system);
//!
//! let manager = DeviceManager::default();
//! manager.add_observer(bindings.clone());
//! let responder = SystemResponder::new(table);
//! manager.add_global_event_monitor(responder);
//! manager.add_source(Box::new(VirtualDevice::gamepad(DeviceIdentity::new(1, 2), "Pad")));
//! manager.poll_sources();
//! # Ok::<(), corebind::Error>(())
//! ```

pub mod backends;
pub mod bindings;
pub mod calibration;
pub mod config;
pub mod description;
pub mod device;
pub mod error;
pub mod event;
pub mod eventbus;
pub mod filtered_monitor;
pub mod gamecore;
pub mod geometry;
pub mod hat;
pub mod logger;
pub mod manager;
pub mod metadata;
pub mod plist;
pub mod responder;
pub mod system;

pub use bindings::*;
pub use calibration::*;
pub use config::*;
pub use description::*;
pub use device::*;
pub use error::{Error, Result};
pub use event::*;
pub use eventbus::*;
pub use filtered_monitor::FilteredMonitor;
pub use gamecore::*;
pub use geometry::*;
pub use hat::*;
pub use logger::EventLogger;
pub use manager::*;
pub use metadata::*;
pub use plist::*;
pub use responder::*;
pub use system::*;
