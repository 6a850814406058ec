//! Turns resolved bindings into key presses for a game core.
//!
//! A [`SystemResponder`] sits between dispatch and one running core. For each
//! event it asks the system's [`SystemBindings`] which keys the event's control
//! can drive, decides which of them are pressed now, and forwards only the
//! changes:
//!
//! - digital keys are pressed on the first control holding them and released
//!   when the last one lets go;
//! - analog keys are forwarded when their value changes;
//! - `Global.*` bindings go to the [`GlobalEventsHandler`] instead of the core.

use crate::bindings::{ResolvedBinding, ResolvedTarget, SystemBindings};
use crate::eventbus::EventMonitor;
use crate::event::{ControlId, EventKind, HidEvent};
use crate::geometry::IntPoint;
use crate::system::{GlobalButton, KeyBindingDescription, SystemDescription};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use tracing::trace;

/// A key as the core sees it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SystemKey {
    /// Index in the system's key list.
    pub key: usize,
    /// 1-based; 0 for system-wide keys.
    pub player: u32,
    pub analogic: bool,
}

/// Receiver of key and mouse input; implemented by game cores.
pub trait SystemResponderClient: Send + Sync {
    fn did_push_key(&self, key: SystemKey);
    fn did_release_key(&self, key: SystemKey);
    fn did_change_analog_key(&self, _key: SystemKey, _value: f64) {}

    fn mouse_moved_at_point(&self, _point: IntPoint) {}
    fn left_mouse_down_at_point(&self, _point: IntPoint) {}
    fn left_mouse_up(&self) {}
    fn right_mouse_down_at_point(&self, _point: IntPoint) {}
    fn right_mouse_up(&self) {}
}

/// Host-side actions bound to [`GlobalButton`]s.
pub trait GlobalEventsHandler: Send + Sync {
    fn save_state(&self) {}
    fn load_state(&self) {}
    fn quick_save(&self) {}
    fn quick_load(&self) {}
    fn toggle_full_screen(&self) {}
    fn toggle_audio_mute(&self) {}
    fn volume_down(&self) {}
    fn volume_up(&self) {}
    fn stop_emulation(&self) {}
    fn reset_emulation(&self) {}
    fn toggle_emulation_paused(&self) {}
    fn take_screenshot(&self) {}
    fn fast_forward(&self, _enabled: bool) {}
    fn rewind(&self, _enabled: bool) {}
    fn step_frame_forward(&self) {}
    fn step_frame_backward(&self) {}
    fn next_display_mode(&self) {}
    fn last_display_mode(&self) {}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum Pressable {
    Key(SystemKey),
    Global(GlobalButton),
}

#[derive(Default)]
struct ResponderState {
    /// Targets each control currently holds down.
    held: HashMap<ControlId, HashSet<Pressable>>,
    /// How many controls hold each target.
    hold_counts: HashMap<Pressable, usize>,
    /// Last value forwarded per (control, analog key).
    analog: HashMap<(ControlId, SystemKey), f64>,
}

/// Forwards bound input of one system to its core.
pub struct SystemResponder {
    system: Arc<SystemDescription>,
    bindings: Arc<RwLock<SystemBindings>>,
    client: RwLock<Option<Arc<dyn SystemResponderClient>>>,
    global_events_handler: RwLock<Option<Arc<dyn GlobalEventsHandler>>>,
    state: Mutex<ResponderState>,
}

impl SystemResponder {
    pub fn new(bindings: Arc<RwLock<SystemBindings>>) -> Self {
        let system = Arc::clone(
            bindings
                .read()
                .unwrap_or_else(|e| e.into_inner())
                .system(),
        );
        Self {
            system,
            bindings,
            client: RwLock::new(None),
            global_events_handler: RwLock::new(None),
            state: Mutex::new(ResponderState::default()),
        }
    }

    pub fn system(&self) -> &Arc<SystemDescription> {
        &self.system
    }

    pub fn set_client(&self, client: Option<Arc<dyn SystemResponderClient>>) {
        *self.client.write().unwrap_or_else(|e| e.into_inner()) = client;
    }

    pub fn set_global_events_handler(&self, handler: Option<Arc<dyn GlobalEventsHandler>>) {
        *self
            .global_events_handler
            .write()
            .unwrap_or_else(|e| e.into_inner()) = handler;
    }

    fn client(&self) -> Option<Arc<dyn SystemResponderClient>> {
        self.client.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn global_handler(&self) -> Option<Arc<dyn GlobalEventsHandler>> {
        self.global_events_handler
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn state(&self) -> MutexGuard<'_, ResponderState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// The core-facing key for `key` and `player`. System-wide keys ignore the player.
    pub fn emulator_key_for_key(&self, key: &KeyBindingDescription, player: u32) -> SystemKey {
        SystemKey {
            key: key.index(),
            player: if key.is_system_wide() { 0 } else { player },
            analogic: key.is_analogic(),
        }
    }

    pub fn press_emulator_key(&self, key: SystemKey) {
        if let Some(client) = self.client() {
            client.did_push_key(key);
        }
    }

    pub fn release_emulator_key(&self, key: SystemKey) {
        if let Some(client) = self.client() {
            client.did_release_key(key);
        }
    }

    pub fn change_analog_emulator_key(&self, key: SystemKey, value: f64) {
        if let Some(client) = self.client() {
            client.did_change_analog_key(key, value);
        }
    }

    pub fn press_global_button(&self, button: GlobalButton) {
        let Some(handler) = self.global_handler() else {
            return;
        };
        match button {
            GlobalButton::SaveState => handler.save_state(),
            GlobalButton::LoadState => handler.load_state(),
            GlobalButton::QuickSave => handler.quick_save(),
            GlobalButton::QuickLoad => handler.quick_load(),
            GlobalButton::FullScreen => handler.toggle_full_screen(),
            GlobalButton::Mute => handler.toggle_audio_mute(),
            GlobalButton::VolumeDown => handler.volume_down(),
            GlobalButton::VolumeUp => handler.volume_up(),
            GlobalButton::Stop => handler.stop_emulation(),
            GlobalButton::Reset => handler.reset_emulation(),
            GlobalButton::Pause => handler.toggle_emulation_paused(),
            GlobalButton::Rewind => handler.rewind(true),
            GlobalButton::FastForward => handler.fast_forward(true),
            GlobalButton::StepFrameBackward => handler.step_frame_backward(),
            GlobalButton::StepFrameForward => handler.step_frame_forward(),
            GlobalButton::NextDisplayMode => handler.next_display_mode(),
            GlobalButton::LastDisplayMode => handler.last_display_mode(),
            GlobalButton::Screenshot => handler.take_screenshot(),
        }
    }

    /// Only the hold-to-activate buttons react to a release.
    pub fn release_global_button(&self, button: GlobalButton) {
        let Some(handler) = self.global_handler() else {
            return;
        };
        match button {
            GlobalButton::Rewind => handler.rewind(false),
            GlobalButton::FastForward => handler.fast_forward(false),
            _ => {}
        }
    }

    /// Analog input on a global button acts as press (non-zero) or release (zero).
    pub fn change_analog_global_button(&self, button: GlobalButton, value: f64) {
        if value != 0.0 {
            self.press_global_button(button);
        } else {
            self.release_global_button(button);
        }
    }

    pub fn mouse_down_at_point(&self, point: IntPoint) {
        if let Some(client) = self.client() {
            client.left_mouse_down_at_point(point);
        }
    }

    pub fn mouse_up(&self) {
        if let Some(client) = self.client() {
            client.left_mouse_up();
        }
    }

    pub fn right_mouse_down_at_point(&self, point: IntPoint) {
        if let Some(client) = self.client() {
            client.right_mouse_down_at_point(point);
        }
    }

    pub fn right_mouse_up(&self) {
        if let Some(client) = self.client() {
            client.right_mouse_up();
        }
    }

    pub fn mouse_moved_at_point(&self, point: IntPoint) {
        if let Some(client) = self.client() {
            client.mouse_moved_at_point(point);
        }
    }

    fn pressable(&self, resolved: &ResolvedBinding) -> Option<Pressable> {
        match resolved.target {
            ResolvedTarget::Global(button) => Some(Pressable::Global(button)),
            ResolvedTarget::Key(id) => {
                let key = self.system.key(id)?;
                if !key.is_system_wide() && resolved.player > self.system.number_of_players() {
                    return None;
                }
                Some(Pressable::Key(self.emulator_key_for_key(key, resolved.player)))
            }
        }
    }

    /// Apply one event. Returns `true` when the event's control is bound.
    pub fn handle_event(&self, event: &HidEvent) -> bool {
        // Short read section: bindings may be remapped concurrently.
        let resolved = self
            .bindings
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .resolve_event(event);
        if resolved.is_empty() {
            return false;
        }

        let control = event.control_identifier();
        let mut now_held = HashSet::new();
        let mut presses = Vec::new();
        let mut releases = Vec::new();
        let mut analog_changes = Vec::new();
        {
            let mut st = self.state();
            for r in &resolved {
                let Some(target) = self.pressable(r) else {
                    continue;
                };
                let active = r.is_activated_by(event);
                match target {
                    Pressable::Key(key) if key.analogic => {
                        let value = if active { magnitude(event) } else { 0.0 };
                        let last = st.analog.insert((control, key), value);
                        if last != Some(value) && (last.is_some() || value != 0.0) {
                            analog_changes.push((key, value));
                        }
                    }
                    _ if active => {
                        now_held.insert(target);
                    }
                    _ => {}
                }
            }

            let previous = st.held.remove(&control).unwrap_or_default();
            for target in previous.difference(&now_held) {
                let count = st.hold_counts.entry(*target).or_insert(1);
                *count = count.saturating_sub(1);
                if *count == 0 {
                    st.hold_counts.remove(target);
                    releases.push(*target);
                }
            }
            for target in now_held.difference(&previous) {
                let count = st.hold_counts.entry(*target).or_insert(0);
                *count += 1;
                if *count == 1 {
                    presses.push(*target);
                }
            }
            if !now_held.is_empty() {
                st.held.insert(control, now_held);
            }
        }

        // Forward outside the state lock; clients may call back in.
        for target in releases {
            trace!(?target, "release");
            match target {
                Pressable::Key(key) => self.release_emulator_key(key),
                Pressable::Global(button) => self.release_global_button(button),
            }
        }
        for target in presses {
            trace!(?target, "press");
            match target {
                Pressable::Key(key) => self.press_emulator_key(key),
                Pressable::Global(button) => self.press_global_button(button),
            }
        }
        for (key, value) in analog_changes {
            self.change_analog_emulator_key(key, value);
        }
        true
    }

    /// Release everything currently held, e.g. when the core loses focus.
    pub fn release_all(&self) {
        let (held, analog) = {
            let mut st = self.state();
            st.held.clear();
            let held: Vec<_> = st.hold_counts.drain().map(|(t, _)| t).collect();
            let analog: Vec<_> = st
                .analog
                .drain()
                .filter(|(_, v)| *v != 0.0)
                .map(|((_, k), _)| k)
                .collect();
            (held, analog)
        };
        for target in held {
            match target {
                Pressable::Key(key) => self.release_emulator_key(key),
                Pressable::Global(button) => self.release_global_button(button),
            }
        }
        for key in analog {
            self.change_analog_emulator_key(key, 0.0);
        }
    }
}

fn magnitude(event: &HidEvent) -> f64 {
    match event.kind() {
        EventKind::Axis { .. } | EventKind::Trigger { .. } => event.absolute_value(),
        _ => 1.0,
    }
}

impl EventMonitor for SystemResponder {
    fn on_event(&self, event: &HidEvent) -> bool {
        self.handle_event(event)
    }
}
