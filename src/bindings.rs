//! Per-player binding tables and their persistence.
//!
//! [`SystemBindings`] holds, for one system, a keyboard table per player and
//! one table per known device. Each [`PlayerBindings`] maps a
//! [`BindingDescription`] to at most one [`BindingTarget`] and keeps reverse
//! indices by control and control value so dispatch is a hash lookup.
//!
//! [`BindingsController`] owns every system's bindings behind `RwLock`s,
//! forwards device arrival/removal, and reads/writes the JSON property list
//! document.

use crate::description::{ControlValueDescription, ControllerDescription};
use crate::error::{Error, Result};
use crate::event::{AxisDirection, ControlId, ControlValueId, DeviceId, EventKind, EventState, EventType, HidEvent};
use crate::hat::HatDirection;
use crate::metadata::KEYBOARD_DEVICE_IDENTIFIER;
use crate::plist::{PlistDictionary, PlistValue};
use crate::system::{BindingDescription, GlobalButton, KeyGroupType, KeyId, OrientedKeyGroup, SystemDescription};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;
use tracing::{debug, info, warn};

const KEYBOARD_SECTION: &str = "keyboard";
const DEVICES_SECTION: &str = "devices";
const PLAYER_ENTRY: &str = "player";
const BINDINGS_ENTRY: &str = "bindings";

/// Player of a device table that is waiting for a free player.
pub const UNASSIGNED_PLAYER: u32 = 0;

/// Which table a binding operation applies to.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BindingSource {
    Keyboard,
    Device(DeviceId),
}

impl BindingSource {
    /// Table an event is looked up in.
    pub fn of_event(event: &HidEvent) -> Self {
        match event.device() {
            Some(id) if id.as_str() != KEYBOARD_DEVICE_IDENTIFIER => BindingSource::Device(id.clone()),
            _ => BindingSource::Keyboard,
        }
    }
}

/// What a binding points at.
#[derive(Clone, Debug, PartialEq)]
pub enum BindingTarget {
    Event(HidEvent),
    /// A named state of a described control.
    ControlValue(ControlValueDescription),
}

impl BindingTarget {
    pub fn event(&self) -> &HidEvent {
        match self {
            BindingTarget::Event(e) => e,
            BindingTarget::ControlValue(v) => v.event(),
        }
    }

    /// Persisted string form: an event string, or `@<control value id>=<event>`.
    pub fn to_plist_string(&self) -> String {
        match self {
            BindingTarget::Event(e) => e.to_string(),
            BindingTarget::ControlValue(v) => format!("@{}={}", v.identifier(), v.event()),
        }
    }

    /// Parse the persisted form. Control values come back as free-standing
    /// descriptions named after their identifier until
    /// [`SystemBindings::adopt_controller`] swaps in the described ones.
    pub fn from_plist_string(s: &str) -> Result<Self> {
        match s.strip_prefix('@') {
            Some(rest) => {
                let (identifier, event) = rest
                    .split_once('=')
                    .ok_or_else(|| Error::InvalidEvent(s.to_string()))?;
                let event: HidEvent = event.parse()?;
                let control = identifier.rsplit_once('.').map(|(c, _)| c).unwrap_or(identifier);
                Ok(BindingTarget::ControlValue(ControlValueDescription::new(
                    identifier, identifier, control, event,
                )))
            }
            None => Ok(BindingTarget::Event(s.parse()?)),
        }
    }
}

/// Per-member events of an oriented group bound to `event`.
///
/// Axis groups yield the base key with `event` and the opposite key with the
/// flipped direction. Hat groups walk the rotation from the base key, starting
/// at `event`'s direction. Members whose direction the hat cannot report are
/// left out, as is every member when the base is not one of the group's
/// directions.
pub fn oriented_member_events(group: &OrientedKeyGroup, event: &HidEvent) -> Vec<(KeyId, HidEvent)> {
    match group.group_type() {
        KeyGroupType::Axis => {
            let mut out = vec![(group.base_key(), event.clone())];
            if let Some(opposite) = event.axis_event_with_opposite_direction() {
                out.push((group.opposite_key(), opposite));
            }
            out
        }
        KeyGroupType::HatSwitch => {
            let n = group.arity();
            let base = event.hat_direction();
            let Some(start) = base.rotation_index(n) else {
                return Vec::new();
            };
            (0..n)
                .filter_map(|i| {
                    let direction = HatDirection::from_rotation_index(start + i, n);
                    let member = event.hat_event_with_direction(direction)?;
                    (!member.hat_direction().is_null()).then(|| (group.key_at_offset(i), member))
                })
                .collect()
        }
    }
}

/// Concrete target of a resolved binding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResolvedTarget {
    Key(KeyId),
    Global(GlobalButton),
}

/// One key an incoming event may drive.
#[derive(Clone, Debug)]
pub struct ResolvedBinding {
    pub player: u32,
    pub target: ResolvedTarget,
    /// The event state that presses `target`.
    pub bound: HidEvent,
    /// Hat bindings of an 8-key group match directions exactly; others also
    /// fire on the diagonals that contain them.
    pub exact_hat: bool,
}

impl ResolvedBinding {
    /// Whether `event` presses this binding's target.
    pub fn is_activated_by(&self, event: &HidEvent) -> bool {
        match (*self.bound.kind(), *event.kind()) {
            (EventKind::Axis { direction: b, .. }, EventKind::Axis { direction: e, .. })
            | (EventKind::Trigger { direction: b, .. }, EventKind::Trigger { direction: e, .. }) => {
                b != AxisDirection::Null && b == e
            }
            (EventKind::HatSwitch { direction: b, .. }, EventKind::HatSwitch { direction: e, .. }) => {
                if self.exact_hat {
                    !b.is_null() && b == e
                } else {
                    e.contains(b)
                }
            }
            (EventKind::Button { .. }, EventKind::Button { state, .. })
            | (EventKind::Keyboard { .. }, EventKind::Keyboard { state, .. }) => state == EventState::On,
            _ => false,
        }
    }
}

/// Bindings of one player on one source.
#[derive(Clone, Debug, Default)]
pub struct PlayerBindings {
    player: u32,
    bindings: HashMap<BindingDescription, BindingTarget>,
    by_value: HashMap<ControlValueId, HashSet<BindingDescription>>,
    by_control: HashMap<ControlId, HashSet<BindingDescription>>,
}

impl PlayerBindings {
    pub fn new(player: u32) -> Self {
        Self {
            player,
            ..Self::default()
        }
    }

    pub fn player(&self) -> u32 {
        self.player
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&BindingDescription, &BindingTarget)> {
        self.bindings.iter()
    }

    pub fn get(&self, binding: &BindingDescription) -> Option<&BindingTarget> {
        self.bindings.get(binding)
    }

    pub fn bindings_for_value(&self, value: ControlValueId) -> Vec<BindingDescription> {
        self.by_value
            .get(&value)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn bindings_for_control(&self, control: ControlId) -> Vec<BindingDescription> {
        self.by_control
            .get(&control)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Oriented groups bound in this table that include `key`.
    pub fn oriented_groups_covering(&self, key: KeyId) -> Vec<OrientedKeyGroup> {
        self.bindings
            .keys()
            .filter_map(|b| match b {
                BindingDescription::OrientedGroup(og) if og.contains(key) => Some(og.clone()),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn insert(&mut self, binding: BindingDescription, target: BindingTarget) -> Option<BindingTarget> {
        let previous = self.remove(&binding);
        let event = target.event();
        self.by_value
            .entry(event.control_value_identifier())
            .or_default()
            .insert(binding.clone());
        self.by_control
            .entry(event.control_identifier())
            .or_default()
            .insert(binding.clone());
        self.bindings.insert(binding, target);
        previous
    }

    pub(crate) fn remove(&mut self, binding: &BindingDescription) -> Option<BindingTarget> {
        let target = self.bindings.remove(binding)?;
        let event = target.event();
        let value = event.control_value_identifier();
        if let Some(set) = self.by_value.get_mut(&value) {
            set.remove(binding);
            if set.is_empty() {
                self.by_value.remove(&value);
            }
        }
        let control = event.control_identifier();
        if let Some(set) = self.by_control.get_mut(&control) {
            set.remove(binding);
            if set.is_empty() {
                self.by_control.remove(&control);
            }
        }
        Some(target)
    }

    /// Swap free-standing control values for the ones `controller` describes.
    fn adopt_controller(&mut self, controller: &ControllerDescription) -> usize {
        let described: Vec<(BindingDescription, ControlValueDescription)> = self
            .bindings
            .iter()
            .filter_map(|(binding, target)| {
                let BindingTarget::ControlValue(value) = target else {
                    return None;
                };
                let known = controller.control_value_for_identifier(value.identifier())?;
                (known != value && is_consistent(binding, known.event())).then(|| (binding.clone(), known.clone()))
            })
            .collect();
        let count = described.len();
        for (binding, value) in described {
            self.insert(binding, BindingTarget::ControlValue(value));
        }
        count
    }

    /// Replace an oriented group binding by one key binding per member.
    fn dissolve(&mut self, group: &OrientedKeyGroup) {
        let binding = BindingDescription::OrientedGroup(group.clone());
        let Some(target) = self.remove(&binding) else {
            return;
        };
        for (key, event) in oriented_member_events(group, target.event()) {
            let member_target = if key == group.base_key() {
                target.clone()
            } else {
                BindingTarget::Event(event)
            };
            self.insert(BindingDescription::Key(key), member_target);
        }
    }

    fn dissolve_covering(&mut self, key: KeyId) {
        for group in self.oriented_groups_covering(key) {
            self.dissolve(&group);
        }
    }

    /// Bind `binding_name` to `target` following the group rules.
    fn assign(&mut self, system: &SystemDescription, binding_name: &str, target: BindingTarget) -> Result<BindingDescription> {
        let requested = system
            .binding_named(binding_name)
            .ok_or_else(|| Error::UnknownKey(binding_name.to_string()))?;
        let event = target.event().clone();

        let binding = match requested {
            BindingDescription::Key(key) => match event.event_type() {
                EventType::Axis if event.direction() != AxisDirection::Null => system
                    .axis_group_of_key(key)
                    .and_then(|g| g.oriented_with_base_key(key))
                    .map(BindingDescription::OrientedGroup)
                    .unwrap_or(BindingDescription::Key(key)),
                EventType::HatSwitch if !event.hat_direction().is_null() => system
                    .hat_switch_group_of_key(key)
                    .and_then(|g| g.oriented_with_base_key(key))
                    .map(BindingDescription::OrientedGroup)
                    .unwrap_or(BindingDescription::Key(key)),
                _ => BindingDescription::Key(key),
            },
            other => other,
        };
        if !is_consistent(&binding, &event) {
            return Err(Error::InvalidEvent(format!("{event} cannot drive {binding_name}")));
        }

        let covered = match &binding {
            BindingDescription::Key(key) => vec![*key],
            BindingDescription::OrientedGroup(og) => og.keys_from_base(),
            BindingDescription::Global(_) => Vec::new(),
        };
        for key in covered {
            self.dissolve_covering(key);
            self.remove(&BindingDescription::Key(key));
        }
        self.remove(&binding);

        if matches!(binding, BindingDescription::OrientedGroup(_)) {
            // The whole control now drives this group.
            for other in self.bindings_for_control(event.control_identifier()) {
                self.remove(&other);
            }
        } else {
            for other in self.bindings_for_control(event.control_identifier()) {
                if let BindingDescription::OrientedGroup(og) = &other {
                    self.dissolve(og);
                }
            }
            for other in self.bindings_for_value(event.control_value_identifier()) {
                self.remove(&other);
            }
        }

        self.insert(binding.clone(), target);
        Ok(binding)
    }

    /// Remove whatever drives `key`, dissolving a covering group first.
    fn remove_key(&mut self, key: KeyId) -> Option<BindingTarget> {
        self.dissolve_covering(key);
        self.remove(&BindingDescription::Key(key))
    }

    /// Target driving `key`, derived from a covering group when needed.
    fn target_for_key(&self, key: KeyId) -> Option<BindingTarget> {
        if let Some(t) = self.bindings.get(&BindingDescription::Key(key)) {
            return Some(t.clone());
        }
        self.oriented_groups_covering(key).into_iter().find_map(|og| {
            let target = self.bindings.get(&BindingDescription::OrientedGroup(og.clone()))?;
            if key == og.base_key() {
                return Some(target.clone());
            }
            oriented_member_events(&og, target.event())
                .into_iter()
                .find(|(k, _)| *k == key)
                .map(|(_, e)| BindingTarget::Event(e))
        })
    }

    fn resolve(&self, event: &HidEvent, out: &mut Vec<ResolvedBinding>) {
        for binding in self.bindings_for_control(event.control_identifier()) {
            let Some(target) = self.bindings.get(&binding) else {
                continue;
            };
            let bound = target.event();
            match &binding {
                BindingDescription::Key(key) => out.push(ResolvedBinding {
                    player: self.player,
                    target: ResolvedTarget::Key(*key),
                    bound: bound.clone(),
                    exact_hat: false,
                }),
                BindingDescription::Global(button) => out.push(ResolvedBinding {
                    player: self.player,
                    target: ResolvedTarget::Global(*button),
                    bound: bound.clone(),
                    exact_hat: false,
                }),
                BindingDescription::OrientedGroup(og) => {
                    for (key, member) in oriented_member_events(og, bound) {
                        out.push(ResolvedBinding {
                            player: self.player,
                            target: ResolvedTarget::Key(key),
                            bound: member,
                            exact_hat: og.arity() == 8,
                        });
                    }
                }
            }
        }
    }

    fn to_plist(&self, system: &SystemDescription, keyboard: bool) -> PlistDictionary {
        let mut out = PlistDictionary::new();
        for (binding, target) in &self.bindings {
            let Some(name) = system.binding_name(binding) else {
                continue;
            };
            let value = match (keyboard, target) {
                (true, BindingTarget::Event(e)) if e.state() == EventState::On => match e.keycode() {
                    Some(code) => PlistValue::Integer(code as i64),
                    None => PlistValue::String(target.to_plist_string()),
                },
                _ => PlistValue::String(target.to_plist_string()),
            };
            out.insert(name, value);
        }
        out
    }

    fn load_plist(&mut self, system: &SystemDescription, table: &PlistDictionary, context: &str) {
        for (name, value) in table {
            let Some(binding) = system.binding_named(name) else {
                warn!(system = system.identifier(), table = context, key = %name, "unknown key in saved bindings skipped");
                continue;
            };
            let target = match value {
                PlistValue::Integer(code) => match u16::try_from(*code) {
                    Ok(code) => Ok(BindingTarget::Event(HidEvent::keyboard(
                        None,
                        Instant::now(),
                        code,
                        EventState::On,
                    ))),
                    Err(_) => Err(Error::InvalidEvent(code.to_string())),
                },
                PlistValue::String(s) => BindingTarget::from_plist_string(s),
                other => Err(Error::InvalidEvent(other.kind_name().to_string())),
            };
            match target {
                Ok(target) if is_consistent(&binding, target.event()) => {
                    self.insert(binding, target);
                }
                Ok(target) => {
                    warn!(system = system.identifier(), table = context, key = %name, event = %target.event(), "saved group binding with wrong event kind skipped");
                }
                Err(e) => {
                    warn!(system = system.identifier(), table = context, key = %name, error = %e, "malformed saved binding skipped");
                }
            }
        }
    }
}

fn is_consistent(binding: &BindingDescription, event: &HidEvent) -> bool {
    match binding {
        BindingDescription::OrientedGroup(og) => match og.group_type() {
            KeyGroupType::Axis => event.event_type() == EventType::Axis && event.direction() != AxisDirection::Null,
            // A four-key group has no member for a diagonal base.
            KeyGroupType::HatSwitch => {
                event.event_type() == EventType::HatSwitch && event.hat_direction().rotation_index(og.arity()).is_some()
            }
        },
        _ => true,
    }
}

#[derive(Clone, Debug)]
struct DeviceBindings {
    bindings: PlayerBindings,
    connected: bool,
}

/// All bindings of one system.
#[derive(Debug)]
pub struct SystemBindings {
    system: Arc<SystemDescription>,
    keyboard: Vec<PlayerBindings>,
    devices: BTreeMap<DeviceId, DeviceBindings>,
    dirty: bool,
}

impl SystemBindings {
    /// Fresh tables; player 1's keyboard gets the system's default keys.
    pub fn new(system: Arc<SystemDescription>) -> Self {
        let mut keyboard: Vec<_> = (1..=system.number_of_players()).map(PlayerBindings::new).collect();
        if let Some(first) = keyboard.first_mut() {
            for (name, code) in system.default_keyboard_controls() {
                let event = HidEvent::keyboard(None, Instant::now(), *code, EventState::On);
                if let Err(e) = first.assign(&system, name, BindingTarget::Event(event)) {
                    warn!(system = system.identifier(), key = %name, error = %e, "default keyboard control skipped");
                }
            }
        }
        Self {
            system,
            keyboard,
            devices: BTreeMap::new(),
            dirty: false,
        }
    }

    pub fn system(&self) -> &Arc<SystemDescription> {
        &self.system
    }

    pub fn keyboard_bindings(&self, player: u32) -> Option<&PlayerBindings> {
        self.keyboard.get(player.checked_sub(1)? as usize)
    }

    pub fn device_bindings(&self, device: &DeviceId) -> Option<&PlayerBindings> {
        self.devices.get(device).map(|d| &d.bindings)
    }

    /// Every device with a table, connected or not.
    pub fn device_identifiers(&self) -> Vec<DeviceId> {
        self.devices.keys().cloned().collect()
    }

    pub fn is_device_connected(&self, device: &DeviceId) -> bool {
        self.devices.get(device).map(|d| d.connected).unwrap_or(false)
    }

    fn check_player(&self, player: u32) -> Result<()> {
        if player == 0 || player > self.system.number_of_players() {
            return Err(Error::InvalidPlayer(player));
        }
        Ok(())
    }

    fn table_mut(&mut self, source: &BindingSource, player: u32) -> Result<&mut PlayerBindings> {
        self.check_player(player)?;
        match source {
            BindingSource::Keyboard => self
                .keyboard
                .get_mut(player as usize - 1)
                .ok_or(Error::InvalidPlayer(player)),
            BindingSource::Device(id) => {
                if self.devices.get(id).map(|d| d.bindings.player) != Some(player) {
                    self.set_player_for_device(id, player)?;
                }
                self.devices
                    .get_mut(id)
                    .map(|d| &mut d.bindings)
                    .ok_or(Error::InvalidPlayer(player))
            }
        }
    }

    fn table(&self, source: &BindingSource, player: u32) -> Option<&PlayerBindings> {
        match source {
            BindingSource::Keyboard => self.keyboard_bindings(player),
            BindingSource::Device(id) => self.device_bindings(id).filter(|t| t.player == player),
        }
    }

    /// Bind `key_name` for `player` on `source` to `event`.
    ///
    /// For a device source, the device is moved to `player` first. Returns the
    /// description actually bound (an oriented group when an axis or hat event
    /// lands on a grouped key).
    pub fn assign_event(
        &mut self,
        source: &BindingSource,
        player: u32,
        key_name: &str,
        event: HidEvent,
    ) -> Result<BindingDescription> {
        if *source == BindingSource::Keyboard && event.event_type() != EventType::Keyboard {
            return Err(Error::InvalidEvent(event.to_string()));
        }
        self.assign_target(source, player, key_name, BindingTarget::Event(event.with_device(None)))
    }

    pub fn assign_control_value(
        &mut self,
        source: &BindingSource,
        player: u32,
        key_name: &str,
        value: ControlValueDescription,
    ) -> Result<BindingDescription> {
        self.assign_target(source, player, key_name, BindingTarget::ControlValue(value))
    }

    fn assign_target(
        &mut self,
        source: &BindingSource,
        player: u32,
        key_name: &str,
        target: BindingTarget,
    ) -> Result<BindingDescription> {
        let system = Arc::clone(&self.system);
        let event = target.event().to_string();
        let binding = self.table_mut(source, player)?.assign(&system, key_name, target)?;
        self.dirty = true;
        debug!(system = system.identifier(), player, key = key_name, %event, "binding assigned");
        Ok(binding)
    }

    pub fn remove_binding(&mut self, source: &BindingSource, player: u32, key_name: &str) -> Result<Option<BindingTarget>> {
        let system = Arc::clone(&self.system);
        let binding = system
            .binding_named(key_name)
            .ok_or_else(|| Error::UnknownKey(key_name.to_string()))?;
        self.check_player(player)?;
        let Some(table) = self.table_mut_existing(source, player) else {
            return Ok(None);
        };
        let removed = match binding {
            BindingDescription::Key(key) => table.remove_key(key),
            other => table.remove(&other),
        };
        if removed.is_some() {
            self.dirty = true;
        }
        Ok(removed)
    }

    fn table_mut_existing(&mut self, source: &BindingSource, player: u32) -> Option<&mut PlayerBindings> {
        match source {
            BindingSource::Keyboard => self.keyboard.get_mut(player.checked_sub(1)? as usize),
            BindingSource::Device(id) => self
                .devices
                .get_mut(id)
                .map(|d| &mut d.bindings)
                .filter(|t| t.player == player),
        }
    }

    /// What drives `key_name` for `player` on `source`.
    pub fn binding_for_key(&self, source: &BindingSource, player: u32, key_name: &str) -> Option<BindingTarget> {
        let table = self.table(source, player)?;
        match self.system.binding_named(key_name)? {
            BindingDescription::Key(key) => table.target_for_key(key),
            other => table.get(&other).cloned(),
        }
    }

    /// Description bound in the table for `key_name`: the key itself or a covering group.
    pub fn binding_description_for_key(&self, source: &BindingSource, player: u32, key_name: &str) -> Option<BindingDescription> {
        let table = self.table(source, player)?;
        match self.system.binding_named(key_name)? {
            BindingDescription::Key(key) => {
                let direct = BindingDescription::Key(key);
                if table.get(&direct).is_some() {
                    return Some(direct);
                }
                table
                    .oriented_groups_covering(key)
                    .into_iter()
                    .next()
                    .map(BindingDescription::OrientedGroup)
            }
            other => table.get(&other).map(|_| other),
        }
    }

    fn tables_for(&self, source: &BindingSource) -> Vec<&PlayerBindings> {
        match source {
            BindingSource::Keyboard => self.keyboard.iter().collect(),
            BindingSource::Device(id) => self
                .device_bindings(id)
                .filter(|t| t.player != UNASSIGNED_PLAYER)
                .into_iter()
                .collect(),
        }
    }

    /// Bindings whose exact state `event` matches, with their player.
    pub fn keys_for_event(&self, event: &HidEvent) -> Vec<(u32, BindingDescription)> {
        let mut out = Vec::new();
        for table in self.tables_for(&BindingSource::of_event(event)) {
            for binding in table.bindings_for_value(event.control_value_identifier()) {
                out.push((table.player, binding));
            }
        }
        out
    }

    /// Every key `event`'s control can drive, with the state that presses it.
    pub fn resolve_event(&self, event: &HidEvent) -> Vec<ResolvedBinding> {
        let mut out = Vec::new();
        for table in self.tables_for(&BindingSource::of_event(event)) {
            table.resolve(event, &mut out);
        }
        out
    }

    fn is_valid_player(&self, player: u32) -> bool {
        (1..=self.system.number_of_players()).contains(&player)
    }

    /// Lowest player no other connected device holds, or
    /// [`UNASSIGNED_PLAYER`] when every player is taken.
    fn lowest_free_player(&self, except: &DeviceId) -> u32 {
        let taken: HashSet<u32> = self
            .devices
            .iter()
            .filter(|(id, d)| d.connected && *id != except)
            .map(|(_, d)| d.bindings.player)
            .collect();
        (1..=self.system.number_of_players())
            .find(|p| !taken.contains(p))
            .unwrap_or(UNASSIGNED_PLAYER)
    }

    /// A device connected. Reuses its existing table (placeholder or loaded)
    /// when there is one; otherwise creates one for the lowest free player,
    /// seeded from the controller's default controls. Returns the player,
    /// [`UNASSIGNED_PLAYER`] when all players are taken.
    pub fn did_add_device(&mut self, device: &DeviceId, controller: Option<&ControllerDescription>) -> u32 {
        let free = self.lowest_free_player(device);
        if self.devices.contains_key(device) {
            let clash = |player: u32| {
                self.devices
                    .iter()
                    .any(|(id, d)| id != device && d.connected && d.bindings.player == player)
            };
            let saved = self.player_for_device(device).unwrap_or(UNASSIGNED_PLAYER);
            let player = if self.is_valid_player(saved) && !clash(saved) {
                saved
            } else {
                free
            };
            if let Some(existing) = self.devices.get_mut(device) {
                existing.connected = true;
                existing.bindings.player = player;
            }
            if let Some(controller) = controller {
                self.adopt_controller(device, controller);
            }
            if player == UNASSIGNED_PLAYER {
                info!(system = self.system.identifier(), device = %device, "no free player for device");
            }
            return player;
        }

        let mut bindings = PlayerBindings::new(free);
        if let Some(controller) = controller {
            if let Some(defaults) = self.system.default_device_controls().get(controller.identifier()) {
                for (key, value_id) in defaults {
                    let Some(value) = controller.control_value_for_identifier(value_id) else {
                        warn!(system = self.system.identifier(), controller = controller.identifier(), value = %value_id, "default device control names an unknown value");
                        continue;
                    };
                    if let Err(e) = bindings.assign(&self.system, key, BindingTarget::ControlValue(value.clone())) {
                        warn!(system = self.system.identifier(), key = %key, error = %e, "default device control skipped");
                    }
                }
            }
        }
        self.devices.insert(
            device.clone(),
            DeviceBindings {
                bindings,
                connected: true,
            },
        );
        self.dirty = true;
        if free == UNASSIGNED_PLAYER {
            info!(system = self.system.identifier(), device = %device, "no free player for device");
        }
        free
    }

    /// Resolve `device`'s control-value bindings through `controller`.
    /// Returns how many bindings now point at described values.
    pub fn adopt_controller(&mut self, device: &DeviceId, controller: &ControllerDescription) -> usize {
        self.devices
            .get_mut(device)
            .map(|d| d.bindings.adopt_controller(controller))
            .unwrap_or(0)
    }

    /// A device went away; its table stays for when it comes back. Its player
    /// passes to the first connected device still waiting for one.
    pub fn did_remove_device(&mut self, device: &DeviceId) {
        let Some(d) = self.devices.get_mut(device) else {
            return;
        };
        if !d.connected {
            return;
        }
        d.connected = false;
        let freed = d.bindings.player;
        if !self.is_valid_player(freed) {
            return;
        }
        let waiting = self
            .devices
            .iter_mut()
            .find(|(_, d)| d.connected && d.bindings.player == UNASSIGNED_PLAYER);
        if let Some((id, d)) = waiting {
            d.bindings.player = freed;
            info!(system = self.system.identifier(), device = %id, player = freed, "waiting device took freed player");
        }
    }

    /// Drop a device's table entirely.
    pub fn forget_device(&mut self, device: &DeviceId) -> bool {
        let removed = self.devices.remove(device).is_some();
        self.dirty |= removed;
        removed
    }

    pub fn player_for_device(&self, device: &DeviceId) -> Option<u32> {
        self.devices.get(device).map(|d| d.bindings.player)
    }

    /// Move `device` to `player`. A connected device already on that player
    /// swaps to the old player of `device`. Unknown devices get an empty table.
    pub fn set_player_for_device(&mut self, device: &DeviceId, player: u32) -> Result<()> {
        self.check_player(player)?;
        let previous = self.devices.get(device).map(|d| d.bindings.player);
        if previous == Some(player) {
            return Ok(());
        }
        let holder = self
            .devices
            .iter()
            .find(|(id, d)| *id != device && d.connected && d.bindings.player == player)
            .map(|(id, _)| id.clone());
        if let (Some(holder), Some(previous)) = (holder, previous) {
            if let Some(d) = self.devices.get_mut(&holder) {
                d.bindings.player = previous;
            }
        }
        self.devices
            .entry(device.clone())
            .or_insert_with(|| DeviceBindings {
                bindings: PlayerBindings::new(player),
                connected: false,
            })
            .bindings
            .player = player;
        self.dirty = true;
        Ok(())
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub(crate) fn mark_clean(&mut self) {
        self.dirty = false;
    }

    /// Property-list form of every table.
    pub fn dictionary_representation(&self) -> PlistDictionary {
        let mut keyboard = PlistDictionary::new();
        for table in &self.keyboard {
            if !table.is_empty() {
                keyboard.insert(table.player.to_string(), table.to_plist(&self.system, true).into());
            }
        }
        let mut devices = PlistDictionary::new();
        for (id, d) in &self.devices {
            let mut entry = PlistDictionary::new();
            entry.insert(PLAYER_ENTRY.into(), PlistValue::Integer(d.bindings.player as i64));
            entry.insert(BINDINGS_ENTRY.into(), d.bindings.to_plist(&self.system, false).into());
            devices.insert(id.to_string(), entry.into());
        }
        let mut out = PlistDictionary::new();
        out.insert(KEYBOARD_SECTION.into(), keyboard.into());
        out.insert(DEVICES_SECTION.into(), devices.into());
        out
    }

    /// Replace the tables with `dict`. Bad entries are skipped with a warning.
    /// Devices named in `dict` get disconnected tables until they arrive.
    pub fn load_dictionary_representation(&mut self, dict: &PlistDictionary) {
        let system = Arc::clone(&self.system);
        if let Some(keyboard) = section(dict, KEYBOARD_SECTION, system.identifier()) {
            for table in &mut self.keyboard {
                *table = PlayerBindings::new(table.player);
            }
            for (player, value) in keyboard {
                let Some(table) = player
                    .parse::<u32>()
                    .ok()
                    .and_then(|p| self.keyboard.get_mut(p.checked_sub(1)? as usize))
                else {
                    warn!(system = system.identifier(), player = %player, "keyboard table for unknown player skipped");
                    continue;
                };
                match value.as_dictionary() {
                    Some(entries) => table.load_plist(&system, entries, KEYBOARD_SECTION),
                    None => warn!(system = system.identifier(), player = %player, "keyboard table is not a dictionary"),
                }
            }
        }

        if let Some(devices) = section(dict, DEVICES_SECTION, system.identifier()) {
            let connected: HashSet<DeviceId> = self
                .devices
                .iter()
                .filter(|(_, d)| d.connected)
                .map(|(id, _)| id.clone())
                .collect();
            self.devices.clear();
            for (id, value) in devices {
                let Some(entry) = value.as_dictionary() else {
                    warn!(system = system.identifier(), device = %id, "device table is not a dictionary");
                    continue;
                };
                let player = entry
                    .get(PLAYER_ENTRY)
                    .and_then(PlistValue::as_integer)
                    .and_then(|p| u32::try_from(p).ok())
                    .filter(|p| self.is_valid_player(*p))
                    .unwrap_or_else(|| {
                        warn!(system = system.identifier(), device = %id, "saved player out of range, device left unassigned");
                        UNASSIGNED_PLAYER
                    });
                let device = DeviceId::new(id);
                let mut bindings = PlayerBindings::new(player);
                if let Some(table) = entry.get(BINDINGS_ENTRY).and_then(PlistValue::as_dictionary) {
                    bindings.load_plist(&system, table, id);
                }
                let is_connected = connected.contains(&device);
                self.devices.insert(
                    device,
                    DeviceBindings {
                        bindings,
                        connected: is_connected,
                    },
                );
            }
        }
        self.dirty = false;
    }
}

fn section<'a>(dict: &'a PlistDictionary, name: &str, system: &str) -> Option<&'a PlistDictionary> {
    let value = dict.get(name)?;
    let table = value.as_dictionary();
    if table.is_none() {
        warn!(system, section = name, found = value.kind_name(), "saved bindings section is not a dictionary");
    }
    table
}

/// Owns the bindings of every registered system.
#[derive(Debug, Default)]
pub struct BindingsController {
    systems: RwLock<BTreeMap<String, Arc<RwLock<SystemBindings>>>>,
    /// Saved data of systems that are not registered (yet).
    unclaimed: RwLock<PlistDictionary>,
    /// Connected devices, replayed into systems registered later.
    devices: RwLock<BTreeMap<DeviceId, Option<Arc<ControllerDescription>>>>,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

impl BindingsController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a system; saved data loaded earlier for it is applied.
    pub fn register_system(&self, system: Arc<SystemDescription>) -> Arc<RwLock<SystemBindings>> {
        let id = system.identifier().to_string();
        // Held across lookup and insert so concurrent registrations share one table.
        let mut systems = write(&self.systems);
        if let Some(existing) = systems.get(&id) {
            return Arc::clone(existing);
        }
        let mut bindings = SystemBindings::new(system);
        if let Some(PlistValue::Dictionary(saved)) = write(&self.unclaimed).remove(&id) {
            bindings.load_dictionary_representation(&saved);
        }
        for (device, controller) in read(&self.devices).iter() {
            bindings.did_add_device(device, controller.as_deref());
        }
        let bindings = Arc::new(RwLock::new(bindings));
        systems.insert(id.clone(), Arc::clone(&bindings));
        info!(system = %id, "system registered");
        bindings
    }

    pub fn system_bindings(&self, identifier: &str) -> Option<Arc<RwLock<SystemBindings>>> {
        read(&self.systems).get(identifier).cloned()
    }

    pub fn system_identifiers(&self) -> Vec<String> {
        read(&self.systems).keys().cloned().collect()
    }

    /// Forward a device arrival to every system. Returns the player per system.
    pub fn device_did_connect(&self, device: &DeviceId, controller: Option<Arc<ControllerDescription>>) -> BTreeMap<String, u32> {
        write(&self.devices).insert(device.clone(), controller.clone());
        read(&self.systems)
            .iter()
            .map(|(id, sb)| (id.clone(), write(sb).did_add_device(device, controller.as_deref())))
            .collect()
    }

    pub fn device_did_disconnect(&self, device: &DeviceId) {
        write(&self.devices).remove(device);
        for sb in read(&self.systems).values() {
            write(sb).did_remove_device(device);
        }
    }

    /// Drop every table of `device`.
    pub fn forget_device(&self, device: &DeviceId) {
        write(&self.devices).remove(device);
        for sb in read(&self.systems).values() {
            write(sb).forget_device(device);
        }
    }

    /// Some system changed since the last save or load.
    pub fn requires_synchronization(&self) -> bool {
        read(&self.systems).values().any(|sb| read(sb).is_dirty())
    }

    pub fn dictionary_representation(&self) -> PlistDictionary {
        let mut out = read(&self.unclaimed).clone();
        for (id, sb) in read(&self.systems).iter() {
            out.insert(id.clone(), read(sb).dictionary_representation().into());
        }
        out
    }

    /// Load a whole document. Registered systems reload now; the rest wait
    /// for [`register_system`](Self::register_system).
    pub fn load_dictionary_representation(&self, dict: &PlistDictionary) {
        let systems = read(&self.systems);
        let mut unclaimed = PlistDictionary::new();
        for (id, value) in dict {
            match (systems.get(id), value) {
                (Some(sb), PlistValue::Dictionary(saved)) => {
                    let mut sb = write(sb);
                    sb.load_dictionary_representation(saved);
                    for (device, controller) in read(&self.devices).iter() {
                        if let Some(controller) = controller {
                            sb.adopt_controller(device, controller);
                        }
                    }
                }
                (None, PlistValue::Dictionary(_)) => {
                    unclaimed.insert(id.clone(), value.clone());
                }
                (_, other) => {
                    warn!(system = %id, found = other.kind_name(), "saved system bindings are not a dictionary");
                }
            }
        }
        *write(&self.unclaimed) = unclaimed;
    }

    pub fn to_json_string(&self) -> Result<String> {
        let json = serde_json::to_string_pretty(&PlistValue::Dictionary(self.dictionary_representation()))?;
        self.mark_clean();
        Ok(json)
    }

    pub fn from_json_str(&self, text: &str) -> Result<()> {
        match serde_json::from_str::<PlistValue>(text)? {
            PlistValue::Dictionary(dict) => {
                self.load_dictionary_representation(&dict);
                Ok(())
            }
            other => Err(Error::InvalidEvent(format!("bindings document is a {}", other.kind_name()))),
        }
    }

    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = self.to_json_string()?;
        std::fs::write(path.as_ref(), json)?;
        debug!(path = %path.as_ref().display(), "bindings saved");
        Ok(())
    }

    pub fn load_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let text = std::fs::read_to_string(path.as_ref())?;
        self.from_json_str(&text)
    }

    fn mark_clean(&self) {
        for sb in read(&self.systems).values() {
            write(sb).mark_clean();
        }
    }
}
