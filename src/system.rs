//! Logical keys of an emulated system.
//!
//! A [`SystemDescription`] lists the human-meaningful keys of one system
//! ("Up", "A", "Start", ...), which of them are analog or shared by all
//! players, and the key groups that link keys together:
//!
//! - **Axis groups** pair two opposite keys (Left/Right) so one physical axis
//!   can drive both.
//! - **Hat-switch groups** list 4 or 8 keys in rotation order (up first,
//!   clockwise) so one hat switch can drive all of them.
//!
//! Keys and groups live in arenas owned by the description and refer to each
//! other through [`KeyId`] / [`GroupId`] indices. An [`OrientedKeyGroup`] is a
//! group seen from one of its members; it is what gets bound when a whole
//! physical axis or hat is assigned starting from that member.
//!
//! Systems are declared in TOML:
//!
//! ```toml
//! identifier = "openemu.system.snes"
//! name = "Super Nintendo"
//! players = 2
//! keys = ["Up", "Right", "Down", "Left", "A", "B", "Start", "Reset"]
//! system_keys = ["Reset"]
//!
//! [hat_switches]
//! DPad = ["Up", "Right", "Down", "Left"]
//!
//! [axes]
//! Horizontal = ["Left", "Right"]
//! Vertical = ["Up", "Down"]
//!
//! [default_keyboard]
//! Up = 82
//!
//! [default_devices.x360]
//! A = "ButtonA.on"
//! ```

use crate::error::{Error, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use tracing::warn;

/// Index of a key inside its [`SystemDescription`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyId(usize);

impl KeyId {
    /// Position in the system's key list; this is the key's index in the
    /// game core's key enumeration.
    pub fn index(self) -> usize {
        self.0
    }
}

/// Index of a key group inside its [`SystemDescription`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupId(usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum KeyGroupType {
    Axis,
    HatSwitch,
}

impl fmt::Display for KeyGroupType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyGroupType::Axis => f.write_str("axis"),
            KeyGroupType::HatSwitch => f.write_str("hat switch"),
        }
    }
}

/// One logical key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyBindingDescription {
    id: KeyId,
    name: String,
    system_wide: bool,
    analogic: bool,
    groups: Vec<GroupId>,
}

impl KeyBindingDescription {
    pub fn id(&self) -> KeyId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn index(&self) -> usize {
        self.id.0
    }

    /// Shared by all players (e.g. a console's reset button).
    pub fn is_system_wide(&self) -> bool {
        self.system_wide
    }

    pub fn is_analogic(&self) -> bool {
        self.analogic
    }

    pub fn groups(&self) -> &[GroupId] {
        &self.groups
    }
}

/// Keys that one physical axis or hat switch can drive together.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyGroupDescription {
    id: GroupId,
    group_type: KeyGroupType,
    identifier: String,
    keys: Vec<KeyId>,
    analogic: bool,
}

impl KeyGroupDescription {
    pub fn id(&self) -> GroupId {
        self.id
    }

    pub fn group_type(&self) -> KeyGroupType {
        self.group_type
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Members in rotation order.
    pub fn keys(&self) -> &[KeyId] {
        &self.keys
    }

    pub fn arity(&self) -> usize {
        self.keys.len()
    }

    /// Every member is an analog key.
    pub fn is_analogic(&self) -> bool {
        self.analogic
    }

    pub fn contains(&self, key: KeyId) -> bool {
        self.keys.contains(&key)
    }

    pub fn index_of_key(&self, key: KeyId) -> Option<usize> {
        self.keys.iter().position(|k| *k == key)
    }

    /// The member half a turn away: the other key of an axis pair, or the key
    /// at `(index + arity / 2) % arity` of a hat group.
    pub fn opposite_key_of_key(&self, key: KeyId) -> Option<KeyId> {
        let index = self.index_of_key(key)?;
        let n = self.arity();
        Some(self.keys[(index + n / 2) % n])
    }

    pub fn oriented_with_base_key(&self, key: KeyId) -> Option<OrientedKeyGroup> {
        let base_index = self.index_of_key(key)?;
        Some(OrientedKeyGroup {
            group: self.id,
            group_type: self.group_type,
            keys: self.keys.clone(),
            base_index,
        })
    }

    /// Members in rotation order starting at `base`, wrapping around.
    pub fn keys_from(&self, base: KeyId) -> Option<Vec<KeyId>> {
        let start = self.index_of_key(base)?;
        let n = self.arity();
        Some((0..n).map(|i| self.keys[(start + i) % n]).collect())
    }

    /// One oriented view per member, starting at `base`.
    pub fn oriented_groups_from(&self, base: KeyId) -> Option<Vec<OrientedKeyGroup>> {
        Some(
            self.keys_from(base)?
                .into_iter()
                .filter_map(|k| self.oriented_with_base_key(k))
                .collect(),
        )
    }
}

/// A key group anchored at one of its members.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct OrientedKeyGroup {
    group: GroupId,
    group_type: KeyGroupType,
    keys: Vec<KeyId>,
    base_index: usize,
}

impl OrientedKeyGroup {
    pub fn group(&self) -> GroupId {
        self.group
    }

    pub fn group_type(&self) -> KeyGroupType {
        self.group_type
    }

    pub fn arity(&self) -> usize {
        self.keys.len()
    }

    pub fn index_of_base_key(&self) -> usize {
        self.base_index
    }

    pub fn base_key(&self) -> KeyId {
        self.keys[self.base_index]
    }

    pub fn opposite_key(&self) -> KeyId {
        self.key_at_offset(self.arity() / 2)
    }

    /// Member `offset` steps clockwise from the base key.
    pub fn key_at_offset(&self, offset: usize) -> KeyId {
        self.keys[(self.base_index + offset) % self.keys.len()]
    }

    pub fn keys_from_base(&self) -> Vec<KeyId> {
        (0..self.arity()).map(|i| self.key_at_offset(i)).collect()
    }

    pub fn contains(&self, key: KeyId) -> bool {
        self.keys.contains(&key)
    }

    /// Views anchored at each member, starting with this one.
    pub fn oriented_groups_from_base(&self) -> Vec<OrientedKeyGroup> {
        (0..self.arity())
            .map(|i| OrientedKeyGroup {
                base_index: (self.base_index + i) % self.arity(),
                ..self.clone()
            })
            .collect()
    }
}

/// System-independent actions handled by the host.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GlobalButton {
    SaveState,
    LoadState,
    QuickSave,
    QuickLoad,
    FullScreen,
    Mute,
    VolumeDown,
    VolumeUp,
    Stop,
    Reset,
    Pause,
    Rewind,
    FastForward,
    StepFrameBackward,
    StepFrameForward,
    NextDisplayMode,
    LastDisplayMode,
    Screenshot,
}

impl GlobalButton {
    pub const ALL: [GlobalButton; 18] = [
        GlobalButton::SaveState,
        GlobalButton::LoadState,
        GlobalButton::QuickSave,
        GlobalButton::QuickLoad,
        GlobalButton::FullScreen,
        GlobalButton::Mute,
        GlobalButton::VolumeDown,
        GlobalButton::VolumeUp,
        GlobalButton::Stop,
        GlobalButton::Reset,
        GlobalButton::Pause,
        GlobalButton::Rewind,
        GlobalButton::FastForward,
        GlobalButton::StepFrameBackward,
        GlobalButton::StepFrameForward,
        GlobalButton::NextDisplayMode,
        GlobalButton::LastDisplayMode,
        GlobalButton::Screenshot,
    ];

    /// Persisted key name, e.g. `"Global.QuickSave"`.
    pub fn key_name(self) -> &'static str {
        match self {
            GlobalButton::SaveState => "Global.SaveState",
            GlobalButton::LoadState => "Global.LoadState",
            GlobalButton::QuickSave => "Global.QuickSave",
            GlobalButton::QuickLoad => "Global.QuickLoad",
            GlobalButton::FullScreen => "Global.FullScreen",
            GlobalButton::Mute => "Global.Mute",
            GlobalButton::VolumeDown => "Global.VolumeDown",
            GlobalButton::VolumeUp => "Global.VolumeUp",
            GlobalButton::Stop => "Global.Stop",
            GlobalButton::Reset => "Global.Reset",
            GlobalButton::Pause => "Global.Pause",
            GlobalButton::Rewind => "Global.Rewind",
            GlobalButton::FastForward => "Global.FastForward",
            GlobalButton::StepFrameBackward => "Global.StepFrameBackward",
            GlobalButton::StepFrameForward => "Global.StepFrameForward",
            GlobalButton::NextDisplayMode => "Global.NextDisplayMode",
            GlobalButton::LastDisplayMode => "Global.LastDisplayMode",
            GlobalButton::Screenshot => "Global.Screenshot",
        }
    }

    pub fn from_key_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|b| b.key_name() == name)
    }
}

impl fmt::Display for GlobalButton {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key_name().trim_start_matches("Global."))
    }
}

/// Anything a physical control can be bound to.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum BindingDescription {
    Key(KeyId),
    Global(GlobalButton),
    OrientedGroup(OrientedKeyGroup),
}

#[derive(Deserialize)]
struct SystemRepr {
    identifier: String,
    name: String,
    #[serde(default = "one")]
    players: u32,
    keys: Vec<String>,
    #[serde(default)]
    system_keys: Vec<String>,
    #[serde(default)]
    analog_keys: Vec<String>,
    #[serde(default)]
    hat_switches: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    axes: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    default_keyboard: BTreeMap<String, u16>,
    #[serde(default)]
    default_devices: BTreeMap<String, BTreeMap<String, String>>,
}

fn one() -> u32 {
    1
}

/// Builder for [`SystemDescription`]; validation happens in [`build`](Self::build).
#[derive(Clone, Debug, Default)]
pub struct SystemDescriptionBuilder {
    identifier: String,
    name: String,
    players: u32,
    keys: Vec<String>,
    system_keys: Vec<String>,
    analog_keys: Vec<String>,
    hat_switches: Vec<(String, Vec<String>)>,
    axes: Vec<(String, Vec<String>)>,
    default_keyboard: BTreeMap<String, u16>,
    default_devices: BTreeMap<String, BTreeMap<String, String>>,
}

impl SystemDescriptionBuilder {
    pub fn players(mut self, players: u32) -> Self {
        self.players = players;
        self
    }

    pub fn keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keys.extend(keys.into_iter().map(Into::into));
        self
    }

    pub fn system_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.system_keys.extend(keys.into_iter().map(Into::into));
        self
    }

    pub fn analog_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.analog_keys.extend(keys.into_iter().map(Into::into));
        self
    }

    /// Hat group; members listed up first, clockwise.
    pub fn hat_switch<I, S>(mut self, identifier: impl Into<String>, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.hat_switches
            .push((identifier.into(), keys.into_iter().map(Into::into).collect()));
        self
    }

    pub fn axis<I, S>(mut self, identifier: impl Into<String>, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.axes
            .push((identifier.into(), keys.into_iter().map(Into::into).collect()));
        self
    }

    pub fn default_keyboard_control(mut self, key: impl Into<String>, keycode: u16) -> Self {
        self.default_keyboard.insert(key.into(), keycode);
        self
    }

    /// Default binding of `key` to a control value of the controller `controller`.
    pub fn default_device_control(
        mut self,
        controller: impl Into<String>,
        key: impl Into<String>,
        control_value: impl Into<String>,
    ) -> Self {
        self.default_devices
            .entry(controller.into())
            .or_default()
            .insert(key.into(), control_value.into());
        self
    }

    pub fn build(self) -> Result<SystemDescription> {
        if self.players == 0 {
            return Err(Error::InvalidPlayer(0));
        }

        let mut by_name = HashMap::with_capacity(self.keys.len());
        let mut keys = Vec::with_capacity(self.keys.len());
        for (i, name) in self.keys.into_iter().enumerate() {
            if name.starts_with("Global.") || name.contains('/') || by_name.insert(name.clone(), KeyId(i)).is_some() {
                return Err(Error::DuplicateKey(name));
            }
            keys.push(KeyBindingDescription {
                id: KeyId(i),
                name,
                system_wide: false,
                analogic: false,
                groups: Vec::new(),
            });
        }

        let lookup = |name: &str| by_name.get(name).copied().ok_or_else(|| Error::UnknownKey(name.to_string()));

        for name in &self.system_keys {
            keys[lookup(name)?.0].system_wide = true;
        }
        for name in &self.analog_keys {
            keys[lookup(name)?.0].analogic = true;
        }

        let mut groups = Vec::new();
        let mut group_by_name = HashMap::new();
        let declared = self
            .axes
            .into_iter()
            .map(|g| (KeyGroupType::Axis, g))
            .chain(self.hat_switches.into_iter().map(|g| (KeyGroupType::HatSwitch, g)));
        for (group_type, (identifier, members)) in declared {
            let (valid, expected) = match group_type {
                KeyGroupType::Axis => (members.len() == 2, "2"),
                KeyGroupType::HatSwitch => (matches!(members.len(), 4 | 8), "4 or 8"),
            };
            if !valid {
                return Err(Error::InvalidKeyGroup {
                    group: identifier,
                    expected,
                    found: members.len(),
                });
            }
            let member_ids = members
                .iter()
                .map(|m| lookup(m))
                .collect::<Result<Vec<_>>>()?;
            // Each member needs its own position in the group.
            if let Some(i) = (1..member_ids.len()).find(|&i| member_ids[..i].contains(&member_ids[i])) {
                return Err(Error::DuplicateKey(format!("{identifier}/{}", members[i])));
            }
            let id = GroupId(groups.len());
            if group_by_name.insert(identifier.clone(), id).is_some() {
                return Err(Error::DuplicateKey(identifier));
            }
            for k in &member_ids {
                keys[k.0].groups.push(id);
            }
            groups.push(KeyGroupDescription {
                id,
                group_type,
                analogic: member_ids.iter().all(|k| keys[k.0].analogic),
                identifier,
                keys: member_ids,
            });
        }

        let mut default_keyboard = BTreeMap::new();
        for (key, code) in self.default_keyboard {
            if by_name.contains_key(&key) || GlobalButton::from_key_name(&key).is_some() {
                default_keyboard.insert(key, code);
            } else {
                warn!(system = %self.identifier, key = %key, "default keyboard control for unknown key ignored");
            }
        }

        Ok(SystemDescription {
            identifier: self.identifier,
            name: self.name,
            number_of_players: self.players,
            keys,
            groups,
            by_name,
            group_by_name,
            default_keyboard_controls: default_keyboard,
            default_device_controls: self.default_devices,
        })
    }
}

/// The keys, groups and defaults of one emulated system.
#[derive(Clone, Debug)]
pub struct SystemDescription {
    identifier: String,
    name: String,
    number_of_players: u32,
    keys: Vec<KeyBindingDescription>,
    groups: Vec<KeyGroupDescription>,
    by_name: HashMap<String, KeyId>,
    group_by_name: HashMap<String, GroupId>,
    default_keyboard_controls: BTreeMap<String, u16>,
    default_device_controls: BTreeMap<String, BTreeMap<String, String>>,
}

impl SystemDescription {
    pub fn builder(identifier: impl Into<String>, name: impl Into<String>) -> SystemDescriptionBuilder {
        SystemDescriptionBuilder {
            identifier: identifier.into(),
            name: name.into(),
            players: 1,
            ..SystemDescriptionBuilder::default()
        }
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let repr: SystemRepr = toml::from_str(text)?;
        let mut builder = Self::builder(repr.identifier, repr.name)
            .players(repr.players)
            .keys(repr.keys)
            .system_keys(repr.system_keys)
            .analog_keys(repr.analog_keys);
        for (id, members) in repr.axes {
            builder = builder.axis(id, members);
        }
        for (id, members) in repr.hat_switches {
            builder = builder.hat_switch(id, members);
        }
        builder.default_keyboard = repr.default_keyboard;
        builder.default_devices = repr.default_devices;
        builder.build()
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn number_of_players(&self) -> u32 {
        self.number_of_players
    }

    /// All keys, system-wide ones included, in declaration order.
    pub fn keys(&self) -> &[KeyBindingDescription] {
        &self.keys
    }

    /// Keys every player has.
    pub fn player_keys(&self) -> impl Iterator<Item = &KeyBindingDescription> {
        self.keys.iter().filter(|k| !k.system_wide)
    }

    pub fn system_keys(&self) -> impl Iterator<Item = &KeyBindingDescription> {
        self.keys.iter().filter(|k| k.system_wide)
    }

    pub fn analog_keys(&self) -> impl Iterator<Item = &KeyBindingDescription> {
        self.keys.iter().filter(|k| k.analogic)
    }

    pub fn key(&self, id: KeyId) -> Option<&KeyBindingDescription> {
        self.keys.get(id.0)
    }

    pub fn key_named(&self, name: &str) -> Option<&KeyBindingDescription> {
        self.by_name.get(name).and_then(|id| self.key(*id))
    }

    pub fn groups(&self) -> &[KeyGroupDescription] {
        &self.groups
    }

    pub fn group(&self, id: GroupId) -> Option<&KeyGroupDescription> {
        self.groups.get(id.0)
    }

    pub fn group_named(&self, identifier: &str) -> Option<&KeyGroupDescription> {
        self.group_by_name.get(identifier).and_then(|id| self.group(*id))
    }

    pub fn groups_of_key(&self, key: KeyId) -> Vec<&KeyGroupDescription> {
        self.key(key)
            .map(|k| k.groups.iter().filter_map(|g| self.group(*g)).collect())
            .unwrap_or_default()
    }

    pub fn axis_group_of_key(&self, key: KeyId) -> Option<&KeyGroupDescription> {
        self.group_of_key_with_type(key, KeyGroupType::Axis)
    }

    pub fn hat_switch_group_of_key(&self, key: KeyId) -> Option<&KeyGroupDescription> {
        self.group_of_key_with_type(key, KeyGroupType::HatSwitch)
    }

    fn group_of_key_with_type(&self, key: KeyId, ty: KeyGroupType) -> Option<&KeyGroupDescription> {
        self.groups_of_key(key)
            .into_iter()
            .find(|g| g.group_type == ty)
    }

    pub fn global_key_bindings(&self) -> &'static [GlobalButton] {
        &GlobalButton::ALL
    }

    /// Resolve a persisted key name: a system key, a `Global.*` button, or
    /// `"<group>/<base key>"` for an oriented group.
    pub fn binding_named(&self, name: &str) -> Option<BindingDescription> {
        if let Some(id) = self.by_name.get(name) {
            return Some(BindingDescription::Key(*id));
        }
        if let Some(button) = GlobalButton::from_key_name(name) {
            return Some(BindingDescription::Global(button));
        }
        let (group, base) = name.split_once('/')?;
        let base = self.by_name.get(base)?;
        self.group_named(group)?
            .oriented_with_base_key(*base)
            .map(BindingDescription::OrientedGroup)
    }

    /// Persisted name of a binding, the inverse of [`binding_named`](Self::binding_named).
    pub fn binding_name(&self, binding: &BindingDescription) -> Option<String> {
        match binding {
            BindingDescription::Key(id) => self.key(*id).map(|k| k.name.clone()),
            BindingDescription::Global(button) => Some(button.key_name().to_string()),
            BindingDescription::OrientedGroup(og) => {
                let group = self.group(og.group())?;
                let base = self.key(og.base_key())?;
                Some(format!("{}/{}", group.identifier, base.name))
            }
        }
    }

    pub fn default_keyboard_controls(&self) -> &BTreeMap<String, u16> {
        &self.default_keyboard_controls
    }

    /// Controller identifier → key name → control value identifier.
    pub fn default_device_controls(&self) -> &BTreeMap<String, BTreeMap<String, String>> {
        &self.default_device_controls
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SNES: &str = r#"
identifier = "openemu.system.snes"
name = "Super Nintendo"
players = 2
keys = ["Up", "Right", "Down", "Left", "A", "B", "Start", "Reset"]
system_keys = ["Reset"]

[hat_switches]
DPad = ["Up", "Right", "Down", "Left"]

[axes]
Horizontal = ["Left", "Right"]
Vertical = ["Up", "Down"]

[default_keyboard]
Up = 82
A = 4
Nope = 1
"#;

    fn snes() -> SystemDescription {
        SystemDescription::from_toml_str(SNES).unwrap()
    }

    #[test]
    fn parses_keys_and_groups() {
        let sys = snes();
        assert_eq!(sys.number_of_players(), 2);
        assert_eq!(sys.keys().len(), 8);
        assert_eq!(sys.player_keys().count(), 7);
        assert!(sys.key_named("Reset").unwrap().is_system_wide());
        assert_eq!(sys.groups().len(), 3);
        assert!(!sys.default_keyboard_controls().contains_key("Nope"));

        let up = sys.key_named("Up").unwrap().id();
        assert_eq!(sys.hat_switch_group_of_key(up).unwrap().identifier(), "DPad");
        assert_eq!(sys.axis_group_of_key(up).unwrap().identifier(), "Vertical");
        assert_eq!(sys.groups_of_key(up).len(), 2);
    }

    #[test]
    fn opposite_is_involutive() {
        let sys = snes();
        for group in sys.groups() {
            for &k in group.keys() {
                let opp = group.opposite_key_of_key(k).unwrap();
                assert_ne!(opp, k);
                assert_eq!(group.opposite_key_of_key(opp), Some(k));
            }
        }
        let dpad = sys.group_named("DPad").unwrap();
        let up = sys.key_named("Up").unwrap().id();
        let down = sys.key_named("Down").unwrap().id();
        assert_eq!(dpad.opposite_key_of_key(up), Some(down));
    }

    #[test]
    fn enumeration_follows_rotation() {
        let sys = snes();
        let dpad = sys.group_named("DPad").unwrap();
        let id = |n| sys.key_named(n).unwrap().id();
        assert_eq!(
            dpad.keys_from(id("Down")).unwrap(),
            vec![id("Down"), id("Left"), id("Up"), id("Right")]
        );

        let oriented = dpad.oriented_with_base_key(id("Left")).unwrap();
        assert_eq!(oriented.base_key(), id("Left"));
        assert_eq!(oriented.opposite_key(), id("Right"));
        assert_eq!(oriented.index_of_base_key(), 3);
        let bases: Vec<_> = oriented
            .oriented_groups_from_base()
            .iter()
            .map(|g| g.base_key())
            .collect();
        assert_eq!(bases, vec![id("Left"), id("Up"), id("Right"), id("Down")]);
        assert_eq!(dpad.oriented_groups_from(id("Up")).unwrap().len(), 4);
    }

    #[test]
    fn arity_is_validated() {
        let err = SystemDescription::builder("s", "S")
            .keys(["Up", "Down", "Left"])
            .hat_switch("DPad", ["Up", "Down", "Left"])
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidKeyGroup { found: 3, .. }));

        let err = SystemDescription::builder("s", "S")
            .keys(["Left", "Right"])
            .axis("X", ["Left", "Missing"])
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::UnknownKey(k) if k == "Missing"));

        let err = SystemDescription::builder("s", "S")
            .keys(["A", "A"])
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateKey(_)));
    }

    #[test]
    fn group_members_must_be_distinct() {
        let err = SystemDescription::builder("s", "S")
            .keys(["Left", "Right"])
            .axis("Horizontal", ["Left", "Left"])
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateKey(k) if k == "Horizontal/Left"));

        let err = SystemDescription::builder("s", "S")
            .keys(["Up", "Right", "Down", "Left"])
            .hat_switch("DPad", ["Up", "Right", "Up", "Left"])
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateKey(k) if k == "DPad/Up"));
    }

    #[test]
    fn global_buttons_resolve_by_name() {
        let sys = snes();
        assert_eq!(
            sys.binding_named("Global.QuickSave"),
            Some(BindingDescription::Global(GlobalButton::QuickSave))
        );
        let dpad = sys.group_named("DPad").unwrap();
        let left = sys.key_named("Left").unwrap().id();
        let og = BindingDescription::OrientedGroup(dpad.oriented_with_base_key(left).unwrap());
        assert_eq!(sys.binding_name(&og).as_deref(), Some("DPad/Left"));
        assert_eq!(sys.binding_named("DPad/Left"), Some(og));
        assert_eq!(sys.binding_named("DPad/A"), None);
        for b in GlobalButton::ALL {
            assert_eq!(GlobalButton::from_key_name(b.key_name()), Some(b));
        }
        assert_eq!(GlobalButton::FastForward.to_string(), "FastForward");
    }
}
