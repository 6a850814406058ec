//! Hat switch directions.
//!
//! A direction is a bit set of the four cardinals. Diagonals are exactly the
//! OR of two adjacent cardinals; neutral is the empty set.
//!
//! Raw hat values arrive as **slots** (`0..7` for 8-way, `0..3` for 4-way,
//! up = 0, clockwise) or as **degrees**. Degrees are folded into 45° sectors.
//! A 4-way hat never reports a diagonal.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of positions a hat switch reports.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HatSwitchType {
    Unknown,
    FourWays,
    EightWays,
}

impl HatSwitchType {
    pub fn positions(self) -> usize {
        match self {
            HatSwitchType::FourWays => 4,
            HatSwitchType::EightWays => 8,
            HatSwitchType::Unknown => 0,
        }
    }

    pub(crate) fn code(self) -> u16 {
        match self {
            HatSwitchType::Unknown => 0,
            HatSwitchType::FourWays => 4,
            HatSwitchType::EightWays => 8,
        }
    }

    pub(crate) fn from_code(code: u16) -> Option<Self> {
        match code {
            0 => Some(HatSwitchType::Unknown),
            4 => Some(HatSwitchType::FourWays),
            8 => Some(HatSwitchType::EightWays),
            _ => None,
        }
    }
}

/// Direction bit set (N = 1, E = 2, S = 4, W = 8).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HatDirection(u8);

impl HatDirection {
    pub const NULL: Self = Self(0);
    pub const NORTH: Self = Self(1 << 0);
    pub const EAST: Self = Self(1 << 1);
    pub const SOUTH: Self = Self(1 << 2);
    pub const WEST: Self = Self(1 << 3);
    pub const NORTH_EAST: Self = Self(Self::NORTH.0 | Self::EAST.0);
    pub const SOUTH_EAST: Self = Self(Self::SOUTH.0 | Self::EAST.0);
    pub const SOUTH_WEST: Self = Self(Self::SOUTH.0 | Self::WEST.0);
    pub const NORTH_WEST: Self = Self(Self::NORTH.0 | Self::WEST.0);

    /// Rotation order for 8 positions, up first, clockwise.
    pub const EIGHT_WAY_ROTATION: [HatDirection; 8] = [
        Self::NORTH,
        Self::NORTH_EAST,
        Self::EAST,
        Self::SOUTH_EAST,
        Self::SOUTH,
        Self::SOUTH_WEST,
        Self::WEST,
        Self::NORTH_WEST,
    ];

    /// Rotation order for 4 positions.
    pub const FOUR_WAY_ROTATION: [HatDirection; 4] =
        [Self::NORTH, Self::EAST, Self::SOUTH, Self::WEST];

    /// Builds a direction from raw bits; bits above the four cardinals are dropped.
    pub fn from_bits(bits: u8) -> Self {
        Self(bits & 0x0F)
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, other: HatDirection) -> bool {
        !other.is_null() && self.0 & other.0 == other.0
    }

    /// `true` when exactly two adjacent cardinals are set.
    pub fn is_diagonal(self) -> bool {
        Self::EIGHT_WAY_ROTATION
            .iter()
            .skip(1)
            .step_by(2)
            .any(|d| *d == self)
    }

    /// `true` for a valid hat state: neutral, one cardinal or one diagonal.
    pub fn is_valid(self) -> bool {
        self.is_null() || Self::EIGHT_WAY_ROTATION.contains(&self)
    }

    /// The cardinal bits making up this direction.
    pub fn cardinals(self) -> Vec<HatDirection> {
        Self::FOUR_WAY_ROTATION
            .iter()
            .copied()
            .filter(|c| self.contains(*c))
            .collect()
    }

    /// Direction 180° away.
    pub fn opposite(self) -> Self {
        let mut bits = 0;
        if self.0 & Self::NORTH.0 != 0 {
            bits |= Self::SOUTH.0;
        }
        if self.0 & Self::SOUTH.0 != 0 {
            bits |= Self::NORTH.0;
        }
        if self.0 & Self::EAST.0 != 0 {
            bits |= Self::WEST.0;
        }
        if self.0 & Self::WEST.0 != 0 {
            bits |= Self::EAST.0;
        }
        Self(bits)
    }

    /// Index of this direction in the rotation of `positions` entries (4 or 8).
    pub fn rotation_index(self, positions: usize) -> Option<usize> {
        match positions {
            4 => Self::FOUR_WAY_ROTATION.iter().position(|d| *d == self),
            8 => Self::EIGHT_WAY_ROTATION.iter().position(|d| *d == self),
            _ => None,
        }
    }

    /// Direction at `index` in the rotation of `positions` entries, wrapping.
    pub fn from_rotation_index(index: usize, positions: usize) -> Self {
        match positions {
            4 => Self::FOUR_WAY_ROTATION[index % 4],
            8 => Self::EIGHT_WAY_ROTATION[index % 8],
            _ => Self::NULL,
        }
    }

    /// Decode a slot value (`up = 0`, clockwise) for the given hat type.
    pub fn from_slot(slot: i32, hat: HatSwitchType) -> Self {
        match hat {
            HatSwitchType::FourWays if (0..4).contains(&slot) => {
                Self::FOUR_WAY_ROTATION[slot as usize]
            }
            HatSwitchType::EightWays | HatSwitchType::Unknown if (0..8).contains(&slot) => {
                Self::EIGHT_WAY_ROTATION[slot as usize]
            }
            _ => Self::NULL,
        }
    }

    pub(crate) fn short_name(self) -> &'static str {
        match self.0 {
            0 => "0",
            1 => "n",
            2 => "e",
            4 => "s",
            8 => "w",
            3 => "ne",
            6 => "se",
            12 => "sw",
            9 => "nw",
            _ => "?",
        }
    }

    pub(crate) fn from_short_name(name: &str) -> Option<Self> {
        Some(match name {
            "0" => Self::NULL,
            "n" => Self::NORTH,
            "e" => Self::EAST,
            "s" => Self::SOUTH,
            "w" => Self::WEST,
            "ne" => Self::NORTH_EAST,
            "se" => Self::SOUTH_EAST,
            "sw" => Self::SOUTH_WEST,
            "nw" => Self::NORTH_WEST,
            _ => return None,
        })
    }
}

impl fmt::Display for HatDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self.0 {
            0 => "Null",
            1 => "North",
            2 => "East",
            4 => "South",
            8 => "West",
            3 => "North-East",
            6 => "South-East",
            12 => "South-West",
            9 => "North-West",
            _ => "Invalid",
        };
        f.write_str(name)
    }
}

/// Normalize a raw hat value into a slot: `-1` neutral, `0..positions-1` otherwise.
///
/// Values outside `[lo, hi]` and the common neutral sentinels are neutral.
/// When `is_degrees` is set, the value is folded into 45° (8-way) or 90°
/// (4-way) sectors.
pub fn hat_value_to_slot(raw: i32, lo: i32, hi: i32, is_degrees: bool, hat: HatSwitchType) -> i16 {
    let positions = match hat {
        HatSwitchType::FourWays => 4,
        _ => 8,
    };
    if raw < lo || raw > hi || matches!(raw, -1 | 0xFFFF) {
        return -1;
    }
    if !is_degrees {
        // Slots may start at 0 or 1 depending on the descriptor.
        let slot = raw - lo;
        if slot >= 0 && slot < positions {
            return slot as i16;
        }
        return -1;
    }
    let sector = 360.0 / positions as f32;
    let deg = raw as f32;
    let mut slot = ((deg + sector / 2.0) / sector).floor() as i32 % positions;
    if slot < 0 {
        slot += positions;
    }
    slot as i16
}

/// Decode a raw hat value straight into a direction.
pub fn hat_direction_from_raw(
    raw: i32,
    lo: i32,
    hi: i32,
    is_degrees: bool,
    hat: HatSwitchType,
) -> HatDirection {
    match hat_value_to_slot(raw, lo, hi, is_degrees, hat) {
        -1 => HatDirection::NULL,
        slot => HatDirection::from_slot(slot as i32, hat),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagonals_are_or_of_adjacent_cardinals() {
        let rot = HatDirection::EIGHT_WAY_ROTATION;
        for i in (1..8).step_by(2) {
            let expected = rot[i - 1].bits() | rot[(i + 1) % 8].bits();
            assert_eq!(rot[i].bits(), expected);
            assert!(rot[i].is_diagonal());
            assert_eq!(rot[i].cardinals().len(), 2);
        }
        for c in HatDirection::FOUR_WAY_ROTATION {
            assert!(!c.is_diagonal());
        }
    }

    #[test]
    fn four_way_never_reports_diagonals() {
        for raw in -2..12 {
            let d = hat_direction_from_raw(raw, 0, 3, false, HatSwitchType::FourWays);
            assert!(!d.is_diagonal(), "raw {raw} gave {d}");
        }
        for deg in (0..360).step_by(5) {
            let d = hat_direction_from_raw(deg, 0, 359, true, HatSwitchType::FourWays);
            assert!(!d.is_diagonal());
            assert!(!d.is_null());
        }
    }

    #[test]
    fn eight_way_slots() {
        assert_eq!(
            hat_direction_from_raw(1, 0, 7, false, HatSwitchType::EightWays),
            HatDirection::NORTH_EAST
        );
        assert_eq!(
            hat_direction_from_raw(8, 0, 7, false, HatSwitchType::EightWays),
            HatDirection::NULL
        );
        // 1-based descriptors
        assert_eq!(
            hat_direction_from_raw(1, 1, 8, false, HatSwitchType::EightWays),
            HatDirection::NORTH
        );
    }

    #[test]
    fn degrees_fold_into_sectors() {
        let d = |deg| hat_direction_from_raw(deg, 0, 359, true, HatSwitchType::EightWays);
        assert_eq!(d(0), HatDirection::NORTH);
        assert_eq!(d(350), HatDirection::NORTH);
        assert_eq!(d(45), HatDirection::NORTH_EAST);
        assert_eq!(d(180), HatDirection::SOUTH);
        assert_eq!(d(270), HatDirection::WEST);
    }

    #[test]
    fn opposite_and_rotation() {
        assert_eq!(HatDirection::NORTH.opposite(), HatDirection::SOUTH);
        assert_eq!(HatDirection::NORTH_EAST.opposite(), HatDirection::SOUTH_WEST);
        for i in 0..8 {
            let d = HatDirection::from_rotation_index(i, 8);
            assert_eq!(d.rotation_index(8), Some(i));
            assert_eq!(HatDirection::from_rotation_index(i + 4, 8), d.opposite());
        }
    }

    #[test]
    fn short_names_round_trip() {
        for d in HatDirection::EIGHT_WAY_ROTATION.iter().chain([HatDirection::NULL].iter()) {
            assert_eq!(HatDirection::from_short_name(d.short_name()), Some(*d));
        }
    }
}
