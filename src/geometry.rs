//! Integer geometry shared with game cores (screen rects, buffer sizes, mouse points).

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IntPoint {
    pub x: i32,
    pub y: i32,
}

impl IntPoint {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IntSize {
    pub width: i32,
    pub height: i32,
}

impl IntSize {
    pub const fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }

    /// Zero width or zero height.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Origin plus size. Sizes may be negative; the min/max accessors normalize.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IntRect {
    pub origin: IntPoint,
    pub size: IntSize,
}

impl IntRect {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            origin: IntPoint::new(x, y),
            size: IntSize::new(width, height),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.size.is_empty()
    }

    pub fn min_x(&self) -> i32 {
        self.origin.x.min(self.origin.x + self.size.width)
    }

    pub fn max_x(&self) -> i32 {
        self.origin.x.max(self.origin.x + self.size.width)
    }

    pub fn min_y(&self) -> i32 {
        self.origin.y.min(self.origin.y + self.size.height)
    }

    pub fn max_y(&self) -> i32 {
        self.origin.y.max(self.origin.y + self.size.height)
    }

    pub fn contains(&self, point: IntPoint) -> bool {
        (self.min_x()..self.max_x()).contains(&point.x) && (self.min_y()..self.max_y()).contains(&point.y)
    }
}
