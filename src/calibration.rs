//! Axis calibration and dead-zone math.
//!
//! A calibration is a `(min, center, max)` triple in raw device units. Scaling
//! maps `[min, center]` onto `[-1, 0]` and `[center, max]` onto `[0, 1]`, after
//! clamping the raw value into `[min, max]`. Triggers use the whole range
//! `[min, max] → [0, 1]`.
//!
//! The dead zone is a plain clamp: magnitudes below the threshold become `0.0`,
//! everything else passes through untouched. Values just above the threshold
//! are **not** stretched to fill the remaining range.

use serde::{Deserialize, Serialize};

/// Raw-unit calibration of one axis control.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AxisCalibration {
    pub min: i64,
    pub center: i64,
    pub max: i64,
    /// `true` when `center` was derived from `min`/`max` and should follow them.
    #[serde(default)]
    pub derived_center: bool,
}

impl AxisCalibration {
    /// Calibration with the default center `(min + max + 1) / 2`.
    ///
    /// Division truncates toward zero, so `(-32768, 32767)` centers on `0`
    /// and `(0, 255)` on `128`.
    pub fn new(min: i64, max: i64) -> Self {
        Self {
            min,
            center: default_center(min, max),
            max,
            derived_center: true,
        }
    }

    pub fn with_center(min: i64, center: i64, max: i64) -> Self {
        Self {
            min,
            center,
            max,
            derived_center: false,
        }
    }

    /// Scale a raw sample into `[-1.0, 1.0]`.
    ///
    /// Degenerate halves (`min == center` or `center == max`) and empty ranges
    /// produce `0.0` instead of dividing by zero.
    pub fn scaled_value(&self, raw: i64) -> f64 {
        if self.min >= self.max {
            return 0.0;
        }
        let center = self.center.clamp(self.min, self.max);
        let value = raw.clamp(self.min, self.max);

        if value < center {
            let span = span(self.min, center);
            if span == 0.0 {
                return 0.0;
            }
            -span_ratio(value, center, span)
        } else if value > center {
            let span = span(center, self.max);
            if span == 0.0 {
                return 0.0;
            }
            span_ratio(center, value, span)
        } else {
            0.0
        }
    }

    /// Scale a raw trigger sample into `[0.0, 1.0]`.
    pub fn scaled_trigger_value(&self, raw: i64) -> f64 {
        if self.min >= self.max {
            return 0.0;
        }
        let value = raw.clamp(self.min, self.max);
        span_ratio(self.min, value, span(self.min, self.max))
    }

    /// Widen the bounds so `raw` is inside them. Returns `true` if anything changed.
    pub fn expand_to_include(&mut self, raw: i64) -> bool {
        if raw >= self.min && raw <= self.max {
            return false;
        }
        self.min = self.min.min(raw);
        self.max = self.max.max(raw);
        if self.derived_center {
            self.center = default_center(self.min, self.max);
        }
        true
    }
}

// Widened so full-range `i64` calibrations cannot overflow.
fn default_center(min: i64, max: i64) -> i64 {
    ((min as i128 + max as i128 + 1) / 2) as i64
}

fn span(from: i64, to: i64) -> f64 {
    (to as i128 - from as i128) as f64
}

fn span_ratio(from: i64, to: i64, total: f64) -> f64 {
    (span(from, to) / total).clamp(0.0, 1.0)
}

/// Clamp-to-zero dead zone.
#[inline]
pub fn apply_dead_zone(value: f64, dead_zone: f64) -> f64 {
    if value.abs() < dead_zone {
        0.0
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_center_rounding() {
        assert_eq!(AxisCalibration::new(-32768, 32767).center, 0);
        assert_eq!(AxisCalibration::new(0, 255).center, 128);
        assert_eq!(AxisCalibration::new(0, 1023).center, 512);
    }

    #[test]
    fn sixteen_bit_half_deflection() {
        let cal = AxisCalibration::new(-32768, 32767);
        let v = cal.scaled_value(16384);
        assert!((v - 0.5003).abs() < 1e-3, "got {v}");
    }

    #[test]
    fn endpoints_and_center_map_exactly() {
        for (min, center, max) in [(-100, 0, 100), (0, 10, 255), (-5, 3, 7), (1, 2, 3)] {
            let cal = AxisCalibration::with_center(min, center, max);
            assert_eq!(cal.scaled_value(min), -1.0);
            assert_eq!(cal.scaled_value(center), 0.0);
            assert_eq!(cal.scaled_value(max), 1.0);
            assert_eq!(cal.scaled_value(min - 1000), -1.0);
            assert_eq!(cal.scaled_value(max + 1000), 1.0);
        }
    }

    #[test]
    fn scaling_is_monotonic() {
        let cal = AxisCalibration::with_center(0, 40, 255);
        let mut last = -1.0;
        for raw in 0..=255 {
            let v = cal.scaled_value(raw);
            assert!(v >= last);
            assert!((-1.0..=1.0).contains(&v));
            last = v;
        }
    }

    #[test]
    fn empty_range_is_neutral() {
        let cal = AxisCalibration::new(7, 7);
        assert_eq!(cal.scaled_value(7), 0.0);
        assert_eq!(cal.scaled_value(100), 0.0);
        assert_eq!(cal.scaled_trigger_value(100), 0.0);

        let lopsided = AxisCalibration::with_center(0, 0, 10);
        assert_eq!(lopsided.scaled_value(-3), 0.0);
        assert_eq!(lopsided.scaled_value(10), 1.0);
    }

    #[test]
    fn trigger_range() {
        let cal = AxisCalibration::new(0, 255);
        assert_eq!(cal.scaled_trigger_value(0), 0.0);
        assert_eq!(cal.scaled_trigger_value(255), 1.0);
        assert_eq!(cal.scaled_trigger_value(300), 1.0);
        assert!((cal.scaled_trigger_value(51) - 0.2).abs() < 1e-9);
    }

    #[test]
    fn dead_zone_clamps_without_rescaling() {
        for dz in [0.0, 0.05, 0.2, 0.5] {
            for step in -20..=20 {
                let v = step as f64 / 20.0;
                let out = apply_dead_zone(v, dz);
                if v.abs() < dz {
                    assert_eq!(out, 0.0);
                } else {
                    assert_eq!(out, v);
                }
            }
        }
    }

    #[test]
    fn auto_calibration_grows_bounds() {
        let mut cal = AxisCalibration::new(-100, 100);
        assert!(!cal.expand_to_include(50));
        assert!(cal.expand_to_include(-200));
        assert_eq!(cal.min, -200);
        assert_eq!(cal.center, (-200 + 100 + 1) / 2);

        let mut fixed = AxisCalibration::with_center(0, 10, 20);
        fixed.expand_to_include(40);
        assert_eq!((fixed.min, fixed.center, fixed.max), (0, 10, 40));
    }

    #[test]
    fn full_width_ranges_do_not_overflow() {
        let cal = AxisCalibration::new(i64::MIN, i64::MAX);
        assert_eq!(cal.center, 0);
        assert_eq!(cal.scaled_value(i64::MIN), -1.0);
        assert_eq!(cal.scaled_value(i64::MAX), 1.0);
        assert_eq!(cal.scaled_value(0), 0.0);
        assert_eq!(cal.scaled_trigger_value(i64::MAX), 1.0);
        assert_eq!(cal.scaled_trigger_value(i64::MIN), 0.0);

        let mut grown = AxisCalibration::new(-1, 1);
        assert!(grown.expand_to_include(i64::MAX));
        assert!(grown.expand_to_include(i64::MIN));
        assert_eq!((grown.min, grown.center, grown.max), (i64::MIN, 0, i64::MAX));
        assert!((grown.scaled_value(i64::MAX / 2) - 0.5).abs() < 1e-9);
    }
}
