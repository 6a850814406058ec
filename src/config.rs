//! Runtime configuration for the input layer.
//!
//! ```toml
//! default_dead_zone = 0.15
//! auto_calibrate = true
//! ```
//!
//! Every field is optional; missing fields use [`InputConfig::default`].

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default upper bound of samples drained from one source per poll.
pub const DEFAULT_MAX_REPORTS_PER_TICK: usize = 32;

/// Tunables consumed by [`DeviceManager`](crate::manager::DeviceManager) and the
/// device handlers it creates.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Dead zone applied to analog controls that have no per-control override.
    pub default_dead_zone: f64,
    /// Grow axis calibration bounds as new extrema are observed.
    pub auto_calibrate: bool,
    /// Events kept for a disconnected device until it comes back.
    pub placeholder_buffer_len: usize,
    /// Sleep between polls on a reader thread.
    pub reader_poll_interval_ms: u64,
    /// Upper bound of samples drained from one source per poll.
    pub max_reports_per_tick: usize,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            default_dead_zone: 0.2,
            auto_calibrate: false,
            placeholder_buffer_len: 32,
            reader_poll_interval_ms: 4,
            max_reports_per_tick: DEFAULT_MAX_REPORTS_PER_TICK,
        }
    }
}

impl InputConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let cfg = InputConfig::from_toml_str("auto_calibrate = true\n").unwrap();
        assert!(cfg.auto_calibrate);
        assert_eq!(cfg.default_dead_zone, 0.2);
        assert_eq!(cfg.placeholder_buffer_len, 32);
    }

    #[test]
    fn empty_document_is_default() {
        assert_eq!(InputConfig::from_toml_str("").unwrap(), InputConfig::default());
    }

    #[test]
    fn wrong_type_is_an_error() {
        assert!(InputConfig::from_toml_str("default_dead_zone = \"wide\"\n").is_err());
    }
}
