//! Capability traits a game core plugin implements.
//!
//! The input layer itself only talks to cores through
//! [`SystemResponderClient`](crate::responder::SystemResponderClient). The traits
//! here describe the rest of the host/core contract so hosts can hold cores
//! as trait objects: lifecycle and frame stepping ([`GameCore`]), video
//! ([`VideoSource`]), audio ([`AudioBufferSource`]) and save states
//! ([`SaveStateCapable`]).

use crate::geometry::{IntRect, IntSize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Failures a core reports to the host. Codes match the plugin ABI.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GameCoreError {
    #[error("the core could not start: {0}")]
    CouldNotStart(String),
    #[error("the core could not load the ROM: {0}")]
    CouldNotLoadRom(String),
    #[error("the core could not load the save state: {0}")]
    CouldNotLoadState(String),
    #[error("save state has the wrong size (expected {expected}, got {actual})")]
    StateHasWrongSize { expected: usize, actual: usize },
    #[error("the core could not save the state: {0}")]
    CouldNotSaveState(String),
}

impl GameCoreError {
    pub fn code(&self) -> i32 {
        match self {
            GameCoreError::CouldNotStart(_) => -1,
            GameCoreError::CouldNotLoadRom(_) => -2,
            GameCoreError::CouldNotLoadState(_) => -3,
            GameCoreError::StateHasWrongSize { .. } => -4,
            GameCoreError::CouldNotSaveState(_) => -5,
        }
    }
}

/// Layout of the pixels in a video buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    Rgb565,
    Rgba5551,
    Bgra8888,
    Rgba8888,
    Rgb888,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgb565 | PixelFormat::Rgba5551 => 2,
            PixelFormat::Rgb888 => 3,
            PixelFormat::Bgra8888 | PixelFormat::Rgba8888 => 4,
        }
    }
}

/// Lifecycle of an emulation core. The host owns the timing loop.
pub trait GameCore: Send {
    fn load_file(&mut self, path: &Path) -> Result<(), GameCoreError>;
    fn setup(&mut self) {}
    fn start(&mut self) -> Result<(), GameCoreError> {
        Ok(())
    }
    fn reset(&mut self);
    fn stop(&mut self) {}
    fn execute_frame(&mut self);

    /// Time between frames at rate 1.0.
    fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / 60.0)
    }

    /// Host-supplied speed multiplier (fast forward, slow motion).
    fn set_rate(&mut self, _rate: f32) {}

    fn system_identifier(&self) -> &str;
}

pub trait VideoSource {
    /// Size of the full frame buffer.
    fn buffer_size(&self) -> IntSize;
    /// Visible part of the buffer.
    fn screen_rect(&self) -> IntRect;
    /// Display aspect, e.g. 4:3.
    fn aspect_size(&self) -> IntSize;
    fn pixel_format(&self) -> PixelFormat;
    fn video_buffer(&self) -> &[u8];

    /// Bytes per buffer row.
    fn bytes_per_row(&self) -> usize {
        self.buffer_size().width.max(0) as usize * self.pixel_format().bytes_per_pixel()
    }
}

pub trait AudioBufferSource {
    fn audio_buffer_count(&self) -> usize {
        1
    }
    fn channel_count(&self, buffer: usize) -> usize;
    fn audio_bit_depth(&self) -> usize {
        16
    }
    fn audio_sample_rate(&self, buffer: usize) -> f64;
    /// Copy up to `out.len()` bytes of buffer `buffer`; returns bytes written.
    fn read_audio(&mut self, buffer: usize, out: &mut [u8]) -> usize;
}

pub trait SaveStateCapable {
    fn serialize_state(&self) -> Result<Vec<u8>, GameCoreError>;
    fn deserialize_state(&mut self, state: &[u8]) -> Result<(), GameCoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter {
        value: u32,
    }

    impl SaveStateCapable for Counter {
        fn serialize_state(&self) -> Result<Vec<u8>, GameCoreError> {
            Ok(self.value.to_le_bytes().to_vec())
        }

        fn deserialize_state(&mut self, state: &[u8]) -> Result<(), GameCoreError> {
            let bytes: [u8; 4] = state.try_into().map_err(|_| GameCoreError::StateHasWrongSize {
                expected: 4,
                actual: state.len(),
            })?;
            self.value = u32::from_le_bytes(bytes);
            Ok(())
        }
    }

    #[test]
    fn error_codes_match_abi() {
        assert_eq!(GameCoreError::CouldNotStart(String::new()).code(), -1);
        assert_eq!(GameCoreError::CouldNotLoadRom(String::new()).code(), -2);
        assert_eq!(GameCoreError::CouldNotLoadState(String::new()).code(), -3);
        assert_eq!(GameCoreError::StateHasWrongSize { expected: 1, actual: 2 }.code(), -4);
        assert_eq!(GameCoreError::CouldNotSaveState(String::new()).code(), -5);
    }

    #[test]
    fn save_state_round_trip_and_size_check() {
        let mut c = Counter { value: 42 };
        let blob = c.serialize_state().unwrap();
        c.value = 0;
        c.deserialize_state(&blob).unwrap();
        assert_eq!(c.value, 42);
        let err = c.deserialize_state(&[1, 2]).unwrap_err();
        assert_eq!(err.code(), -4);
    }
}
