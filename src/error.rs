#[cfg(feature = "input")]
use cpal::{BuildStreamError, PlayStreamError, SupportedStreamConfigsError};

/// A configuration value was rejected when a component was constructed.
///
/// Values are never clamped; an out-of-range setting always fails here.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("sample rate must be positive and finite, got {0}")]
    SampleRate(f32),
    #[error("bin count must be positive")]
    BinCount,
    #[error("peak spacing must be at least one bin")]
    PeakSpacing,
    #[error("fft size must be a power of two between 32 and 32768, got {0}")]
    FftSize(usize),
    #[error("decibel range is empty: min {min} must be below max {max}")]
    DecibelRange { min: f32, max: f32 },
    #[error("smoothing must be within 0..=1, got {0}")]
    Smoothing(f32),
    #[error("refresh rate must be positive and finite, got {0}")]
    RefreshRate(f32),
}

/// Opening the audio input failed. The session is never started.
#[cfg(feature = "input")]
#[derive(Debug, thiserror::Error)]
pub enum AcquisitionError {
    #[error("{0}")]
    Stream(#[from] BuildStreamError),
    #[error("{0}")]
    Play(#[from] PlayStreamError),
    #[error("{0}")]
    Configs(#[from] SupportedStreamConfigsError),
    #[error("{0}")]
    Config(#[from] ConfigError),
    #[error("No config available for device")]
    NoConfig,
    #[error("No device available")]
    NoDevice,
}
