//! # Error Types
//!
//! Errors surfaced by the detection engine. Only [`DeviceError`] ever reaches
//! the user: a malformed frame is downgraded to an invalid pitch estimate and
//! a bad configuration is rejected before a session exists.

use thiserror::Error;

/// The capture device could not be acquired.
///
/// Returned by [`crate::session::Detector::start`]. The engine never retries
/// on its own; a new `start()` call is the retry.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// The host reports no default input device.
    #[error("no input device available")]
    NoInputDevice,

    /// The device offers no `f32` input configuration we can use.
    #[error("no suitable f32 input format found")]
    NoSupportedConfig,

    /// The device runs at a rate where one frame cannot span the longest
    /// period of the detection range.
    #[error(
        "frames of {frame_size} samples are too short at {sample_rate} Hz, need at least {required}"
    )]
    FrameTooShort {
        frame_size: usize,
        sample_rate: u32,
        required: usize,
    },

    /// The audio backend refused one of the capture steps
    /// (querying configs, building or playing the stream).
    #[error("audio backend error while {action}: {message}")]
    Backend {
        action: &'static str,
        message: String,
    },
}

impl DeviceError {
    pub(crate) fn backend(action: &'static str, err: impl std::fmt::Display) -> Self {
        DeviceError::Backend {
            action,
            message: err.to_string(),
        }
    }
}

/// A frame that cannot be analyzed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FrameError {
    #[error("frame contains no samples")]
    Empty,

    #[error("frame reports a sample rate of 0 Hz")]
    ZeroSampleRate,

    /// The frame cannot hold one comparison window plus the largest lag.
    #[error("frame of {len} samples is too short, need at least {required}")]
    TooShort { len: usize, required: usize },

    #[error("sample {index} is not a finite number")]
    NonFinite { index: usize },
}

/// Configuration could not be loaded or is inconsistent.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not parse config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}
