//! # Configuration Module
//!
//! Tunable parameters for capture, pitch estimation and note stabilization.
//! Every section has defaults matching the behavior described in the crate
//! docs, so a config file only needs to list the values it changes.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::pitch;

/// Top-level configuration for a detection session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub capture: CaptureConfig,
    pub estimator: EstimatorConfig,
    pub stabilizer: StabilizerConfig,
    /// Interval between two display ticks in milliseconds (default: 16, ~60 FPS)
    pub tick_interval_ms: u64,
}

/// Live capture parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Preferred input sample rate in Hz (default: 44100)
    pub sample_rate: u32,
    /// Samples per analysis frame (default: 4096)
    pub frame_size: usize,
    /// Samples between the starts of two consecutive frames (default: 1024)
    pub hop_size: usize,
    /// Frames the capture callback may queue before dropping (default: 4)
    pub queue_depth: usize,
}

/// Pitch estimator thresholds and search range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    /// Frames with RMS below this are silent (default: 0.01)
    pub silence_rms: f32,
    /// Minimum correlation score for a trustworthy pitch (default: 0.9)
    pub clarity_threshold: f32,
    /// Lowest detectable pitch in Hz (default: 80.0)
    pub min_frequency: f32,
    /// Highest detectable pitch in Hz (default: 1000.0)
    pub max_frequency: f32,
}

/// Rolling-history and voting parameters of the stabilizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StabilizerConfig {
    /// Maximum number of observations kept (default: 20)
    pub history_capacity: usize,
    /// Observations required before anything is displayed (default: 5)
    pub min_observations: usize,
    /// Share of the history the majority note must reach (default: 0.7)
    pub agreement_ratio: f32,
    /// Estimates must be strictly more confident than this to count (default: 0.5)
    pub accept_confidence: f32,
    /// Invalid estimates below this confidence decay the history (default: 0.3)
    pub silence_confidence: f32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            frame_size: 4096,
            hop_size: 1024,
            queue_depth: 4,
        }
    }
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            silence_rms: 0.01,
            clarity_threshold: 0.9,
            min_frequency: 80.0,
            max_frequency: 1000.0,
        }
    }
}

impl Default for StabilizerConfig {
    fn default() -> Self {
        Self {
            history_capacity: 20,
            min_observations: 5,
            agreement_ratio: 0.7,
            accept_confidence: 0.5,
            silence_confidence: 0.3,
        }
    }
}

impl DetectorConfig {
    /// Loads a configuration from a JSON file and validates it.
    ///
    /// Missing fields keep their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let mut file = File::open(path)?;
        let mut data = String::new();
        file.read_to_string(&mut data)?;
        Self::from_json(&data)
    }

    /// Parses and validates a JSON configuration string.
    pub fn from_json(data: &str) -> Result<Self, ConfigError> {
        let config: DetectorConfig = serde_json::from_str(data)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that the values can drive a session.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        if self.tick_interval_ms == 0 {
            return invalid("tick_interval_ms must be positive");
        }

        let capture = &self.capture;
        if capture.sample_rate == 0 {
            return invalid("capture.sample_rate must be positive");
        }
        if capture.frame_size == 0 || capture.hop_size == 0 {
            return invalid("capture.frame_size and capture.hop_size must be positive");
        }
        if capture.hop_size > capture.frame_size {
            return invalid("capture.hop_size must not exceed capture.frame_size");
        }
        if capture.queue_depth == 0 {
            return invalid("capture.queue_depth must be positive");
        }

        let estimator = &self.estimator;
        if !(estimator.min_frequency > 0.0 && estimator.min_frequency < estimator.max_frequency) {
            return invalid("estimator frequency range must satisfy 0 < min_frequency < max_frequency");
        }
        if !(0.0..=1.0).contains(&estimator.clarity_threshold) {
            return invalid("estimator.clarity_threshold must lie in [0, 1]");
        }
        if estimator.silence_rms < 0.0 {
            return invalid("estimator.silence_rms must not be negative");
        }

        let required = pitch::required_frame_len(capture.sample_rate, estimator);
        if capture.frame_size < required {
            return Err(ConfigError::Invalid(format!(
                "capture.frame_size of {} cannot cover min_frequency {} Hz at {} Hz, need at least {}",
                capture.frame_size, estimator.min_frequency, capture.sample_rate, required
            )));
        }

        let stabilizer = &self.stabilizer;
        if stabilizer.history_capacity == 0 {
            return invalid("stabilizer.history_capacity must be positive");
        }
        if stabilizer.min_observations == 0
            || stabilizer.min_observations > stabilizer.history_capacity
        {
            return invalid("stabilizer.min_observations must lie in 1..=history_capacity");
        }
        if !(stabilizer.agreement_ratio > 0.0 && stabilizer.agreement_ratio <= 1.0) {
            return invalid("stabilizer.agreement_ratio must lie in (0, 1]");
        }

        Ok(())
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            capture: CaptureConfig::default(),
            estimator: EstimatorConfig::default(),
            stabilizer: StabilizerConfig::default(),
            tick_interval_ms: 16,
        }
    }
}
