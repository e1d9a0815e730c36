//! Synthetic signals shared by the integration tests.

#![allow(dead_code)]

use std::f32::consts::PI;

pub const SAMPLE_RATE: u32 = 44_100;
pub const FRAME_SIZE: usize = 4096;

/// A sine of `len` samples.
pub fn sine(frequency: f32, amplitude: f32, len: usize) -> Vec<f32> {
    (0..len)
        .map(|i| amplitude * (2.0 * PI * frequency * i as f32 / SAMPLE_RATE as f32).sin())
        .collect()
}

/// A tone with a few weaker overtones, closer to a real instrument.
pub fn harmonic_tone(frequency: f32, len: usize) -> Vec<f32> {
    (0..len)
        .map(|i| {
            let t = i as f32 / SAMPLE_RATE as f32;
            0.5 * (2.0 * PI * frequency * t).sin()
                + 0.2 * (2.0 * PI * 2.0 * frequency * t).sin()
                + 0.1 * (2.0 * PI * 3.0 * frequency * t).sin()
        })
        .collect()
}

pub fn silence(len: usize) -> Vec<f32> {
    vec![0.0; len]
}

/// Deterministic white noise in [-amplitude, amplitude].
pub fn noise(amplitude: f32, len: usize) -> Vec<f32> {
    let mut state: u32 = 0x2545_F491;
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            amplitude * ((state as f32 / u32::MAX as f32) * 2.0 - 1.0)
        })
        .collect()
}

/// Concatenates whole frames: `frames` frames of each segment in turn.
pub fn frames_of(segments: &[(Vec<f32>, usize)]) -> Vec<f32> {
    let mut out = Vec::new();
    for (frame, count) in segments {
        for _ in 0..*count {
            out.extend_from_slice(frame);
        }
    }
    out
}
