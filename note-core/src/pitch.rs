//! # Pitch Detection Module
//!
//! Monophonic pitch estimation with a difference-based autocorrelation.
//! Each candidate lag is scored by how closely the signal matches a copy of
//! itself shifted by that lag:
//!
//! ```text
//! score(lag) = 1 - (1/W) * sum(|x[i] - x[i + lag]|),  i in 0..W
//! ```
//!
//! where `W` is the comparison window shared by all lags. A perfectly
//! periodic frame scores 1 at its period.
//!
//! ## Features
//! - RMS silence gate ahead of the O(N·M) search
//! - Early exit once the first strong correlation peak has been passed
//! - Parabolic interpolation for sub-sample accuracy, including at the
//!   smallest lag

use log::trace;

use crate::audio::AudioFrame;
use crate::config::EstimatorConfig;
use crate::error::FrameError;

/// Result of analysing a single frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PitchEstimate {
    /// Detected fundamental in Hz, `None` when the frame holds no usable pitch.
    pub frequency: Option<f32>,
    /// Best correlation score, clamped to `[0, 1]`.
    pub confidence: f32,
}

impl PitchEstimate {
    /// The estimate for silence and unusable frames.
    pub const INVALID: PitchEstimate = PitchEstimate {
        frequency: None,
        confidence: 0.0,
    };

    pub fn is_valid(&self) -> bool {
        self.frequency.is_some_and(|f| f > 0.0)
    }
}

/// Inclusive-exclusive lag range `[min, max)` searched for a given sample rate.
///
/// `min` corresponds to the highest detectable pitch and `max` to the lowest.
pub fn lag_range(sample_rate: u32, config: &EstimatorConfig) -> (usize, usize) {
    let rate = sample_rate as f32;
    let min_lag = (rate / config.max_frequency).floor().max(1.0) as usize;
    let max_lag = (rate / config.min_frequency).floor() as usize;
    (min_lag, max_lag)
}

/// Minimum frame length able to cover the full lag range.
///
/// The comparison window must be at least as long as the largest lag.
pub fn required_frame_len(sample_rate: u32, config: &EstimatorConfig) -> usize {
    let (_, max_lag) = lag_range(sample_rate, config);
    max_lag * 2
}

/// Checks that a frame can be fed to [`estimate_pitch`].
pub fn check_frame(frame: &AudioFrame, config: &EstimatorConfig) -> Result<(), FrameError> {
    frame.validate()?;
    let required = required_frame_len(frame.sample_rate(), config);
    if frame.len() < required {
        return Err(FrameError::TooShort {
            len: frame.len(),
            required,
        });
    }
    Ok(())
}

/// Estimates the fundamental frequency of a frame.
///
/// Malformed frames yield [`PitchEstimate::INVALID`] rather than an error so
/// that one bad frame never interrupts a running session.
///
/// # Returns
/// * `frequency: Some(f)` with `confidence >= clarity_threshold` for a clear tone
/// * `frequency: None, confidence: 0` for silence or a malformed frame
/// * `frequency: None, confidence: best score` for an aperiodic frame
pub fn estimate_pitch(frame: &AudioFrame, config: &EstimatorConfig) -> PitchEstimate {
    try_estimate_pitch(frame, config).unwrap_or_else(|e| {
        trace!("Rejecting frame: {}", e);
        PitchEstimate::INVALID
    })
}

/// Like [`estimate_pitch`] but reports why a frame was unusable.
pub fn try_estimate_pitch(
    frame: &AudioFrame,
    config: &EstimatorConfig,
) -> Result<PitchEstimate, FrameError> {
    check_frame(frame, config)?;
    Ok(search_period(frame, config))
}

fn search_period(frame: &AudioFrame, config: &EstimatorConfig) -> PitchEstimate {
    // --- Noise Gate: silence never reaches the lag search ---
    if frame.rms() < config.silence_rms {
        return PitchEstimate::INVALID;
    }

    let signal = frame.samples();
    let (min_lag, max_lag) = lag_range(frame.sample_rate(), config);
    if min_lag >= max_lag {
        return PitchEstimate::INVALID;
    }
    let window = signal.len() - max_lag;

    // scores[k] is the score of lag min_lag - 1 + k. The lag just below the
    // range only serves as a neighbour: it decides whether min_lag itself is
    // a rising edge and anchors interpolation there.
    let first_lag = min_lag - 1;
    let mut scores: Vec<f32> = Vec::with_capacity(max_lag - first_lag);
    let mut last_score = lag_score(signal, first_lag, window);
    scores.push(last_score);

    let mut best_lag = 0;
    let mut best_score = f32::NEG_INFINITY;
    let mut found_peak = false;

    for lag in min_lag..max_lag {
        let score = lag_score(signal, lag, window);
        scores.push(score);

        if score > config.clarity_threshold && score > last_score {
            found_peak = true;
        } else if found_peak {
            // Past the first clear peak; later peaks are multiples of the period.
            break;
        }

        if score > best_score {
            best_score = score;
            best_lag = lag;
        }
        last_score = score;
    }

    if best_lag == 0 || best_score < config.clarity_threshold {
        return PitchEstimate {
            frequency: None,
            confidence: best_score.clamp(0.0, 1.0),
        };
    }

    let period = refine_lag(&scores, best_lag - first_lag) + first_lag as f32;
    if !(period.is_finite() && period > 0.0) {
        return PitchEstimate::INVALID;
    }

    let frequency = frame.sample_rate() as f32 / period;
    if !(frequency.is_finite() && frequency > 0.0) {
        return PitchEstimate::INVALID;
    }

    PitchEstimate {
        frequency: Some(frequency),
        confidence: best_score.clamp(0.0, 1.0),
    }
}

/// Normalized difference score of one lag over the first `window` samples.
fn lag_score(signal: &[f32], lag: usize, window: usize) -> f32 {
    let diff: f32 = signal[..window]
        .iter()
        .zip(&signal[lag..lag + window])
        .map(|(a, b)| (a - b).abs())
        .sum();
    1.0 - diff / window as f32
}

/// Fits a parabola through the scores around `index` and returns the
/// position of its vertex.
///
/// Falls back to `index` at either end of the score table or when the three
/// points do not form a proper maximum.
fn refine_lag(scores: &[f32], index: usize) -> f32 {
    if index == 0 || index + 1 >= scores.len() {
        return index as f32;
    }

    let y1 = scores[index - 1];
    let y2 = scores[index];
    let y3 = scores[index + 1];

    if y2 < y1 || y2 < y3 {
        return index as f32;
    }

    let a = (y1 - 2.0 * y2 + y3) / 2.0;
    let b = (y3 - y1) / 2.0;

    if a < 0.0 {
        index as f32 - b / (2.0 * a)
    } else {
        index as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    const SAMPLE_RATE: u32 = 44_100;
    const FRAME_SIZE: usize = 4096;

    fn sine(frequency: f32, amplitude: f32, sample_rate: u32, len: usize) -> AudioFrame {
        let samples = (0..len)
            .map(|i| amplitude * (2.0 * PI * frequency * i as f32 / sample_rate as f32).sin())
            .collect();
        AudioFrame::new(samples, sample_rate)
    }

    fn assert_within_one_percent(frequency: f32, sample_rate: u32, amplitude: f32) {
        let config = EstimatorConfig::default();
        let estimate = estimate_pitch(&sine(frequency, amplitude, sample_rate, FRAME_SIZE), &config);
        let detected = estimate
            .frequency
            .unwrap_or_else(|| panic!("no pitch for {} Hz (confidence {})", frequency, estimate.confidence));
        let error = (detected - frequency).abs() / frequency;
        assert!(
            error <= 0.01,
            "{} Hz detected as {} Hz at {} Hz sample rate",
            frequency,
            detected,
            sample_rate
        );
        assert!(estimate.confidence >= 0.9, "confidence {}", estimate.confidence);
    }

    #[test]
    fn detects_sines_across_the_range() {
        for &frequency in &[82.41, 110.0, 196.0, 261.63, 440.0, 659.25, 880.0, 987.77] {
            assert_within_one_percent(frequency, SAMPLE_RATE, 0.5);
        }
    }

    #[test]
    fn detects_sines_at_48k() {
        for &frequency in &[130.81, 329.63, 523.25] {
            assert_within_one_percent(frequency, 48_000, 0.8);
        }
    }

    #[test]
    fn detects_quiet_tone_just_above_the_gate() {
        // Amplitude 0.02 gives an RMS of about 0.014.
        assert_within_one_percent(220.0, SAMPLE_RATE, 0.02);
    }

    #[test]
    fn silence_is_invalid_with_zero_confidence() {
        let config = EstimatorConfig::default();
        let zeros = AudioFrame::new(vec![0.0; FRAME_SIZE], SAMPLE_RATE);
        assert_eq!(estimate_pitch(&zeros, &config), PitchEstimate::INVALID);

        let whisper = sine(440.0, 0.005, SAMPLE_RATE, FRAME_SIZE);
        assert!(whisper.rms() < config.silence_rms);
        assert_eq!(estimate_pitch(&whisper, &config), PitchEstimate::INVALID);
    }

    #[test]
    fn malformed_frames_are_invalid() {
        let config = EstimatorConfig::default();
        assert_eq!(
            estimate_pitch(&AudioFrame::new(vec![], SAMPLE_RATE), &config),
            PitchEstimate::INVALID
        );

        let short = sine(440.0, 0.5, SAMPLE_RATE, 512);
        assert!(matches!(
            check_frame(&short, &config),
            Err(FrameError::TooShort { len: 512, .. })
        ));
        assert_eq!(estimate_pitch(&short, &config), PitchEstimate::INVALID);

        let mut samples = sine(440.0, 0.5, SAMPLE_RATE, FRAME_SIZE).samples().to_vec();
        samples[100] = f32::INFINITY;
        assert_eq!(
            estimate_pitch(&AudioFrame::new(samples, SAMPLE_RATE), &config),
            PitchEstimate::INVALID
        );
    }

    #[test]
    fn aperiodic_frame_is_rejected() {
        // Deterministic pseudo-random noise (xorshift).
        let mut state: u32 = 0x9E37_79B9;
        let samples = (0..FRAME_SIZE)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                (state as f32 / u32::MAX as f32) * 2.0 - 1.0
            })
            .collect();
        let estimate = estimate_pitch(&AudioFrame::new(samples, SAMPLE_RATE), &EstimatorConfig::default());
        assert_eq!(estimate.frequency, None);
        assert!(estimate.confidence < 0.9);
        assert!((0.0..=1.0).contains(&estimate.confidence));
    }

    #[test]
    fn lag_range_follows_the_frequency_bounds() {
        let config = EstimatorConfig::default();
        assert_eq!(lag_range(44_100, &config), (44, 551));
        assert_eq!(lag_range(48_000, &config), (48, 600));
        assert_eq!(required_frame_len(44_100, &config), 1102);
    }

    #[test]
    fn parabola_vertex_moves_toward_the_larger_neighbour() {
        let refined = refine_lag(&[0.90, 0.99, 0.97], 1);
        assert!(refined > 1.0 && refined < 1.5, "refined {}", refined);
        // Edges and non-peaks stay put.
        assert_eq!(refine_lag(&[0.99, 0.97], 0), 0.0);
        assert_eq!(refine_lag(&[0.9, 0.8, 0.9], 1), 1.0);
        // A point on a slope is not a maximum, however shallow the curve.
        assert_eq!(refine_lag(&[0.99, 0.985, 0.979], 1), 1.0);
    }

    #[test]
    fn detects_sines_at_the_top_of_the_range() {
        // Periods here sit within a few samples of the smallest lag.
        for &sample_rate in &[44_100, 48_000] {
            for &amplitude in &[0.015, 0.5, 1.0] {
                let mut frequency = 950.0;
                while frequency <= 1000.0 {
                    assert_within_one_percent(frequency, sample_rate, amplitude);
                    frequency += 2.5;
                }
            }
        }
    }

    #[test]
    fn peak_at_the_smallest_lag_is_not_an_octave_down() {
        let config = EstimatorConfig::default();
        let estimate = estimate_pitch(&sine(993.9, 0.5, SAMPLE_RATE, FRAME_SIZE), &config);
        let detected = estimate.frequency.unwrap();
        assert!((detected - 993.9).abs() < 10.0, "detected {}", detected);

        // 22.05 kHz puts the period of B5 right next to the smallest lag.
        let estimate = estimate_pitch(&sine(982.8, 0.5, 22_050, FRAME_SIZE), &config);
        let detected = estimate.frequency.unwrap();
        assert!((detected - 982.8).abs() / 982.8 <= 0.01, "detected {}", detected);
    }
}
