//! # Note Stabilizer
//!
//! Turns the jittery per-frame estimates into a display that only changes
//! when the recent history agrees. Observations go into a bounded rolling
//! history; a note is shown once enough of them agree by majority vote, and
//! silent frames drain the history one entry at a time instead of wiping it.
//!
//! ## Rules
//! - An estimate counts only with a positive frequency, a confidence above
//!   `accept_confidence` and a resolvable note.
//! - Nothing is shown before `min_observations` entries are held.
//! - The majority note is shown when it fills at least `agreement_ratio` of
//!   the history; otherwise the previous display stays.
//! - The shown frequency is the lower median of the history.
//! - An invalid estimate below `silence_confidence` pops the newest entry;
//!   an emptied history resets the display to silence.

use std::collections::VecDeque;

use log::debug;

use crate::config::StabilizerConfig;
use crate::pitch::PitchEstimate;
use crate::tuning::NoteObservation;

/// Label rendered when no note is displayed.
pub const SILENCE_LABEL: &str = "—";

/// Stability score above which the history counts as a steady tone.
pub const STABILITY_THRESHOLD: f32 = 0.7;

/// What the display shows after a tick.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StabilizedOutput {
    /// Stable note name, `None` while silent or accumulating.
    pub displayed_note: Option<String>,
    pub displayed_frequency: Option<f32>,
    /// Confidence of the latest estimate in percent (0 to 100).
    pub confidence_percent: f32,
}

impl StabilizedOutput {
    /// The note name, or [`SILENCE_LABEL`] when nothing is displayed.
    pub fn note_label(&self) -> &str {
        self.displayed_note.as_deref().unwrap_or(SILENCE_LABEL)
    }

    pub fn is_silent(&self) -> bool {
        self.displayed_note.is_none()
    }
}

/// Lifecycle of a stabilizer within one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StabilizerState {
    /// Empty history, nothing displayed.
    Idle,
    /// Observations held but no note displayed yet.
    Accumulating,
    /// A stable note is on display.
    Displaying,
}

/// Summary of how steady the current history is.
#[derive(Debug, Clone, PartialEq)]
pub struct StabilityReport {
    pub stable: bool,
    pub dominant_note: Option<String>,
    /// Share of the history taken by the dominant note.
    pub dominance_ratio: f32,
    /// Dominance ratio penalized by the spread of the dominant note's frequencies.
    pub stability_score: f32,
    /// Occurrences per note, in order of first appearance.
    pub distribution: Vec<(String, usize)>,
}

/// Rolling-history note stabilizer.
#[derive(Debug, Clone)]
pub struct Stabilizer {
    config: StabilizerConfig,
    /// (note name, frequency) pairs, oldest first.
    history: VecDeque<(String, f32)>,
    output: StabilizedOutput,
}

impl Stabilizer {
    pub fn new(config: StabilizerConfig) -> Self {
        let capacity = config.history_capacity;
        Self {
            config,
            history: VecDeque::with_capacity(capacity + 1),
            output: StabilizedOutput::default(),
        }
    }

    /// Feeds one frame's estimate and its mapped note, returning the updated display.
    pub fn update(
        &mut self,
        estimate: &PitchEstimate,
        note: Option<&NoteObservation>,
    ) -> &StabilizedOutput {
        let accepted = match (estimate.frequency, note) {
            (Some(frequency), Some(note))
                if frequency > 0.0 && estimate.confidence > self.config.accept_confidence =>
            {
                Some((note, frequency))
            }
            _ => None,
        };

        match accepted {
            Some((note, frequency)) => self.observe(&note.name, frequency, estimate.confidence),
            None => self.decay(estimate.confidence),
        }
        &self.output
    }

    fn observe(&mut self, name: &str, frequency: f32, confidence: f32) {
        self.history.push_back((name.to_string(), frequency));
        if self.history.len() > self.config.history_capacity {
            self.history.pop_front();
        }

        if self.history.len() >= self.config.min_observations {
            self.vote();
        }

        self.output.confidence_percent = (confidence * 100.0).clamp(0.0, 100.0);
    }

    fn vote(&mut self) {
        let Some((note, count)) = majority_note(self.history.iter().map(|(name, _)| name.as_str()))
        else {
            return;
        };

        let required = self.history.len() as f32 * self.config.agreement_ratio;
        if (count as f32) < required {
            return;
        }

        if self.output.displayed_note.as_deref() != Some(note) {
            debug!("Displaying {} ({}/{} agree)", note, count, self.history.len());
            self.output.displayed_note = Some(note.to_string());
        }
        self.output.displayed_frequency = lower_median(self.history.iter().map(|&(_, f)| f));
    }

    fn decay(&mut self, confidence: f32) {
        if confidence < self.config.silence_confidence && self.history.pop_back().is_some() {
            if self.history.is_empty() && !self.output.is_silent() {
                debug!("History drained, display back to silence");
                self.output.displayed_note = None;
                self.output.displayed_frequency = None;
            }
        }
        self.output.confidence_percent = 0.0;
    }

    /// Empties the history and resets the display to silence.
    pub fn clear(&mut self) {
        self.history.clear();
        self.output = StabilizedOutput::default();
    }

    pub fn output(&self) -> &StabilizedOutput {
        &self.output
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn state(&self) -> StabilizerState {
        if self.output.displayed_note.is_some() {
            StabilizerState::Displaying
        } else if self.history.is_empty() {
            StabilizerState::Idle
        } else {
            StabilizerState::Accumulating
        }
    }

    /// Measures how steady the held history is.
    pub fn stability(&self) -> StabilityReport {
        let distribution = note_counts(self.history.iter().map(|(name, _)| name.as_str()));
        let Some((dominant, count)) = pick_majority(&distribution) else {
            return StabilityReport {
                stable: false,
                dominant_note: None,
                dominance_ratio: 0.0,
                stability_score: 0.0,
                distribution: Vec::new(),
            };
        };

        let dominance_ratio = count as f32 / self.history.len() as f32;
        let frequencies: Vec<f32> = self
            .history
            .iter()
            .filter(|(name, f)| name == dominant && *f > 0.0)
            .map(|&(_, f)| f)
            .collect();

        let stability_score = match coefficient_of_variation(&frequencies) {
            Some(variation) => dominance_ratio * (1.0 - variation.min(1.0)),
            None => 0.0,
        };

        StabilityReport {
            stable: stability_score > STABILITY_THRESHOLD,
            dominant_note: Some(dominant.to_string()),
            dominance_ratio,
            stability_score,
            distribution: distribution
                .iter()
                .map(|&(name, count)| (name.to_string(), count))
                .collect(),
        }
    }
}

/// Finds the most frequent note name.
///
/// Ties go to the name that appeared first: names are counted in order of
/// first appearance and a later name replaces the leader only with a
/// strictly higher count.
pub fn majority_note<'a>(names: impl Iterator<Item = &'a str>) -> Option<(&'a str, usize)> {
    pick_majority(&note_counts(names))
}

fn note_counts<'a>(names: impl Iterator<Item = &'a str>) -> Vec<(&'a str, usize)> {
    let mut counts: Vec<(&str, usize)> = Vec::new();
    for name in names {
        match counts.iter_mut().find(|(seen, _)| *seen == name) {
            Some((_, count)) => *count += 1,
            None => counts.push((name, 1)),
        }
    }
    counts
}

fn pick_majority<'a>(counts: &[(&'a str, usize)]) -> Option<(&'a str, usize)> {
    let mut best: Option<(&str, usize)> = None;
    for &(name, count) in counts {
        if best.is_none_or(|(_, max)| count > max) {
            best = Some((name, count));
        }
    }
    best
}

/// Element at index `len / 2` after sorting ascending. For an even count
/// that is the upper of the two middle values.
pub fn lower_median(values: impl Iterator<Item = f32>) -> Option<f32> {
    let mut sorted: Vec<f32> = values.collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(f32::total_cmp);
    Some(sorted[sorted.len() / 2])
}

/// Population standard deviation over mean.
fn coefficient_of_variation(values: &[f32]) -> Option<f32> {
    if values.is_empty() {
        return None;
    }
    let n = values.len() as f32;
    let mean = values.iter().sum::<f32>() / n;
    if mean <= 0.0 {
        return None;
    }
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / n;
    Some(variance.sqrt() / mean)
}
