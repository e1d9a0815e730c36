//! # Musical Tuning Module
//!
//! Maps frequencies to note names in 12-tone equal temperament with
//! A4 = 440 Hz. Frequencies are rounded to the nearest semitone; the
//! remaining deviation is reported in cents.
//!
//! ## Features
//! - Frequency to note name, octave, MIDI number and cent deviation
//! - Note name to frequency lookups (C0 to B8)
//! - Cent distance between two frequencies

use std::collections::BTreeMap;

use once_cell::sync::Lazy;

/// Reference pitch of A4 in Hz.
pub const A4_FREQUENCY: f32 = 440.0;

/// MIDI note number of A4.
pub const A4_MIDI: i32 = 69;

/// Chromatic pitch-class names starting at C.
pub const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// A frequency resolved to its nearest equal-tempered note.
#[derive(Debug, Clone, PartialEq)]
pub struct NoteObservation {
    /// Full note name, e.g. "A#4"
    pub name: String,
    /// Pitch class without octave, e.g. "A#"
    pub pitch_class: &'static str,
    pub octave: i32,
    pub midi_number: i32,
    /// Deviation from the named note, rounded to whole cents
    pub cents: i32,
    /// Unrounded deviation in cents
    pub exact_cents: f32,
}

impl NoteObservation {
    /// How close the pitch sits to the named note: 1 when dead on, 0 at a
    /// quarter tone (50 cents) or beyond.
    pub fn tuning_accuracy(&self) -> f32 {
        (1.0 - self.exact_cents.abs() / 50.0).max(0.0)
    }
}

/// Resolves a frequency to the nearest note.
///
/// Returns `None` for zero, negative or non-finite frequencies.
pub fn to_note(frequency: f32) -> Option<NoteObservation> {
    if !(frequency.is_finite() && frequency > 0.0) {
        return None;
    }

    let semitones = 12.0 * (frequency / A4_FREQUENCY).log2();
    let nearest = semitones.round();
    let midi_number = nearest as i32 + A4_MIDI;
    let octave = midi_number.div_euclid(12) - 1;
    let pitch_class = NOTE_NAMES[midi_number.rem_euclid(12) as usize];
    let exact_cents = (semitones - nearest) * 100.0;

    Some(NoteObservation {
        name: format!("{}{}", pitch_class, octave),
        pitch_class,
        octave,
        midi_number,
        cents: exact_cents.round() as i32,
        exact_cents,
    })
}

/// Equal-tempered frequency of a MIDI note number.
pub fn midi_to_frequency(midi_number: i32) -> f32 {
    A4_FREQUENCY * 2.0_f32.powf((midi_number - A4_MIDI) as f32 / 12.0)
}

/// Note name to frequency map covering C0 (MIDI 12) to B8 (MIDI 119).
///
/// Computed once on first use.
static NOTE_MAP: Lazy<BTreeMap<String, f32>> = Lazy::new(|| {
    (12..120)
        .map(|midi: i32| {
            let name = format!("{}{}", NOTE_NAMES[midi.rem_euclid(12) as usize], midi / 12 - 1);
            (name, midi_to_frequency(midi))
        })
        .collect()
});

/// Looks up the target frequency of a note name such as "A4" or "C#3".
///
/// Only sharps are recognized, matching the names [`to_note`] produces.
pub fn note_frequency(name: &str) -> Option<f32> {
    NOTE_MAP.get(name).copied()
}

/// Calculates the deviation of `freq` from `target_freq` in cents.
///
/// Positive values are sharp, negative values flat.
pub fn cents_between(freq: f32, target_freq: f32) -> f32 {
    1200.0 * (freq / target_freq).log2()
}
