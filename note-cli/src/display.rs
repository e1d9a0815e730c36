//! # Terminal Display
//!
//! Renders the detector output as a single, continuously rewritten
//! terminal line:
//!
//! ```text
//!  A4    445.1 Hz  [-----|-+---]  +20 ct  |||||||||||||||||||.  93%
//! ```
//!
//! The cent meter shows how far the displayed frequency sits from the
//! equal-tempered target of the displayed note; the level bar follows the
//! raw confidence of every frame.

use std::io::{self, Write};

use note_core::{DisplaySink, StabilizedOutput, tuning};

/// Maximum cent deviation shown on the meter (-50 to +50 cents).
const METER_RANGE: f32 = 50.0;

/// Character cells of the cent meter, centre included.
const METER_WIDTH: usize = 11;

/// Character cells of the level bar.
const LEVEL_WIDTH: usize = 20;

/// Display sink writing to a terminal.
pub struct TerminalDisplay<W: Write> {
    out: W,
    level: f32,
    last_line: String,
}

impl TerminalDisplay<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> TerminalDisplay<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            level: 0.0,
            last_line: String::new(),
        }
    }

    /// Ends the status line so later output starts on a fresh line.
    pub fn finish(&mut self) -> io::Result<()> {
        if !self.last_line.is_empty() {
            writeln!(self.out)?;
            self.last_line.clear();
        }
        self.out.flush()
    }

    fn redraw(&mut self, line: String) -> io::Result<()> {
        if line == self.last_line {
            return Ok(());
        }
        // Pad to wipe leftovers of a longer previous line.
        let width = self.last_line.chars().count().max(line.chars().count());
        write!(self.out, "\r{:<width$}", line, width = width)?;
        self.out.flush()?;
        self.last_line = line;
        Ok(())
    }
}

impl<W: Write> DisplaySink for TerminalDisplay<W> {
    fn show(&mut self, output: &StabilizedOutput) {
        let line = render_line(output, self.level);
        if let Err(e) = self.redraw(line) {
            log::warn!("Could not write to terminal: {}", e);
        }
    }

    fn level(&mut self, confidence_percent: f32) {
        self.level = confidence_percent;
    }
}

/// Formats one status line.
pub fn render_line(output: &StabilizedOutput, level_percent: f32) -> String {
    let frequency = match output.displayed_frequency {
        Some(f) => format!("{:7.1} Hz", f),
        None => format!("{:>7} Hz", "-"),
    };

    let cents = output
        .displayed_note
        .as_deref()
        .and_then(tuning::note_frequency)
        .zip(output.displayed_frequency)
        .map(|(target, f)| tuning::cents_between(f, target));

    let deviation = match cents {
        Some(c) => format!("{:+3.0} ct", c),
        None => "     ".to_string(),
    };

    format!(
        " {:<4} {}  [{}]  {}  {}  {:3.0}%",
        output.note_label(),
        frequency,
        cent_meter(cents),
        deviation,
        level_bar(level_percent),
        level_percent.clamp(0.0, 100.0)
    )
}

/// Text cent meter: `|` marks the target, `+` the current deviation.
fn cent_meter(cents: Option<f32>) -> String {
    let centre = METER_WIDTH / 2;
    let mut cells = vec!['-'; METER_WIDTH];
    cells[centre] = '|';

    if let Some(cents) = cents {
        let clamped = cents.clamp(-METER_RANGE, METER_RANGE);
        let offset = (clamped / METER_RANGE * centre as f32).round() as isize;
        let index = (centre as isize + offset) as usize;
        cells[index] = '+';
    }
    cells.into_iter().collect()
}

fn level_bar(level_percent: f32) -> String {
    let filled = ((level_percent.clamp(0.0, 100.0) / 100.0) * LEVEL_WIDTH as f32).round() as usize;
    format!("{}{}", "|".repeat(filled), ".".repeat(LEVEL_WIDTH - filled))
}
