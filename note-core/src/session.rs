//! # Detection Session
//!
//! Ties the pipeline together. A [`Session`] holds the per-run state (the
//! stabilizer and a few counters) and is created by [`Detector::start`] and
//! dropped by [`Detector::stop`]. One pipeline iteration is the free function
//! [`tick`], which needs nothing but a session and a frame, so it can be
//! driven by the [`crate::clock::FrameClock`], an offline loop or a test.

use log::{debug, info, warn};

use crate::audio::{AudioFrame, FrameCapture, FrameSource, SampleBufferSource};
use crate::config::DetectorConfig;
use crate::error::DeviceError;
use crate::pitch::{PitchEstimate, try_estimate_pitch};
use crate::stabilizer::{StabilizedOutput, Stabilizer};
use crate::tuning::{NoteObservation, to_note};

/// Receives the engine's output once per processed frame.
pub trait DisplaySink {
    /// The stabilized note display.
    fn show(&mut self, output: &StabilizedOutput);

    /// Raw confidence of the latest estimate in percent, sent every
    /// processed frame whether or not a note is displayed.
    fn level(&mut self, _confidence_percent: f32) {}
}

/// Everything one tick produced.
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub estimate: PitchEstimate,
    pub note: Option<NoteObservation>,
    pub output: StabilizedOutput,
}

impl TickReport {
    /// The estimate's confidence in percent, independent of its validity.
    pub fn level_percent(&self) -> f32 {
        (self.estimate.confidence * 100.0).clamp(0.0, 100.0)
    }

    /// Forwards the report to a display sink.
    pub fn publish(&self, sink: &mut impl DisplaySink) {
        sink.level(self.level_percent());
        sink.show(&self.output);
    }
}

/// State of one detection run.
#[derive(Debug, Clone)]
pub struct Session {
    config: DetectorConfig,
    stabilizer: Stabilizer,
    frames_processed: u64,
    frames_rejected: u64,
}

impl Session {
    pub fn new(config: DetectorConfig) -> Self {
        let stabilizer = Stabilizer::new(config.stabilizer.clone());
        Self {
            config,
            stabilizer,
            frames_processed: 0,
            frames_rejected: 0,
        }
    }

    pub fn stabilizer(&self) -> &Stabilizer {
        &self.stabilizer
    }

    pub fn output(&self) -> &StabilizedOutput {
        self.stabilizer.output()
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    /// Frames that were malformed and counted as silence.
    pub fn frames_rejected(&self) -> u64 {
        self.frames_rejected
    }
}

/// Runs one frame through estimation, note mapping and stabilization.
///
/// A malformed frame is logged and treated as an invalid estimate with zero
/// confidence; it never ends the session.
pub fn tick(session: &mut Session, frame: &AudioFrame) -> TickReport {
    let estimate = match try_estimate_pitch(frame, &session.config.estimator) {
        Ok(estimate) => estimate,
        Err(e) => {
            debug!("Treating malformed frame as silence: {}", e);
            session.frames_rejected += 1;
            PitchEstimate::INVALID
        }
    };

    let note = estimate.frequency.and_then(to_note);
    let output = session.stabilizer.update(&estimate, note.as_ref()).clone();
    session.frames_processed += 1;

    TickReport {
        estimate,
        note,
        output,
    }
}

/// Session control surface over a frame source.
///
/// `start` opens the source and creates a fresh session, `stop` closes the
/// source and discards the session. Between the two, `tick` processes the
/// newest available frame.
pub struct Detector<S: FrameSource> {
    source: S,
    config: DetectorConfig,
    capture: Option<S::Capture>,
    session: Option<Session>,
}

impl<S: FrameSource> Detector<S> {
    pub fn new(source: S, config: DetectorConfig) -> Self {
        Self {
            source,
            config,
            capture: None,
            session: None,
        }
    }

    /// Opens the frame source and begins a new session.
    ///
    /// Does nothing if a session is already running. A failure leaves the
    /// detector stopped; retrying is up to the caller.
    pub fn start(&mut self) -> Result<(), DeviceError> {
        if self.is_running() {
            debug!("start() called while already running");
            return Ok(());
        }

        let capture = self.source.open().inspect_err(|e| {
            warn!("Could not open frame source: {}", e);
        })?;

        self.capture = Some(capture);
        self.session = Some(Session::new(self.config.clone()));
        info!("Detection started");
        Ok(())
    }

    /// Ends the session, clearing all history and releasing the frame source.
    ///
    /// Safe to call at any time, any number of times.
    pub fn stop(&mut self) {
        if let Some(mut capture) = self.capture.take() {
            capture.close();
        }
        if let Some(session) = self.session.take() {
            info!(
                "Detection stopped after {} frames ({} rejected)",
                session.frames_processed(),
                session.frames_rejected()
            );
        }
    }

    pub fn is_running(&self) -> bool {
        self.session.is_some()
    }

    /// Processes the newest frame, if the session is running and a frame is ready.
    pub fn tick(&mut self) -> Option<TickReport> {
        let session = self.session.as_mut()?;
        let capture = self.capture.as_mut()?;
        let frame = capture.read_frame()?;
        Some(tick(session, &frame))
    }

    /// Like [`Detector::tick`], forwarding the result to `sink`.
    ///
    /// Returns whether a frame was processed.
    pub fn tick_into(&mut self, sink: &mut impl DisplaySink) -> bool {
        match self.tick() {
            Some(report) => {
                report.publish(sink);
                true
            }
            None => false,
        }
    }

    /// Current display; silence when no session is running.
    pub fn output(&self) -> StabilizedOutput {
        self.session
            .as_ref()
            .map(|session| session.output().clone())
            .unwrap_or_default()
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }
}

impl<S: FrameSource> Drop for Detector<S> {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Runs a whole signal through a fresh session, one output per frame.
///
/// Frames are cut the way live capture cuts them (`capture.frame_size`
/// samples every `capture.hop_size`); a trailing partial frame is ignored.
pub fn analyze_samples(
    samples: Vec<f32>,
    sample_rate: u32,
    config: &DetectorConfig,
) -> Vec<StabilizedOutput> {
    let source = SampleBufferSource::with_config(samples, sample_rate, &config.capture);
    let mut capture = source.capture();
    let mut session = Session::new(config.clone());

    let mut outputs = Vec::with_capacity(source.frame_count());
    while let Some(frame) = capture.read_frame() {
        outputs.push(tick(&mut session, &frame).output);
    }
    outputs
}
