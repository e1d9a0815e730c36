// note-core/src/lib.rs

//! The core logic for the real-time note detector.
//! This crate is responsible for audio capture, pitch estimation,
//! note mapping and note stabilization. It is completely headless
//! and contains no display code.
//!
//! ## Pipeline
//! Frame Source -> Pitch Estimator -> Note Mapper -> Stabilizer -> Display Sink,
//! driven once per display tick by the [`clock::FrameClock`].
//!
//! ```no_run
//! use note_core::{Detector, DetectorConfig, FrameClock, MicrophoneSource, StabilizedOutput, DisplaySink};
//!
//! struct Print;
//! impl DisplaySink for Print {
//!     fn show(&mut self, output: &StabilizedOutput) {
//!         println!("{}", output.note_label());
//!     }
//! }
//!
//! let config = DetectorConfig::default();
//! let mut detector = Detector::new(MicrophoneSource::new(&config), config.clone());
//! detector.start()?;
//! let stop = crossbeam_channel::after(std::time::Duration::from_secs(5));
//! FrameClock::from_config(&config).run(&mut detector, &mut Print, &stop);
//! # Ok::<(), note_core::DeviceError>(())
//! ```

pub mod audio;
pub mod clock;
pub mod config;
pub mod error;
pub mod pitch;
pub mod session;
pub mod stabilizer;
pub mod tuning;

pub use audio::{AudioFrame, FrameCapture, FrameSource, MicrophoneSource, SampleBufferSource};
pub use clock::{ClockSummary, FrameClock};
pub use config::{CaptureConfig, DetectorConfig, EstimatorConfig, StabilizerConfig};
pub use error::{ConfigError, DeviceError, FrameError};
pub use pitch::{PitchEstimate, estimate_pitch};
pub use session::{Detector, DisplaySink, Session, TickReport, analyze_samples, tick};
pub use stabilizer::{SILENCE_LABEL, StabilityReport, StabilizedOutput, Stabilizer, StabilizerState};
pub use tuning::{NoteObservation, to_note};
