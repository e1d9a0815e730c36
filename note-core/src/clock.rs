//! # Frame Clock
//!
//! Drives a [`Detector`] at a fixed display rate. Each tick pulls the newest
//! frame, if any, through the pipeline and hands the result to a
//! [`DisplaySink`]. Ticks run one after another on the calling thread, so
//! the detector never sees two ticks at once.

use std::time::Duration;

use crossbeam_channel::{Receiver, select};
use log::info;

use crate::audio::FrameSource;
use crate::config::DetectorConfig;
use crate::session::{Detector, DisplaySink};

/// Counters from one clock run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClockSummary {
    /// Ticks that fired.
    pub ticks: u64,
    /// Ticks that found a frame to process.
    pub frames: u64,
}

/// Fixed-interval scheduler for detector ticks.
#[derive(Debug, Clone, Copy)]
pub struct FrameClock {
    interval: Duration,
}

impl FrameClock {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub fn from_config(config: &DetectorConfig) -> Self {
        Self::new(Duration::from_millis(config.tick_interval_ms.max(1)))
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Ticks `detector` until a message arrives on `shutdown`, the shutdown
    /// sender is dropped, or the detector is no longer running.
    ///
    /// The detector is stopped before returning.
    pub fn run<S, T>(
        &self,
        detector: &mut Detector<S>,
        sink: &mut impl DisplaySink,
        shutdown: &Receiver<T>,
    ) -> ClockSummary
    where
        S: FrameSource,
    {
        let ticker = crossbeam_channel::tick(self.interval);
        let mut summary = ClockSummary::default();

        info!("Frame clock running every {:?}", self.interval);
        while detector.is_running() {
            select! {
                recv(ticker) -> _ => {
                    summary.ticks += 1;
                    if detector.tick_into(sink) {
                        summary.frames += 1;
                    }
                },
                recv(shutdown) -> _ => {
                    info!("Received shutdown signal");
                    break;
                },
            }
        }

        detector.stop();
        info!(
            "Frame clock stopped after {} ticks, {} frames",
            summary.ticks, summary.frames
        );
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::SampleBufferSource;
    use crate::stabilizer::StabilizedOutput;

    struct CountingSink(usize);

    impl DisplaySink for CountingSink {
        fn show(&mut self, _output: &StabilizedOutput) {
            self.0 += 1;
        }
    }

    #[test]
    fn stops_on_shutdown_and_stops_the_detector() {
        let config = DetectorConfig::default();
        let source = SampleBufferSource::new(vec![0.0; 4096 * 3], 44_100, 4096, 4096);
        let mut detector = Detector::new(source, config);
        detector.start().unwrap();

        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(1);
        shutdown_tx.send(()).unwrap();

        let mut sink = CountingSink(0);
        let summary = FrameClock::new(Duration::from_millis(1)).run(&mut detector, &mut sink, &shutdown_rx);

        assert!(!detector.is_running());
        assert_eq!(summary.frames as usize, sink.0);
    }

    #[test]
    fn processes_frames_until_the_deadline() {
        let config = DetectorConfig::default();
        let source = SampleBufferSource::new(vec![0.0; 4096 * 3], 44_100, 4096, 4096);
        let mut detector = Detector::new(source, config);
        detector.start().unwrap();

        let clock = FrameClock::new(Duration::from_millis(2));
        assert_eq!(clock.interval(), Duration::from_millis(2));
        let deadline = crossbeam_channel::after(Duration::from_millis(200));
        let mut sink = CountingSink(0);
        let summary = clock.run(&mut detector, &mut sink, &deadline);

        // The buffer holds three frames; later ticks find nothing new.
        assert_eq!(summary.frames, 3);
        assert_eq!(sink.0, 3);
        assert!(summary.ticks >= summary.frames);
        assert!(!detector.is_running());
    }

    #[test]
    fn interval_comes_from_the_config() {
        let mut config = DetectorConfig::default();
        assert_eq!(FrameClock::from_config(&config).interval(), Duration::from_millis(16));

        config.tick_interval_ms = 0;
        assert_eq!(FrameClock::from_config(&config).interval(), Duration::from_millis(1));
    }

    #[test]
    fn does_not_tick_a_stopped_detector() {
        let source = SampleBufferSource::new(vec![0.0; 4096], 44_100, 4096, 4096);
        let mut detector = Detector::new(source, DetectorConfig::default());
        let (_tx, rx) = crossbeam_channel::unbounded::<()>();

        let summary = FrameClock::new(Duration::from_millis(1)).run(&mut detector, &mut CountingSink(0), &rx);
        assert_eq!(summary, ClockSummary::default());
    }
}
