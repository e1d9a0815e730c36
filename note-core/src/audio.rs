//! # Audio Capture Module
//!
//! Frame sources feeding the detection pipeline. A [`FrameSource`] is opened
//! once per session and yields a [`FrameCapture`] handle; the handle hands out
//! fixed-size mono frames without ever blocking and releases the underlying
//! resource on `close()` or when dropped.
//!
//! ## Sources
//! - [`MicrophoneSource`]: live input from the default device via CPAL
//! - [`SampleBufferSource`]: an in-memory signal, for offline analysis and tests

use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SupportedStreamConfigRange;
use crossbeam_channel::{Receiver, Sender, TrySendError};
use log::{debug, error, info, warn};

use crate::config::{CaptureConfig, DetectorConfig, EstimatorConfig};
use crate::error::{DeviceError, FrameError};
use crate::pitch;

/// One frame of mono audio and the sample rate it was captured at.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl AudioFrame {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Root-mean-square amplitude, 0 for an empty frame.
    pub fn rms(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        (self.samples.iter().map(|&s| s * s).sum::<f32>() / self.samples.len() as f32).sqrt()
    }

    /// Rejects frames no estimator could make sense of.
    pub fn validate(&self) -> Result<(), FrameError> {
        if self.samples.is_empty() {
            return Err(FrameError::Empty);
        }
        if self.sample_rate == 0 {
            return Err(FrameError::ZeroSampleRate);
        }
        if let Some(index) = self.samples.iter().position(|s| !s.is_finite()) {
            return Err(FrameError::NonFinite { index });
        }
        Ok(())
    }
}

/// Something that can be opened to capture audio frames.
pub trait FrameSource {
    type Capture: FrameCapture;

    /// Acquires the capture resource.
    fn open(&mut self) -> Result<Self::Capture, DeviceError>;
}

/// An open capture handle.
pub trait FrameCapture {
    /// Returns the most recent complete frame, or `None` if no new frame is
    /// ready. Never blocks.
    fn read_frame(&mut self) -> Option<AudioFrame>;

    /// Releases the capture resource. Calling it again is a no-op.
    fn close(&mut self);
}

/// Live capture from the default input device.
#[derive(Debug, Clone)]
pub struct MicrophoneSource {
    config: CaptureConfig,
    estimator: EstimatorConfig,
}

impl MicrophoneSource {
    /// Takes the estimator settings too: the frame size must cover the
    /// longest period at whatever rate the device ends up running.
    pub fn new(config: &DetectorConfig) -> Self {
        Self {
            config: config.capture.clone(),
            estimator: config.estimator.clone(),
        }
    }
}

/// Open microphone stream. Frames arrive from the audio backend's callback
/// thread over a bounded channel.
pub struct MicrophoneCapture {
    stream: Option<cpal::Stream>,
    frames: Receiver<AudioFrame>,
}

impl FrameSource for MicrophoneSource {
    type Capture = MicrophoneCapture;

    /// Opens the default input device.
    ///
    /// This function:
    /// 1. Selects the default audio input device
    /// 2. Picks the f32 configuration closest to the requested sample rate,
    ///    preferring mono
    /// 3. Starts a stream whose callback downmixes to mono and slices the
    ///    signal into overlapping frames
    fn open(&mut self) -> Result<MicrophoneCapture, DeviceError> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or(DeviceError::NoInputDevice)?;

        match device.name() {
            Ok(name) => info!("Using audio input device: {}", name),
            Err(e) => warn!("Using audio input device with unknown name: {}", e),
        }

        let configs = device
            .supported_input_configs()
            .map_err(|e| DeviceError::backend("querying input configs", e))?
            .collect::<Vec<_>>();
        let supported_config = find_supported_config(configs, self.config.sample_rate)
            .ok_or(DeviceError::NoSupportedConfig)?;

        let sample_rate = self.config.sample_rate.clamp(
            supported_config.min_sample_rate().0,
            supported_config.max_sample_rate().0,
        );
        check_frame_size(self.config.frame_size, sample_rate, &self.estimator)?;
        let config = supported_config.with_sample_rate(cpal::SampleRate(sample_rate));
        let channels = usize::from(config.channels()).max(1);
        let config: cpal::StreamConfig = config.into();

        info!(
            "Selected sample rate: {} Hz, {} channel(s), {} samples per frame",
            sample_rate, channels, self.config.frame_size
        );

        let (frame_tx, frame_rx) = crossbeam_channel::bounded(self.config.queue_depth);
        let mut framer = Framer::new(
            frame_tx,
            self.config.frame_size,
            self.config.hop_size,
            sample_rate,
        );

        let err_fn = |err| error!("An error occurred on the audio stream: {}", err);

        let stream = device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    framer.push_interleaved(data, channels);
                },
                err_fn,
                None,
            )
            .map_err(|e| DeviceError::backend("building the input stream", e))?;

        stream
            .play()
            .map_err(|e| DeviceError::backend("starting the input stream", e))?;

        Ok(MicrophoneCapture {
            stream: Some(stream),
            frames: frame_rx,
        })
    }
}

impl FrameCapture for MicrophoneCapture {
    fn read_frame(&mut self) -> Option<AudioFrame> {
        self.stream.as_ref()?;
        // Keep only the newest frame; older ones are stale by now.
        self.frames.try_iter().last()
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.pause() {
                warn!("Error pausing stream: {}", e);
            }
            drop(stream);
            info!("Audio capture closed");
        }
    }
}

impl Drop for MicrophoneCapture {
    fn drop(&mut self) {
        self.close();
    }
}

/// Fails when frames of `frame_size` samples at `sample_rate` are too short
/// for the estimator's lag range, so every frame would be rejected.
fn check_frame_size(
    frame_size: usize,
    sample_rate: u32,
    estimator: &EstimatorConfig,
) -> Result<(), DeviceError> {
    let required = pitch::required_frame_len(sample_rate, estimator);
    if frame_size < required {
        warn!(
            "Device rate {} Hz needs frames of {} samples, configured {}",
            sample_rate, required, frame_size
        );
        return Err(DeviceError::FrameTooShort {
            frame_size,
            sample_rate,
            required,
        });
    }
    Ok(())
}

/// Finds the best supported audio configuration for the target sample rate.
///
/// Only 32-bit float formats qualify. Mono beats multi-channel, then the
/// range closest to `target_rate` wins.
fn find_supported_config(
    configs: Vec<SupportedStreamConfigRange>,
    target_rate: u32,
) -> Option<SupportedStreamConfigRange> {
    configs
        .into_iter()
        .filter(|c| c.sample_format() == cpal::SampleFormat::F32)
        .min_by_key(|c| {
            let distance = if target_rate < c.min_sample_rate().0 {
                c.min_sample_rate().0 - target_rate
            } else {
                target_rate.saturating_sub(c.max_sample_rate().0)
            };
            (c.channels() != 1, distance)
        })
}

/// Accumulates callback data and emits overlapping frames.
struct Framer {
    sender: Sender<AudioFrame>,
    buffer: Vec<f32>,
    frame_size: usize,
    hop_size: usize,
    sample_rate: u32,
}

impl Framer {
    fn new(sender: Sender<AudioFrame>, frame_size: usize, hop_size: usize, sample_rate: u32) -> Self {
        Self {
            sender,
            buffer: Vec::with_capacity(frame_size * 2),
            frame_size,
            hop_size: hop_size.clamp(1, frame_size.max(1)),
            sample_rate,
        }
    }

    fn push_interleaved(&mut self, data: &[f32], channels: usize) {
        if channels <= 1 {
            self.buffer.extend_from_slice(data);
        } else {
            let scale = 1.0 / channels as f32;
            self.buffer.extend(
                data.chunks(channels)
                    .map(|frame| frame.iter().sum::<f32>() * scale),
            );
        }

        while self.buffer.len() >= self.frame_size {
            let frame = AudioFrame::new(self.buffer[..self.frame_size].to_vec(), self.sample_rate);
            match self.sender.try_send(frame) {
                Ok(()) => {}
                // The consumer is behind; this frame is dropped.
                Err(TrySendError::Full(_)) => {}
                Err(TrySendError::Disconnected(_)) => {
                    self.buffer.clear();
                    return;
                }
            }
            self.buffer.drain(..self.hop_size);
        }
    }
}

/// Serves frames from a signal held in memory.
///
/// Each `read_frame` call advances by `hop_size` samples; a trailing partial
/// frame is never returned.
#[derive(Debug, Clone)]
pub struct SampleBufferSource {
    samples: Arc<Vec<f32>>,
    sample_rate: u32,
    frame_size: usize,
    hop_size: usize,
}

impl SampleBufferSource {
    pub fn new(samples: Vec<f32>, sample_rate: u32, frame_size: usize, hop_size: usize) -> Self {
        Self {
            samples: Arc::new(samples),
            sample_rate,
            frame_size,
            hop_size: hop_size.max(1),
        }
    }

    /// Source that frames the signal the way live capture would.
    pub fn with_config(samples: Vec<f32>, sample_rate: u32, config: &CaptureConfig) -> Self {
        Self::new(samples, sample_rate, config.frame_size, config.hop_size)
    }

    /// Opens a read position at the start of the signal. Unlike
    /// [`FrameSource::open`] this cannot fail.
    pub fn capture(&self) -> SampleBufferCapture {
        debug!(
            "Opening sample buffer of {} samples at {} Hz",
            self.samples.len(),
            self.sample_rate
        );
        SampleBufferCapture {
            samples: Arc::clone(&self.samples),
            sample_rate: self.sample_rate,
            frame_size: self.frame_size,
            hop_size: self.hop_size,
            position: 0,
            closed: false,
        }
    }

    /// Number of whole frames one pass over the signal yields.
    pub fn frame_count(&self) -> usize {
        if self.frame_size == 0 || self.samples.len() < self.frame_size {
            return 0;
        }
        (self.samples.len() - self.frame_size) / self.hop_size + 1
    }
}

/// Read position within a [`SampleBufferSource`].
#[derive(Debug)]
pub struct SampleBufferCapture {
    samples: Arc<Vec<f32>>,
    sample_rate: u32,
    frame_size: usize,
    hop_size: usize,
    position: usize,
    closed: bool,
}

impl FrameSource for SampleBufferSource {
    type Capture = SampleBufferCapture;

    fn open(&mut self) -> Result<SampleBufferCapture, DeviceError> {
        Ok(self.capture())
    }
}

impl FrameCapture for SampleBufferCapture {
    fn read_frame(&mut self) -> Option<AudioFrame> {
        if self.closed || self.frame_size == 0 {
            return None;
        }
        let end = self.position.checked_add(self.frame_size)?;
        let window = self.samples.get(self.position..end)?;
        let frame = AudioFrame::new(window.to_vec(), self.sample_rate);
        self.position += self.hop_size;
        Some(frame)
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_size_must_cover_the_lag_range_at_the_device_rate() {
        let estimator = EstimatorConfig::default();
        assert!(check_frame_size(4096, 44_100, &estimator).is_ok());
        assert!(check_frame_size(4096, 48_000, &estimator).is_ok());

        // 192 kHz pushes the 80 Hz period to 2400 samples.
        match check_frame_size(4096, 192_000, &estimator) {
            Err(DeviceError::FrameTooShort { required, sample_rate, .. }) => {
                assert_eq!(required, 4800);
                assert_eq!(sample_rate, 192_000);
            }
            other => panic!("expected FrameTooShort, got {:?}", other),
        }
        assert!(check_frame_size(4800, 192_000, &estimator).is_ok());
    }

    #[test]
    fn rms_of_constant_signal() {
        let frame = AudioFrame::new(vec![0.5; 64], 44_100);
        assert!((frame.rms() - 0.5).abs() < 1e-6);
        assert_eq!(AudioFrame::new(vec![], 44_100).rms(), 0.0);
    }

    #[test]
    fn validate_rejects_malformed_frames() {
        assert_eq!(AudioFrame::new(vec![], 44_100).validate(), Err(FrameError::Empty));
        assert_eq!(
            AudioFrame::new(vec![0.0; 8], 0).validate(),
            Err(FrameError::ZeroSampleRate)
        );
        assert_eq!(
            AudioFrame::new(vec![0.0, 1.0, f32::NAN], 44_100).validate(),
            Err(FrameError::NonFinite { index: 2 })
        );
        assert!(AudioFrame::new(vec![0.1; 8], 44_100).validate().is_ok());
    }

    #[test]
    fn sample_buffer_serves_overlapping_frames() {
        let samples: Vec<f32> = (0..10).map(|i| i as f32).collect();
        let mut source = SampleBufferSource::new(samples, 8_000, 4, 2);
        assert_eq!(source.frame_count(), 4);

        let mut capture = source.open().unwrap();
        let first = capture.read_frame().unwrap();
        assert_eq!(first.samples(), &[0.0, 1.0, 2.0, 3.0]);
        assert_eq!(first.sample_rate(), 8_000);
        assert_eq!(capture.read_frame().unwrap().samples(), &[2.0, 3.0, 4.0, 5.0]);
        assert!(capture.read_frame().is_some());
        assert_eq!(capture.read_frame().unwrap().samples(), &[6.0, 7.0, 8.0, 9.0]);
        assert!(capture.read_frame().is_none());
    }

    #[test]
    fn closed_buffer_capture_yields_nothing() {
        let mut source = SampleBufferSource::new(vec![0.0; 16], 8_000, 4, 4);
        let mut capture = source.open().unwrap();
        capture.close();
        capture.close();
        assert!(capture.read_frame().is_none());
    }

    #[test]
    fn framer_downmixes_and_hops() {
        let (tx, rx) = crossbeam_channel::bounded(8);
        let mut framer = Framer::new(tx, 4, 2, 16_000);
        // Stereo pairs average to 0, 1, 2, 3, 4, 5.
        framer.push_interleaved(&[0.0, 0.0, 1.0, 1.0, 2.0, 2.0, 3.0, 3.0, 4.0, 4.0, 5.0, 5.0], 2);

        let frames: Vec<AudioFrame> = rx.try_iter().collect();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].samples(), &[0.0, 1.0, 2.0, 3.0]);
        assert_eq!(frames[1].samples(), &[2.0, 3.0, 4.0, 5.0]);
        assert_eq!(frames[1].sample_rate(), 16_000);
    }

    #[test]
    fn framer_drops_frames_when_queue_is_full() {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let mut framer = Framer::new(tx, 2, 2, 8_000);
        framer.push_interleaved(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 1);

        let frames: Vec<AudioFrame> = rx.try_iter().collect();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].samples(), &[1.0, 2.0]);
        assert!(framer.buffer.is_empty());
    }
}
