//! Push-to-talk recorder: one microphone stream per recording.
//!
//! ```text
//! start() → AudioCapture::new → stream fills CaptureBuffer
//! stop()  → drop stream → stereo_to_mono → encode_wav → MediaBlob
//! ```
//!
//! The device is opened on `start` and released on `stop`, so the OS
//! microphone indicator is only lit while the user is actually talking.
//! [`Recorder`] owns a `cpal::Stream` and therefore lives on the UI thread.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::config::AudioConfig;
use crate::media::MediaBlob;

use super::buffer::SharedCaptureBuffer;
use super::capture::{AudioCapture, CaptureError, StreamHandle};
use super::resample::stereo_to_mono;
use super::wav::encode_wav;

struct ActiveRecording {
    _handle: StreamHandle,
    sink: SharedCaptureBuffer,
    started: Instant,
}

pub struct Recorder {
    min_secs: f32,
    max_secs: f32,
    active: Option<ActiveRecording>,
}

impl Recorder {
    pub fn new(min_secs: f32, max_secs: f32) -> Self {
        Self {
            min_secs,
            max_secs,
            active: None,
        }
    }

    pub fn from_config(config: &AudioConfig) -> Self {
        Self::new(config.min_recording_secs, config.max_recording_secs)
    }

    /// Open the microphone and begin recording.
    ///
    /// Returns `Ok(false)` without touching the device when a recording is
    /// already in progress.
    pub fn start(&mut self) -> Result<bool, CaptureError> {
        if self.active.is_some() {
            log::debug!("recorder already active; start ignored");
            return Ok(false);
        }

        let capture = AudioCapture::new()?;
        let sink: SharedCaptureBuffer = Arc::new(Mutex::new(capture.buffer_for(self.max_secs)));
        let handle = capture.start(Arc::clone(&sink))?;

        log::info!(
            "recording started ({} Hz, {} ch)",
            capture.sample_rate(),
            capture.channels()
        );
        self.active = Some(ActiveRecording {
            _handle: handle,
            sink,
            started: Instant::now(),
        });
        Ok(true)
    }

    /// Stop recording, release the microphone and encode what was captured.
    ///
    /// Returns `None` when no recording was active.
    pub fn stop(&mut self) -> Option<Result<MediaBlob, CaptureError>> {
        let ActiveRecording {
            _handle: handle,
            sink,
            started,
        } = self.active.take()?;
        drop(handle);

        let (samples, sample_rate, channels, captured_secs) = {
            let mut buf = sink.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            let captured_secs = buf.duration_secs();
            (buf.drain(), buf.sample_rate(), buf.channels(), captured_secs)
        };
        log::info!(
            "recording stopped after {:.2}s ({:.2}s of audio captured)",
            started.elapsed().as_secs_f32(),
            captured_secs
        );

        Some(finish_recording(&samples, sample_rate, channels, self.min_secs))
    }

    /// Abandon the current recording without producing a blob.
    pub fn cancel(&mut self) {
        if self.active.take().is_some() {
            log::info!("recording cancelled");
        }
    }

    pub fn is_recording(&self) -> bool {
        self.active.is_some()
    }

    /// Time since the current recording started.
    pub fn elapsed(&self) -> Option<Duration> {
        self.active.as_ref().map(|a| a.started.elapsed())
    }
}

/// Turn raw interleaved samples into an uploadable WAV blob.
///
/// # Errors
///
/// [`CaptureError::Empty`] when nothing was captured and
/// [`CaptureError::TooShort`] when the mono duration is under `min_secs`.
pub fn finish_recording(
    samples: &[f32],
    sample_rate: u32,
    channels: u16,
    min_secs: f32,
) -> Result<MediaBlob, CaptureError> {
    let mono = stereo_to_mono(samples, channels);
    if mono.is_empty() || sample_rate == 0 {
        return Err(CaptureError::Empty);
    }

    let got_secs = mono.len() as f32 / sample_rate as f32;
    if got_secs < min_secs {
        return Err(CaptureError::TooShort { got_secs, min_secs });
    }

    Ok(encode_wav(&mono, sample_rate)?)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
