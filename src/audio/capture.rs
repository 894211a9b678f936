//! Microphone capture via `cpal`.
//!
//! [`AudioCapture`] wraps the cpal host/device/stream lifecycle.  Call
//! [`AudioCapture::start`] to begin filling a [`SharedCaptureBuffer`].  The
//! returned [`StreamHandle`] is a RAII guard; dropping it stops the
//! underlying cpal stream and releases the microphone.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SizedSample};
use thiserror::Error;

use super::buffer::{CaptureBuffer, SharedCaptureBuffer};

// ---------------------------------------------------------------------------
// StreamHandle
// ---------------------------------------------------------------------------

/// RAII guard that keeps the cpal stream alive.
///
/// Dropping this value calls `cpal::Stream::drop` which pauses/stops the
/// underlying hardware stream.
pub struct StreamHandle {
    _stream: cpal::Stream,
}

// ---------------------------------------------------------------------------
// CaptureError
// ---------------------------------------------------------------------------

/// Errors that can occur while setting up or finishing a recording.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no input device found on the default audio host")]
    NoDevice,

    #[error("failed to query default input config: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("unsupported input sample format: {0:?}")]
    UnsupportedFormat(cpal::SampleFormat),

    #[error("failed to build input stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to start audio stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[error("recording is empty")]
    Empty,

    #[error("recording too short: {got_secs:.2}s < {min_secs:.2}s")]
    TooShort { got_secs: f32, min_secs: f32 },

    #[error("failed to encode recording: {0}")]
    Encode(#[from] super::wav::WavError),
}

impl CaptureError {
    /// `true` when the microphone itself could not be opened, as opposed to
    /// a recording that was captured but unusable.
    pub fn is_device_failure(&self) -> bool {
        !matches!(
            self,
            CaptureError::Empty | CaptureError::TooShort { .. } | CaptureError::Encode(_)
        )
    }
}

// ---------------------------------------------------------------------------
// AudioCapture
// ---------------------------------------------------------------------------

/// Microphone capture device wrapper built on top of `cpal`.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::{Arc, Mutex};
/// use avatar_chat::audio::AudioCapture;
///
/// let capture = AudioCapture::new().unwrap();
/// let sink = Arc::new(Mutex::new(capture.buffer_for(30.0)));
/// let _handle = capture.start(Arc::clone(&sink)).unwrap();
/// // `_handle` keeps the stream alive; drop it to stop recording.
/// ```
pub struct AudioCapture {
    device: cpal::Device,
    config: cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    /// Native sample rate reported by the device (Hz).
    sample_rate: u32,
    /// Number of interleaved channels reported by the device.
    channels: u16,
}

impl AudioCapture {
    /// Open the system default input device.
    ///
    /// Queries the device's preferred stream configuration (sample rate,
    /// channels, sample format) so no manual configuration is required.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::NoDevice`] when no input device is available,
    /// or [`CaptureError::DefaultConfig`] when the device cannot report a
    /// default stream configuration.
    pub fn new() -> Result<Self, CaptureError> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or(CaptureError::NoDevice)?;

        let supported = device.default_input_config()?;

        let channels = supported.channels();
        let sample_rate = supported.sample_rate().0;
        let sample_format = supported.sample_format();
        let config: cpal::StreamConfig = supported.into();

        if let Ok(name) = device.name() {
            log::debug!("input device '{name}': {sample_rate} Hz, {channels} ch, {sample_format:?}");
        }

        Ok(Self {
            device,
            config,
            sample_format,
            sample_rate,
            channels,
        })
    }

    /// An empty [`CaptureBuffer`] matching this device, holding at most
    /// `max_secs` of audio.
    pub fn buffer_for(&self, max_secs: f32) -> CaptureBuffer {
        CaptureBuffer::for_duration(max_secs, self.sample_rate, self.channels)
    }

    /// Start recording into `sink`.
    ///
    /// The cpal callback runs on a dedicated audio thread; each hardware
    /// buffer is converted to `f32` and appended to the sink.  Samples past
    /// the sink's capacity are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::BuildStream`] or [`CaptureError::PlayStream`]
    /// if the platform rejects the stream configuration.
    pub fn start(&self, sink: SharedCaptureBuffer) -> Result<StreamHandle, CaptureError> {
        let stream = match self.sample_format {
            cpal::SampleFormat::F32 => self.build::<f32>(sink)?,
            cpal::SampleFormat::I16 => self.build::<i16>(sink)?,
            cpal::SampleFormat::I32 => self.build::<i32>(sink)?,
            cpal::SampleFormat::U16 => self.build::<u16>(sink)?,
            other => return Err(CaptureError::UnsupportedFormat(other)),
        };

        stream.play()?;
        Ok(StreamHandle { _stream: stream })
    }

    fn build<T>(&self, sink: SharedCaptureBuffer) -> Result<cpal::Stream, CaptureError>
    where
        T: SizedSample,
        f32: FromSample<T>,
    {
        let stream = self.device.build_input_stream(
            &self.config,
            move |data: &[T], _: &cpal::InputCallbackInfo| write_input(data, &sink),
            |err: cpal::StreamError| {
                log::error!("cpal input stream error: {err}");
            },
            None, // no timeout
        )?;
        Ok(stream)
    }

    /// Native sample rate of the capture stream in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of interleaved channels delivered by the device.
    pub fn channels(&self) -> u16 {
        self.channels
    }
}

/// Convert one hardware buffer to `f32` and append it to `sink`.
fn write_input<T>(data: &[T], sink: &SharedCaptureBuffer)
where
    T: Sample,
    f32: FromSample<T>,
{
    let samples: Vec<f32> = data.iter().map(|&s| f32::from_sample(s)).collect();
    // A poisoned lock means the recorder panicked; nothing useful to do here.
    if let Ok(mut buf) = sink.lock() {
        let was_full = buf.overflowed();
        buf.push_slice(&samples);
        if buf.overflowed() && !was_full {
            log::warn!("recording reached its maximum length; further audio dropped");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn write_input_converts_i16_to_f32() {
        let sink = Arc::new(Mutex::new(CaptureBuffer::new(8, 16_000, 1)));
        write_input(&[0_i16, i16::MAX, i16::MIN], &sink);

        let samples = sink.lock().unwrap().drain();
        assert_eq!(samples.len(), 3);
        assert!(samples[0].abs() < 1e-6);
        assert!((samples[1] - 1.0).abs() < 1e-3);
        assert!((samples[2] + 1.0).abs() < 1e-3);
    }

    #[test]
    fn write_input_respects_capacity() {
        let sink = Arc::new(Mutex::new(CaptureBuffer::new(2, 16_000, 1)));
        write_input(&[0.1_f32, 0.2, 0.3], &sink);

        let buf = sink.lock().unwrap();
        assert_eq!(buf.len(), 2);
        assert!(buf.overflowed());
    }

    #[test]
    fn device_failures_are_classified() {
        assert!(CaptureError::NoDevice.is_device_failure());
        assert!(!CaptureError::Empty.is_device_failure());
        assert!(!CaptureError::TooShort {
            got_secs: 0.1,
            min_secs: 0.5
        }
        .is_device_failure());
    }

    #[test]
    fn too_short_message_has_durations() {
        let msg = CaptureError::TooShort {
            got_secs: 0.25,
            min_secs: 0.5,
        }
        .to_string();
        assert!(msg.contains("0.25"));
        assert!(msg.contains("0.50"));
    }
}
