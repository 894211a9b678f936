//! Speech playback via `cpal`.
//!
//! [`AudioOutput`] is the seam the pipeline plays synthesized speech
//! through.  [`CpalAudioOutput`] decodes the WAV payload up front (so a bad
//! payload is reported to the caller) and then plays it on a short-lived
//! thread that owns the output stream.  `play` never blocks for the length
//! of the clip.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SizedSample};
use thiserror::Error;

use crate::media::MediaBlob;

use super::resample::resample;
use super::wav::{decode_wav, WavError};

/// Extra time the output stream stays open after the last sample.
const TAIL: Duration = Duration::from_millis(250);

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("cannot decode speech audio: {0}")]
    Decode(#[from] WavError),

    #[error("speech audio is empty")]
    Empty,

    #[error("failed to spawn playback thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Plays synthesized speech.
///
/// Implementors must be `Send + Sync` so one instance can be shared by
/// concurrent turns behind an `Arc<dyn AudioOutput>`.
pub trait AudioOutput: Send + Sync {
    /// Start playing `audio` and return once playback has begun.
    fn play(&self, audio: &MediaBlob) -> Result<(), PlaybackError>;
}

// ---------------------------------------------------------------------------
// CpalAudioOutput
// ---------------------------------------------------------------------------

/// Plays WAV speech on the system default output device.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalAudioOutput;

impl CpalAudioOutput {
    pub fn new() -> Self {
        Self
    }
}

impl AudioOutput for CpalAudioOutput {
    fn play(&self, audio: &MediaBlob) -> Result<(), PlaybackError> {
        let decoded = decode_wav(audio.bytes())?;
        if decoded.samples.is_empty() {
            return Err(PlaybackError::Empty);
        }
        log::debug!("playing {:.2}s of speech", decoded.duration_secs());

        thread::Builder::new()
            .name("speech-playback".into())
            .spawn(move || {
                if let Err(e) = play_blocking(decoded.samples, decoded.sample_rate) {
                    log::warn!("speech playback failed: {e}");
                }
            })?;
        Ok(())
    }
}

/// Open the default output device, play `samples` to the end, then close it.
fn play_blocking(samples: Vec<f32>, sample_rate: u32) -> anyhow::Result<()> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| anyhow::anyhow!("no output device found on the default audio host"))?;
    let supported = device.default_output_config()?;

    let device_rate = supported.sample_rate().0;
    let channels = supported.channels() as usize;
    let sample_format = supported.sample_format();
    let config: cpal::StreamConfig = supported.into();

    let samples = Arc::new(resample(&samples, sample_rate, device_rate));
    let clip = Duration::from_secs_f64(samples.len() as f64 / device_rate as f64);

    let stream = match sample_format {
        cpal::SampleFormat::F32 => build_output::<f32>(&device, &config, channels, samples)?,
        cpal::SampleFormat::I16 => build_output::<i16>(&device, &config, channels, samples)?,
        cpal::SampleFormat::I32 => build_output::<i32>(&device, &config, channels, samples)?,
        cpal::SampleFormat::U16 => build_output::<u16>(&device, &config, channels, samples)?,
        other => anyhow::bail!("unsupported output sample format: {other:?}"),
    };

    stream.play()?;
    log::debug!("playing {:.2}s of speech at {device_rate} Hz", clip.as_secs_f32());
    thread::sleep(clip + TAIL);
    Ok(())
}

fn build_output<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    channels: usize,
    samples: Arc<Vec<f32>>,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: SizedSample + FromSample<f32>,
{
    let mut cursor = 0usize;
    device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            cursor = fill_frames(data, channels, &samples, cursor);
        },
        |err: cpal::StreamError| {
            log::error!("cpal output stream error: {err}");
        },
        None,
    )
}

/// Write mono `samples` starting at `cursor` into interleaved `data`,
/// duplicating each sample across `channels`.  Frames past the end are
/// silence.  Returns the new cursor.
fn fill_frames<T>(data: &mut [T], channels: usize, samples: &[f32], mut cursor: usize) -> usize
where
    T: SizedSample + FromSample<f32>,
{
    for frame in data.chunks_mut(channels.max(1)) {
        let value = samples.get(cursor).copied().unwrap_or(0.0);
        cursor += 1;
        for slot in frame.iter_mut() {
            *slot = T::from_sample(value);
        }
    }
    cursor
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_frames_duplicates_across_channels() {
        let mut out = [0.0_f32; 6];
        let cursor = fill_frames(&mut out, 2, &[0.1, 0.2, 0.3], 0);

        assert_eq!(cursor, 3);
        assert_eq!(out, [0.1, 0.1, 0.2, 0.2, 0.3, 0.3]);
    }

    #[test]
    fn fill_frames_pads_with_silence() {
        let mut out = [1.0_f32; 4];
        let cursor = fill_frames(&mut out, 1, &[0.5, 0.5], 1);

        assert_eq!(cursor, 5);
        assert_eq!(out, [0.5, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn fill_frames_converts_to_i16() {
        let mut out = [0_i16; 2];
        fill_frames(&mut out, 1, &[1.0, -1.0], 0);
        assert!(out[0] > 32_000);
        assert!(out[1] < -32_000);
    }

    #[test]
    fn play_rejects_non_wav_payload() {
        let output = CpalAudioOutput::new();
        let err = output
            .play(&MediaBlob::new(b"ID3 not a wav".to_vec(), "audio/mpeg"))
            .unwrap_err();
        assert!(matches!(err, PlaybackError::Decode(_)));
    }

    #[test]
    fn play_rejects_empty_wav() {
        let blob = crate::audio::encode_wav(&[], 16_000).unwrap();
        let err = CpalAudioOutput::new().play(&blob).unwrap_err();
        assert!(matches!(err, PlaybackError::Empty));
    }
}
