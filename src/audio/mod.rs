//! Audio I/O: push-to-talk recording and speech playback.
//!
//! # Recording
//!
//! ```text
//! Microphone → cpal callback → CaptureBuffer → stereo_to_mono
//!           → encode_wav → MediaBlob (audio/wav)
//! ```
//!
//! # Playback
//!
//! ```text
//! MediaBlob (audio/wav) → decode_wav → resample(device rate) → cpal output
//! ```

pub mod buffer;
pub mod capture;
pub mod playback;
pub mod recorder;
pub mod resample;
pub mod wav;

pub use buffer::{CaptureBuffer, SharedCaptureBuffer};
pub use capture::{AudioCapture, CaptureError, StreamHandle};
pub use playback::{AudioOutput, CpalAudioOutput, PlaybackError};
pub use recorder::{finish_recording, Recorder};
pub use resample::{resample, stereo_to_mono};
pub use wav::{decode_wav, encode_wav, DecodedAudio, WavError, WAV_MIME};
