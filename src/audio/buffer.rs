//! Bounded capture buffer for interleaved `f32` microphone samples.
//!
//! Unlike a ring buffer, a capture buffer keeps the **head** of the
//! recording: once `capacity` samples are stored, further samples are
//! dropped and [`overflowed`](CaptureBuffer::overflowed) turns `true`.  The
//! user hears their whole question, not the tail of it.
//!
//! # Example
//!
//! ```rust
//! use avatar_chat::audio::CaptureBuffer;
//!
//! let mut buf = CaptureBuffer::new(4, 16_000, 1);
//! let accepted = buf.push_slice(&[1.0, 2.0, 3.0, 4.0, 5.0]);
//! assert_eq!(accepted, 4);
//! assert!(buf.overflowed());
//! assert_eq!(buf.drain(), vec![1.0, 2.0, 3.0, 4.0]);
//! ```

use std::sync::{Arc, Mutex};

/// Buffer shared between the cpal callback thread and the recorder.
pub type SharedCaptureBuffer = Arc<Mutex<CaptureBuffer>>;

/// Accumulates interleaved samples up to a fixed capacity.
#[derive(Debug)]
pub struct CaptureBuffer {
    samples: Vec<f32>,
    capacity: usize,
    sample_rate: u32,
    channels: u16,
    overflowed: bool,
}

impl CaptureBuffer {
    /// Create a buffer holding at most `capacity` interleaved samples of
    /// audio at `sample_rate` Hz with `channels` channels.
    ///
    /// # Panics
    ///
    /// Panics if `capacity == 0` or `channels == 0`.
    pub fn new(capacity: usize, sample_rate: u32, channels: u16) -> Self {
        assert!(capacity > 0, "CaptureBuffer capacity must be > 0");
        assert!(channels > 0, "CaptureBuffer needs at least one channel");
        Self {
            samples: Vec::new(),
            capacity,
            sample_rate,
            channels,
            overflowed: false,
        }
    }

    /// Buffer sized for `max_secs` of audio in the given format.
    pub fn for_duration(max_secs: f32, sample_rate: u32, channels: u16) -> Self {
        let capacity = (max_secs.max(0.0) * sample_rate as f32) as usize * channels as usize;
        Self::new(capacity.max(1), sample_rate, channels)
    }

    /// Append as much of `data` as fits.  Returns the number of samples
    /// accepted.
    pub fn push_slice(&mut self, data: &[f32]) -> usize {
        let room = self.capacity - self.samples.len();
        let take = room.min(data.len());
        self.samples.extend_from_slice(&data[..take]);
        if take < data.len() {
            self.overflowed = true;
        }
        take
    }

    /// Take all stored samples in order and reset the buffer.
    pub fn drain(&mut self) -> Vec<f32> {
        self.overflowed = false;
        std::mem::take(&mut self.samples)
    }

    /// Number of interleaved samples currently stored.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// `true` once a push had to drop samples.
    pub fn overflowed(&self) -> bool {
        self.overflowed
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Recorded duration in seconds.
    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        let frames = self.samples.len() / self.channels as usize;
        frames as f32 / self.sample_rate as f32
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_and_drain_within_capacity() {
        let mut buf = CaptureBuffer::new(8, 16_000, 1);
        assert_eq!(buf.push_slice(&[1.0, 2.0, 3.0]), 3);
        assert_eq!(buf.len(), 3);
        assert!(!buf.overflowed());

        assert_eq!(buf.drain(), vec![1.0, 2.0, 3.0]);
        assert!(buf.is_empty());
    }

    #[test]
    fn overflow_keeps_the_head() {
        let mut buf = CaptureBuffer::new(4, 16_000, 1);
        buf.push_slice(&[1.0, 2.0, 3.0]);
        assert_eq!(buf.push_slice(&[4.0, 5.0, 6.0]), 1);
        assert!(buf.overflowed());
        assert_eq!(buf.push_slice(&[7.0]), 0);

        assert_eq!(buf.drain(), vec![1.0, 2.0, 3.0, 4.0]);
        assert!(!buf.overflowed());
    }

    #[test]
    fn duration_counts_frames_not_samples() {
        let mut buf = CaptureBuffer::new(96_000, 48_000, 2);
        buf.push_slice(&vec![0.0; 48_000]); // 24 000 stereo frames
        assert!((buf.duration_secs() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn for_duration_sizes_capacity() {
        let buf = CaptureBuffer::for_duration(2.0, 16_000, 2);
        assert_eq!(buf.capacity(), 64_000);
        assert_eq!(buf.channels(), 2);
        assert_eq!(buf.sample_rate(), 16_000);
    }

    #[test]
    #[should_panic(expected = "CaptureBuffer capacity must be > 0")]
    fn zero_capacity_panics() {
        let _ = CaptureBuffer::new(0, 16_000, 1);
    }
}
