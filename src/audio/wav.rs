//! In-memory WAV encoding (recordings) and decoding (synthesized speech)
//! via `hound`.

use std::io::Cursor;

use thiserror::Error;

use crate::media::MediaBlob;

use super::stereo_to_mono;

/// MIME type of encoded recordings.
pub const WAV_MIME: &str = "audio/wav";

#[derive(Debug, Error)]
pub enum WavError {
    #[error("WAV codec error: {0}")]
    Codec(#[from] hound::Error),

    #[error("unsupported WAV sample format: {bits}-bit {format}")]
    Unsupported { bits: u16, format: &'static str },
}

/// Mono samples decoded from a WAV payload.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl DecodedAudio {
    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.sample_rate as f32
    }
}

/// Encode mono `samples` in `[-1.0, 1.0]` as a 16-bit PCM WAV blob.
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<MediaBlob, WavError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::with_capacity(44 + samples.len() * 2));
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        for &s in samples {
            let clamped = s.clamp(-1.0, 1.0);
            writer.write_sample((clamped * i16::MAX as f32) as i16)?;
        }
        writer.finalize()?;
    }

    Ok(MediaBlob::new(cursor.into_inner(), WAV_MIME))
}

/// Decode a WAV payload to mono `f32` samples.
///
/// Integer formats of 8 to 32 bits and 32-bit float are accepted; multiple
/// channels are averaged down to one.
pub fn decode_wav(bytes: &[u8]) -> Result<DecodedAudio, WavError> {
    let mut reader = hound::WavReader::new(Cursor::new(bytes))?;
    let spec = reader.spec();

    let interleaved: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (hound::SampleFormat::Float, 32) => {
            reader.samples::<f32>().collect::<Result<_, _>>()?
        }
        (hound::SampleFormat::Int, bits @ 8..=32) => {
            let scale = (1_i64 << (bits - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()?
        }
        (hound::SampleFormat::Float, bits) => {
            return Err(WavError::Unsupported {
                bits,
                format: "float",
            })
        }
        (hound::SampleFormat::Int, bits) => {
            return Err(WavError::Unsupported { bits, format: "int" })
        }
    };

    Ok(DecodedAudio {
        samples: stereo_to_mono(&interleaved, spec.channels),
        sample_rate: spec.sample_rate,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
