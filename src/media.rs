//! Media payloads exchanged with the backend and temporary playable files.
//!
//! [`MediaBlob`] is an in-memory payload (recorded audio, synthesized speech,
//! rendered video, avatar image).  [`PlayableMedia`] writes a blob to a
//! temporary file so an external player can open it; the file lives exactly
//! as long as the handle.  Dropping (or [`release`](PlayableMedia::release)-ing)
//! the handle deletes the file.

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use thiserror::Error;

// ---------------------------------------------------------------------------
// MediaError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("failed to create playable media file: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// MediaBlob
// ---------------------------------------------------------------------------

/// Bytes plus their MIME type.
#[derive(Clone, PartialEq, Eq)]
pub struct MediaBlob {
    bytes: Vec<u8>,
    mime: String,
}

impl MediaBlob {
    pub fn new(bytes: Vec<u8>, mime: impl Into<String>) -> Self {
        Self {
            bytes,
            mime: mime.into(),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn mime(&self) -> &str {
        &self.mime
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// File extension (with the dot) matching the MIME type.
    pub fn extension(&self) -> &'static str {
        let essence = self.mime.split(';').next().unwrap_or("").trim();
        match essence {
            "audio/wav" | "audio/x-wav" | "audio/wave" => ".wav",
            "audio/webm" | "video/webm" => ".webm",
            "audio/mpeg" | "audio/mp3" => ".mp3",
            "video/mp4" => ".mp4",
            "image/png" => ".png",
            "image/jpeg" => ".jpg",
            _ => ".bin",
        }
    }
}

// Bodies can be megabytes; only show their size.
impl std::fmt::Debug for MediaBlob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaBlob")
            .field("mime", &self.mime)
            .field("len", &self.bytes.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// PlayableMedia
// ---------------------------------------------------------------------------

/// A blob materialised as a temporary file.
///
/// The path is valid until the handle is dropped.
#[derive(Debug)]
pub struct PlayableMedia {
    file: NamedTempFile,
    mime: String,
    len: usize,
}

impl PlayableMedia {
    /// Write `blob` to a fresh temporary file in the system temp dir.
    pub fn create(blob: &MediaBlob) -> Result<Self, MediaError> {
        Self::create_in(std::env::temp_dir(), blob)
    }

    /// Write `blob` to a fresh temporary file inside `dir`.
    pub fn create_in(dir: impl AsRef<Path>, blob: &MediaBlob) -> Result<Self, MediaError> {
        let mut file = tempfile::Builder::new()
            .prefix("avatar-chat-")
            .suffix(blob.extension())
            .tempfile_in(dir)?;
        file.write_all(blob.bytes())?;
        file.flush()?;

        Ok(Self {
            file,
            mime: blob.mime().to_string(),
            len: blob.len(),
        })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn mime(&self) -> &str {
        &self.mime
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Delete the backing file now.  Returns the path that was released.
    pub fn release(self) -> PathBuf {
        let path = self.file.path().to_path_buf();
        if let Err(e) = self.file.close() {
            log::warn!("media: failed to delete {}: {e}", path.display());
        }
        path
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
