//! Remote backend collaborator: transcription, speech synthesis and avatar
//! video generation.
//!
//! ```text
//! POST /transcribe        multipart audio      → {"transcript"} | {"error"}
//! POST /speak             JSON {"text"}        → audio bytes
//! POST /generate-avatar   multipart audio+img  → video bytes
//! GET  /status                                 → {"status":"ok"}
//! ```
//!
//! [`AvatarBackend`] is the seam the pipeline talks to; [`HttpBackend`] is
//! the production `reqwest` implementation.  No call is ever retried.

pub mod error;
pub mod http;

use async_trait::async_trait;

use crate::media::MediaBlob;
use crate::session::SessionId;

pub use error::BackendError;
pub use http::HttpBackend;

/// Async interface to the backend.
///
/// Implementors must be `Send + Sync` so they can be shared across turns
/// behind an `Arc<dyn AvatarBackend>`.
#[async_trait]
pub trait AvatarBackend: Send + Sync {
    /// Upload a recording and return the recognised text.
    async fn transcribe(&self, audio: &MediaBlob, session: &SessionId)
        -> Result<String, BackendError>;

    /// Synthesize `text` and return playable audio.
    async fn speak(&self, text: &str, session: &SessionId) -> Result<MediaBlob, BackendError>;

    /// Render an avatar video lip-synced to `audio`, optionally using `image`
    /// as the face.
    async fn generate_avatar(
        &self,
        audio: &MediaBlob,
        session: &SessionId,
        image: Option<&MediaBlob>,
    ) -> Result<MediaBlob, BackendError>;

    /// Resolve the configured avatar image (URL or local path) to bytes.
    async fn fetch_image(&self, location: &str) -> Result<MediaBlob, BackendError>;
}
