//! `reqwest` implementation of [`AvatarBackend`].
//!
//! All connection details come from [`BackendConfig`]; nothing is
//! hardcoded beyond the endpoint paths the backend exposes.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{multipart, RequestBuilder, Response};
use serde::Deserialize;

use crate::config::{BackendConfig, SessionCarrier};
use crate::media::MediaBlob;
use crate::session::SessionId;

use super::{AvatarBackend, BackendError};

const SESSION_HEADER: &str = "session_id";
const SESSION_QUERY: &str = "session_id_query";
const SPEAK_SESSION_QUERY: &str = "session_id";

#[derive(Debug, Deserialize)]
struct TranscribeResponse {
    transcript: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    status: String,
}

/// HTTP client for the transcription / speech / avatar backend.
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
    carrier: SessionCarrier,
    audio_field: String,
}

impl HttpBackend {
    /// Build a client from configuration.
    ///
    /// The per-request timeout comes from `config.timeout_secs`.  A default
    /// client is used as a last-resort fallback if the builder fails.
    pub fn from_config(config: &BackendConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            carrier: config.session_carrier,
            audio_field: config.audio_field.clone(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Probe `GET /status`; succeeds when the backend reports `"ok"`.
    pub async fn status(&self) -> Result<(), BackendError> {
        let resp = self
            .client
            .get(format!("{}/status", self.base_url))
            .send()
            .await?;
        let resp = ensure_success(resp)?;
        let body: StatusResponse = resp.json().await?;

        if body.status == "ok" {
            Ok(())
        } else {
            Err(BackendError::Server(format!("status is {:?}", body.status)))
        }
    }

    /// Attach the session id the way the configured carrier prescribes.
    fn with_session(&self, req: RequestBuilder, session: &SessionId) -> RequestBuilder {
        match self.carrier {
            SessionCarrier::Query => req.query(&[(SESSION_QUERY, session.as_str())]),
            SessionCarrier::Header => req.header(SESSION_HEADER, session.as_str()),
        }
    }
}

fn ensure_success(resp: Response) -> Result<Response, BackendError> {
    let status = resp.status();
    if status.is_success() {
        Ok(resp)
    } else {
        Err(BackendError::Status {
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or("").to_string(),
        })
    }
}

fn content_type(resp: &Response, fallback: &str) -> String {
    resp.headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or(fallback)
        .to_string()
}

async fn read_blob(resp: Response, fallback_mime: &str) -> Result<MediaBlob, BackendError> {
    let mime = content_type(&resp, fallback_mime);
    let bytes = resp.bytes().await?;
    Ok(MediaBlob::new(bytes.to_vec(), mime))
}

fn file_part(blob: &MediaBlob, file_name: &str) -> Result<multipart::Part, BackendError> {
    multipart::Part::bytes(blob.bytes().to_vec())
        .file_name(file_name.to_string())
        .mime_str(blob.mime())
        .map_err(|e| BackendError::InvalidRequest(e.to_string()))
}

fn image_mime_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "image/png",
    }
}

#[async_trait]
impl AvatarBackend for HttpBackend {
    async fn transcribe(
        &self,
        audio: &MediaBlob,
        session: &SessionId,
    ) -> Result<String, BackendError> {
        let file_name = if audio.mime().contains("webm") {
            "audio.webm"
        } else {
            "audio.wav"
        };
        let form =
            multipart::Form::new().part(self.audio_field.clone(), file_part(audio, file_name)?);

        log::debug!(
            "backend: POST /transcribe ({} bytes, {})",
            audio.len(),
            audio.mime()
        );
        let req = self
            .client
            .post(format!("{}/transcribe", self.base_url))
            .multipart(form);
        let resp = self.with_session(req, session).send().await?;
        let resp = ensure_success(resp)?;

        let body: TranscribeResponse = resp
            .json()
            .await
            .map_err(|e| BackendError::Malformed(e.to_string()))?;

        match body {
            TranscribeResponse {
                transcript: Some(text),
                ..
            } if !text.is_empty() => Ok(text),
            TranscribeResponse {
                error: Some(message),
                ..
            } => Err(BackendError::Server(message)),
            _ => Err(BackendError::MissingField("transcript")),
        }
    }

    async fn speak(&self, text: &str, session: &SessionId) -> Result<MediaBlob, BackendError> {
        log::debug!("backend: POST /speak ({} chars)", text.chars().count());

        let mut req = self
            .client
            .post(format!("{}/speak", self.base_url))
            .query(&[(SPEAK_SESSION_QUERY, session.as_str())])
            .json(&serde_json::json!({ "text": text }));
        if self.carrier == SessionCarrier::Header {
            req = req.header(SESSION_HEADER, session.as_str());
        }

        let resp = ensure_success(req.send().await?)?;
        read_blob(resp, "audio/wav").await
    }

    async fn generate_avatar(
        &self,
        audio: &MediaBlob,
        session: &SessionId,
        image: Option<&MediaBlob>,
    ) -> Result<MediaBlob, BackendError> {
        let mut form = multipart::Form::new().part("audio", file_part(audio, "audio.wav")?);
        if let Some(image) = image {
            form = form.part("image", file_part(image, "avatar.png")?);
        }

        log::debug!(
            "backend: POST /generate-avatar ({} audio bytes, image: {})",
            audio.len(),
            image.is_some()
        );
        let req = self
            .client
            .post(format!("{}/generate-avatar", self.base_url))
            .multipart(form);
        let resp = ensure_success(self.with_session(req, session).send().await?)?;
        read_blob(resp, "video/mp4").await
    }

    async fn fetch_image(&self, location: &str) -> Result<MediaBlob, BackendError> {
        if location.starts_with("http://") || location.starts_with("https://") {
            let resp = ensure_success(self.client.get(location).send().await?)?;
            return read_blob(resp, "image/png").await;
        }

        let path = Path::new(location);
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| BackendError::File {
                path: location.to_string(),
                message: e.to_string(),
            })?;
        Ok(MediaBlob::new(bytes, image_mime_for(path)))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn backend_for(url: &str, carrier: SessionCarrier, audio_field: &str) -> HttpBackend {
        HttpBackend::from_config(&BackendConfig {
            url: url.to_string(),
            session_carrier: carrier,
            audio_field: audio_field.to_string(),
            timeout_secs: 5,
        })
    }

    fn wav_blob() -> MediaBlob {
        MediaBlob::new(b"RIFF-fake-wav-body".to_vec(), "audio/wav")
    }

    fn session() -> SessionId {
        SessionId::new("abc123")
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let backend = backend_for("http://localhost:8000/", SessionCarrier::Query, "audio");
        assert_eq!(backend.base_url(), "http://localhost:8000");
    }

    #[tokio::test]
    async fn transcribe_with_query_carrier() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/transcribe")
            .match_query(Matcher::UrlEncoded(
                "session_id_query".into(),
                "abc123".into(),
            ))
            .match_body(Matcher::Regex(
                r#"name="audio"; filename="audio.wav""#.to_string(),
            ))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"transcript":"hello there","latency":0.4}"#)
            .create_async()
            .await;

        let backend = backend_for(&server.url(), SessionCarrier::Query, "audio");
        let text = backend.transcribe(&wav_blob(), &session()).await.unwrap();

        assert_eq!(text, "hello there");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn transcribe_with_header_carrier_and_file_field() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/transcribe")
            .match_query(Matcher::Any)
            .match_header("session_id", "abc123")
            .match_body(Matcher::Regex(r#"name="file"; filename="audio.wav""#.to_string()))
            .with_status(200)
            .with_body(r#"{"transcript":"hi"}"#)
            .create_async()
            .await;

        let backend = backend_for(&server.url(), SessionCarrier::Header, "file");
        assert_eq!(backend.transcribe(&wav_blob(), &session()).await.unwrap(), "hi");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn transcribe_webm_uses_webm_file_name() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/transcribe")
            .match_query(Matcher::Any)
            .match_body(Matcher::Regex(r#"filename="audio.webm""#.to_string()))
            .with_status(200)
            .with_body(r#"{"transcript":"webm ok"}"#)
            .create_async()
            .await;

        let backend = backend_for(&server.url(), SessionCarrier::Query, "audio");
        let blob = MediaBlob::new(b"webm-bytes".to_vec(), "audio/webm;codecs=opus");
        assert_eq!(backend.transcribe(&blob, &session()).await.unwrap(), "webm ok");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn transcribe_error_field_maps_to_server_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/transcribe")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"error":"Audio file is empty"}"#)
            .create_async()
            .await;

        let backend = backend_for(&server.url(), SessionCarrier::Query, "audio");
        let err = backend.transcribe(&wav_blob(), &session()).await.unwrap_err();
        assert!(matches!(err, BackendError::Server(ref m) if m == "Audio file is empty"));
    }

    #[tokio::test]
    async fn transcribe_without_fields_is_missing_transcript() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/transcribe")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"transcript":""}"#)
            .create_async()
            .await;

        let backend = backend_for(&server.url(), SessionCarrier::Query, "audio");
        let err = backend.transcribe(&wav_blob(), &session()).await.unwrap_err();
        assert!(matches!(err, BackendError::MissingField("transcript")));
    }

    #[tokio::test]
    async fn transcribe_http_error_maps_to_status() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/transcribe")
            .match_query(Matcher::Any)
            .with_status(503)
            .create_async()
            .await;

        let backend = backend_for(&server.url(), SessionCarrier::Query, "audio");
        let err = backend.transcribe(&wav_blob(), &session()).await.unwrap_err();
        assert!(matches!(err, BackendError::Status { status: 503, .. }));
    }

    #[tokio::test]
    async fn transcribe_non_json_body_is_malformed() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/transcribe")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("<html>oops</html>")
            .create_async()
            .await;

        let backend = backend_for(&server.url(), SessionCarrier::Query, "audio");
        let err = backend.transcribe(&wav_blob(), &session()).await.unwrap_err();
        assert!(matches!(err, BackendError::Malformed(_)));
    }

    #[tokio::test]
    async fn unreachable_backend_is_a_transport_error() {
        // Port 9 (discard) on localhost is almost never listening.
        let backend = backend_for("http://127.0.0.1:9", SessionCarrier::Query, "audio");
        let err = backend.transcribe(&wav_blob(), &session()).await.unwrap_err();
        assert!(err.is_transport(), "unexpected error: {err:?}");
    }

    #[tokio::test]
    async fn speak_posts_json_with_session_query() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/speak")
            .match_query(Matcher::UrlEncoded("session_id".into(), "abc123".into()))
            .match_body(Matcher::Json(serde_json::json!({ "text": "Hello" })))
            .with_status(200)
            .with_header("content-type", "audio/wav")
            .with_body(b"RIFFdata".as_slice())
            .create_async()
            .await;

        let backend = backend_for(&server.url(), SessionCarrier::Query, "audio");
        let blob = backend.speak("Hello", &session()).await.unwrap();

        assert_eq!(blob.bytes(), b"RIFFdata");
        assert_eq!(blob.mime(), "audio/wav");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn speak_with_header_carrier_sends_both() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/speak")
            .match_query(Matcher::UrlEncoded("session_id".into(), "abc123".into()))
            .match_header("session_id", "abc123")
            .with_status(200)
            .with_body(b"RIFF".as_slice())
            .create_async()
            .await;

        let backend = backend_for(&server.url(), SessionCarrier::Header, "file");
        backend.speak("Hi", &session()).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn speak_http_500_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/speak")
            .match_query(Matcher::Any)
            .with_status(500)
            .with_body("TTS generation failed")
            .create_async()
            .await;

        let backend = backend_for(&server.url(), SessionCarrier::Query, "audio");
        let err = backend.speak("Hi", &session()).await.unwrap_err();
        assert!(matches!(err, BackendError::Status { status: 500, .. }));
    }

    #[tokio::test]
    async fn generate_avatar_sends_audio_and_image() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/generate-avatar")
            .match_query(Matcher::UrlEncoded(
                "session_id_query".into(),
                "abc123".into(),
            ))
            .match_body(Matcher::AllOf(vec![
                Matcher::Regex(r#"name="audio"; filename="audio.wav""#.to_string()),
                Matcher::Regex(r#"name="image"; filename="avatar.png""#.to_string()),
            ]))
            .with_status(200)
            .with_header("content-type", "video/mp4")
            .with_body(b"mp4-bytes".as_slice())
            .create_async()
            .await;

        let backend = backend_for(&server.url(), SessionCarrier::Query, "audio");
        let image = MediaBlob::new(b"png-bytes".to_vec(), "image/png");
        let video = backend
            .generate_avatar(&wav_blob(), &session(), Some(&image))
            .await
            .unwrap();

        assert_eq!(video.bytes(), b"mp4-bytes");
        assert_eq!(video.mime(), "video/mp4");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn generate_avatar_without_image_defaults_to_mp4() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/generate-avatar")
            .match_query(Matcher::Any)
            .match_body(Matcher::Regex(r#"name="audio""#.to_string()))
            .with_status(200)
            .with_body(b"video".as_slice())
            .create_async()
            .await;

        let backend = backend_for(&server.url(), SessionCarrier::Query, "audio");
        let video = backend
            .generate_avatar(&wav_blob(), &session(), None)
            .await
            .unwrap();
        assert_eq!(video.mime(), "video/mp4");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn fetch_image_over_http() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/avatar.jpg")
            .with_status(200)
            .with_header("content-type", "image/jpeg")
            .with_body(b"jpeg".as_slice())
            .create_async()
            .await;

        let backend = backend_for(&server.url(), SessionCarrier::Query, "audio");
        let image = backend
            .fetch_image(&format!("{}/avatar.jpg", server.url()))
            .await
            .unwrap();
        assert_eq!(image.mime(), "image/jpeg");
        assert_eq!(image.bytes(), b"jpeg");
    }

    #[tokio::test]
    async fn fetch_image_from_local_file() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("face.JPG");
        std::fs::write(&path, b"jpeg-data").unwrap();

        let backend = backend_for("http://localhost:8000", SessionCarrier::Query, "audio");
        let image = backend.fetch_image(path.to_str().unwrap()).await.unwrap();
        assert_eq!(image.mime(), "image/jpeg");

        let missing = backend
            .fetch_image(dir.path().join("nope.png").to_str().unwrap())
            .await
            .unwrap_err();
        assert!(matches!(missing, BackendError::File { .. }));
    }

    #[tokio::test]
    async fn status_reports_ok_backend() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/status")
            .with_status(200)
            .with_body(r#"{"status":"ok"}"#)
            .create_async()
            .await;

        let backend = backend_for(&server.url(), SessionCarrier::Query, "audio");
        assert!(backend.status().await.is_ok());
    }
}
