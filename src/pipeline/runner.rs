//! Pipeline runner: drives one chat turn from user input to avatar video.
//!
//! [`Pipeline`] owns the [`SharedState`] and responds to
//! [`PipelineCommand`]s received over a `tokio::sync::mpsc` channel.
//!
//! # Turn flow
//!
//! ```text
//! SubmitAudio(blob)
//!   └─▶ size check ─▶ backend.transcribe          [Transcribing]
//! SubmitText(text) ──┐
//!   ◀────────────────┘
//!   └─▶ append user message                       [RenderedUser]
//!         └─▶ backend.speak(reply)                [Synthesizing]
//!               └─▶ spawn_blocking(output.play)   [PlayingAudio]
//!                     └─▶ backend.generate_avatar [GeneratingVideo]
//!                           └─▶ PlayableMedia     [PlayingVideo]
//! any failure ─▶ append error message ─▶ Idle
//! ```
//!
//! Every accepted submission runs as its own task so the command loop keeps
//! draining (and ignoring) submissions while a turn is in flight.

use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::audio::{AudioOutput, CaptureError};
use crate::backend::{AvatarBackend, BackendError};
use crate::config::{AppConfig, ReplyMode};
use crate::media::{MediaBlob, MediaError, PlayableMedia};
use crate::session::{SessionId, SessionManager};

use super::events::{LatencyStage, PipelineCommand, PipelineEvent, PipelineObserver};
use super::reply::compose_reply;
use super::state::{lock_state, ChatMessage, SharedState, TurnStage, VideoRef};

// ---------------------------------------------------------------------------
// TurnError
// ---------------------------------------------------------------------------

/// Why a turn stopped.  `Display` is the exact sentence shown in the chat.
#[derive(Debug, Error)]
pub enum TurnError {
    #[error("Microphone access denied.")]
    PermissionDenied,

    #[error("Audio recording is empty. Please try again.")]
    EmptyRecording,

    #[error("Recording too short. Please speak for at least 1-2 seconds.")]
    RecordingTooShort,

    #[error("Could not process the recording. Please try again.")]
    RecordingUnreadable,

    #[error("{}", transcription_message(.0))]
    Transcription(BackendError),

    #[error("TTS failed.")]
    Synthesis(BackendError),

    #[error("Avatar generation failed.")]
    Avatar(BackendError),

    #[error("Avatar generation failed.")]
    VideoStorage(MediaError),
}

fn transcription_message(error: &BackendError) -> String {
    match error {
        BackendError::Server(text) => format!("Transcription error: {text}"),
        BackendError::MissingField(_) => "No transcript received.".to_string(),
        BackendError::Status { status, .. } => format!("Transcription failed: HTTP {status}"),
        _ => "Network error.".to_string(),
    }
}

impl From<CaptureError> for TurnError {
    fn from(error: CaptureError) -> Self {
        if error.is_device_failure() {
            return TurnError::PermissionDenied;
        }
        match error {
            CaptureError::Empty => TurnError::EmptyRecording,
            CaptureError::TooShort { .. } => TurnError::RecordingTooShort,
            error => {
                log::error!("capture: recording could not be encoded: {error}");
                TurnError::RecordingUnreadable
            }
        }
    }
}

/// Reject recordings too small to be worth uploading.
pub fn validate_recording(audio: &MediaBlob, min_bytes: usize) -> Result<(), TurnError> {
    if audio.is_empty() {
        return Err(TurnError::EmptyRecording);
    }
    if audio.len() < min_bytes {
        return Err(TurnError::RecordingTooShort);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Settings / input
// ---------------------------------------------------------------------------

/// The slice of [`AppConfig`] a turn needs.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub greeting: String,
    pub reply_mode: ReplyMode,
    /// URL or local path; empty means no image.
    pub avatar_image: String,
    pub min_recording_bytes: usize,
}

impl PipelineSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            greeting: config.widget.greeting.clone(),
            reply_mode: config.widget.reply_mode,
            avatar_image: config.widget.avatar_image.clone(),
            min_recording_bytes: config.audio.min_recording_bytes,
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// What the user submitted.
#[derive(Debug, Clone)]
pub enum TurnInput {
    Text(String),
    Audio(MediaBlob),
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Drives chat turns.
///
/// Create with [`Pipeline::new`], then call [`run`](Self::run) inside a
/// tokio task.
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use avatar_chat::audio::CpalAudioOutput;
/// use avatar_chat::backend::HttpBackend;
/// use avatar_chat::config::AppConfig;
/// use avatar_chat::pipeline::{new_shared_state, ChannelObserver, Pipeline, PipelineSettings};
/// use avatar_chat::session::{MemorySessionStore, SessionManager};
///
/// # async fn example() {
/// let config = AppConfig::default();
/// let (observer, _events) = ChannelObserver::channel();
/// let pipeline = Pipeline::new(
///     new_shared_state(),
///     Arc::new(HttpBackend::from_config(&config.backend)),
///     Arc::new(CpalAudioOutput::new()),
///     Arc::new(observer),
///     Arc::new(SessionManager::new(Arc::new(MemorySessionStore::new()), "demo")),
///     PipelineSettings::from_config(&config),
/// );
///
/// let (command_tx, command_rx) = tokio::sync::mpsc::channel(16);
/// # drop(command_tx);
/// pipeline.run(command_rx).await;
/// # }
/// ```
#[derive(Clone)]
pub struct Pipeline {
    inner: Arc<Inner>,
}

struct Inner {
    state: SharedState,
    backend: Arc<dyn AvatarBackend>,
    output: Arc<dyn AudioOutput>,
    observer: Arc<dyn PipelineObserver>,
    session: Arc<SessionManager>,
    settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(
        state: SharedState,
        backend: Arc<dyn AvatarBackend>,
        output: Arc<dyn AudioOutput>,
        observer: Arc<dyn PipelineObserver>,
        session: Arc<SessionManager>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                state,
                backend,
                output,
                observer,
                session,
                settings,
            }),
        }
    }

    pub fn state(&self) -> SharedState {
        Arc::clone(&self.inner.state)
    }

    // -----------------------------------------------------------------------
    // Main async loop
    // -----------------------------------------------------------------------

    /// Process commands until `commands` is closed, then wait for running
    /// turns and release the current video.
    pub async fn run(self, mut commands: mpsc::Receiver<PipelineCommand>) {
        let mut turns = JoinSet::new();

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command, &mut turns),
                    None => break,
                },
                Some(joined) = turns.join_next(), if !turns.is_empty() => {
                    self.reap(joined);
                }
            }
        }

        while let Some(joined) = turns.join_next().await {
            self.reap(joined);
        }

        self.shutdown();
        log::info!("pipeline: command channel closed, shutting down");
    }

    /// Run one turn to completion on the current task.
    ///
    /// Returns `false` without doing anything if another turn holds the
    /// loading gate.
    pub async fn submit(&self, input: TurnInput) -> bool {
        if !self.inner.try_claim() {
            return false;
        }
        self.inner.run_turn(input).await;
        true
    }

    /// Release the playable video still on screen.
    pub fn shutdown(&self) {
        let released = lock_state(&self.inner.state).release_video();
        if let Some(path) = released {
            log::debug!("pipeline: released {}", path.display());
            self.inner.emit(PipelineEvent::MediaReleased(path));
        }
    }

    // -----------------------------------------------------------------------
    // Command handlers
    // -----------------------------------------------------------------------

    fn handle_command(&self, command: PipelineCommand, turns: &mut JoinSet<()>) {
        match command {
            PipelineCommand::Open => self.inner.greet(),
            PipelineCommand::SubmitText(text) => {
                let text = text.trim();
                if text.is_empty() {
                    log::debug!("pipeline: blank text ignored");
                    return;
                }
                self.spawn_turn(TurnInput::Text(text.to_string()), turns);
            }
            PipelineCommand::SubmitAudio(audio) => self.spawn_turn(TurnInput::Audio(audio), turns),
            PipelineCommand::CaptureStarted => self.inner.capture_started(),
            PipelineCommand::CaptureFailed(error) => self.inner.capture_failed(error),
        }
    }

    fn spawn_turn(&self, input: TurnInput, turns: &mut JoinSet<()>) {
        if !self.inner.try_claim() {
            return;
        }
        let inner = Arc::clone(&self.inner);
        turns.spawn(async move { inner.run_turn(input).await });
    }

    fn reap(&self, joined: Result<(), tokio::task::JoinError>) {
        if let Err(e) = joined {
            log::error!("pipeline: turn task aborted: {e}");
            self.inner.finish_turn();
        }
    }
}

impl Inner {
    // -----------------------------------------------------------------------
    // Turn
    // -----------------------------------------------------------------------

    fn try_claim(&self) -> bool {
        let claimed = lock_state(&self.state).try_begin_turn();
        if claimed {
            self.emit(PipelineEvent::LoadingChanged(true));
        } else {
            log::debug!("pipeline: turn in progress; submission ignored");
        }
        claimed
    }

    async fn run_turn(&self, input: TurnInput) {
        if let Err(e) = self.execute(input).await {
            log::error!("pipeline: turn failed: {e} ({e:?})");
            self.append(ChatMessage::error(e.to_string()));
        }
        self.finish_turn();
    }

    async fn execute(&self, input: TurnInput) -> Result<(), TurnError> {
        let session = self.session.session_id();

        let text = match input {
            TurnInput::Text(text) => text,
            TurnInput::Audio(audio) => self.transcribe(&audio, &session).await?,
        };

        self.append(ChatMessage::user(text.clone()));
        self.set_stage(TurnStage::RenderedUser);

        let reply = compose_reply(self.settings.reply_mode, &text);
        if let Some(message) = reply.message {
            self.append(ChatMessage::ai(message));
        }

        // ── Speech ───────────────────────────────────────────────────────
        self.set_stage(TurnStage::Synthesizing);
        let started = Instant::now();
        let speech = self
            .backend
            .speak(&reply.speech, &session)
            .await
            .map_err(TurnError::Synthesis)?;
        self.report_latency(LatencyStage::Synthesis, started);

        self.set_stage(TurnStage::PlayingAudio);
        self.play(&speech).await;

        // ── Avatar video ─────────────────────────────────────────────────
        self.set_stage(TurnStage::GeneratingVideo);
        let image = self.avatar_image().await;
        let started = Instant::now();
        let video = self
            .backend
            .generate_avatar(&speech, &session, image.as_ref())
            .await
            .map_err(TurnError::Avatar)?;
        self.report_latency(LatencyStage::Avatar, started);

        let playable = PlayableMedia::create(&video).map_err(TurnError::VideoStorage)?;
        self.show_video(playable);
        self.set_stage(TurnStage::PlayingVideo);
        Ok(())
    }

    async fn transcribe(&self, audio: &MediaBlob, session: &SessionId) -> Result<String, TurnError> {
        validate_recording(audio, self.settings.min_recording_bytes)?;

        self.set_stage(TurnStage::Transcribing);
        log::info!("pipeline: uploading {} byte recording ({})", audio.len(), audio.mime());
        let started = Instant::now();
        let transcript = self
            .backend
            .transcribe(audio, session)
            .await
            .map_err(TurnError::Transcription)?;
        self.report_latency(LatencyStage::Transcription, started);
        Ok(transcript)
    }

    /// Playback problems are logged; the turn carries on to the video.
    async fn play(&self, speech: &MediaBlob) {
        let output = Arc::clone(&self.output);
        let speech = speech.clone();
        match tokio::task::spawn_blocking(move || output.play(&speech)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => log::warn!("pipeline: speech playback failed: {e}"),
            Err(e) => log::warn!("pipeline: playback task panicked: {e}"),
        }
    }

    async fn avatar_image(&self) -> Option<MediaBlob> {
        let location = self.settings.avatar_image.trim();
        if location.is_empty() {
            return None;
        }
        match self.backend.fetch_image(location).await {
            Ok(image) => Some(image),
            Err(e) => {
                log::warn!("pipeline: avatar image unavailable ({e}); continuing without it");
                None
            }
        }
    }

    /// Swap in the new video, releasing the previous file first.
    fn show_video(&self, playable: PlayableMedia) {
        let message = ChatMessage::Video {
            media: VideoRef::of(&playable),
        };
        let released = {
            let mut st = lock_state(&self.state);
            let released = st.replace_video(playable);
            st.log.push(message.clone());
            released
        };
        if let Some(path) = released {
            log::debug!("pipeline: released {}", path.display());
            self.emit(PipelineEvent::MediaReleased(path));
        }
        self.emit(PipelineEvent::MessageAppended(message));
    }

    fn finish_turn(&self) {
        lock_state(&self.state).end_turn();
        self.emit(PipelineEvent::StageChanged(TurnStage::Idle));
        self.emit(PipelineEvent::LoadingChanged(false));
    }

    // -----------------------------------------------------------------------
    // Outside the turn
    // -----------------------------------------------------------------------

    fn greet(&self) {
        let greeting = self.settings.greeting.trim();
        let message = {
            let mut st = lock_state(&self.state);
            if !st.log.is_empty() || greeting.is_empty() {
                return;
            }
            let message = ChatMessage::ai(greeting);
            st.log.push(message.clone());
            message
        };
        self.emit(PipelineEvent::MessageAppended(message));
    }

    fn capture_started(&self) {
        let accepted = {
            let mut st = lock_state(&self.state);
            let idle = !st.is_loading();
            if idle {
                st.stage = TurnStage::Capturing;
            }
            idle
        };
        if accepted {
            self.emit(PipelineEvent::StageChanged(TurnStage::Capturing));
        }
    }

    fn capture_failed(&self, error: TurnError) {
        log::warn!("pipeline: capture failed: {error}");
        self.append(ChatMessage::error(error.to_string()));

        let reset = {
            let mut st = lock_state(&self.state);
            let idle = !st.is_loading();
            if idle {
                st.stage = TurnStage::Idle;
            }
            idle
        };
        if reset {
            self.emit(PipelineEvent::StageChanged(TurnStage::Idle));
        }
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn emit(&self, event: PipelineEvent) {
        self.observer.on_event(event);
    }

    fn append(&self, message: ChatMessage) {
        lock_state(&self.state).log.push(message.clone());
        self.emit(PipelineEvent::MessageAppended(message));
    }

    fn set_stage(&self, stage: TurnStage) {
        lock_state(&self.state).stage = stage;
        log::debug!("pipeline: → {stage:?}");
        self.emit(PipelineEvent::StageChanged(stage));
    }

    fn report_latency(&self, stage: LatencyStage, started: Instant) {
        let elapsed = started.elapsed();
        log::info!("pipeline: {} took {} ms", stage.label(), elapsed.as_millis());
        self.emit(PipelineEvent::Latency { stage, elapsed });
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
