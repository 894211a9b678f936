//! Turn stages, chat messages and the shared chat state.
//!
//! [`TurnStage`] tracks where the current turn is.  [`ChatState`] is the
//! single source of truth for the message log, the loading gate and the
//! playable video currently on screen.
//!
//! [`SharedState`] is a type alias for `Arc<Mutex<ChatState>>`; lock it for a
//! short critical section and never across `.await`.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::media::PlayableMedia;

// ---------------------------------------------------------------------------
// TurnStage
// ---------------------------------------------------------------------------

/// Stages of one user turn.
///
/// ```text
/// Idle ─▶ Capturing ─▶ Transcribing ─▶ RenderedUser ─▶ Synthesizing
///      ─▶ PlayingAudio ─▶ GeneratingVideo ─▶ PlayingVideo ─▶ Idle
/// any network stage ──error──▶ Idle
/// ```
///
/// Typed input skips `Capturing` and `Transcribing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TurnStage {
    #[default]
    Idle,
    Capturing,
    Transcribing,
    RenderedUser,
    Synthesizing,
    PlayingAudio,
    GeneratingVideo,
    PlayingVideo,
}

impl TurnStage {
    /// `true` while a request is outstanding and new submissions are ignored.
    ///
    /// ```
    /// use avatar_chat::pipeline::TurnStage;
    ///
    /// assert!(!TurnStage::Idle.is_busy());
    /// assert!(!TurnStage::Capturing.is_busy());
    /// assert!(TurnStage::Transcribing.is_busy());
    /// assert!(TurnStage::GeneratingVideo.is_busy());
    /// assert!(!TurnStage::PlayingVideo.is_busy());
    /// ```
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            TurnStage::Transcribing
                | TurnStage::RenderedUser
                | TurnStage::Synthesizing
                | TurnStage::PlayingAudio
                | TurnStage::GeneratingVideo
        )
    }

    /// Short status line for the UI.
    pub fn label(&self) -> &'static str {
        match self {
            TurnStage::Idle => "Ready",
            TurnStage::Capturing => "Listening...",
            TurnStage::Transcribing => "Transcribing...",
            TurnStage::RenderedUser => "Thinking...",
            TurnStage::Synthesizing => "Synthesizing speech...",
            TurnStage::PlayingAudio => "Speaking...",
            TurnStage::GeneratingVideo => "Generating avatar video...",
            TurnStage::PlayingVideo => "Video ready",
        }
    }
}

// ---------------------------------------------------------------------------
// ChatMessage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Ai,
}

/// A rendered video: where its playable file lives and how big it is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoRef {
    pub path: PathBuf,
    pub mime: String,
    pub size: usize,
}

impl VideoRef {
    pub fn of(media: &PlayableMedia) -> Self {
        Self {
            path: media.path().to_path_buf(),
            mime: media.mime().to_string(),
            size: media.len(),
        }
    }

    /// `false` once the playable file has been released.
    pub fn is_available(&self) -> bool {
        self.path.exists()
    }
}

/// One entry in the chat log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatMessage {
    Text { role: Role, text: String },
    Error { text: String },
    Video { media: VideoRef },
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        ChatMessage::Text {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn ai(text: impl Into<String>) -> Self {
        ChatMessage::Text {
            role: Role::Ai,
            text: text.into(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        ChatMessage::Error { text: text.into() }
    }
}

// ---------------------------------------------------------------------------
// MessageLog
// ---------------------------------------------------------------------------

/// Ordered, append-only list of chat entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageLog {
    messages: Vec<ChatMessage>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ChatMessage> {
        self.messages.iter()
    }

    pub fn as_slice(&self) -> &[ChatMessage] {
        &self.messages
    }
}

impl<'a> IntoIterator for &'a MessageLog {
    type Item = &'a ChatMessage;
    type IntoIter = std::slice::Iter<'a, ChatMessage>;

    fn into_iter(self) -> Self::IntoIter {
        self.messages.iter()
    }
}

// ---------------------------------------------------------------------------
// ChatState
// ---------------------------------------------------------------------------

/// Everything the pipeline mutates during a turn.
#[derive(Debug, Default)]
pub struct ChatState {
    pub log: MessageLog,
    pub stage: TurnStage,
    is_loading: bool,
    current_video: Option<PlayableMedia>,
}

impl ChatState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    /// Claim the loading gate.  Returns `false` if a turn is already running.
    pub fn try_begin_turn(&mut self) -> bool {
        if self.is_loading {
            return false;
        }
        self.is_loading = true;
        true
    }

    /// Release the loading gate and return to `Idle`.
    pub fn end_turn(&mut self) {
        self.is_loading = false;
        self.stage = TurnStage::Idle;
    }

    /// Release the current playable video (if any) and install `next`.
    ///
    /// Returns the path of the released file so callers can report it.
    pub fn replace_video(&mut self, next: PlayableMedia) -> Option<PathBuf> {
        let released = self.current_video.take().map(PlayableMedia::release);
        self.current_video = Some(next);
        released
    }

    /// Release the current playable video without replacing it.
    pub fn release_video(&mut self) -> Option<PathBuf> {
        self.current_video.take().map(PlayableMedia::release)
    }

    pub fn current_video(&self) -> Option<&PlayableMedia> {
        self.current_video.as_ref()
    }
}

// ---------------------------------------------------------------------------
// SharedState
// ---------------------------------------------------------------------------

/// Thread-safe handle to [`ChatState`].
pub type SharedState = Arc<Mutex<ChatState>>;

pub fn new_shared_state() -> SharedState {
    Arc::new(Mutex::new(ChatState::new()))
}

/// Lock `state`, recovering the guard if a previous holder panicked.
pub fn lock_state(state: &SharedState) -> MutexGuard<'_, ChatState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::MediaBlob;
    use std::path::Path;

    fn video(dir: &Path, tag: &[u8]) -> PlayableMedia {
        PlayableMedia::create_in(dir, &MediaBlob::new(tag.to_vec(), "video/mp4")).unwrap()
    }

    #[test]
    fn idle_and_capturing_are_not_busy() {
        assert!(!TurnStage::Idle.is_busy());
        assert!(!TurnStage::Capturing.is_busy());
        assert!(TurnStage::Synthesizing.is_busy());
        assert!(TurnStage::PlayingAudio.is_busy());
    }

    #[test]
    fn labels_are_distinct() {
        let stages = [
            TurnStage::Idle,
            TurnStage::Capturing,
            TurnStage::Transcribing,
            TurnStage::RenderedUser,
            TurnStage::Synthesizing,
            TurnStage::PlayingAudio,
            TurnStage::GeneratingVideo,
            TurnStage::PlayingVideo,
        ];
        let mut labels: Vec<_> = stages.iter().map(TurnStage::label).collect();
        labels.sort_unstable();
        labels.dedup();
        assert_eq!(labels.len(), stages.len());
    }

    #[test]
    fn default_stage_is_idle() {
        assert_eq!(TurnStage::default(), TurnStage::Idle);
    }

    #[test]
    fn message_log_keeps_order() {
        let mut log = MessageLog::new();
        log.push(ChatMessage::ai("hi"));
        log.push(ChatMessage::user("hello"));
        log.push(ChatMessage::error("TTS failed."));

        assert_eq!(log.len(), 3);
        assert_eq!(log.as_slice()[0], ChatMessage::ai("hi"));
        assert_eq!(log.last(), Some(&ChatMessage::error("TTS failed.")));
        assert_eq!((&log).into_iter().count(), 3);
    }

    #[test]
    fn loading_gate_admits_one_turn() {
        let mut state = ChatState::new();
        assert!(state.try_begin_turn());
        assert!(!state.try_begin_turn());
        assert!(state.is_loading());

        state.stage = TurnStage::Synthesizing;
        state.end_turn();
        assert!(!state.is_loading());
        assert_eq!(state.stage, TurnStage::Idle);
        assert!(state.try_begin_turn());
    }

    #[test]
    fn replace_video_releases_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = ChatState::new();

        let first = video(dir.path(), b"one");
        let first_path = first.path().to_path_buf();
        assert!(state.replace_video(first).is_none());
        assert!(first_path.exists());

        let second = video(dir.path(), b"two");
        let second_ref = VideoRef::of(&second);
        let released = state.replace_video(second);

        assert_eq!(released.as_deref(), Some(first_path.as_path()));
        assert!(!first_path.exists());
        assert!(second_ref.is_available());
        assert_eq!(second_ref.size, 3);

        assert_eq!(state.release_video(), Some(second_ref.path.clone()));
        assert!(!second_ref.is_available());
        assert!(state.current_video().is_none());
    }

    #[test]
    fn poisoned_state_is_recovered() {
        let state = new_shared_state();
        let clone = Arc::clone(&state);
        let _ = std::thread::spawn(move || {
            let _guard = clone.lock().unwrap();
            panic!("poison");
        })
        .join();

        assert!(state.is_poisoned());
        lock_state(&state).log.push(ChatMessage::ai("still works"));
        assert_eq!(lock_state(&state).log.len(), 1);
    }

    #[test]
    fn shared_state_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SharedState>();
    }
}
