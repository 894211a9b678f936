//! Pipeline commands (UI → pipeline) and events (pipeline → observers).
//!
//! The pipeline never touches the window.  Everything it does is reported
//! through a [`PipelineObserver`]; the egui app drains a [`ChannelObserver`]
//! each frame, tests use `RecordingObserver`.

use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::media::MediaBlob;

use super::runner::TurnError;
use super::state::{ChatMessage, TurnStage};

// ---------------------------------------------------------------------------
// PipelineCommand
// ---------------------------------------------------------------------------

/// Requests sent from the UI thread to the pipeline.
#[derive(Debug)]
pub enum PipelineCommand {
    /// The chat window was opened; shows the greeting once.
    Open,
    /// The user sent typed text.
    SubmitText(String),
    /// The user finished a recording.
    SubmitAudio(MediaBlob),
    /// The microphone is live.
    CaptureStarted,
    /// The recording could not be started or produced nothing usable.
    CaptureFailed(TurnError),
}

// ---------------------------------------------------------------------------
// PipelineEvent
// ---------------------------------------------------------------------------

/// Backend round trips whose duration is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LatencyStage {
    Transcription,
    Synthesis,
    Avatar,
}

impl LatencyStage {
    pub fn label(&self) -> &'static str {
        match self {
            LatencyStage::Transcription => "STT",
            LatencyStage::Synthesis => "TTS",
            LatencyStage::Avatar => "Avatar",
        }
    }
}

/// Everything observers are told about.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    MessageAppended(ChatMessage),
    StageChanged(TurnStage),
    LoadingChanged(bool),
    Latency { stage: LatencyStage, elapsed: Duration },
    /// A playable file was deleted; views holding its path must drop it.
    MediaReleased(PathBuf),
    /// Result of the startup `GET /status` probe.
    BackendStatus(bool),
}

// ---------------------------------------------------------------------------
// PipelineObserver
// ---------------------------------------------------------------------------

/// Receives pipeline events.  Called from tokio worker threads.
pub trait PipelineObserver: Send + Sync {
    fn on_event(&self, event: PipelineEvent);
}

/// Forwards events over an unbounded channel; the receiver is polled with
/// `try_recv` from the UI thread.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<PipelineEvent>,
}

impl ChannelObserver {
    pub fn new(tx: mpsc::UnboundedSender<PipelineEvent>) -> Self {
        Self { tx }
    }

    pub fn channel() -> (Self, mpsc::UnboundedReceiver<PipelineEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }
}

impl PipelineObserver for ChannelObserver {
    fn on_event(&self, event: PipelineEvent) {
        // Receiver gone means the window closed; nothing left to notify.
        if self.tx.send(event).is_err() {
            log::trace!("pipeline event dropped: receiver closed");
        }
    }
}

/// Keeps every event in memory.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: std::sync::Mutex<Vec<PipelineEvent>>,
}

#[cfg(test)]
impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<PipelineEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Only the appended messages, in order.
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                PipelineEvent::MessageAppended(m) => Some(m),
                _ => None,
            })
            .collect()
    }

    /// Only the stage transitions, in order.
    pub fn stages(&self) -> Vec<TurnStage> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                PipelineEvent::StageChanged(s) => Some(s),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
impl PipelineObserver for RecordingObserver {
    fn on_event(&self, event: PipelineEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
