//! Chat pipeline: turns user input into a transcript, speech and an avatar
//! video, and reports every step to an observer.
//!
//! # Architecture
//!
//! ```text
//! UI thread                               tokio runtime
//! ─────────                               ─────────────
//! Recorder ─▶ PipelineCommand (mpsc) ───▶ Pipeline::run()
//!                                           ├─ Open        → greeting
//!                                           ├─ Submit*     → JoinSet turn task
//!                                           └─ Capture*    → stage / error
//!
//! ChatApp ◀── PipelineEvent (mpsc) ◀───── ChannelObserver
//!
//! SharedState (Arc<Mutex<ChatState>>) ←── log, loading gate, current video
//! ```

pub mod events;
pub mod reply;
pub mod runner;
pub mod state;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use events::{
    ChannelObserver, LatencyStage, PipelineCommand, PipelineEvent, PipelineObserver,
};
pub use reply::{compose_reply, Reply};
pub use runner::{validate_recording, Pipeline, PipelineSettings, TurnError, TurnInput};
pub use state::{
    lock_state, new_shared_state, ChatMessage, ChatState, MessageLog, Role, SharedState,
    TurnStage, VideoRef,
};
