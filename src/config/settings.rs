//! Application settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files and shared across threads.
//! Every field is optional in the file: missing keys take their defaults.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::AppPaths;

// ---------------------------------------------------------------------------
// SessionCarrier
// ---------------------------------------------------------------------------

/// How the session identifier travels with transcription and avatar
/// requests.
///
/// | Variant  | Wire form                          |
/// |----------|------------------------------------|
/// | `Query`  | `?session_id_query=<id>`           |
/// | `Header` | `session_id: <id>` request header  |
///
/// The speech endpoint always receives `?session_id=<id>`; with `Header`
/// the header is attached as well.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionCarrier {
    Query,
    Header,
}

impl Default for SessionCarrier {
    fn default() -> Self {
        Self::Query
    }
}

// ---------------------------------------------------------------------------
// ReplyMode
// ---------------------------------------------------------------------------

/// What the assistant says back after a user message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplyMode {
    /// Speak the user's own text; no assistant bubble is added.
    Direct,
    /// Add an assistant bubble `"You said: <text>"` and speak that.
    Echo,
}

impl Default for ReplyMode {
    fn default() -> Self {
        Self::Direct
    }
}

// ---------------------------------------------------------------------------
// MicMode
// ---------------------------------------------------------------------------

/// How the microphone button starts and stops a recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MicMode {
    /// Record while the button is held down.
    Hold,
    /// First click starts, second click stops.
    Toggle,
}

impl Default for MicMode {
    fn default() -> Self {
        Self::Toggle
    }
}

// ---------------------------------------------------------------------------
// BackendConfig
// ---------------------------------------------------------------------------

/// Where the transcription / speech / avatar backend lives and how to talk
/// to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL without a trailing slash, e.g. `http://localhost:8000`.
    pub url: String,
    /// Where the session id is placed on transcription / avatar requests.
    pub session_carrier: SessionCarrier,
    /// Multipart field name for the uploaded recording (`audio` or `file`).
    pub audio_field: String,
    /// Per-request timeout.  Avatar rendering is slow, keep this generous.
    pub timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8000".into(),
            session_carrier: SessionCarrier::default(),
            audio_field: "audio".into(),
            timeout_secs: 60,
        }
    }
}

// ---------------------------------------------------------------------------
// ThemeConfig
// ---------------------------------------------------------------------------

/// Widget colours as CSS-style hex strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThemeConfig {
    pub primary: String,
    pub background: String,
}

impl Default for ThemeConfig {
    fn default() -> Self {
        Self {
            primary: "#4f46e5".into(),
            background: "#ffffff".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// WidgetConfig
// ---------------------------------------------------------------------------

/// Chat widget behaviour and appearance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WidgetConfig {
    /// Avatar image sent to `/generate-avatar`: an `http(s)` URL or a local
    /// file path.  Empty disables the image part.
    pub avatar_image: String,
    /// First assistant message shown when the chat opens.
    pub greeting: String,
    /// Key under which the session identifier is persisted.
    pub session_key: String,
    pub reply_mode: ReplyMode,
    /// Header title of the chat window.
    pub title: String,
    pub theme: ThemeConfig,
}

impl Default for WidgetConfig {
    fn default() -> Self {
        Self {
            avatar_image: "https://ui-avatars.com/api/?name=AI".into(),
            greeting: "Hi! How can I help you today?".into(),
            session_key: "ai_avatar_session".into(),
            reply_mode: ReplyMode::default(),
            title: "AI Assistant".into(),
            theme: ThemeConfig::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// AudioConfig
// ---------------------------------------------------------------------------

/// Settings for microphone capture.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Encoded recordings smaller than this are rejected before upload.
    pub min_recording_bytes: usize,
    /// Recordings shorter than this are rejected before upload.
    pub min_recording_secs: f32,
    /// Capture stops accumulating after this many seconds.
    pub max_recording_secs: f32,
    pub mic_mode: MicMode,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            min_recording_bytes: 1_000,
            min_recording_secs: 0.5,
            max_recording_secs: 60.0,
            mic_mode: MicMode::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// UiConfig
// ---------------------------------------------------------------------------

/// eframe window settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    /// Last saved window position `(x, y)` in screen pixels.  `None` lets the
    /// window manager pick.
    pub window_position: Option<(f32, f32)>,
    pub always_on_top: bool,
    /// Initial inner size `(width, height)`.
    pub window_size: (f32, f32),
    /// Open each new avatar video in the system player as soon as it arrives.
    pub autoplay_video: bool,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            window_position: None,
            always_on_top: false,
            window_size: (380.0, 560.0),
            autoplay_video: true,
        }
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level application configuration, serialised as `settings.toml`.
///
/// # Persistence
///
/// ```rust,no_run
/// use avatar_chat::config::AppConfig;
///
/// // Load (returns Default when file is missing)
/// let config = AppConfig::load().unwrap();
///
/// // Modify and save
/// // config.save().unwrap();
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub backend: BackendConfig,
    pub widget: WidgetConfig,
    pub audio: AudioConfig,
    pub ui: UiConfig,
}

impl AppConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(AppConfig::default())` when the file does not exist yet
    /// (first-run scenario) so callers never need to special-case a missing
    /// file.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path (useful for tests).
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the platform-appropriate `settings.toml`,
    /// creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Save to an explicit path (useful for tests).
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
