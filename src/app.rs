//! Avatar chat window: egui/eframe application.
//!
//! # Architecture
//!
//! [`ChatApp`] is the top-level [`eframe::App`].  It owns the microphone
//! [`Recorder`] (cpal streams stay on the UI thread) and two channel
//! endpoints:
//!
//! * `command_tx`: sends [`PipelineCommand`] to the pipeline.
//! * `event_rx`:   receives [`PipelineEvent`]s, drained every frame.
//!
//! The window is a classic chat layout: title bar with a backend status dot,
//! scrolling message list, and an input row with text field, Send and mic
//! buttons.  The footer shows the last turn's per-stage latency.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use eframe::egui;
use tokio::sync::mpsc;

use crate::audio::{CaptureError, Recorder};
use crate::config::{AppConfig, MicMode, ThemeConfig};
use crate::media::MediaBlob;
use crate::pipeline::{
    ChatMessage, LatencyStage, PipelineCommand, PipelineEvent, Role, TurnError, TurnStage,
    VideoRef,
};

// ---------------------------------------------------------------------------
// Theme
// ---------------------------------------------------------------------------

const DEFAULT_PRIMARY: egui::Color32 = egui::Color32::from_rgb(0x4f, 0x46, 0xe5);
const DEFAULT_BACKGROUND: egui::Color32 = egui::Color32::WHITE;

/// Parse `#rgb` or `#rrggbb` (the `#` is optional).
pub fn parse_hex_color(value: &str) -> Option<egui::Color32> {
    let hex = value.trim().trim_start_matches('#');
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let channel = |s: &str| u8::from_str_radix(s, 16).ok();
    match hex.len() {
        3 => {
            let mut rgb = [0u8; 3];
            for (i, c) in hex.chars().enumerate() {
                let v = channel(&c.to_string())?;
                rgb[i] = v * 17;
            }
            Some(egui::Color32::from_rgb(rgb[0], rgb[1], rgb[2]))
        }
        6 => Some(egui::Color32::from_rgb(
            channel(&hex[0..2])?,
            channel(&hex[2..4])?,
            channel(&hex[4..6])?,
        )),
        _ => None,
    }
}

/// Resolved window colours.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Theme {
    pub primary: egui::Color32,
    pub background: egui::Color32,
}

impl Theme {
    pub fn from_config(config: &ThemeConfig) -> Self {
        Self {
            primary: color_or(&config.primary, DEFAULT_PRIMARY, "primary"),
            background: color_or(&config.background, DEFAULT_BACKGROUND, "background"),
        }
    }

    /// Text colour readable on top of `primary`.
    pub fn on_primary(&self) -> egui::Color32 {
        contrast_text(self.primary)
    }

    /// Text colour readable on top of `background`.
    pub fn on_background(&self) -> egui::Color32 {
        contrast_text(self.background)
    }

    /// Bubble fill for AI messages: the background nudged towards grey.
    pub fn ai_bubble(&self) -> egui::Color32 {
        let [r, g, b, _] = self.background.to_array();
        let mix = |c: u8| ((c as u16 * 9 + 0x80) / 10) as u8;
        egui::Color32::from_rgb(mix(r), mix(g), mix(b))
    }
}

fn color_or(value: &str, fallback: egui::Color32, name: &str) -> egui::Color32 {
    parse_hex_color(value).unwrap_or_else(|| {
        log::warn!("theme: invalid {name} colour {value:?}; using default");
        fallback
    })
}

fn contrast_text(fill: egui::Color32) -> egui::Color32 {
    let [r, g, b, _] = fill.to_array();
    let luma = 0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32;
    if luma > 150.0 {
        egui::Color32::from_rgb(30, 30, 30)
    } else {
        egui::Color32::WHITE
    }
}

const ERROR_COLOR: egui::Color32 = egui::Color32::from_rgb(220, 38, 38);

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// `850 ms` below one second, `2.3 s` above.
pub fn format_latency(elapsed: Duration) -> String {
    let ms = elapsed.as_millis();
    if ms < 1_000 {
        format!("{ms} ms")
    } else {
        format!("{:.1} s", elapsed.as_secs_f32())
    }
}

/// Hand a file to the platform's default player.
fn open_in_player(path: &Path) -> std::io::Result<()> {
    #[cfg(target_os = "macos")]
    let mut command = std::process::Command::new("open");

    #[cfg(target_os = "windows")]
    let mut command = {
        let mut c = std::process::Command::new("cmd");
        c.args(["/C", "start", ""]);
        c
    };

    #[cfg(all(unix, not(target_os = "macos")))]
    let mut command = std::process::Command::new("xdg-open");

    command.arg(path).spawn().map(|_| ())
}

// ---------------------------------------------------------------------------
// Mic button
// ---------------------------------------------------------------------------

/// What the mic button asks for in one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MicAction {
    Nothing,
    Start,
    Stop,
}

/// Mic button and recorder state for one frame.
#[derive(Debug, Clone, Copy, Default)]
struct MicInput {
    clicked: bool,
    held: bool,
    /// `held` from the previous frame.
    was_held: bool,
    recording: bool,
}

fn mic_action(mode: MicMode, input: MicInput) -> MicAction {
    match mode {
        MicMode::Toggle if input.clicked && input.recording => MicAction::Stop,
        MicMode::Toggle if input.clicked => MicAction::Start,
        MicMode::Toggle => MicAction::Nothing,
        // One start per press: a failed start is not retried while the
        // button stays down.
        MicMode::Hold if input.held && !input.was_held && !input.recording => MicAction::Start,
        MicMode::Hold if !input.held && input.recording => MicAction::Stop,
        MicMode::Hold => MicAction::Nothing,
    }
}

// ---------------------------------------------------------------------------
// ChatApp
// ---------------------------------------------------------------------------

/// eframe application for the avatar chat window.
pub struct ChatApp {
    // ── Mirrored pipeline state ──────────────────────────────────────────
    messages: Vec<ChatMessage>,
    stage: TurnStage,
    is_loading: bool,
    latencies: BTreeMap<LatencyStage, Duration>,
    /// Playable files the pipeline has deleted.
    released: HashSet<PathBuf>,
    /// `None` until the startup status probe reports.
    backend_online: Option<bool>,

    // ── UI state ─────────────────────────────────────────────────────────
    input: String,
    recorder: Recorder,
    mic_held: bool,
    /// Outer window position seen on the last frame.
    window_position: Option<(f32, f32)>,
    theme: Theme,
    spinner_phase: f32,
    scroll_to_bottom: bool,

    // ── Channels ─────────────────────────────────────────────────────────
    command_tx: mpsc::Sender<PipelineCommand>,
    event_rx: mpsc::UnboundedReceiver<PipelineEvent>,

    config: AppConfig,
}

impl ChatApp {
    /// Create the app and announce the open window to the pipeline, which
    /// answers with the greeting.
    pub fn new(
        config: AppConfig,
        command_tx: mpsc::Sender<PipelineCommand>,
        event_rx: mpsc::UnboundedReceiver<PipelineEvent>,
    ) -> Self {
        let app = Self {
            messages: Vec::new(),
            stage: TurnStage::Idle,
            is_loading: false,
            latencies: BTreeMap::new(),
            released: HashSet::new(),
            backend_online: None,
            input: String::new(),
            recorder: Recorder::from_config(&config.audio),
            mic_held: false,
            window_position: None,
            theme: Theme::from_config(&config.widget.theme),
            spinner_phase: 0.0,
            scroll_to_bottom: false,
            command_tx,
            event_rx,
            config,
        };
        app.send(PipelineCommand::Open);
        app
    }

    // ── Channel polling ──────────────────────────────────────────────────

    /// Drain all pending pipeline events (non-blocking).
    fn poll_events(&mut self) {
        while let Ok(event) = self.event_rx.try_recv() {
            match event {
                PipelineEvent::MessageAppended(message) => {
                    if let ChatMessage::Video { media } = &message {
                        if self.config.ui.autoplay_video {
                            self.play_video(media);
                        }
                    }
                    self.messages.push(message);
                    self.scroll_to_bottom = true;
                }
                PipelineEvent::StageChanged(stage) => self.stage = stage,
                PipelineEvent::LoadingChanged(loading) => {
                    if loading {
                        self.latencies.clear();
                    }
                    self.is_loading = loading;
                }
                PipelineEvent::Latency { stage, elapsed } => {
                    self.latencies.insert(stage, elapsed);
                }
                PipelineEvent::MediaReleased(path) => {
                    self.released.insert(path);
                }
                PipelineEvent::BackendStatus(online) => self.backend_online = Some(online),
            }
        }
    }

    fn send(&self, command: PipelineCommand) {
        if let Err(e) = self.command_tx.try_send(command) {
            log::warn!("ui: pipeline command dropped: {e}");
        }
    }

    // ── Input actions ────────────────────────────────────────────────────

    fn submit_text(&mut self) {
        let text = self.input.trim().to_string();
        if text.is_empty() || self.is_loading {
            return;
        }
        self.input.clear();
        self.send(PipelineCommand::SubmitText(text));
    }

    fn apply_mic_action(&mut self, action: MicAction) {
        match action {
            MicAction::Start => self.start_recording(),
            MicAction::Stop => self.stop_recording(),
            MicAction::Nothing => {}
        }
    }

    fn start_recording(&mut self) {
        if self.is_loading {
            return;
        }
        let started = self.recorder.start();
        self.report_capture_start(started);
    }

    fn stop_recording(&mut self) {
        let finished = self.recorder.stop();
        self.report_capture_stop(finished);
    }

    fn report_capture_start(&self, started: Result<bool, CaptureError>) {
        match started {
            Ok(true) => self.send(PipelineCommand::CaptureStarted),
            Ok(false) => {}
            Err(e) => {
                log::warn!("ui: microphone unavailable: {e}");
                self.send(PipelineCommand::CaptureFailed(TurnError::from(e)));
            }
        }
    }

    fn report_capture_stop(&self, finished: Option<Result<MediaBlob, CaptureError>>) {
        match finished {
            Some(Ok(audio)) => self.send(PipelineCommand::SubmitAudio(audio)),
            Some(Err(e)) => {
                log::info!("ui: recording rejected: {e}");
                self.send(PipelineCommand::CaptureFailed(TurnError::from(e)));
            }
            None => {}
        }
    }

    /// Copy the last seen window position into the config.  Returns `true`
    /// when it differs from what was loaded.
    fn remember_window_position(&mut self) -> bool {
        match self.window_position {
            Some(position) if self.config.ui.window_position != Some(position) => {
                self.config.ui.window_position = Some(position);
                true
            }
            _ => false,
        }
    }

    fn video_expired(&self, video: &VideoRef) -> bool {
        self.released.contains(&video.path) || !video.is_available()
    }

    fn play_video(&self, video: &VideoRef) {
        if self.video_expired(video) {
            return;
        }
        if let Err(e) = open_in_player(&video.path) {
            log::warn!("ui: cannot open {}: {e}", video.path.display());
        }
    }

    // ── Title bar ────────────────────────────────────────────────────────

    fn draw_title_bar(&self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            ui.label(
                egui::RichText::new(&self.config.widget.title)
                    .color(self.theme.on_primary())
                    .strong()
                    .size(15.0),
            );

            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                let (color, text) = match self.backend_online {
                    Some(true) => (egui::Color32::from_rgb(34, 197, 94), "online"),
                    Some(false) => (ERROR_COLOR, "offline"),
                    None => (egui::Color32::from_rgb(160, 160, 160), "checking"),
                };
                ui.label(
                    egui::RichText::new(text)
                        .color(self.theme.on_primary())
                        .size(11.0),
                );
                ui.label(egui::RichText::new("●").color(color).size(11.0));
            });
        });
    }

    // ── Message list ─────────────────────────────────────────────────────

    fn draw_messages(&mut self, ui: &mut egui::Ui) {
        let scroll_to_bottom = std::mem::take(&mut self.scroll_to_bottom);
        let mut open: Option<VideoRef> = None;

        egui::ScrollArea::vertical()
            .auto_shrink([false, false])
            .stick_to_bottom(true)
            .show(ui, |ui| {
                for message in &self.messages {
                    match message {
                        ChatMessage::Text { role: Role::User, text } => {
                            self.draw_bubble(ui, text, true);
                        }
                        ChatMessage::Text { role: Role::Ai, text } => {
                            self.draw_bubble(ui, text, false);
                        }
                        ChatMessage::Error { text } => {
                            ui.label(egui::RichText::new(text).color(ERROR_COLOR).size(12.0));
                        }
                        ChatMessage::Video { media } => {
                            if self.draw_video(ui, media) {
                                open = Some(media.clone());
                            }
                        }
                    }
                    ui.add_space(4.0);
                }

                if self.stage != TurnStage::Idle {
                    let status = if self.stage.is_busy() {
                        format!("{} {}", self.spinner_char(), self.stage.label())
                    } else {
                        self.stage.label().to_string()
                    };
                    ui.label(
                        egui::RichText::new(status)
                            .color(egui::Color32::from_rgb(120, 120, 120))
                            .italics()
                            .size(12.0),
                    );
                }

                if scroll_to_bottom {
                    ui.scroll_to_cursor(Some(egui::Align::BOTTOM));
                }
            });

        if let Some(video) = open {
            self.play_video(&video);
        }
    }

    fn draw_bubble(&self, ui: &mut egui::Ui, text: &str, from_user: bool) {
        let (fill, color, align) = if from_user {
            (self.theme.primary, self.theme.on_primary(), egui::Align::Max)
        } else {
            (self.theme.ai_bubble(), self.theme.on_background(), egui::Align::Min)
        };

        ui.with_layout(egui::Layout::top_down(align), |ui| {
            ui.set_max_width(ui.available_width() * 0.8);
            egui::Frame::new()
                .fill(fill)
                .corner_radius(egui::CornerRadius::same(10))
                .inner_margin(egui::Margin::symmetric(10, 6))
                .show(ui, |ui| {
                    ui.label(egui::RichText::new(text).color(color).size(13.0));
                });
        });
    }

    /// Returns `true` when the user asked to open the video.
    fn draw_video(&self, ui: &mut egui::Ui, video: &VideoRef) -> bool {
        let mut clicked = false;
        egui::Frame::new()
            .fill(self.theme.ai_bubble())
            .corner_radius(egui::CornerRadius::same(10))
            .inner_margin(egui::Margin::symmetric(10, 6))
            .show(ui, |ui| {
                ui.horizontal(|ui| {
                    if self.video_expired(video) {
                        ui.label(
                            egui::RichText::new("🎬 Avatar video (expired)")
                                .color(egui::Color32::from_rgb(140, 140, 140))
                                .size(12.0),
                        );
                    } else {
                        ui.label(
                            egui::RichText::new(format!(
                                "🎬 Avatar video ({} KB)",
                                video.size.div_ceil(1024)
                            ))
                            .color(self.theme.on_background())
                            .size(12.0),
                        );
                        clicked = ui.button("▶ Play").clicked();
                    }
                });
            });
        clicked
    }

    // ── Input row / footer ───────────────────────────────────────────────

    fn draw_input_row(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            let enabled = !self.is_loading;
            let recording = self.recorder.is_recording();

            // Mic button (rightmost), then Send, then the text field fills the rest.
            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                let mic_label = if recording { "⏹" } else { "🎤" };
                let mic = ui.add_enabled(
                    enabled || recording,
                    egui::Button::new(egui::RichText::new(mic_label).size(16.0))
                        .fill(if recording { ERROR_COLOR } else { self.theme.primary }),
                );
                let held = mic.is_pointer_button_down_on();
                let action = mic_action(
                    self.config.audio.mic_mode,
                    MicInput {
                        clicked: mic.clicked(),
                        held,
                        was_held: self.mic_held,
                        recording,
                    },
                );
                self.mic_held = held;
                self.apply_mic_action(action);

                let send = ui.add_enabled(
                    enabled,
                    egui::Button::new(egui::RichText::new("Send").color(self.theme.on_primary()))
                        .fill(self.theme.primary),
                );

                let field = ui.add_enabled(
                    enabled,
                    egui::TextEdit::singleline(&mut self.input)
                        .hint_text("Type a message...")
                        .desired_width(f32::INFINITY),
                );
                let entered = field.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));

                if send.clicked() || entered {
                    self.submit_text();
                    field.request_focus();
                }
            });
        });
    }

    fn draw_footer(&self, ui: &mut egui::Ui) {
        let text = if let Some(elapsed) = self.recorder.elapsed() {
            format!("Recording {:.1}s", elapsed.as_secs_f32())
        } else if self.latencies.is_empty() {
            String::new()
        } else {
            self.latencies
                .iter()
                .map(|(stage, elapsed)| format!("{} {}", stage.label(), format_latency(*elapsed)))
                .collect::<Vec<_>>()
                .join(" · ")
        };
        ui.label(
            egui::RichText::new(text)
                .color(egui::Color32::from_rgb(130, 130, 130))
                .size(10.0),
        );
    }

    // ── Helpers ───────────────────────────────────────────────────────────

    /// A simple rotating ASCII spinner character driven by `spinner_phase`.
    fn spinner_char(&self) -> char {
        let chars = ['|', '/', '-', '\\'];
        let idx = (self.spinner_phase as usize) % chars.len();
        chars[idx]
    }
}

// ---------------------------------------------------------------------------
// eframe::App impl
// ---------------------------------------------------------------------------

impl eframe::App for ChatApp {
    /// Called every frame by eframe.  Polls the event channel, advances the
    /// spinner, then renders the window.
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.poll_events();

        if let Some(outer_rect) = ctx.input(|i| i.viewport().outer_rect) {
            self.window_position = Some((outer_rect.min.x, outer_rect.min.y));
        }

        self.spinner_phase += 0.08;
        if self.spinner_phase >= 4.0 {
            self.spinner_phase = 0.0;
        }

        // Events arrive from other threads and do not wake the UI by
        // themselves, so keep polling: fast while animating, slow otherwise.
        if self.is_loading || self.recorder.is_recording() {
            ctx.request_repaint_after(Duration::from_millis(66));
        } else {
            ctx.request_repaint_after(Duration::from_millis(250));
        }

        egui::TopBottomPanel::top("title")
            .frame(
                egui::Frame::new()
                    .fill(self.theme.primary)
                    .inner_margin(egui::Margin::same(8)),
            )
            .show(ctx, |ui| self.draw_title_bar(ui));

        egui::TopBottomPanel::bottom("input")
            .frame(
                egui::Frame::new()
                    .fill(self.theme.background)
                    .inner_margin(egui::Margin::same(8)),
            )
            .show(ctx, |ui| {
                self.draw_input_row(ui);
                self.draw_footer(ui);
            });

        egui::CentralPanel::default()
            .frame(
                egui::Frame::new()
                    .fill(self.theme.background)
                    .inner_margin(egui::Margin::same(8)),
            )
            .show(ctx, |ui| self.draw_messages(ui));
    }

    /// Release the microphone if the window closes mid-recording and keep
    /// the window where the user left it.
    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        self.recorder.cancel();
        if self.remember_window_position() {
            if let Err(e) = self.config.save() {
                log::warn!("ui: could not save window position: {e}");
            }
        }
        log::info!("avatar chat window closing");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn app() -> (
        ChatApp,
        mpsc::Receiver<PipelineCommand>,
        mpsc::UnboundedSender<PipelineEvent>,
    ) {
        let mut config = AppConfig::default();
        config.ui.autoplay_video = false;
        let (command_tx, command_rx) = mpsc::channel(8);
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        (ChatApp::new(config, command_tx, event_rx), command_rx, event_tx)
    }

    #[test]
    fn parse_six_digit_hex() {
        assert_eq!(
            parse_hex_color("#4f46e5"),
            Some(egui::Color32::from_rgb(0x4f, 0x46, 0xe5))
        );
        assert_eq!(
            parse_hex_color("FFFFFF"),
            Some(egui::Color32::from_rgb(255, 255, 255))
        );
    }

    #[test]
    fn parse_three_digit_hex() {
        assert_eq!(
            parse_hex_color("#f0a"),
            Some(egui::Color32::from_rgb(0xff, 0x00, 0xaa))
        );
    }

    #[test]
    fn parse_rejects_garbage() {
        assert_eq!(parse_hex_color("blue"), None);
        assert_eq!(parse_hex_color("#12345"), None);
        assert_eq!(parse_hex_color("#gggggg"), None);
        assert_eq!(parse_hex_color(""), None);
    }

    #[test]
    fn theme_falls_back_on_invalid_colours() {
        let theme = Theme::from_config(&ThemeConfig {
            primary: "not-a-colour".into(),
            background: "#000".into(),
        });
        assert_eq!(theme.primary, DEFAULT_PRIMARY);
        assert_eq!(theme.background, egui::Color32::from_rgb(0, 0, 0));
        assert_eq!(theme.on_background(), egui::Color32::WHITE);
    }

    #[test]
    fn contrast_text_picks_readable_colour() {
        assert_eq!(contrast_text(egui::Color32::WHITE), egui::Color32::from_rgb(30, 30, 30));
        assert_eq!(contrast_text(DEFAULT_PRIMARY), egui::Color32::WHITE);
    }

    #[test]
    fn latency_formatting() {
        assert_eq!(format_latency(Duration::from_millis(850)), "850 ms");
        assert_eq!(format_latency(Duration::from_millis(2_340)), "2.3 s");
    }

    #[test]
    fn new_app_requests_greeting() {
        let (_app, mut commands, _events) = app();
        assert!(matches!(commands.try_recv(), Ok(PipelineCommand::Open)));
    }

    #[test]
    fn events_update_mirrored_state() {
        let (mut app, _commands, events) = app();
        let video = VideoRef {
            path: PathBuf::from("/tmp/avatar-chat-test.mp4"),
            mime: "video/mp4".into(),
            size: 2048,
        };

        events.send(PipelineEvent::LoadingChanged(true)).unwrap();
        events
            .send(PipelineEvent::StageChanged(TurnStage::Synthesizing))
            .unwrap();
        events
            .send(PipelineEvent::MessageAppended(ChatMessage::user("hi")))
            .unwrap();
        events
            .send(PipelineEvent::Latency {
                stage: LatencyStage::Synthesis,
                elapsed: Duration::from_millis(300),
            })
            .unwrap();
        events
            .send(PipelineEvent::MessageAppended(ChatMessage::Video {
                media: video.clone(),
            }))
            .unwrap();
        events
            .send(PipelineEvent::MediaReleased(video.path.clone()))
            .unwrap();
        events.send(PipelineEvent::BackendStatus(true)).unwrap();

        app.poll_events();

        assert!(app.is_loading);
        assert_eq!(app.stage, TurnStage::Synthesizing);
        assert_eq!(app.messages.len(), 2);
        assert_eq!(
            app.latencies.get(&LatencyStage::Synthesis),
            Some(&Duration::from_millis(300))
        );
        assert!(app.released.contains(&video.path));
        assert_eq!(app.backend_online, Some(true));
        assert!(app.scroll_to_bottom);
    }

    #[test]
    fn new_turn_clears_latencies() {
        let (mut app, _commands, events) = app();
        events
            .send(PipelineEvent::Latency {
                stage: LatencyStage::Avatar,
                elapsed: Duration::from_secs(2),
            })
            .unwrap();
        app.poll_events();
        assert_eq!(app.latencies.len(), 1);

        events.send(PipelineEvent::LoadingChanged(true)).unwrap();
        app.poll_events();
        assert!(app.latencies.is_empty());
    }

    #[test]
    fn submit_text_sends_trimmed_and_clears_input() {
        let (mut app, mut commands, _events) = app();
        let _ = commands.try_recv(); // Open

        app.input = "  hello  ".into();
        app.submit_text();

        assert!(app.input.is_empty());
        match commands.try_recv() {
            Ok(PipelineCommand::SubmitText(text)) => assert_eq!(text, "hello"),
            other => panic!("expected SubmitText, got {other:?}"),
        }
    }

    fn hold(held: bool, was_held: bool, recording: bool) -> MicAction {
        mic_action(
            MicMode::Hold,
            MicInput {
                clicked: false,
                held,
                was_held,
                recording,
            },
        )
    }

    fn toggle(clicked: bool, recording: bool) -> MicAction {
        mic_action(
            MicMode::Toggle,
            MicInput {
                clicked,
                held: false,
                was_held: false,
                recording,
            },
        )
    }

    #[test]
    fn hold_starts_on_press_and_stops_on_release() {
        assert_eq!(hold(true, false, false), MicAction::Start);
        assert_eq!(hold(true, true, true), MicAction::Nothing);
        assert_eq!(hold(false, true, true), MicAction::Stop);
        assert_eq!(hold(false, false, false), MicAction::Nothing);
    }

    #[test]
    fn hold_does_not_retry_a_failed_start_while_held() {
        // First frame of the press starts; the recorder then stays idle
        // because the device refused.
        let mut starts = 0;
        let mut was_held = false;
        for _ in 0..10 {
            if hold(true, was_held, false) == MicAction::Start {
                starts += 1;
            }
            was_held = true;
        }
        assert_eq!(starts, 1);

        // Release, then a fresh press tries again.
        assert_eq!(hold(false, true, false), MicAction::Nothing);
        assert_eq!(hold(true, false, false), MicAction::Start);
    }

    #[test]
    fn toggle_flips_on_click() {
        assert_eq!(toggle(true, false), MicAction::Start);
        assert_eq!(toggle(true, true), MicAction::Stop);
        assert_eq!(toggle(false, true), MicAction::Nothing);
        assert_eq!(toggle(false, false), MicAction::Nothing);
    }

    #[test]
    fn refused_microphone_reports_permission_denied() {
        let (app, mut commands, _events) = app();
        let _ = commands.try_recv(); // Open

        app.report_capture_start(Err(CaptureError::NoDevice));
        assert!(matches!(
            commands.try_recv(),
            Ok(PipelineCommand::CaptureFailed(TurnError::PermissionDenied))
        ));

        app.report_capture_start(Ok(false));
        assert!(commands.try_recv().is_err());

        app.report_capture_start(Ok(true));
        assert!(matches!(
            commands.try_recv(),
            Ok(PipelineCommand::CaptureStarted)
        ));
    }

    #[test]
    fn rejected_recordings_become_capture_failures() {
        let (app, mut commands, _events) = app();
        let _ = commands.try_recv(); // Open

        app.report_capture_stop(Some(Err(CaptureError::TooShort {
            got_secs: 0.2,
            min_secs: 0.5,
        })));
        assert!(matches!(
            commands.try_recv(),
            Ok(PipelineCommand::CaptureFailed(TurnError::RecordingTooShort))
        ));

        app.report_capture_stop(Some(Err(CaptureError::Empty)));
        assert!(matches!(
            commands.try_recv(),
            Ok(PipelineCommand::CaptureFailed(TurnError::EmptyRecording))
        ));

        app.report_capture_stop(None);
        assert!(commands.try_recv().is_err());
    }

    #[test]
    fn finished_recording_is_submitted() {
        let (app, mut commands, _events) = app();
        let _ = commands.try_recv(); // Open

        let audio = MediaBlob::new(vec![0u8; 2048], "audio/wav");
        app.report_capture_stop(Some(Ok(audio.clone())));
        match commands.try_recv() {
            Ok(PipelineCommand::SubmitAudio(blob)) => assert_eq!(blob, audio),
            other => panic!("expected SubmitAudio, got {other:?}"),
        }
    }

    #[test]
    fn moved_window_position_is_remembered() {
        let (mut app, _commands, _events) = app();
        assert!(!app.remember_window_position());

        app.window_position = Some((120.0, 80.0));
        assert!(app.remember_window_position());
        assert_eq!(app.config.ui.window_position, Some((120.0, 80.0)));

        // Unchanged since the last save.
        assert!(!app.remember_window_position());
    }

    #[test]
    fn submit_text_blocked_while_loading() {
        let (mut app, mut commands, _events) = app();
        let _ = commands.try_recv(); // Open

        app.is_loading = true;
        app.input = "hello".into();
        app.submit_text();

        assert_eq!(app.input, "hello");
        assert!(commands.try_recv().is_err());
    }
}
