//! Application entry point for Avatar Chat.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Load [`AppConfig`] from disk (returns default on first run).
//! 3. Create [`tokio`] runtime (multi-thread, 2 workers).
//! 4. Open the session store, resolve the session id and build the HTTP
//!    backend client.
//! 5. Probe `GET /status` in the background.
//! 6. Spawn the pipeline on the tokio runtime.
//! 7. Run [`eframe::run_native`], which blocks the main thread until the window
//!    is closed.
//! 8. Close the command channel and let the pipeline release its media.

use std::sync::Arc;
use std::time::Duration;

use avatar_chat::{
    app::ChatApp,
    audio::CpalAudioOutput,
    backend::{AvatarBackend, HttpBackend},
    config::{AppConfig, AppPaths},
    pipeline::{
        new_shared_state, ChannelObserver, Pipeline, PipelineCommand, PipelineEvent,
        PipelineObserver, PipelineSettings,
    },
    session::{FileSessionStore, SessionManager},
};
use tokio::sync::mpsc;

use eframe::egui;

/// How long the pipeline gets to finish a running turn after the window closes.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Native options builder
// ---------------------------------------------------------------------------

fn native_options(config: &AppConfig) -> eframe::NativeOptions {
    let (width, height) = config.ui.window_size;
    let mut vp = egui::ViewportBuilder::default()
        .with_title(config.widget.title.clone())
        .with_inner_size([width, height])
        .with_min_inner_size([280.0, 320.0]);

    if config.ui.always_on_top {
        vp = vp.with_always_on_top();
    }

    if let Some((x, y)) = config.ui.window_position {
        vp = vp.with_position(egui::pos2(x, y));
    }

    eframe::NativeOptions {
        viewport: vp,
        ..Default::default()
    }
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

fn main() -> eframe::Result<()> {
    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("Avatar Chat starting up");

    // 2. Configuration
    let config = AppConfig::load().unwrap_or_else(|e| {
        log::warn!("Failed to load config ({e}); using defaults");
        AppConfig::default()
    });

    // 3. Tokio runtime (2 worker threads: one turn plus the status probe)
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("failed to create tokio runtime");

    // 4. Session store + backend client
    let paths = AppPaths::new();
    let store = Arc::new(FileSessionStore::new(&paths.session_file));
    log::info!("Session store: {}", store.path().display());
    let session = Arc::new(SessionManager::new(store, config.widget.session_key.clone()));
    // Touch the store here, off the runtime; turns then read the cached id.
    let session_id = session.session_id();
    log::debug!("Session id: {session_id}");
    let backend = Arc::new(HttpBackend::from_config(&config.backend));
    log::info!("Backend: {}", backend.base_url());

    // 5. Channel setup
    let (command_tx, command_rx) = mpsc::channel::<PipelineCommand>(16);
    let (observer, event_rx) = ChannelObserver::channel();

    {
        let backend = Arc::clone(&backend);
        let observer = observer.clone();
        rt.spawn(async move {
            let online = match backend.status().await {
                Ok(()) => true,
                Err(e) => {
                    log::warn!("Backend status check failed: {e}");
                    false
                }
            };
            observer.on_event(PipelineEvent::BackendStatus(online));
        });
    }

    // 6. Pipeline
    let backend: Arc<dyn AvatarBackend> = backend;
    let pipeline = Pipeline::new(
        new_shared_state(),
        backend,
        Arc::new(CpalAudioOutput::new()),
        Arc::new(observer),
        session,
        PipelineSettings::from_config(&config),
    );
    let pipeline_task = rt.spawn(pipeline.run(command_rx));

    // 7. Build the egui app and run it (blocks until the window is closed)
    let title = config.widget.title.clone();
    let options = native_options(&config);
    let app = ChatApp::new(config, command_tx, event_rx);

    let result = eframe::run_native(&title, options, Box::new(move |_cc| Ok(Box::new(app))));

    // 8. The app (and its command sender) is gone; wait for the pipeline to
    //    drain so the last video file is deleted.
    match rt.block_on(tokio::time::timeout(SHUTDOWN_GRACE, pipeline_task)) {
        Ok(Ok(())) => log::info!("Pipeline stopped"),
        Ok(Err(e)) => log::error!("Pipeline task failed: {e}"),
        Err(_) => log::warn!("Pipeline did not stop within {SHUTDOWN_GRACE:?}"),
    }

    result
}
