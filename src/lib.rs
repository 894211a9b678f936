//! Desktop chat client for a talking-avatar backend.
//!
//! Speak or type; the backend transcribes, speaks the reply and renders an
//! avatar video of it.

pub mod app;
pub mod audio;
pub mod backend;
pub mod config;
pub mod media;
pub mod pipeline;
pub mod session;
