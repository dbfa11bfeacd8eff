//! HTTP and WebSocket surface for the telephony provider

mod audio;
mod handlers;
mod markup;
mod stream;
mod types;

pub use handlers::create_router;

use crate::config::{Config, VoiceConfig};
use crate::runtime::TurnController;
use axum::http::{header, HeaderMap};
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<TurnController>,
    pub voice: Arc<VoiceConfig>,
    pub public_base_url: Option<Arc<str>>,
    pub audio_buffer_bytes: usize,
}

impl AppState {
    pub fn new(controller: Arc<TurnController>, config: &Config) -> Self {
        Self {
            controller,
            voice: Arc::new(config.voice.clone()),
            public_base_url: config.public_base_url.as_deref().map(Arc::from),
            audio_buffer_bytes: config.audio_buffer_bytes,
        }
    }

    /// Base for callback URLs: configured, else derived from the Host header
    pub fn base_url(&self, headers: &HeaderMap) -> Option<String> {
        if let Some(base) = &self.public_base_url {
            return Some(base.to_string());
        }
        headers
            .get(header::HOST)
            .and_then(|host| host.to_str().ok())
            .map(|host| format!("https://{host}"))
    }
}
