//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds the configuration
//! every session needs to open its own upstream connection.

use crate::config::Config;
use gemini_realtime::{LiveConfig, LiveSession};
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// Upstream settings for a new session. The credential never leaves the server.
    pub fn live_config(&self) -> LiveConfig {
        LiveConfig {
            endpoint: self.config.gemini_endpoint.clone(),
            credential: self.config.gemini_api_key.clone(),
            model: self.config.gemini_model.clone(),
            instructions_path: self.config.system_prompt_path.clone(),
        }
    }

    /// A fresh, unconnected upstream client for one session.
    pub fn new_live_session(&self) -> LiveSession {
        LiveSession::new(self.live_config())
    }
}
