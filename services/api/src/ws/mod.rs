//! WebSocket Session Management
//!
//! This module contains the logic for relaying a live conversation between a
//! browser and Gemini Live:
//!
//! - `protocol`: The events and outgoing messages exchanged inside a session.
//! - `session`: Manages the browser connection lifecycle and its I/O tasks.
//! - `proxy`: The per-session forwarding and interrupt logic.

pub mod protocol;
pub mod proxy;
pub mod session;

pub use session::ws_handler;
