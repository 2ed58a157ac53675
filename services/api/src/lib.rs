//! Gemini Live Relay Library Crate
//!
//! This library contains the server side of the relay: configuration, the
//! application state, routing, and the WebSocket session proxy that pairs each
//! browser connection with its own upstream Gemini Live connection. The
//! `relay` binary is a thin wrapper around this library.

pub mod config;
pub mod router;
pub mod state;
pub mod ws;
