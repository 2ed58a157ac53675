//! Core types for the Gemini Live relay.
//!
//! - `frame`: the browser ⇄ relay frame vocabulary and the decode step.
//! - `session`: the per-session interrupt state machine.
//! - `playback`: the Playback Controller contract and an in-memory buffer.
//! - `capture`: chunking of recorder output into self-contained audio frames.
//! - `client`: a client-side transport adapter speaking the relay protocol.

pub mod capture;
pub mod client;
pub mod frame;
pub mod playback;
pub mod session;

pub use client::{ClientEvent, Controls, RelayClient};
pub use frame::{AudioBlob, AudioChunk, ClientFrame, Inbound, ServerEvent, ServerFrame, decode_text};
pub use playback::{PlaybackBuffer, PlaybackController};
pub use session::{SessionMachine, SessionState};
