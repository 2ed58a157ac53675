//! Gemini Live upstream client.
//!
//! This crate owns a single real-time WebSocket connection to the speech model
//! provider. It performs the one-time setup handshake and exposes send/receive
//! primitives to whoever owns the connection:
//!
//! - `setup`: the setup message sent once per session.
//! - `session`: [`LiveSession`], the connection owner.
//!
//! The [`UpstreamClient`] trait is the seam the relay proxy programs against, so
//! the proxy can be driven by a scripted upstream in tests.

pub mod session;
pub mod setup;

use async_trait::async_trait;
use bytes::Bytes;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{self, Message};

pub use session::{DEFAULT_ENDPOINT, LiveConfig, LiveSession, install_crypto_provider};
pub use setup::SetupMessage;

/// Lifecycle of the transport-level connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Unconnected,
    Connecting,
    Open,
    Closed,
}

/// Errors raised while establishing or using the upstream connection.
#[derive(Debug, thiserror::Error)]
pub enum LiveError {
    #[error("invalid upstream endpoint: {0}")]
    Endpoint(#[from] url::ParseError),
    #[error("upstream transport error: {0}")]
    Transport(#[from] tungstenite::Error),
    #[error("failed to read system instructions from {path}: {source}")]
    Instructions {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize upstream frame: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// A frame headed to the provider.
///
/// `Text` and `Binary` are already in wire representation and pass through
/// unchanged; `Json` is serialized on send.
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamFrame {
    Text(String),
    Binary(Bytes),
    Json(serde_json::Value),
}

impl UpstreamFrame {
    /// Builds a structured frame from any serializable value.
    pub fn json<T: serde::Serialize>(value: &T) -> Result<Self, LiveError> {
        Ok(Self::Json(serde_json::to_value(value)?))
    }

    pub(crate) fn into_message(self) -> Result<Message, LiveError> {
        Ok(match self {
            Self::Text(text) => Message::Text(text.into()),
            Self::Binary(data) => Message::Binary(data),
            Self::Json(value) => Message::Text(serde_json::to_string(&value)?.into()),
        })
    }
}

/// Something observed on the upstream connection.
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamEvent {
    Text(String),
    Binary(Bytes),
    /// The transport failed; no further events follow.
    Error(String),
    /// The provider closed the connection or the stream ended.
    Closed { reason: Option<String> },
}

/// Receiving half of the upstream event subscription.
pub type UpstreamEvents = mpsc::Receiver<UpstreamEvent>;

/// The operations a session proxy needs from its upstream connection.
#[async_trait]
pub trait UpstreamClient: Send {
    /// Opens the connection and sends the setup message.
    ///
    /// Returns `Ok(None)` when the client already has (or had) a connection,
    /// in which case nothing happens.
    async fn connect(&mut self) -> Result<Option<UpstreamEvents>, LiveError>;

    /// Sends a frame if the connection is open.
    ///
    /// Returns `Ok(false)` when the frame was dropped because the connection is
    /// not open. Dropped frames are never delivered later.
    async fn send(&mut self, frame: UpstreamFrame) -> Result<bool, LiveError>;

    /// Best-effort close. Safe to call repeatedly.
    async fn close(&mut self);

    fn state(&self) -> ConnectionState;
}
