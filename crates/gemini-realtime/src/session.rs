//! Owns the lifecycle of one real-time connection to Gemini Live.

use crate::{
    ConnectionState, LiveError, SetupMessage, UpstreamClient, UpstreamEvent, UpstreamEvents,
    UpstreamFrame,
};
use async_trait::async_trait;
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use secrecy::{ExposeSecret, SecretString};
use std::path::PathBuf;
use tokio::{net::TcpStream, sync::mpsc, task::JoinHandle};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async, tungstenite::protocol::Message as WsMessage,
};
use tracing::{debug, error, info, warn};
use url::Url;

/// Default Gemini Live endpoint. The credential is appended as the `key` query parameter.
pub const DEFAULT_ENDPOINT: &str = "wss://generativelanguage.googleapis.com/v1beta/live:connect";

const EVENT_CHANNEL_CAPACITY: usize = 128;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Everything needed to open a session with the provider.
#[derive(Debug)]
pub struct LiveConfig {
    pub endpoint: String,
    pub credential: SecretString,
    pub model: String,
    /// File holding the system instruction text, read at connect time.
    pub instructions_path: PathBuf,
}

impl LiveConfig {
    /// The endpoint URL with the credential attached.
    pub fn endpoint_url(&self) -> Result<Url, url::ParseError> {
        let mut url = Url::parse(&self.endpoint)?;
        url.query_pairs_mut()
            .append_pair("key", self.credential.expose_secret());
        Ok(url)
    }
}

/// Installs `ring` as the process-wide rustls provider unless one is already set.
///
/// Must run before the first `wss://` connect. Safe to call repeatedly.
pub fn install_crypto_provider() {
    if rustls::crypto::CryptoProvider::get_default().is_none()
        && rustls::crypto::ring::default_provider()
            .install_default()
            .is_err()
    {
        debug!("Crypto provider was installed concurrently.");
    }
}

/// A single upstream connection.
///
/// Frames sent before the connection is open are dropped, not queued.
pub struct LiveSession {
    config: LiveConfig,
    state: ConnectionState,
    writer: Option<SplitSink<WsStream, WsMessage>>,
    reader: Option<JoinHandle<()>>,
}

impl LiveSession {
    pub fn new(config: LiveConfig) -> Self {
        Self {
            config,
            state: ConnectionState::Unconnected,
            writer: None,
            reader: None,
        }
    }

    pub fn config(&self) -> &LiveConfig {
        &self.config
    }

    async fn open(&mut self) -> Result<UpstreamEvents, LiveError> {
        let url = self.config.endpoint_url()?;
        install_crypto_provider();
        let (ws_stream, _) = connect_async(url.as_str()).await?;
        info!(model = %self.config.model, "Connected to Gemini Live WebSocket.");
        let (mut writer, reader) = ws_stream.split();

        let instructions = match tokio::fs::read_to_string(&self.config.instructions_path).await {
            Ok(text) => text,
            Err(source) => {
                let _ = writer.close().await;
                return Err(LiveError::Instructions {
                    path: self.config.instructions_path.clone(),
                    source,
                });
            }
        };

        let setup = SetupMessage::new(self.config.model.clone(), instructions);
        let payload = serde_json::to_string(&setup)?;
        if let Err(e) = writer.send(WsMessage::Text(payload.into())).await {
            let _ = writer.close().await;
            return Err(e.into());
        }
        debug!("Sent setup message.");

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        self.reader = Some(tokio::spawn(read_upstream(reader, tx)));
        self.writer = Some(writer);
        Ok(rx)
    }
}

#[async_trait]
impl UpstreamClient for LiveSession {
    async fn connect(&mut self) -> Result<Option<UpstreamEvents>, LiveError> {
        if self.state != ConnectionState::Unconnected {
            debug!(state = ?self.state, "connect() called on a used session; ignoring.");
            return Ok(None);
        }
        self.state = ConnectionState::Connecting;
        match self.open().await {
            Ok(events) => {
                self.state = ConnectionState::Open;
                Ok(Some(events))
            }
            Err(e) => {
                error!(error = %e, "Failed to open Gemini Live session.");
                self.state = ConnectionState::Closed;
                Err(e)
            }
        }
    }

    async fn send(&mut self, frame: UpstreamFrame) -> Result<bool, LiveError> {
        if self.state != ConnectionState::Open {
            debug!(state = ?self.state, "Upstream not open; dropping frame.");
            return Ok(false);
        }
        let Some(writer) = self.writer.as_mut() else {
            return Ok(false);
        };
        writer.send(frame.into_message()?).await?;
        Ok(true)
    }

    async fn close(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            if let Err(e) = writer.close().await {
                debug!(error = %e, "Ignoring error while closing upstream.");
            }
        }
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        if self.state != ConnectionState::Closed {
            info!("Gemini Live session closed.");
        }
        self.state = ConnectionState::Closed;
    }

    fn state(&self) -> ConnectionState {
        self.state
    }
}

/// Pumps provider messages into the event channel until the transport ends.
async fn read_upstream(mut reader: SplitStream<WsStream>, tx: mpsc::Sender<UpstreamEvent>) {
    while let Some(msg) = reader.next().await {
        let event = match msg {
            Ok(WsMessage::Text(text)) => UpstreamEvent::Text(text.as_str().to_owned()),
            Ok(WsMessage::Binary(data)) => UpstreamEvent::Binary(data),
            Ok(WsMessage::Close(frame)) => {
                debug!(?frame, "Gemini Live sent close frame.");
                let _ = tx
                    .send(UpstreamEvent::Closed {
                        reason: frame.map(|f| f.reason.as_str().to_owned()),
                    })
                    .await;
                return;
            }
            Ok(_) => continue,
            Err(e) => {
                warn!(error = %e, "Error reading from Gemini Live WebSocket.");
                let _ = tx.send(UpstreamEvent::Error(e.to_string())).await;
                return;
            }
        };
        if tx.send(event).await.is_err() {
            return;
        }
    }
    let _ = tx.send(UpstreamEvent::Closed { reason: None }).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(endpoint: &str) -> LiveConfig {
        LiveConfig {
            endpoint: endpoint.to_string(),
            credential: SecretString::from("s3cr&t key".to_string()),
            model: "models/test".to_string(),
            instructions_path: PathBuf::from("/does/not/exist.md"),
        }
    }

    #[test]
    fn test_credential_is_query_encoded() {
        let url = config(DEFAULT_ENDPOINT).endpoint_url().unwrap();
        assert_eq!(url.scheme(), "wss");
        assert_eq!(
            url.query_pairs().find(|(k, _)| k == "key").map(|(_, v)| v.into_owned()),
            Some("s3cr&t key".to_string())
        );
    }

    #[test]
    fn test_debug_redacts_credential() {
        let rendered = format!("{:?}", config(DEFAULT_ENDPOINT));
        assert!(!rendered.contains("s3cr&t"));
    }

    #[test]
    fn test_invalid_endpoint_is_rejected() {
        assert!(config("not a url").endpoint_url().is_err());
    }

    #[tokio::test]
    async fn test_send_before_connect_is_dropped() {
        let mut session = LiveSession::new(config(DEFAULT_ENDPOINT));
        let sent = session
            .send(UpstreamFrame::Text("early".into()))
            .await
            .unwrap();
        assert!(!sent);
        assert_eq!(session.state(), ConnectionState::Unconnected);
    }

    #[tokio::test]
    async fn test_close_is_idempotent_without_connection() {
        let mut session = LiveSession::new(config(DEFAULT_ENDPOINT));
        session.close().await;
        session.close().await;
        assert_eq!(session.state(), ConnectionState::Closed);
        assert!(session.connect().await.unwrap().is_none());
    }
}
