//! Client Transport Adapter: the browser side of the relay, as a Rust client.
//!
//! [`RelayClient`] connects to the relay's `/ws` endpoint, sends microphone
//! frames and control signals, and applies downstream frames to a
//! [`PlaybackController`] the same way the browser UI does.

use crate::{
    frame::{
        AudioBlob, AudioChunk, ClientFrame, EVENT_RESPONSE_END, Inbound, ServerEvent, ServerFrame,
        decode_text,
    },
    playback::PlaybackController,
};
use anyhow::{Context, Result};
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use std::collections::VecDeque;
use tokio::net::TcpStream;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async, tungstenite::protocol::Message,
};
use tracing::{debug, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Which UI controls are usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Controls {
    pub start: bool,
    pub stop: bool,
    pub interrupt: bool,
}

impl Default for Controls {
    /// Pre-session: only start is available.
    fn default() -> Self {
        Self {
            start: true,
            stop: false,
            interrupt: false,
        }
    }
}

/// What the UI layer sees from the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    Transcript { text: String, partial: bool },
    ResponseText(String),
    /// Audio was queued for playback.
    Audio { bytes: usize },
    ResponseEnd,
    Control(String),
    Error(String),
    /// The connection is gone and controls were reset.
    Closed,
}

pub struct RelayClient<P> {
    sink: Option<SplitSink<WsStream, Message>>,
    stream: Option<SplitStream<WsStream>>,
    playback: P,
    speaking: bool,
    controls: Controls,
    pending: VecDeque<ClientEvent>,
}

impl<P: PlaybackController> RelayClient<P> {
    /// Connects to the relay and sends the session start signal.
    pub async fn start(url: &str, language: &str, playback: P) -> Result<Self> {
        let (ws_stream, _) = connect_async(url)
            .await
            .with_context(|| format!("Failed to connect to relay at {url}"))?;
        let (sink, stream) = ws_stream.split();
        let mut client = Self {
            sink: Some(sink),
            stream: Some(stream),
            playback,
            speaking: false,
            controls: Controls {
                start: false,
                stop: true,
                interrupt: false,
            },
            pending: VecDeque::new(),
        };
        client.send_frame(&ClientFrame::start(language)).await?;
        info!(%url, %language, "Relay session started.");
        Ok(client)
    }

    pub fn controls(&self) -> Controls {
        self.controls
    }

    pub fn is_speaking(&self) -> bool {
        self.speaking
    }

    pub fn is_connected(&self) -> bool {
        self.sink.is_some()
    }

    pub fn playback(&self) -> &P {
        &self.playback
    }

    pub fn playback_mut(&mut self) -> &mut P {
        &mut self.playback
    }

    pub async fn send_audio(&mut self, blob: AudioBlob) -> Result<()> {
        self.send_frame(&ClientFrame::audio(blob)).await
    }

    /// Barge-in: asks the model to stop and silences local playback at once.
    ///
    /// Does nothing when the connection is not open.
    pub async fn interrupt(&mut self) -> Result<()> {
        if self.sink.is_none() {
            return Ok(());
        }
        self.send_frame(&ClientFrame::interrupt()).await?;
        self.playback.stop();
        self.set_speaking(false);
        Ok(())
    }

    /// Closes the connection and resets controls. Safe to call repeatedly.
    pub async fn stop(&mut self) {
        self.controls = Controls::default();
        self.speaking = false;
        self.stream = None;
        if let Some(mut sink) = self.sink.take() {
            if let Err(e) = sink.close().await {
                debug!(error = %e, "Ignoring error while closing relay connection.");
            }
        }
    }

    /// Waits for the next downstream event.
    ///
    /// Returns `None` once the connection has been closed and every event was drained.
    pub async fn next_event(&mut self) -> Option<ClientEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }
            let stream = self.stream.as_mut()?;
            let msg = stream.next().await;
            match msg {
                Some(Ok(Message::Text(text))) => self.apply_text(text.as_str()),
                Some(Ok(Message::Binary(data))) => self.apply_audio(AudioChunk::pcm16(data)),
                Some(Ok(Message::Close(_))) | None => {
                    self.stop().await;
                    return Some(ClientEvent::Closed);
                }
                Some(Err(e)) => {
                    warn!(error = %e, "Relay connection failed.");
                    self.stop().await;
                    return Some(ClientEvent::Closed);
                }
                Some(Ok(_)) => {}
            }
        }
    }

    async fn send_frame(&mut self, frame: &ClientFrame) -> Result<()> {
        let sink = self.sink.as_mut().context("Relay connection is closed")?;
        let payload = serde_json::to_string(frame)?;
        sink.send(Message::Text(payload.into()))
            .await
            .context("Failed to send frame to relay")?;
        Ok(())
    }

    fn apply_text(&mut self, text: &str) {
        match decode_text::<ServerFrame>(text) {
            Inbound::Json { frame, .. } => {
                for event in frame.into_events() {
                    self.apply(event);
                }
            }
            Inbound::RawAudio(data) => self.apply_audio(AudioChunk::pcm16(data)),
        }
    }

    fn apply(&mut self, event: ServerEvent) {
        let event = match event {
            ServerEvent::Transcript { text, partial } => ClientEvent::Transcript { text, partial },
            ServerEvent::ResponseText(text) => ClientEvent::ResponseText(text),
            ServerEvent::ResponseAudio(chunk) => return self.apply_audio(chunk),
            ServerEvent::Control(event) if event == EVENT_RESPONSE_END => {
                self.set_speaking(false);
                self.playback.stop();
                ClientEvent::ResponseEnd
            }
            ServerEvent::Control(event) => ClientEvent::Control(event),
            ServerEvent::Error(message) => ClientEvent::Error(message),
        };
        self.pending.push_back(event);
    }

    fn apply_audio(&mut self, chunk: AudioChunk) {
        let bytes = chunk.pcm.len();
        self.playback.enqueue(chunk);
        self.set_speaking(true);
        self.pending.push_back(ClientEvent::Audio { bytes });
    }

    fn set_speaking(&mut self, on: bool) {
        self.speaking = on;
        self.controls.interrupt = on;
    }
}
