//! Manages the browser WebSocket connection lifecycle for a relay session.

use super::{
    protocol::{Outgoing, SessionEvent},
    proxy::SessionProxy,
};
use crate::state::AppState;
use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use relay_core::{Inbound, decode_text};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{Instrument, debug, info, instrument, warn};
use uuid::Uuid;

/// Capacity of a session's event queue and of its outgoing queue.
const CHANNEL_CAPACITY: usize = 256;

/// Axum handler to upgrade an HTTP connection to a WebSocket.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Runs one relay session for the lifetime of a browser connection.
///
/// The browser socket is split into a reader task feeding the session queue and
/// a writer task draining outgoing messages; the proxy logic runs in between.
#[instrument(name = "relay_session", skip_all, fields(session_id))]
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let session_id = Uuid::new_v4();
    tracing::Span::current().record("session_id", &session_id.to_string());
    info!("New WebSocket connection.");

    let (socket_tx, socket_rx) = socket.split();
    let (event_tx, event_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (out_tx, out_rx) = mpsc::channel(CHANNEL_CAPACITY);

    let writer = tokio::spawn(write_browser(socket_tx, out_rx).in_current_span());
    let reader = tokio::spawn(read_browser(socket_rx, event_tx.clone()).in_current_span());

    let factory_state = state.clone();
    let proxy = SessionProxy::new(
        move || factory_state.new_live_session(),
        out_tx,
        event_tx,
    );
    proxy.run(event_rx).await;

    reader.abort();
    if let Err(e) = writer.await {
        warn!(error = %e, "Browser writer task failed.");
    }
    info!("WebSocket connection closed.");
}

/// Decodes browser messages onto the session queue, in arrival order.
async fn read_browser(mut socket_rx: SplitStream<WebSocket>, events: mpsc::Sender<SessionEvent>) {
    while let Some(msg) = socket_rx.next().await {
        let inbound = match msg {
            Ok(Message::Text(text)) => decode_text(text.as_str()),
            Ok(Message::Binary(data)) => Inbound::RawAudio(data),
            Ok(Message::Close(_)) => break,
            Ok(Message::Ping(_) | Message::Pong(_)) => continue,
            Err(e) => {
                warn!(error = %e, "Error receiving from browser WebSocket.");
                break;
            }
        };
        if events.send(SessionEvent::Client(inbound)).await.is_err() {
            return;
        }
    }
    let _ = events.send(SessionEvent::ClientClosed).await;
}

/// Sends outgoing messages to the browser until the session closes it.
async fn write_browser(
    mut socket_tx: SplitSink<WebSocket, Message>,
    mut outgoing: mpsc::Receiver<Outgoing>,
) {
    while let Some(msg) = outgoing.recv().await {
        let result = match msg {
            Outgoing::Text(text) => socket_tx.send(Message::Text(text.into())).await,
            Outgoing::Binary(data) => socket_tx.send(Message::Binary(data)).await,
            Outgoing::Close => {
                let _ = socket_tx.send(Message::Close(None)).await;
                break;
            }
        };
        if let Err(e) = result {
            debug!(error = %e, "Failed to write to browser WebSocket.");
            break;
        }
    }
    let _ = socket_tx.close().await;
}
