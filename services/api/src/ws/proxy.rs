//! Per-session forwarding between the browser and the upstream client.
//!
//! A [`SessionProxy`] consumes one ordered queue of [`SessionEvent`]s. Browser
//! frames and upstream events are handled one at a time, to completion, so the
//! interrupt state needs no locking and each direction stays FIFO.

use super::protocol::{Outgoing, SessionEvent};
use gemini_realtime::{UpstreamClient, UpstreamEvent, UpstreamEvents, UpstreamFrame};
use relay_core::{
    ClientFrame, Inbound, ServerFrame, SessionMachine, SessionState, decode_text,
};
use std::ops::ControlFlow;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, error, info, warn};

/// Bridges one browser connection to one upstream client.
///
/// The upstream client is created by `make_upstream` when the browser sends its
/// start signal, and never more than once per session.
pub struct SessionProxy<U, F> {
    machine: SessionMachine,
    upstream: Option<U>,
    make_upstream: F,
    downstream: mpsc::Sender<Outgoing>,
    events: mpsc::Sender<SessionEvent>,
    pump: Option<JoinHandle<()>>,
}

impl<U, F> SessionProxy<U, F>
where
    U: UpstreamClient,
    F: FnMut() -> U + Send,
{
    /// `events` must feed the queue later passed to [`SessionProxy::run`]; upstream
    /// events are pushed onto it.
    pub fn new(
        make_upstream: F,
        downstream: mpsc::Sender<Outgoing>,
        events: mpsc::Sender<SessionEvent>,
    ) -> Self {
        Self {
            machine: SessionMachine::new(),
            upstream: None,
            make_upstream,
            downstream,
            events,
            pump: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.machine.state()
    }

    pub fn is_speaking(&self) -> bool {
        self.machine.is_speaking()
    }

    pub fn upstream(&self) -> Option<&U> {
        self.upstream.as_ref()
    }

    /// Processes events until either side disconnects, then tears the session down.
    pub async fn run(mut self, mut queue: mpsc::Receiver<SessionEvent>) {
        while let Some(event) = queue.recv().await {
            if self.handle(event).await.is_break() {
                break;
            }
        }
        self.teardown().await;
    }

    /// Applies one event. `Break` means the session is over.
    pub async fn handle(&mut self, event: SessionEvent) -> ControlFlow<()> {
        if self.machine.is_closed() {
            return ControlFlow::Break(());
        }
        match event {
            SessionEvent::Client(Inbound::Json { raw, frame }) => {
                self.on_client_frame(raw, frame).await
            }
            SessionEvent::Client(Inbound::RawAudio(data)) => {
                self.forward_upstream(UpstreamFrame::Binary(data)).await
            }
            SessionEvent::ClientClosed => {
                info!("Browser disconnected.");
                ControlFlow::Break(())
            }
            SessionEvent::Upstream(event) => self.on_upstream_event(event).await,
        }
    }

    async fn on_client_frame(&mut self, raw: String, frame: ClientFrame) -> ControlFlow<()> {
        if frame.is_start() && self.start().await.is_break() {
            return ControlFlow::Break(());
        }
        if frame.is_interrupt() && self.machine.interrupt() {
            info!("Client interrupted model speech.");
        }
        self.forward_upstream(UpstreamFrame::Text(raw)).await
    }

    /// `Idle -> Connecting -> Listening`. Later browser frames wait in the queue
    /// until this returns.
    async fn start(&mut self) -> ControlFlow<()> {
        if !self.machine.begin_connect() {
            debug!(state = %self.machine.state(), "Ignoring repeated start signal.");
            return ControlFlow::Continue(());
        }
        let upstream = self.upstream.insert((self.make_upstream)());
        match upstream.connect().await {
            Ok(events) => {
                if let Some(events) = events {
                    self.pump = Some(spawn_pump(events, self.events.clone()));
                }
                self.machine.upstream_opened();
                info!("Upstream session open.");
                ControlFlow::Continue(())
            }
            Err(e) => {
                error!(error = %e, "Failed to start upstream session.");
                let _ = self
                    .downstream
                    .send(Outgoing::error(format!("Failed to start session: {e}")))
                    .await;
                ControlFlow::Break(())
            }
        }
    }

    async fn forward_upstream(&mut self, frame: UpstreamFrame) -> ControlFlow<()> {
        let Some(upstream) = self.upstream.as_mut() else {
            debug!("No upstream yet; dropping browser frame.");
            return ControlFlow::Continue(());
        };
        match upstream.send(frame).await {
            Ok(true) => ControlFlow::Continue(()),
            Ok(false) => {
                debug!("Upstream not open; browser frame dropped.");
                ControlFlow::Continue(())
            }
            Err(e) => {
                warn!(error = %e, "Failed to forward frame upstream.");
                let _ = self
                    .downstream
                    .send(Outgoing::error(format!("Upstream error: {e}")))
                    .await;
                ControlFlow::Break(())
            }
        }
    }

    async fn on_upstream_event(&mut self, event: UpstreamEvent) -> ControlFlow<()> {
        match event {
            UpstreamEvent::Text(text) => {
                match decode_text::<ServerFrame>(&text) {
                    Inbound::Json { frame, .. } => {
                        if frame.is_response() {
                            self.machine.response_started();
                        }
                        if frame.is_response_end() {
                            self.machine.response_ended();
                        }
                    }
                    // The client plays non-JSON text as audio.
                    Inbound::RawAudio(_) => {
                        self.machine.response_started();
                    }
                }
                self.send_downstream(Outgoing::Text(text)).await
            }
            UpstreamEvent::Binary(data) => {
                self.machine.response_started();
                self.send_downstream(Outgoing::Binary(data)).await
            }
            UpstreamEvent::Error(message) => {
                warn!(%message, "Upstream reported an error.");
                let _ = self
                    .downstream
                    .send(Outgoing::error(format!("Upstream error: {message}")))
                    .await;
                ControlFlow::Break(())
            }
            UpstreamEvent::Closed { reason } => {
                info!(?reason, "Upstream closed the connection.");
                let message = match reason.filter(|r| !r.is_empty()) {
                    Some(reason) => format!("Upstream connection closed: {reason}"),
                    None => "Upstream connection closed".to_string(),
                };
                let _ = self.downstream.send(Outgoing::error(message)).await;
                ControlFlow::Break(())
            }
        }
    }

    async fn send_downstream(&mut self, msg: Outgoing) -> ControlFlow<()> {
        if self.downstream.send(msg).await.is_err() {
            debug!("Browser writer is gone.");
            return ControlFlow::Break(());
        }
        ControlFlow::Continue(())
    }

    /// Closes the upstream and the browser connection. Safe to call repeatedly.
    pub async fn teardown(&mut self) {
        if !self.machine.close() {
            return;
        }
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        if let Some(upstream) = self.upstream.as_mut() {
            upstream.close().await;
        }
        let _ = self.downstream.send(Outgoing::Close).await;
        info!("Session closed.");
    }
}

/// Moves upstream events onto the session queue, preserving their order.
fn spawn_pump(mut upstream: UpstreamEvents, queue: mpsc::Sender<SessionEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = upstream.recv().await {
            if queue.send(SessionEvent::Upstream(event)).await.is_err() {
                break;
            }
        }
    })
}
