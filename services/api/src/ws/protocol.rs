//! Messages passed between the tasks of one relay session.

use bytes::Bytes;
use gemini_realtime::UpstreamEvent;
use relay_core::{ClientFrame, Inbound, ServerFrame};

/// One entry on a session's ordered event queue.
#[derive(Debug)]
pub enum SessionEvent {
    /// A frame from the browser, already through the decode step.
    Client(Inbound<ClientFrame>),
    /// The browser connection ended.
    ClientClosed,
    Upstream(UpstreamEvent),
}

/// A message headed to the browser.
#[derive(Debug, Clone, PartialEq)]
pub enum Outgoing {
    Text(String),
    Binary(Bytes),
    Close,
}

impl Outgoing {
    pub fn frame(frame: &ServerFrame) -> Self {
        Self::Text(frame.to_json())
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::frame(&ServerFrame::error(message))
    }
}
