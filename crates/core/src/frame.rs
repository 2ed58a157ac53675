//! Frames exchanged between the browser client and the relay.
//!
//! Browser → relay frames are [`ClientFrame`]s; relay → browser frames are
//! [`ServerFrame`]s. Text that does not decode as JSON is treated as raw audio
//! rather than rejected, see [`decode_text`].

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use bytes::Bytes;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};
use tracing::warn;

/// Input event that opens a session.
pub const EVENT_START: &str = "start";
/// Control event that stops model speech.
pub const EVENT_INTERRUPT: &str = "interrupt";
/// Control event marking the end of a model response.
pub const EVENT_RESPONSE_END: &str = "response.end";
/// Sample rate of PCM audio delivered to the client, in Hz.
pub const PCM_SAMPLE_RATE_HZ: u32 = 16_000;

/// Result of the decode step: structured JSON, or opaque audio bytes.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound<T> {
    /// A JSON frame. `raw` is the original text, kept for verbatim forwarding.
    Json { raw: String, frame: T },
    RawAudio(Bytes),
}

/// Decodes a text message, falling back to raw audio when it is not valid JSON for `T`.
pub fn decode_text<T: DeserializeOwned>(text: &str) -> Inbound<T> {
    match serde_json::from_str(text) {
        Ok(frame) => Inbound::Json {
            raw: text.to_owned(),
            frame,
        },
        Err(_) => Inbound::RawAudio(Bytes::copy_from_slice(text.as_bytes())),
    }
}

/// A self-contained encoded audio chunk from the microphone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioBlob {
    pub mime_type: String,
    /// Base64 payload.
    pub data: String,
}

impl AudioBlob {
    pub fn encode(mime_type: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            mime_type: mime_type.into(),
            data: BASE64.encode(bytes),
        }
    }
}

/// `{ "event": "start", "language": "en", ... }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputEvent {
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(flatten)]
    pub params: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClientInput {
    Audio { audio: AudioBlob },
    Event(InputEvent),
}

/// `{ "event": "interrupt" }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlEvent {
    pub event: String,
}

/// A JSON frame sent by the browser.
///
/// Any valid JSON decodes: shapes other than `input`/`control` land in `Other`
/// and are still forwarded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClientFrame {
    Input { input: ClientInput },
    Control { control: ControlEvent },
    Other(Value),
}

impl ClientFrame {
    pub fn start(language: impl Into<String>) -> Self {
        Self::Input {
            input: ClientInput::Event(InputEvent {
                event: EVENT_START.to_string(),
                language: Some(language.into()),
                params: Map::new(),
            }),
        }
    }

    pub fn audio(blob: AudioBlob) -> Self {
        Self::Input {
            input: ClientInput::Audio { audio: blob },
        }
    }

    pub fn interrupt() -> Self {
        Self::Control {
            control: ControlEvent {
                event: EVENT_INTERRUPT.to_string(),
            },
        }
    }

    pub fn is_start(&self) -> bool {
        matches!(
            self,
            Self::Input { input: ClientInput::Event(e) } if e.event == EVENT_START
        )
    }

    pub fn is_interrupt(&self) -> bool {
        matches!(self, Self::Control { control } if control.event == EVENT_INTERRUPT)
    }
}

/// PCM audio headed for playback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioChunk {
    pub pcm: Bytes,
    pub sample_rate: u32,
}

impl AudioChunk {
    pub fn pcm16(pcm: Bytes) -> Self {
        Self {
            pcm,
            sample_rate: PCM_SAMPLE_RATE_HZ,
        }
    }
}

/// One semantic event carried by a [`ServerFrame`].
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    Transcript { text: String, partial: bool },
    ResponseText(String),
    ResponseAudio(AudioChunk),
    Control(String),
    Error(String),
}

/// A JSON frame sent to the browser.
///
/// Every field is optional and one frame may carry several; empty strings
/// count as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerFrame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partial_transcript: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_text: Option<String>,
    /// Base64 PCM.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_chunk: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn present(field: &Option<String>) -> bool {
    field.as_deref().is_some_and(|s| !s.is_empty())
}

fn take_present(field: Option<String>) -> Option<String> {
    field.filter(|s| !s.is_empty())
}

impl ServerFrame {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn response_end() -> Self {
        Self {
            event: Some(EVENT_RESPONSE_END.to_string()),
            ..Default::default()
        }
    }

    /// True when the frame carries model output (text or audio).
    pub fn is_response(&self) -> bool {
        present(&self.response_text) || present(&self.audio_chunk)
    }

    pub fn is_response_end(&self) -> bool {
        self.event.as_deref() == Some(EVENT_RESPONSE_END)
    }

    /// Splits the frame into events, in the order a client applies them.
    pub fn into_events(self) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        if let Some(text) = take_present(self.transcript) {
            events.push(ServerEvent::Transcript {
                text,
                partial: false,
            });
        }
        if let Some(text) = take_present(self.partial_transcript) {
            events.push(ServerEvent::Transcript {
                text,
                partial: true,
            });
        }
        if let Some(text) = take_present(self.response_text) {
            events.push(ServerEvent::ResponseText(text));
        }
        if let Some(encoded) = take_present(self.audio_chunk) {
            match BASE64.decode(encoded.as_bytes()) {
                Ok(pcm) => events.push(ServerEvent::ResponseAudio(AudioChunk::pcm16(pcm.into()))),
                Err(e) => warn!(error = %e, "Dropping audio chunk with invalid base64."),
            }
        }
        if let Some(event) = take_present(self.event) {
            events.push(ServerEvent::Control(event));
        }
        if let Some(message) = take_present(self.error) {
            events.push(ServerEvent::Error(message));
        }
        events
    }

    pub fn to_json(&self) -> String {
        // Only strings and options; serialization cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}
