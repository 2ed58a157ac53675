//! The one-time setup handshake sent when the upstream connection opens.

use serde::{Deserialize, Serialize};

/// Audio format the provider is asked to speak back in.
pub const OUTPUT_AUDIO_FORMAT: &str = "pcm_s16le";
/// Sample rate of response audio, in Hz.
pub const OUTPUT_SAMPLE_RATE_HZ: u32 = 16_000;

/// Top-level setup envelope: `{ "setup": { ... } }`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SetupMessage {
    pub setup: Setup,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Setup {
    pub model: String,
    pub instructions: String,
    pub response: ResponseConfig,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ResponseConfig {
    pub modalities: Vec<ResponseModality>,
    pub audio: AudioOutputConfig,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResponseModality {
    Audio,
    Text,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AudioOutputConfig {
    pub format: String,
    pub sample_rate_hertz: u32,
}

impl SetupMessage {
    /// Builds the setup message for a model and its system instructions.
    ///
    /// Modalities and audio format are fixed: the model always answers with
    /// both audio and text, as 16 kHz signed 16-bit little-endian PCM.
    pub fn new(model: impl Into<String>, instructions: impl Into<String>) -> Self {
        Self {
            setup: Setup {
                model: model.into(),
                instructions: instructions.into(),
                response: ResponseConfig {
                    modalities: vec![ResponseModality::Audio, ResponseModality::Text],
                    audio: AudioOutputConfig {
                        format: OUTPUT_AUDIO_FORMAT.to_string(),
                        sample_rate_hertz: OUTPUT_SAMPLE_RATE_HZ,
                    },
                },
            },
        }
    }
}
