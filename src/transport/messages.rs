use serde::{Deserialize, Serialize};

use crate::audio::EncodedFrame;

/// One encoded capture frame on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaChunk {
    pub media_type: String, // e.g. "audio/pcm;rate=16000"
    pub data: String,       // Base64-encoded PCM bytes
}

/// Handshake payload sent when the transport opens
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSetup {
    pub model: String,
    pub voice: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    pub input_transcription: bool,
    pub output_transcription: bool,
    pub response_sample_rate: u32,
}

/// Messages sent to the live agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    Setup(SessionSetup),
    RealtimeInput { media: MediaChunk },
}

impl From<EncodedFrame> for ClientMessage {
    fn from(frame: EncodedFrame) -> Self {
        ClientMessage::RealtimeInput {
            media: MediaChunk {
                media_type: frame.mime_type,
                data: frame.data,
            },
        }
    }
}

/// Which side of the conversation a transcript fragment belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptRole {
    /// Learner speech recognized by the agent
    Input,
    /// Agent speech
    Output,
}

/// Messages received from the live agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    SetupComplete,
    /// Base64 PCM, 24kHz mono, arbitrary length
    Audio { data: String },
    Transcript { role: TranscriptRole, text: String },
    Interrupted,
    TurnComplete,
    Close,
    Error { reason: String },
}

/// Event delivered to the session by a transport
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    SetupComplete,
    Audio { data: String },
    Transcript { role: TranscriptRole, text: String },
    Interrupted,
    TurnComplete,
    /// Peer closed the session
    Closed,
    /// Peer reported a failure
    Error { reason: String },
    /// A message arrived that could not be parsed
    Malformed { reason: String },
}

impl From<ServerMessage> for InboundEvent {
    fn from(message: ServerMessage) -> Self {
        match message {
            ServerMessage::SetupComplete => InboundEvent::SetupComplete,
            ServerMessage::Audio { data } => InboundEvent::Audio { data },
            ServerMessage::Transcript { role, text } => InboundEvent::Transcript { role, text },
            ServerMessage::Interrupted => InboundEvent::Interrupted,
            ServerMessage::TurnComplete => InboundEvent::TurnComplete,
            ServerMessage::Close => InboundEvent::Closed,
            ServerMessage::Error { reason } => InboundEvent::Error { reason },
        }
    }
}

impl InboundEvent {
    /// Parse one text frame from the wire
    pub fn parse(text: &str) -> Self {
        match serde_json::from_str::<ServerMessage>(text) {
            Ok(message) => message.into(),
            Err(e) => InboundEvent::Malformed {
                reason: e.to_string(),
            },
        }
    }
}
