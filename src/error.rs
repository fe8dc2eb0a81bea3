//! Error taxonomy shared by the codec, session and player.

use thiserror::Error;

/// Errors surfaced by the audio pipeline.
///
/// Codec-level variants are recoverable by dropping the offending unit.
/// Session-level variants terminate the session they occur in.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VoiceError {
    /// Input text is not valid base64 transport encoding.
    #[error("Malformed transport encoding: {0}")]
    MalformedEncoding(String),

    /// Byte length is not a whole number of interleaved 16-bit frames.
    #[error("Invalid frame length: {len} bytes is not a multiple of {frame_bytes}")]
    InvalidFrameLength { len: usize, frame_bytes: usize },

    /// The capture device could not be opened.
    #[error("Microphone unavailable: {0}")]
    NoMicAccess(String),

    /// The transport failed, closed unexpectedly or sent garbage.
    #[error("Transport error: {0}")]
    TransportError(String),

    /// The one-shot synthesis call returned nothing usable.
    #[error("Speech synthesis unavailable")]
    SynthesisUnavailable,

    /// A player operation needs a loaded buffer.
    #[error("No audio buffer loaded")]
    NoBufferLoaded,
}

impl VoiceError {
    /// Single user-facing message for a failure.
    pub fn user_message(&self) -> &'static str {
        match self {
            VoiceError::NoMicAccess(_) => {
                "Microphone access failed. Check device permissions and try again."
            }
            VoiceError::TransportError(_) => {
                "Connection error. Check your network and API key, then start again."
            }
            VoiceError::SynthesisUnavailable => "Lesson audio could not be generated.",
            VoiceError::NoBufferLoaded => "No lesson audio is loaded.",
            VoiceError::MalformedEncoding(_) | VoiceError::InvalidFrameLength { .. } => {
                "Received audio could not be decoded."
            }
        }
    }
}
