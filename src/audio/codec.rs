//! Linear PCM codec
//!
//! Converts between raw bytes and base64 transport text, and between signed
//! 16-bit little-endian PCM and normalized float samples.

use base64::Engine;

use super::frame::DecodedBuffer;
use crate::error::VoiceError;

/// Scale between i16 PCM and normalized float
pub const PCM16_SCALE: f32 = 32768.0;

/// Encode raw bytes as transport text. Never fails.
pub fn encode(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// Inverse of [`encode`]
pub fn decode(text: &str) -> Result<Vec<u8>, VoiceError> {
    base64::engine::general_purpose::STANDARD
        .decode(text)
        .map_err(|e| VoiceError::MalformedEncoding(e.to_string()))
}

/// Reinterpret bytes as interleaved i16 LE samples and split per channel.
pub fn decode_audio_data(
    bytes: &[u8],
    sample_rate: u32,
    channels: u16,
) -> Result<DecodedBuffer, VoiceError> {
    let frame_bytes = 2 * channels as usize;
    if frame_bytes == 0 || bytes.len() % frame_bytes != 0 {
        return Err(VoiceError::InvalidFrameLength {
            len: bytes.len(),
            frame_bytes,
        });
    }

    let count = bytes.len() / frame_bytes;
    let mut data: Vec<Vec<f32>> = (0..channels).map(|_| Vec::with_capacity(count)).collect();

    for (i, chunk) in bytes.chunks_exact(2).enumerate() {
        let sample = i16::from_le_bytes([chunk[0], chunk[1]]);
        data[i % channels as usize].push(sample as f32 / PCM16_SCALE);
    }

    Ok(DecodedBuffer::new(sample_rate, data))
}

/// `round(sample * 32768)` clamped to the i16 range
pub fn float_to_pcm16(sample: f32) -> i16 {
    let scaled = (sample * PCM16_SCALE).round();
    scaled.clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

pub fn pcm16_to_bytes(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}
