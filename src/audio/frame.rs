use serde::{Deserialize, Serialize};

use super::codec;

/// Capture frame of 16-bit PCM (interleaved when multi-channel)
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    /// Raw audio samples (i16 PCM, interleaved)
    samples: Vec<i16>,
    /// Sample rate in Hz
    sample_rate: u32,
    /// Number of channels
    channels: u16,
    /// Capture sequence number, starting at 0 per pipeline
    sequence: u64,
}

impl AudioFrame {
    pub fn new(samples: Vec<i16>, sample_rate: u32, channels: u16, sequence: u64) -> Self {
        Self {
            samples,
            sample_rate,
            channels,
            sequence,
        }
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Samples per channel
    pub fn frame_len(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels as usize
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frame_len() as f64 / self.sample_rate as f64
    }

    /// Little-endian PCM bytes
    pub fn to_le_bytes(&self) -> Vec<u8> {
        codec::pcm16_to_bytes(&self.samples)
    }

    /// Wrap the frame for transport, tagged with its rate
    pub fn encode(&self) -> EncodedFrame {
        EncodedFrame {
            mime_type: pcm_mime_type(self.sample_rate),
            data: codec::encode(&self.to_le_bytes()),
            sample_rate: self.sample_rate,
            sequence: self.sequence,
        }
    }
}

/// Mime-style label used on the wire, e.g. `audio/pcm;rate=16000`
pub fn pcm_mime_type(sample_rate: u32) -> String {
    format!("audio/pcm;rate={}", sample_rate)
}

/// Base64 text form of a PCM frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodedFrame {
    pub mime_type: String,
    pub data: String,
    pub sample_rate: u32,
    pub sequence: u64,
}

/// Per-channel float samples ready for output
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedBuffer {
    sample_rate: u32,
    channels: Vec<Vec<f32>>,
}

impl DecodedBuffer {
    pub fn new(sample_rate: u32, channels: Vec<Vec<f32>>) -> Self {
        Self {
            sample_rate,
            channels,
        }
    }

    /// Silent buffer, mostly useful for scheduling tests
    pub fn silence(sample_rate: u32, channel_count: u16, frames: usize) -> Self {
        Self {
            sample_rate,
            channels: vec![vec![0.0; frames]; channel_count as usize],
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.channels.get(index).map(Vec::as_slice)
    }

    /// Samples per channel
    pub fn frames(&self) -> usize {
        self.channels.first().map(Vec::len).unwrap_or(0)
    }

    /// Duration in seconds at rate 1.0
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }
}
