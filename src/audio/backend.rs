use tokio::sync::mpsc;

use crate::error::VoiceError;

/// Configuration for a capture backend
#[derive(Debug, Clone)]
pub struct MicrophoneConfig {
    /// Capture sample rate in Hz (the live agent expects 16kHz)
    pub sample_rate: u32,
    /// Samples per delivered block (device callback size)
    pub block_size: usize,
    /// Depth of the block channel; a full channel drops blocks
    pub queue_depth: usize,
}

impl Default for MicrophoneConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000, // 16kHz mono input
            block_size: 1024,
            queue_depth: 32,
        }
    }
}

/// Audio capture backend trait
///
/// Implementations deliver mono float blocks in [-1.0, 1.0] at the
/// configured capture rate. The producer side must never block on the
/// consumer: when the block channel is full the block is dropped.
///
/// Implementations:
/// - `DeviceMicrophone`: the default sound card input (feature `device`)
/// - `WavFileMicrophone`: replays a WAV file at real-time pace
/// - test doubles driven through a channel
#[async_trait::async_trait]
pub trait MicrophoneBackend: Send {
    /// Acquire the device and start capturing
    ///
    /// Fails with `NoMicAccess` when the device cannot be opened.
    async fn start(&mut self) -> Result<mpsc::Receiver<Vec<f32>>, VoiceError>;

    /// Release the device. Safe to call when not capturing.
    fn stop(&mut self);

    /// Check if backend is currently capturing
    fn is_capturing(&self) -> bool;

    /// Get backend name for logging
    fn name(&self) -> &str;
}
