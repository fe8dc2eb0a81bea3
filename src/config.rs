use anyhow::Result;
use serde::Deserialize;
use std::time::Duration;

use crate::audio::{CaptureConfig, MicrophoneConfig};
use crate::transport::WebSocketConfig;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub transport: TransportConfig,
    pub capture: CaptureSettings,
    pub playback: PlaybackConfig,
    pub player: PlayerConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "tutor-voice".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub handshake_timeout_secs: u64,
    pub queue_depth: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:8765/live".to_string(),
            api_key: None,
            model: "live-native-audio".to_string(),
            handshake_timeout_secs: 10,
            queue_depth: 64,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    pub sample_rate: u32,
    /// Samples per transmitted frame
    pub frame_size: usize,
    /// Samples per microphone block
    pub block_size: usize,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            frame_size: 4096,
            block_size: 1024,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Rate of inbound agent audio
    pub sample_rate: u32,
    pub reap_interval_ms: u64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            sample_rate: 24000,
            reap_interval_ms: 250,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub tick_interval_ms: u64,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 100,
        }
    }
}

impl Config {
    /// Layer an optional config file and `TUTOR__*` environment variables
    /// over the defaults
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("TUTOR")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    pub fn websocket(&self) -> WebSocketConfig {
        WebSocketConfig {
            url: self.transport.url.clone(),
            api_key: self.transport.api_key.clone(),
            handshake_timeout: Duration::from_secs(self.transport.handshake_timeout_secs),
            queue_depth: self.transport.queue_depth,
        }
    }

    pub fn capture(&self) -> CaptureConfig {
        CaptureConfig {
            sample_rate: self.capture.sample_rate,
            frame_size: self.capture.frame_size,
        }
    }

    pub fn microphone(&self) -> MicrophoneConfig {
        MicrophoneConfig {
            sample_rate: self.capture.sample_rate,
            block_size: self.capture.block_size,
            ..MicrophoneConfig::default()
        }
    }
}
