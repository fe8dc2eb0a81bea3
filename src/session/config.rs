use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::audio::CaptureConfig;
use crate::transport::SessionSetup;

/// Tutor persona chosen by the learner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Personality {
    #[default]
    Friendly,
    Strict,
    Creative,
    Caring,
    Rude,
}

impl Personality {
    /// Prebuilt agent voice for this persona
    pub fn voice(&self) -> &'static str {
        match self {
            Personality::Strict => "Puck",
            Personality::Caring => "Kore",
            _ => "Zephyr",
        }
    }
}

impl fmt::Display for Personality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Personality::Friendly => "friendly",
            Personality::Strict => "strict",
            Personality::Creative => "creative",
            Personality::Caring => "caring",
            Personality::Rude => "rude",
        };
        f.write_str(name)
    }
}

impl FromStr for Personality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "friendly" => Ok(Personality::Friendly),
            "strict" => Ok(Personality::Strict),
            "creative" => Ok(Personality::Creative),
            "caring" => Ok(Personality::Caring),
            "rude" => Ok(Personality::Rude),
            other => Err(format!("unknown personality: {}", other)),
        }
    }
}

/// Configuration for a duplex session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Unique session identifier (e.g., "talk-<uuid>")
    pub session_id: String,

    /// Model requested in the setup handshake
    pub model: String,

    pub personality: Personality,

    /// System instruction forwarded verbatim to the agent
    pub instructions: Option<String>,

    /// Microphone frame grouping
    pub capture: CaptureConfig,

    /// Sample rate of inbound agent audio (24kHz mono)
    pub output_sample_rate: u32,

    /// How often finished sources are pruned from the active set
    pub reap_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_id: format!("talk-{}", uuid::Uuid::new_v4()),
            model: "live-native-audio".to_string(),
            personality: Personality::default(),
            instructions: None,
            capture: CaptureConfig::default(),
            output_sample_rate: 24000,
            reap_interval: Duration::from_millis(250),
        }
    }
}

impl SessionConfig {
    /// Handshake payload for this session
    pub fn setup(&self) -> SessionSetup {
        SessionSetup {
            model: self.model.clone(),
            voice: self.personality.voice().to_string(),
            instructions: self.instructions.clone(),
            input_transcription: true,
            output_transcription: true,
            response_sample_rate: self.output_sample_rate,
        }
    }
}
