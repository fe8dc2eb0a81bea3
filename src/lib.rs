pub mod audio;
pub mod config;
pub mod error;
pub mod lesson;
pub mod playback;
pub mod session;
pub mod transport;

pub use audio::{
    AudioEngine, AudioFile, AudioFrame, CaptureConfig, CapturePipeline, DecodedBuffer,
    EncodedFrame, MicrophoneBackend, MicrophoneConfig, Mixer, RealtimeEngine, VirtualEngine,
    WavFileMicrophone,
};
#[cfg(feature = "device")]
pub use audio::{DeviceEngine, DeviceMicrophone};
pub use config::Config;
pub use error::VoiceError;
pub use lesson::{load_lesson_audio, PrerenderedSpeech, SpeechSynthesizer};
pub use playback::{PlaybackScheduler, PlayerProgress, ScheduledSource, SeekablePlayer};
pub use session::{
    Conversation, DuplexSession, Personality, SessionConfig, SessionState, SessionStats, Speaker,
    TranscriptEntry,
};
pub use transport::{
    ClientMessage, InboundEvent, SessionSetup, Transport, TransportLink, WebSocketConfig,
    WebSocketTransport,
};
