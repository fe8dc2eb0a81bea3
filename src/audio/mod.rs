pub mod backend;
pub mod capture;
pub mod codec;
#[cfg(feature = "device")]
pub mod device;
pub mod engine;
pub mod file;
pub mod frame;
pub mod mixer;

pub use backend::{MicrophoneBackend, MicrophoneConfig};
pub use capture::{CaptureConfig, CapturePipeline, CaptureStats, FrameAssembler, InputConverter};
#[cfg(feature = "device")]
pub use device::{DeviceEngine, DeviceMicrophone};
pub use engine::{AudioEngine, EngineEvent, RealtimeEngine, SourceToken, VirtualEngine};
pub use file::{AudioFile, WavFileMicrophone};
pub use frame::{pcm_mime_type, AudioFrame, DecodedBuffer, EncodedFrame};
pub use mixer::Mixer;
