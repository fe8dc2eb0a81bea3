use anyhow::{Context, Result};
use hound::WavReader;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::backend::{MicrophoneBackend, MicrophoneConfig};
use super::codec::PCM16_SCALE;
use crate::error::VoiceError;

/// 16-bit WAV file loaded into memory
pub struct AudioFile {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<i16>,
}

impl AudioFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening audio file: {}", path.display());

        let reader = WavReader::open(path).context("Failed to open WAV file")?;

        let spec = reader.spec();
        if spec.bits_per_sample != 16 || spec.sample_format != hound::SampleFormat::Int {
            anyhow::bail!(
                "Expected 16-bit integer PCM, got {} bits {:?}",
                spec.bits_per_sample,
                spec.sample_format
            );
        }

        let samples: Vec<i16> = reader
            .into_samples::<i16>()
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to read audio samples")?;

        let duration_seconds =
            samples.len() as f64 / (spec.sample_rate as f64 * spec.channels as f64);

        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} channels, {} samples",
            duration_seconds,
            spec.sample_rate,
            spec.channels,
            samples.len()
        );

        Ok(Self {
            path: path.display().to_string(),
            duration_seconds,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            samples,
        })
    }

    /// Average interleaved channels down to normalized mono floats
    pub fn to_mono_f32(&self) -> Vec<f32> {
        let channels = self.channels.max(1) as usize;
        self.samples
            .chunks_exact(channels)
            .map(|frame| {
                let sum: i32 = frame.iter().map(|&s| s as i32).sum();
                (sum / channels as i32) as f32 / PCM16_SCALE
            })
            .collect()
    }
}

/// Microphone stand-in that replays a WAV file at real-time pace
///
/// The file must already be at the capture rate; resampling is not done.
pub struct WavFileMicrophone {
    path: PathBuf,
    config: MicrophoneConfig,
    task: Option<JoinHandle<()>>,
}

impl WavFileMicrophone {
    pub fn new(path: impl Into<PathBuf>, config: MicrophoneConfig) -> Self {
        Self {
            path: path.into(),
            config,
            task: None,
        }
    }
}

#[async_trait::async_trait]
impl MicrophoneBackend for WavFileMicrophone {
    async fn start(&mut self) -> Result<mpsc::Receiver<Vec<f32>>, VoiceError> {
        if self.task.is_some() {
            return Err(VoiceError::NoMicAccess("Already capturing".to_string()));
        }

        let audio = AudioFile::open(&self.path)
            .map_err(|e| VoiceError::NoMicAccess(format!("{:#}", e)))?;

        if audio.sample_rate != self.config.sample_rate {
            return Err(VoiceError::NoMicAccess(format!(
                "{} is {}Hz, capture expects {}Hz",
                audio.path, audio.sample_rate, self.config.sample_rate
            )));
        }

        let samples = audio.to_mono_f32();
        let block_size = self.config.block_size.max(1);
        let period = Duration::from_secs_f64(block_size as f64 / self.config.sample_rate as f64);
        let (tx, rx) = mpsc::channel(self.config.queue_depth.max(1));

        info!(
            "Replaying {} as microphone ({} blocks of {} samples)",
            audio.path,
            samples.len().div_ceil(block_size),
            block_size
        );

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            let mut dropped = 0usize;

            for block in samples.chunks(block_size) {
                ticker.tick().await;
                match tx.try_send(block.to_vec()) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        dropped += 1;
                        debug!("Capture consumer lagging, dropped block");
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => break,
                }
            }

            if dropped > 0 {
                warn!("Microphone replay dropped {} blocks", dropped);
            }
            info!("Microphone replay finished");
        });

        self.task = Some(task);
        Ok(rx)
    }

    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            info!("Microphone released");
        }
    }

    fn is_capturing(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    fn name(&self) -> &str {
        "wav-file"
    }
}

impl Drop for WavFileMicrophone {
    fn drop(&mut self) {
        self.stop();
    }
}
