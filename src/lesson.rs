//! Lesson narration loading
//!
//! A lesson's text is turned into speech by a one-shot [`SpeechSynthesizer`]
//! and decoded into a single buffer for the seekable player.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::audio::{codec, AudioFile, DecodedBuffer};
use crate::error::VoiceError;

/// One-shot text-to-speech collaborator
#[async_trait::async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Produce base64 PCM16 mono audio for `text`
    ///
    /// An empty payload means nothing could be generated.
    async fn synthesize(&self, text: &str) -> Result<String>;

    /// Get synthesizer name for logging
    fn name(&self) -> &str;
}

/// Serves narration that was rendered ahead of time
///
/// Accepts either a text file holding base64 PCM or a 16-bit WAV file.
/// The text argument to `synthesize` is ignored.
pub struct PrerenderedSpeech {
    path: PathBuf,
    sample_rate: u32,
}

impl PrerenderedSpeech {
    pub fn new(path: impl Into<PathBuf>, sample_rate: u32) -> Self {
        Self {
            path: path.into(),
            sample_rate,
        }
    }

    fn is_wav(path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("wav"))
            .unwrap_or(false)
    }

    fn encode_wav(&self) -> Result<String> {
        let audio = AudioFile::open(&self.path)?;
        if audio.sample_rate != self.sample_rate {
            bail!(
                "Lesson audio is {}Hz, expected {}Hz",
                audio.sample_rate,
                self.sample_rate
            );
        }

        let samples: Vec<i16> = audio
            .to_mono_f32()
            .into_iter()
            .map(codec::float_to_pcm16)
            .collect();
        Ok(codec::encode(&codec::pcm16_to_bytes(&samples)))
    }
}

#[async_trait::async_trait]
impl SpeechSynthesizer for PrerenderedSpeech {
    async fn synthesize(&self, _text: &str) -> Result<String> {
        if Self::is_wav(&self.path) {
            return self.encode_wav();
        }

        let payload = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        Ok(payload.trim().to_string())
    }

    fn name(&self) -> &str {
        "prerendered"
    }
}

/// Synthesize `text` and decode it into a mono buffer at `sample_rate`
///
/// Synthesis errors and empty payloads both surface as `SynthesisUnavailable`.
pub async fn load_lesson_audio(
    synthesizer: &dyn SpeechSynthesizer,
    text: &str,
    sample_rate: u32,
) -> Result<DecodedBuffer, VoiceError> {
    info!("Synthesizing lesson audio with {}", synthesizer.name());

    let payload = match synthesizer.synthesize(text).await {
        Ok(payload) => payload,
        Err(e) => {
            warn!("Speech synthesis failed: {:#}", e);
            return Err(VoiceError::SynthesisUnavailable);
        }
    };

    let payload = payload.trim();
    if payload.is_empty() {
        warn!("Speech synthesis returned no audio");
        return Err(VoiceError::SynthesisUnavailable);
    }

    let bytes = codec::decode(payload)?;
    let buffer = codec::decode_audio_data(&bytes, sample_rate, 1)?;
    info!("Lesson audio ready: {:.2}s", buffer.duration());

    Ok(buffer)
}
