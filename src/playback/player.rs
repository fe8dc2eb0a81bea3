use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

use crate::audio::{AudioEngine, DecodedBuffer, SourceToken};
use crate::error::VoiceError;

pub const MIN_RATE: f64 = 0.25;
pub const MAX_RATE: f64 = 4.0;

/// Snapshot returned by [`SeekablePlayer::tick`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PlayerProgress {
    pub position: f64,
    pub duration: f64,
    pub is_playing: bool,
}

/// Transport-style player over one fully decoded buffer
///
/// Position is derived from the engine clock:
/// `(now - started_at) * rate + offset` while playing, `offset` otherwise.
/// Every change of position or rate stops the current source and starts a
/// fresh one at the recomputed offset.
pub struct SeekablePlayer {
    engine: Box<dyn AudioEngine>,
    buffer: Option<Arc<DecodedBuffer>>,
    offset: f64,
    started_at: f64,
    rate: f64,
    is_playing: bool,
    current: Option<SourceToken>,
    next_token: u64,
}

impl SeekablePlayer {
    pub fn new(engine: Box<dyn AudioEngine>) -> Self {
        Self {
            engine,
            buffer: None,
            offset: 0.0,
            started_at: 0.0,
            rate: 1.0,
            is_playing: false,
            current: None,
            next_token: 0,
        }
    }

    /// Bind a buffer, replacing any previous one. Playback starts paused at 0.
    pub fn load(&mut self, buffer: DecodedBuffer) {
        self.unload();
        info!(
            "Loaded {:.2}s buffer ({}Hz, {} channel(s))",
            buffer.duration(),
            buffer.sample_rate(),
            buffer.channel_count()
        );
        self.buffer = Some(Arc::new(buffer));
    }

    /// Stop output and release the buffer
    pub fn unload(&mut self) {
        self.stop_output();
        self.buffer = None;
        self.offset = 0.0;
        self.is_playing = false;
    }

    pub fn play(&mut self) -> Result<(), VoiceError> {
        let duration = self.loaded_duration()?;
        if self.is_playing {
            return Ok(());
        }
        if self.offset >= duration {
            self.offset = 0.0;
        }
        self.start_output()
    }

    pub fn pause(&mut self) {
        if !self.is_playing {
            return;
        }
        self.offset = self.position();
        self.stop_output();
        self.is_playing = false;
        debug!("Paused at {:.3}s", self.offset);
    }

    pub fn seek(&mut self, position: f64) -> Result<(), VoiceError> {
        let duration = self.loaded_duration()?;
        let target = if position.is_finite() {
            position.clamp(0.0, duration)
        } else {
            0.0
        };

        if self.is_playing {
            self.stop_output();
            self.offset = target;
            self.start_output()?;
        } else {
            self.offset = target;
        }
        debug!("Seeked to {:.3}s", target);
        Ok(())
    }

    /// Change playback speed, returning the rate actually applied
    pub fn set_rate(&mut self, rate: f64) -> f64 {
        if !rate.is_finite() {
            return self.rate;
        }
        let rate = rate.clamp(MIN_RATE, MAX_RATE);

        if self.is_playing {
            let position = self.position();
            self.stop_output();
            self.offset = position;
            self.rate = rate;
            // Buffer is present whenever is_playing is set
            let _ = self.start_output();
        } else {
            self.rate = rate;
        }
        rate
    }

    pub fn position(&self) -> f64 {
        let duration = self.duration();
        let raw = if self.is_playing {
            (self.engine.now() - self.started_at) * self.rate + self.offset
        } else {
            self.offset
        };
        raw.clamp(0.0, duration)
    }

    /// Advance progress; pins to the end and stops once the buffer is exhausted
    pub fn tick(&mut self) -> PlayerProgress {
        let duration = self.duration();
        let mut position = self.position();

        if self.is_playing && position >= duration {
            self.stop_output();
            self.is_playing = false;
            self.offset = duration;
            position = duration;
            info!("Reached end of buffer ({:.2}s)", duration);
        }

        PlayerProgress {
            position,
            duration,
            is_playing: self.is_playing,
        }
    }

    pub fn duration(&self) -> f64 {
        self.buffer.as_ref().map(|b| b.duration()).unwrap_or(0.0)
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn is_playing(&self) -> bool {
        self.is_playing
    }

    pub fn is_loaded(&self) -> bool {
        self.buffer.is_some()
    }

    /// Release the output device
    pub fn close(&mut self) {
        self.unload();
        self.engine.close();
    }

    fn loaded_duration(&self) -> Result<f64, VoiceError> {
        self.buffer
            .as_ref()
            .map(|b| b.duration())
            .ok_or(VoiceError::NoBufferLoaded)
    }

    fn start_output(&mut self) -> Result<(), VoiceError> {
        let buffer = self.buffer.clone().ok_or(VoiceError::NoBufferLoaded)?;
        let token = SourceToken(self.next_token);
        self.next_token += 1;

        let now = self.engine.now();
        self.engine
            .start_source(token, buffer, now, self.offset, self.rate);
        self.current = Some(token);
        self.started_at = now;
        self.is_playing = true;
        Ok(())
    }

    fn stop_output(&mut self) {
        if let Some(token) = self.current.take() {
            self.engine.stop_source(token);
        }
    }
}

impl Drop for SeekablePlayer {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::VirtualEngine;

    fn player_with(seconds: usize) -> (SeekablePlayer, VirtualEngine) {
        let engine = VirtualEngine::new();
        let mut player = SeekablePlayer::new(Box::new(engine.clone()));
        player.load(DecodedBuffer::silence(100, 1, seconds * 100));
        (player, engine)
    }

    #[test]
    fn test_rate_is_clamped() {
        let (mut player, _engine) = player_with(10);

        assert_eq!(player.set_rate(10.0), MAX_RATE);
        assert_eq!(player.set_rate(0.0), MIN_RATE);
        assert_eq!(player.set_rate(f64::NAN), MIN_RATE);
    }

    #[test]
    fn test_play_at_end_restarts() {
        let (mut player, engine) = player_with(2);

        player.seek(2.0).unwrap();
        player.play().unwrap();
        assert_eq!(player.position(), 0.0);

        engine.advance(0.5);
        assert_eq!(player.position(), 0.5);
    }
}
