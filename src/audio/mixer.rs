// Output mixer for device engines
//
// Holds every source an engine has started and renders them onto the
// device timeline one frame at a time. Overlapping sources are summed with
// clipping. The clock is the count of frames rendered, so it only moves
// while the device is actually pulling audio.

use std::sync::Arc;
use tracing::debug;

use super::engine::SourceToken;
use super::frame::DecodedBuffer;

/// One started source, positioned in device frames
#[derive(Debug)]
struct MixSource {
    token: SourceToken,
    buffer: Arc<DecodedBuffer>,
    /// Device frame at which the source becomes audible
    start_frame: u64,
    /// Buffer sample index at `start_frame`
    base: f64,
    /// Buffer samples advanced per device frame
    step: f64,
}

impl MixSource {
    fn position(&self, frame: u64) -> Option<f64> {
        let elapsed = frame.checked_sub(self.start_frame)?;
        Some(self.base + elapsed as f64 * self.step)
    }

    fn sample_at(&self, frame: u64) -> Option<f32> {
        let index = self.position(frame)? as usize;
        self.buffer.channel(0)?.get(index).copied()
    }

    fn finished(&self, frame: u64) -> bool {
        self.position(frame)
            .map(|pos| pos >= self.buffer.frames() as f64)
            .unwrap_or(false)
    }
}

/// Frame-clocked mixer shared between an engine handle and its device callback
#[derive(Debug)]
pub struct Mixer {
    sample_rate: u32,
    channels: u16,
    frames_rendered: u64,
    sources: Vec<MixSource>,
}

impl Mixer {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate: sample_rate.max(1),
            channels: channels.max(1),
            frames_rendered: 0,
            sources: Vec::new(),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Seconds of audio rendered so far
    pub fn now(&self) -> f64 {
        self.frames_rendered as f64 / self.sample_rate as f64
    }

    /// Start `buffer` at clock time `when`, `offset` seconds in, at `rate`
    pub fn add(
        &mut self,
        token: SourceToken,
        buffer: Arc<DecodedBuffer>,
        when: f64,
        offset: f64,
        rate: f64,
    ) {
        let sr = self.sample_rate as f64;
        let buffer_rate = buffer.sample_rate() as f64;
        let start_frame = (when.max(0.0) * sr).round() as u64;

        self.sources.push(MixSource {
            token,
            start_frame: start_frame.max(self.frames_rendered),
            base: offset.max(0.0) * buffer_rate,
            step: rate * buffer_rate / sr,
            buffer,
        });
    }

    /// Drop a source. Returns false for unknown or already finished tokens.
    pub fn remove(&mut self, token: SourceToken) -> bool {
        let before = self.sources.len();
        self.sources.retain(|s| s.token != token);
        self.sources.len() != before
    }

    pub fn clear(&mut self) {
        self.sources.clear();
    }

    /// Sources still waiting to start or playing
    pub fn active(&self) -> usize {
        self.sources.len()
    }

    /// Render interleaved output into `out` and advance the clock
    ///
    /// Every channel of a frame carries the same mono mix.
    pub fn fill(&mut self, out: &mut [f32]) {
        for frame in out.chunks_mut(self.channels as usize) {
            let at = self.frames_rendered;
            let mixed: f32 = self.sources.iter().filter_map(|s| s.sample_at(at)).sum();
            frame.fill(mixed.clamp(-1.0, 1.0));
            self.frames_rendered += 1;
        }

        let now = self.frames_rendered;
        let before = self.sources.len();
        self.sources.retain(|s| !s.finished(now));
        if self.sources.len() != before {
            debug!("{} source(s) finished", before - self.sources.len());
        }
    }
}
