// Audio output engines
//
// An engine is the explicit output-device handle owned by one session or
// player. It exposes a monotonic clock in seconds and starts/stops sources
// at absolute clock times.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tracing::{debug, info, warn};

use super::codec;
use super::frame::DecodedBuffer;

/// Identifier for one scheduled source, unique per owner
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SourceToken(pub u64);

/// Output device abstraction
pub trait AudioEngine: Send {
    /// Current engine clock in seconds
    fn now(&self) -> f64;

    /// Start `buffer` at clock time `when`, skipping `offset` seconds of it,
    /// played at `rate`.
    fn start_source(
        &mut self,
        token: SourceToken,
        buffer: Arc<DecodedBuffer>,
        when: f64,
        offset: f64,
        rate: f64,
    );

    /// Stop a source immediately. Unknown tokens are ignored.
    fn stop_source(&mut self, token: SourceToken);

    /// Release the device. Further calls are no-ops.
    fn close(&mut self);

    /// Get engine name for logging
    fn name(&self) -> &str;
}

/// One call observed by a [`VirtualEngine`]
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    Started {
        token: SourceToken,
        when: f64,
        offset: f64,
        rate: f64,
        duration: f64,
    },
    Stopped {
        token: SourceToken,
        at: f64,
    },
    Closed {
        at: f64,
    },
}

#[derive(Debug, Default)]
struct VirtualState {
    now: f64,
    events: Vec<EngineEvent>,
    closed: bool,
}

/// Engine driven by a manually advanced clock
///
/// Clones share the same clock and event log, so a test can keep one handle
/// while a session owns another.
#[derive(Debug, Clone, Default)]
pub struct VirtualEngine {
    state: Arc<Mutex<VirtualState>>,
}

impl VirtualEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, VirtualState> {
        // A poisoned lock only means a test panicked mid-call
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_time(&self, now: f64) {
        self.lock().now = now;
    }

    pub fn advance(&self, secs: f64) {
        self.lock().now += secs;
    }

    pub fn events(&self) -> Vec<EngineEvent> {
        self.lock().events.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Start times of every source started so far, in call order
    pub fn start_times(&self) -> Vec<f64> {
        self.lock()
            .events
            .iter()
            .filter_map(|e| match e {
                EngineEvent::Started { when, .. } => Some(*when),
                _ => None,
            })
            .collect()
    }

    pub fn stopped_tokens(&self) -> Vec<SourceToken> {
        self.lock()
            .events
            .iter()
            .filter_map(|e| match e {
                EngineEvent::Stopped { token, .. } => Some(*token),
                _ => None,
            })
            .collect()
    }
}

impl AudioEngine for VirtualEngine {
    fn now(&self) -> f64 {
        self.lock().now
    }

    fn start_source(
        &mut self,
        token: SourceToken,
        buffer: Arc<DecodedBuffer>,
        when: f64,
        offset: f64,
        rate: f64,
    ) {
        let mut state = self.lock();
        if state.closed {
            return;
        }
        state.events.push(EngineEvent::Started {
            token,
            when,
            offset,
            rate,
            duration: buffer.duration(),
        });
    }

    fn stop_source(&mut self, token: SourceToken) {
        let mut state = self.lock();
        if state.closed {
            return;
        }
        let at = state.now;
        state.events.push(EngineEvent::Stopped { token, at });
    }

    fn close(&mut self) {
        let mut state = self.lock();
        if state.closed {
            return;
        }
        let at = state.now;
        state.closed = true;
        state.events.push(EngineEvent::Closed { at });
    }

    fn name(&self) -> &str {
        "virtual"
    }
}

struct RenderedSource {
    token: SourceToken,
    buffer: Arc<DecodedBuffer>,
    when: f64,
    offset: f64,
    rate: f64,
    stopped_at: Option<f64>,
}

/// Headless engine on the wall clock
///
/// Sources are timed against a monotonic `Instant`. When a recording path is
/// set, everything that would have been heard is mixed down and written to a
/// mono 16-bit WAV file on close. Without one it only keeps time.
pub struct RealtimeEngine {
    origin: Instant,
    sample_rate: u32,
    recording: Option<PathBuf>,
    sources: Vec<RenderedSource>,
    closed: bool,
}

impl RealtimeEngine {
    pub fn new(sample_rate: u32) -> Self {
        info!("Realtime engine initialized ({}Hz)", sample_rate);
        Self {
            origin: Instant::now(),
            sample_rate,
            recording: None,
            sources: Vec::new(),
            closed: false,
        }
    }

    /// Write the rendered output to `path` when the engine closes
    pub fn with_recording(mut self, path: impl Into<PathBuf>) -> Self {
        self.recording = Some(path.into());
        self
    }

    /// Mix every started source onto one timeline at the engine rate
    fn render(&self) -> Vec<f32> {
        let sr = self.sample_rate as f64;
        let end = self
            .sources
            .iter()
            .map(|s| s.when + Self::audible_secs(s))
            .fold(0.0_f64, f64::max);
        let mut out = vec![0.0_f32; (end * sr).ceil() as usize];

        for source in &self.sources {
            let Some(samples) = source.buffer.channel(0) else {
                continue;
            };
            let step = source.rate * source.buffer.sample_rate() as f64 / sr;
            let first = (source.when * sr).round() as usize;
            let count = (Self::audible_secs(source) * sr) as usize;
            let base = source.offset * source.buffer.sample_rate() as f64;

            for i in 0..count {
                let src = (base + i as f64 * step) as usize;
                let (Some(sample), Some(slot)) = (samples.get(src), out.get_mut(first + i)) else {
                    break;
                };
                *slot += *sample;
            }
        }

        out
    }

    /// Seconds of a source that play before it ends or is stopped
    fn audible_secs(source: &RenderedSource) -> f64 {
        let natural = ((source.buffer.duration() - source.offset) / source.rate).max(0.0);
        match source.stopped_at {
            Some(at) => natural.min((at - source.when).max(0.0)),
            None => natural,
        }
    }

    fn write_recording(&self, path: &PathBuf) -> Result<()> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut writer = hound::WavWriter::create(path, spec)
            .with_context(|| format!("Failed to create WAV file: {:?}", path))?;

        let mixed = self.render();
        for sample in &mixed {
            writer
                .write_sample(codec::float_to_pcm16(*sample))
                .context("Failed to write sample to WAV")?;
        }

        writer.finalize().context("Failed to finalize WAV file")?;

        info!(
            "Rendered {:.1}s of output to {}",
            mixed.len() as f64 / self.sample_rate as f64,
            path.display()
        );

        Ok(())
    }
}

impl AudioEngine for RealtimeEngine {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }

    fn start_source(
        &mut self,
        token: SourceToken,
        buffer: Arc<DecodedBuffer>,
        when: f64,
        offset: f64,
        rate: f64,
    ) {
        if self.closed {
            return;
        }
        debug!(
            "Source {:?} at {:.3}s (offset {:.3}s, rate {:.2}, {:.3}s long)",
            token,
            when,
            offset,
            rate,
            buffer.duration()
        );
        if self.recording.is_some() {
            self.sources.push(RenderedSource {
                token,
                buffer,
                when,
                offset,
                rate,
                stopped_at: None,
            });
        }
    }

    fn stop_source(&mut self, token: SourceToken) {
        let now = self.now();
        if let Some(source) = self
            .sources
            .iter_mut()
            .find(|s| s.token == token && s.stopped_at.is_none())
        {
            source.stopped_at = Some(now);
        }
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        if let Some(path) = self.recording.clone() {
            if let Err(e) = self.write_recording(&path) {
                warn!("Failed to write output recording: {:#}", e);
            }
        }
        self.sources.clear();
    }

    fn name(&self) -> &str {
        "realtime"
    }
}

impl Drop for RealtimeEngine {
    fn drop(&mut self) {
        self.close();
    }
}
