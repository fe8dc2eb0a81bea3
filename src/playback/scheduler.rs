// Gapless playback scheduling for inbound agent audio
//
// Chunks are queued back to back on the engine clock in arrival order:
// each starts at max(now, next_start) and advances next_start by its own
// duration. Sources live in the active set until reaped or cancelled.

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use crate::audio::{AudioEngine, DecodedBuffer, SourceToken};

/// A buffer placed on the engine timeline
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledSource {
    pub token: SourceToken,
    /// Engine clock time the source begins
    pub start: f64,
    /// Buffer duration in seconds at rate 1.0
    pub duration: f64,
    pub rate: f64,
}

impl ScheduledSource {
    /// Engine clock time the source finishes on its own
    pub fn end(&self) -> f64 {
        self.start + self.duration / self.rate
    }
}

/// Output clock accumulator plus the set of sources still sounding
#[derive(Debug, Default)]
pub struct PlaybackScheduler {
    next_start: f64,
    active: BTreeMap<SourceToken, ScheduledSource>,
    next_token: u64,
}

impl PlaybackScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `buffer` directly after everything already scheduled
    pub fn schedule(&mut self, engine: &mut dyn AudioEngine, buffer: DecodedBuffer) -> ScheduledSource {
        let now = engine.now();
        let start = now.max(self.next_start);
        let duration = buffer.duration();

        let token = SourceToken(self.next_token);
        self.next_token += 1;

        engine.start_source(token, Arc::new(buffer), start, 0.0, 1.0);

        let source = ScheduledSource {
            token,
            start,
            duration,
            rate: 1.0,
        };
        self.next_start = start + duration;
        self.active.insert(token, source);

        debug!(
            "Scheduled source {} at {:.3}s ({:.3}s long, {} active)",
            token.0,
            start,
            duration,
            self.active.len()
        );
        source
    }

    /// Drop sources that have finished by `now`. Returns how many were removed.
    pub fn reap(&mut self, now: f64) -> usize {
        let before = self.active.len();
        self.active.retain(|_, source| source.end() > now);
        before - self.active.len()
    }

    /// Stop every active source and restart the accumulator at the engine's now
    pub fn cancel_all(&mut self, engine: &mut dyn AudioEngine) -> usize {
        let cancelled = self.active.len();
        for token in self.active.keys() {
            engine.stop_source(*token);
        }
        self.active.clear();
        self.next_start = engine.now();

        if cancelled > 0 {
            debug!("Cancelled {} scheduled sources", cancelled);
        }
        cancelled
    }

    /// Move the accumulator to `now` without touching the active set
    pub fn reset(&mut self, now: f64) {
        self.next_start = now;
    }

    pub fn next_start(&self) -> f64 {
        self.next_start
    }

    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    pub fn active(&self) -> impl Iterator<Item = &ScheduledSource> {
        self.active.values()
    }
}
