use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::config::SessionConfig;
use super::state::SessionState;
use super::stats::{SessionStats, Speaker, TranscriptEntry, TranscriptLog};
use crate::audio::{codec, AudioEngine, CapturePipeline, CaptureStats, MicrophoneBackend};
use crate::error::VoiceError;
use crate::playback::PlaybackScheduler;
use crate::transport::{ClientMessage, InboundEvent, Transport};

/// A live two-way voice session with the agent
///
/// Owns the microphone, the transport and the output engine for its whole
/// lifetime. Whatever was acquired is released exactly once, on `stop`, on
/// failure, or on drop.
pub struct DuplexSession {
    config: SessionConfig,
    state: SessionState,

    microphone: Box<dyn MicrophoneBackend>,
    transport: Box<dyn Transport>,
    engine: Box<dyn AudioEngine>,

    scheduler: PlaybackScheduler,
    capture: Option<CapturePipeline>,
    capture_stats: Option<Arc<CaptureStats>>,
    outbound: Option<mpsc::Sender<ClientMessage>>,
    inbound: Option<mpsc::Receiver<InboundEvent>>,

    transcript: TranscriptLog,
    started_at: DateTime<Utc>,
    failure: Option<VoiceError>,

    // Teardown bookkeeping
    mic_acquired: bool,
    transport_open: bool,
    engine_closed: bool,

    chunks_scheduled: usize,
    chunks_skipped: usize,
    interruptions: usize,
}

impl DuplexSession {
    pub fn new(
        config: SessionConfig,
        microphone: Box<dyn MicrophoneBackend>,
        transport: Box<dyn Transport>,
        engine: Box<dyn AudioEngine>,
    ) -> Self {
        info!(
            "Creating session {} (mic: {}, transport: {}, engine: {})",
            config.session_id,
            microphone.name(),
            transport.name(),
            engine.name()
        );

        Self {
            config,
            state: SessionState::Idle,
            microphone,
            transport,
            engine,
            scheduler: PlaybackScheduler::new(),
            capture: None,
            capture_stats: None,
            outbound: None,
            inbound: None,
            transcript: TranscriptLog::new(),
            started_at: Utc::now(),
            failure: None,
            mic_acquired: false,
            transport_open: false,
            engine_closed: false,
            chunks_scheduled: 0,
            chunks_skipped: 0,
            interruptions: 0,
        }
    }

    /// Acquire the microphone, complete the handshake and start capture
    ///
    /// On failure the session is left in `Error` with everything it acquired
    /// released.
    pub async fn start(&mut self) -> Result<(), VoiceError> {
        if self.state != SessionState::Idle {
            warn!("Session {} already started ({})", self.config.session_id, self.state);
            return Ok(());
        }

        self.transition(SessionState::Connecting);

        let blocks = match self.microphone.start().await {
            Ok(blocks) => {
                self.mic_acquired = true;
                blocks
            }
            Err(e) => {
                self.fail(e.clone());
                return Err(e);
            }
        };

        let setup = self.config.setup();
        let link = match self.transport.connect(&setup).await {
            Ok(link) => {
                self.transport_open = true;
                link
            }
            Err(e) => {
                self.fail(e.clone());
                return Err(e);
            }
        };

        let capture = CapturePipeline::spawn(self.config.capture.clone(), blocks, link.outbound.clone());
        self.capture_stats = Some(capture.stats());
        self.capture = Some(capture);
        self.outbound = Some(link.outbound);
        self.inbound = Some(link.inbound);

        self.scheduler.reset(self.engine.now());
        self.transition(SessionState::Active);
        info!("Session {} active (voice: {})", self.config.session_id, setup.voice);

        Ok(())
    }

    /// Apply one inbound event to the state machine
    pub fn handle_event(&mut self, event: InboundEvent) {
        if !self.state.is_live() {
            debug!("Ignoring {:?} in state {}", event, self.state);
            return;
        }

        match event {
            InboundEvent::SetupComplete => {
                debug!("Duplicate setup acknowledgement");
            }
            InboundEvent::Audio { data } => self.schedule_chunk(&data),
            InboundEvent::Transcript { role, text } => {
                let speaker = Speaker::from(role);
                debug!("Transcript ({:?}): {}", speaker, text);
                self.transcript.push(speaker, text);
            }
            InboundEvent::Interrupted => self.interrupt(),
            InboundEvent::TurnComplete => {
                info!("Agent turn complete");
            }
            InboundEvent::Closed => {
                info!("Peer closed session {}", self.config.session_id);
                self.stop();
            }
            InboundEvent::Error { reason } => {
                self.fail(VoiceError::TransportError(reason));
            }
            InboundEvent::Malformed { reason } => {
                self.fail(VoiceError::TransportError(format!(
                    "malformed message: {}",
                    reason
                )));
            }
        }
    }

    /// Drive the session until it closes, fails or `shutdown` resolves
    pub async fn run<F>(&mut self, shutdown: F) -> SessionStats
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let Some(mut inbound) = self.inbound.take() else {
            warn!("Session {} is not connected", self.config.session_id);
            return self.stats();
        };
        // interval() rejects a zero period
        let period = self.config.reap_interval.max(Duration::from_millis(1));
        let mut reap = tokio::time::interval(period);

        while self.state.is_live() {
            tokio::select! {
                event = inbound.recv() => match event {
                    Some(event) => self.handle_event(event),
                    None => self.fail(VoiceError::TransportError(
                        "inbound stream ended without close".to_string(),
                    )),
                },
                _ = reap.tick() => {
                    self.reap_finished();
                }
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    self.stop();
                }
            }
        }

        self.stats()
    }

    /// Remove sources that have finished playing
    pub fn reap_finished(&mut self) -> usize {
        let now = self.engine.now();
        self.scheduler.reap(now)
    }

    /// End the session normally. A session that never started stays `Idle`.
    pub fn stop(&mut self) {
        if self.state.is_terminal() || self.state == SessionState::Idle {
            return;
        }
        info!("Stopping session {}", self.config.session_id);
        self.teardown();
        self.transition(SessionState::Closed);
    }

    /// End the session with a failure. The first failure wins.
    pub fn fail(&mut self, err: VoiceError) {
        if self.state.is_terminal() {
            return;
        }
        error!("Session {} failed: {}", self.config.session_id, err);
        self.failure = Some(err);
        self.teardown();
        self.transition(SessionState::Error);
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn session_id(&self) -> &str {
        &self.config.session_id
    }

    pub fn failure(&self) -> Option<&VoiceError> {
        self.failure.as_ref()
    }

    /// Single message suitable for showing the learner
    pub fn failure_message(&self) -> Option<&'static str> {
        self.failure.as_ref().map(|e| e.user_message())
    }

    pub fn transcript(&self) -> &[TranscriptEntry] {
        self.transcript.entries()
    }

    pub fn recent_transcript(&self, n: usize) -> &[TranscriptEntry] {
        self.transcript.recent(n)
    }

    /// Transport outbound queue is still open
    pub fn is_connected(&self) -> bool {
        self.outbound.as_ref().is_some_and(|tx| !tx.is_closed())
    }

    pub fn active_sources(&self) -> usize {
        self.scheduler.active_len()
    }

    pub fn next_start(&self) -> f64 {
        self.scheduler.next_start()
    }

    pub fn stats(&self) -> SessionStats {
        let duration = Utc::now().signed_duration_since(self.started_at);
        let (frames_sent, frames_dropped) = self
            .capture_stats
            .as_ref()
            .map(|s| (s.frames_sent(), s.frames_dropped()))
            .unwrap_or((0, 0));

        SessionStats {
            session_id: self.config.session_id.clone(),
            state: self.state,
            started_at: self.started_at,
            duration_secs: duration.num_milliseconds() as f64 / 1000.0,
            frames_sent,
            frames_dropped,
            chunks_scheduled: self.chunks_scheduled,
            chunks_skipped: self.chunks_skipped,
            interruptions: self.interruptions,
            transcript_entries: self.transcript.len(),
        }
    }

    fn schedule_chunk(&mut self, data: &str) {
        let decoded = codec::decode(data).and_then(|bytes| {
            codec::decode_audio_data(&bytes, self.config.output_sample_rate, 1)
        });

        match decoded {
            Ok(buffer) if buffer.frames() == 0 => {
                debug!("Skipping empty audio chunk");
            }
            Ok(buffer) => {
                self.scheduler.schedule(self.engine.as_mut(), buffer);
                self.chunks_scheduled += 1;
            }
            Err(e) => {
                self.chunks_skipped += 1;
                warn!("Skipping audio chunk: {}", e);
            }
        }
    }

    fn interrupt(&mut self) {
        self.transition(SessionState::Interrupted);
        let cancelled = self.scheduler.cancel_all(self.engine.as_mut());
        self.interruptions += 1;
        info!("Interrupted: cancelled {} source(s)", cancelled);
        self.transition(SessionState::Active);
    }

    fn teardown(&mut self) {
        if let Some(mut capture) = self.capture.take() {
            capture.stop();
        }

        if self.mic_acquired {
            self.microphone.stop();
            self.mic_acquired = false;
            debug!("Released microphone");
        }

        self.outbound = None;
        self.inbound = None;

        if self.transport_open {
            self.transport.close();
            self.transport_open = false;
            debug!("Closed transport");
        }

        if !self.engine_closed {
            self.scheduler.cancel_all(self.engine.as_mut());
            self.engine.close();
            self.engine_closed = true;
            debug!("Closed output engine");
        }
    }

    fn transition(&mut self, next: SessionState) {
        debug!("Session {}: {} -> {}", self.config.session_id, self.state, next);
        self.state = next;
    }
}

impl Drop for DuplexSession {
    fn drop(&mut self) {
        if !self.state.is_terminal() {
            self.teardown();
        }
    }
}
