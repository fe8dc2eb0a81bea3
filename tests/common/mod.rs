// Shared test doubles for session, capture and conversation tests
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tutor_voice::audio::codec;
use tutor_voice::transport::{ClientMessage, InboundEvent, SessionSetup, Transport, TransportLink};
use tutor_voice::{MicrophoneBackend, VoiceError};

/// Ordered record of device calls shared between doubles
pub type DeviceLog = Arc<Mutex<Vec<String>>>;

pub fn device_log() -> DeviceLog {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn log_entries(log: &DeviceLog) -> Vec<String> {
    log.lock().unwrap().clone()
}

/// Counters observed by tests
#[derive(Debug, Default)]
pub struct MicProbe {
    pub starts: AtomicUsize,
    pub stops: AtomicUsize,
}

impl MicProbe {
    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

/// Microphone fed by the test through a channel
pub struct ScriptedMicrophone {
    label: String,
    deny: bool,
    blocks: Option<mpsc::Receiver<Vec<f32>>>,
    capturing: bool,
    probe: Arc<MicProbe>,
    log: Option<DeviceLog>,
}

impl ScriptedMicrophone {
    pub fn new() -> (Self, mpsc::Sender<Vec<f32>>, Arc<MicProbe>) {
        let (tx, rx) = mpsc::channel(16);
        let probe = Arc::new(MicProbe::default());
        let mic = Self {
            label: "mic".to_string(),
            deny: false,
            blocks: Some(rx),
            capturing: false,
            probe: Arc::clone(&probe),
            log: None,
        };
        (mic, tx, probe)
    }

    /// A microphone whose permission request is refused
    pub fn denied() -> (Self, Arc<MicProbe>) {
        let (mut mic, _tx, probe) = Self::new();
        mic.deny = true;
        (mic, probe)
    }

    pub fn logging_to(mut self, label: &str, log: DeviceLog) -> Self {
        self.label = label.to_string();
        self.log = Some(log);
        self
    }

    fn record(&self, what: &str) {
        if let Some(log) = &self.log {
            log.lock().unwrap().push(format!("{}:{}", what, self.label));
        }
    }
}

#[async_trait::async_trait]
impl MicrophoneBackend for ScriptedMicrophone {
    async fn start(&mut self) -> Result<mpsc::Receiver<Vec<f32>>, VoiceError> {
        if self.deny {
            return Err(VoiceError::NoMicAccess("Permission denied".to_string()));
        }
        let blocks = self
            .blocks
            .take()
            .ok_or_else(|| VoiceError::NoMicAccess("Already capturing".to_string()))?;

        self.probe.starts.fetch_add(1, Ordering::SeqCst);
        self.capturing = true;
        self.record("start");
        Ok(blocks)
    }

    fn stop(&mut self) {
        self.probe.stops.fetch_add(1, Ordering::SeqCst);
        self.capturing = false;
        self.record("stop");
    }

    fn is_capturing(&self) -> bool {
        self.capturing
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

#[derive(Debug, Default)]
pub struct TransportProbe {
    pub connects: AtomicUsize,
    pub closes: AtomicUsize,
    pub setup: Mutex<Option<SessionSetup>>,
}

impl TransportProbe {
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn setup(&self) -> Option<SessionSetup> {
        self.setup.lock().unwrap().clone()
    }
}

/// The far end of a [`ChannelTransport`], held by the test
pub struct Peer {
    pub events: mpsc::Sender<InboundEvent>,
    pub outbound: mpsc::Receiver<ClientMessage>,
}

/// In-memory transport; the test plays the agent through [`Peer`]
pub struct ChannelTransport {
    reject: Option<String>,
    link: Option<TransportLink>,
    probe: Arc<TransportProbe>,
}

impl ChannelTransport {
    pub fn new(queue_depth: usize) -> (Self, Peer, Arc<TransportProbe>) {
        let (out_tx, out_rx) = mpsc::channel(queue_depth);
        let (in_tx, in_rx) = mpsc::channel(queue_depth);
        let probe = Arc::new(TransportProbe::default());

        let transport = Self {
            reject: None,
            link: Some(TransportLink {
                outbound: out_tx,
                inbound: in_rx,
            }),
            probe: Arc::clone(&probe),
        };
        let peer = Peer {
            events: in_tx,
            outbound: out_rx,
        };
        (transport, peer, probe)
    }

    /// A transport whose handshake is refused with `reason`
    pub fn rejecting(reason: &str) -> (Self, Arc<TransportProbe>) {
        let (mut transport, _peer, probe) = Self::new(4);
        transport.reject = Some(reason.to_string());
        (transport, probe)
    }
}

#[async_trait::async_trait]
impl Transport for ChannelTransport {
    async fn connect(&mut self, setup: &SessionSetup) -> Result<TransportLink, VoiceError> {
        self.probe.connects.fetch_add(1, Ordering::SeqCst);
        *self.probe.setup.lock().unwrap() = Some(setup.clone());

        if let Some(reason) = &self.reject {
            return Err(VoiceError::TransportError(reason.clone()));
        }
        self.link
            .take()
            .ok_or_else(|| VoiceError::TransportError("Already connected".to_string()))
    }

    fn close(&mut self) {
        self.probe.closes.fetch_add(1, Ordering::SeqCst);
    }

    fn name(&self) -> &str {
        "channel"
    }
}

/// Base64 mono PCM16 of `seconds` of a constant level at `sample_rate`
pub fn pcm_chunk(seconds: f64, sample_rate: u32, level: i16) -> String {
    let count = (seconds * sample_rate as f64).round() as usize;
    codec::encode(&codec::pcm16_to_bytes(&vec![level; count]))
}

/// Poll `condition` every few milliseconds until it holds or `timeout` passes
pub async fn wait_until<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}
