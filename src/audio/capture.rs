// Capture pipeline: microphone blocks -> fixed-size PCM frames -> transport
//
// Blocks arrive at whatever size the device delivers. They are regrouped
// into frames of exactly `frame_size` samples, converted to i16 PCM, base64
// encoded and handed to the transport queue without waiting on it.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::codec;
use super::frame::AudioFrame;
use crate::transport::ClientMessage;

/// Capture configuration
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Capture sample rate in Hz
    pub sample_rate: u32,
    /// Samples per transmitted frame
    pub frame_size: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            frame_size: 4096,
        }
    }
}

/// Regroups arbitrary float blocks into exact-size mono PCM frames
#[derive(Debug)]
pub struct FrameAssembler {
    sample_rate: u32,
    frame_size: usize,
    pending: Vec<f32>,
    sequence: u64,
}

impl FrameAssembler {
    pub fn new(sample_rate: u32, frame_size: usize) -> Self {
        let frame_size = frame_size.max(1);
        Self {
            sample_rate,
            frame_size,
            pending: Vec::with_capacity(frame_size * 2),
            sequence: 0,
        }
    }

    /// Accumulate a block and return every frame it completes
    pub fn push(&mut self, block: &[f32]) -> Vec<AudioFrame> {
        self.pending.extend_from_slice(block);

        let mut frames = Vec::new();
        while self.pending.len() >= self.frame_size {
            let samples: Vec<i16> = self
                .pending
                .drain(..self.frame_size)
                .map(codec::float_to_pcm16)
                .collect();

            frames.push(AudioFrame::new(samples, self.sample_rate, 1, self.sequence));
            self.sequence += 1;
        }

        frames
    }

    /// Samples waiting for the next frame
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn frames_produced(&self) -> u64 {
        self.sequence
    }
}

/// Conforms raw device input to the capture format
///
/// Interleaved device frames are averaged down to mono, brought to the
/// capture rate by dropping or repeating samples, and cut into blocks of
/// `block_size`.
#[derive(Debug)]
pub struct InputConverter {
    channels: usize,
    /// Device frames per capture sample
    step: f64,
    phase: f64,
    block_size: usize,
    pending: Vec<f32>,
}

impl InputConverter {
    pub fn new(device_rate: u32, channels: u16, capture_rate: u32, block_size: usize) -> Self {
        let block_size = block_size.max(1);
        Self {
            channels: channels.max(1) as usize,
            step: device_rate.max(1) as f64 / capture_rate.max(1) as f64,
            phase: 0.0,
            block_size,
            pending: Vec::with_capacity(block_size * 2),
        }
    }

    /// Feed interleaved device samples, returning every block they complete
    pub fn push(&mut self, interleaved: &[f32]) -> Vec<Vec<f32>> {
        for frame in interleaved.chunks(self.channels) {
            let mono = frame.iter().sum::<f32>() / frame.len() as f32;
            self.phase += 1.0;
            while self.phase >= self.step {
                self.phase -= self.step;
                self.pending.push(mono);
            }
        }

        let mut blocks = Vec::new();
        while self.pending.len() >= self.block_size {
            blocks.push(self.pending.drain(..self.block_size).collect());
        }
        blocks
    }
}

/// Counters shared with the capture task
#[derive(Debug, Default)]
pub struct CaptureStats {
    frames_sent: AtomicUsize,
    frames_dropped: AtomicUsize,
}

impl CaptureStats {
    pub fn frames_sent(&self) -> usize {
        self.frames_sent.load(Ordering::SeqCst)
    }

    pub fn frames_dropped(&self) -> usize {
        self.frames_dropped.load(Ordering::SeqCst)
    }
}

/// Running capture task for one session
pub struct CapturePipeline {
    running: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
    stats: Arc<CaptureStats>,
}

impl CapturePipeline {
    /// Spawn the capture task
    ///
    /// Frames go to `outbound` with `try_send`: a full queue drops the frame,
    /// a closed queue ends capture.
    pub fn spawn(
        config: CaptureConfig,
        mut blocks: mpsc::Receiver<Vec<f32>>,
        outbound: mpsc::Sender<ClientMessage>,
    ) -> Self {
        let running = Arc::new(AtomicBool::new(true));
        let stats = Arc::new(CaptureStats::default());

        let task = {
            let running = Arc::clone(&running);
            let stats = Arc::clone(&stats);

            tokio::spawn(async move {
                info!(
                    "Capture task started ({}Hz, {} samples per frame)",
                    config.sample_rate, config.frame_size
                );
                let mut assembler = FrameAssembler::new(config.sample_rate, config.frame_size);

                'capture: while let Some(block) = blocks.recv().await {
                    if !running.load(Ordering::SeqCst) {
                        break;
                    }

                    for frame in assembler.push(&block) {
                        let message = ClientMessage::from(frame.encode());
                        match outbound.try_send(message) {
                            Ok(()) => {
                                stats.frames_sent.fetch_add(1, Ordering::SeqCst);
                            }
                            Err(mpsc::error::TrySendError::Full(_)) => {
                                let dropped = stats.frames_dropped.fetch_add(1, Ordering::SeqCst) + 1;
                                if dropped == 1 || dropped % 50 == 0 {
                                    warn!(
                                        "Transport queue full, dropped frame {} ({} dropped so far)",
                                        frame.sequence(),
                                        dropped
                                    );
                                }
                            }
                            Err(mpsc::error::TrySendError::Closed(_)) => {
                                debug!("Transport queue closed");
                                break 'capture;
                            }
                        }
                    }
                }

                running.store(false, Ordering::SeqCst);
                info!(
                    "Capture task stopped ({} frames sent, {} dropped)",
                    stats.frames_sent(),
                    stats.frames_dropped()
                );
            })
        };

        Self {
            running,
            task: Some(task),
            stats,
        }
    }

    /// Halt capture immediately. Pending frames are discarded.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> Arc<CaptureStats> {
        Arc::clone(&self.stats)
    }
}

impl Drop for CapturePipeline {
    fn drop(&mut self) {
        self.stop();
    }
}
