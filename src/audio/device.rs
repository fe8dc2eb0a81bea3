// Sound card backends built on cpal
//
// A cpal stream is not `Send` on every host, so each stream is opened and
// kept on its own thread for its whole life. The handles below only hold
// the state shared with the device callback and a way to stop that thread.

use anyhow::{anyhow, bail, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SizedSample};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc as std_mpsc, Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use super::backend::{MicrophoneBackend, MicrophoneConfig};
use super::capture::InputConverter;
use super::engine::{AudioEngine, SourceToken};
use super::frame::DecodedBuffer;
use super::mixer::Mixer;
use crate::error::VoiceError;

/// Thread owning one running stream
struct StreamThread {
    shutdown: Option<std_mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl StreamThread {
    /// Open a stream on a new thread and pass the outcome to `report`
    fn spawn<T, O, R>(name: &str, open: O, report: R) -> Result<Self>
    where
        T: Send + 'static,
        O: FnOnce() -> Result<(cpal::Stream, T)> + Send + 'static,
        R: FnOnce(Result<T>) + Send + 'static,
    {
        let (shutdown_tx, shutdown_rx) = std_mpsc::channel::<()>();

        let thread = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || match open() {
                Ok((stream, value)) => {
                    report(Ok(value));
                    // Wakes when the handle drops its sender
                    let _ = shutdown_rx.recv();
                    drop(stream);
                }
                Err(e) => report(Err(e)),
            })
            .context("Failed to spawn audio thread")?;

        Ok(Self {
            shutdown: Some(shutdown_tx),
            thread: Some(thread),
        })
    }

    fn stop(&mut self) {
        self.shutdown.take();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Audio thread panicked");
            }
        }
    }
}

impl Drop for StreamThread {
    fn drop(&mut self) {
        self.stop();
    }
}

fn lock(mixer: &Mutex<Mixer>) -> MutexGuard<'_, Mixer> {
    mixer.lock().unwrap_or_else(|e| e.into_inner())
}

/// Engine playing through the default output device
///
/// The clock is the number of frames the device has pulled, so scheduled
/// start times line up with what is actually heard.
pub struct DeviceEngine {
    mixer: Arc<Mutex<Mixer>>,
    stream: StreamThread,
    device_name: String,
    closed: bool,
}

impl DeviceEngine {
    /// Open the default output device at its preferred format
    pub fn open() -> Result<Self> {
        let (ready_tx, ready_rx) = std_mpsc::channel();
        let stream = StreamThread::spawn("audio-output", open_output, move |result| {
            let _ = ready_tx.send(result);
        })?;

        let (mixer, device_name) = ready_rx
            .recv()
            .map_err(|_| anyhow!("Audio output thread exited"))??;

        Ok(Self {
            mixer,
            stream,
            device_name,
            closed: false,
        })
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }
}

fn open_output() -> Result<(cpal::Stream, (Arc<Mutex<Mixer>>, String))> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| anyhow!("No output device"))?;
    let name = device.name().unwrap_or_else(|_| "Unknown".to_string());

    let supported = device
        .default_output_config()
        .context("No usable output config")?;
    let format = supported.sample_format();
    let config: cpal::StreamConfig = supported.into();
    let mixer = Arc::new(Mutex::new(Mixer::new(config.sample_rate.0, config.channels)));

    let stream = match format {
        cpal::SampleFormat::F32 => build_output::<f32>(&device, &config, mixer.clone())?,
        cpal::SampleFormat::I16 => build_output::<i16>(&device, &config, mixer.clone())?,
        cpal::SampleFormat::U16 => build_output::<u16>(&device, &config, mixer.clone())?,
        other => bail!("Unsupported output sample format: {:?}", other),
    };
    stream.play().context("Failed to start output stream")?;

    info!(
        "Output device {} ({}Hz, {} ch, {:?})",
        name, config.sample_rate.0, config.channels, format
    );
    Ok((stream, (mixer, name)))
}

fn build_output<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mixer: Arc<Mutex<Mixer>>,
) -> Result<cpal::Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let mut scratch: Vec<f32> = Vec::new();
    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            scratch.resize(data.len(), 0.0);
            lock(&mixer).fill(&mut scratch);
            for (out, sample) in data.iter_mut().zip(&scratch) {
                *out = T::from_sample(*sample);
            }
        },
        |err| error!("Audio output error: {}", err),
        None,
    )?;
    Ok(stream)
}

impl AudioEngine for DeviceEngine {
    fn now(&self) -> f64 {
        lock(&self.mixer).now()
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
            "Source {:?} at {:.3}s (offset {:.3}s, rate {:.2})",
            token, when, offset, rate
        );
        lock(&self.mixer).add(token, buffer, when, offset, rate);
    }

    fn stop_source(&mut self, token: SourceToken) {
        lock(&self.mixer).remove(token);
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        lock(&self.mixer).clear();
        self.stream.stop();
        info!("Output device {} released", self.device_name);
    }

    fn name(&self) -> &str {
        "device"
    }
}

impl Drop for DeviceEngine {
    fn drop(&mut self) {
        self.close();
    }
}

/// Microphone on the default input device
///
/// Device audio is downmixed and resampled to the configured capture rate
/// inside the callback. Blocks that do not fit in the queue are dropped.
pub struct DeviceMicrophone {
    config: MicrophoneConfig,
    stream: Option<StreamThread>,
    dropped: Arc<AtomicUsize>,
}

impl DeviceMicrophone {
    pub fn new(config: MicrophoneConfig) -> Self {
        Self {
            config,
            stream: None,
            dropped: Arc::new(AtomicUsize::new(0)),
        }
    }
}

fn open_input(
    config: &MicrophoneConfig,
    tx: mpsc::Sender<Vec<f32>>,
    dropped: Arc<AtomicUsize>,
) -> Result<(cpal::Stream, String)> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| anyhow!("No input device"))?;
    let name = device.name().unwrap_or_else(|_| "Unknown".to_string());

    let supported = device
        .default_input_config()
        .context("No usable input config")?;
    let format = supported.sample_format();
    let stream_config: cpal::StreamConfig = supported.into();
    let converter = InputConverter::new(
        stream_config.sample_rate.0,
        stream_config.channels,
        config.sample_rate,
        config.block_size,
    );

    let stream = match format {
        cpal::SampleFormat::F32 => {
            build_input::<f32>(&device, &stream_config, converter, tx, dropped)?
        }
        cpal::SampleFormat::I16 => {
            build_input::<i16>(&device, &stream_config, converter, tx, dropped)?
        }
        cpal::SampleFormat::U16 => {
            build_input::<u16>(&device, &stream_config, converter, tx, dropped)?
        }
        other => bail!("Unsupported input sample format: {:?}", other),
    };
    stream.play().context("Failed to start input stream")?;

    info!(
        "Input device {} ({}Hz, {} ch) -> {}Hz mono",
        name, stream_config.sample_rate.0, stream_config.channels, config.sample_rate
    );
    Ok((stream, name))
}

fn build_input<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut converter: InputConverter,
    tx: mpsc::Sender<Vec<f32>>,
    dropped: Arc<AtomicUsize>,
) -> Result<cpal::Stream>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let mut scratch: Vec<f32> = Vec::new();
    let stream = device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            scratch.clear();
            scratch.extend(data.iter().map(|s| f32::from_sample(*s)));
            for block in converter.push(&scratch) {
                if let Err(mpsc::error::TrySendError::Full(_)) = tx.try_send(block) {
                    dropped.fetch_add(1, Ordering::Relaxed);
                }
            }
        },
        |err| error!("Audio input error: {}", err),
        None,
    )?;
    Ok(stream)
}

#[async_trait::async_trait]
impl MicrophoneBackend for DeviceMicrophone {
    async fn start(&mut self) -> Result<mpsc::Receiver<Vec<f32>>, VoiceError> {
        if self.stream.is_some() {
            return Err(VoiceError::NoMicAccess("Already capturing".to_string()));
        }

        let (tx, rx) = mpsc::channel(self.config.queue_depth.max(1));
        let (ready_tx, ready_rx) = oneshot::channel();
        let config = self.config.clone();
        let dropped = self.dropped.clone();

        let stream = StreamThread::spawn(
            "audio-input",
            move || open_input(&config, tx, dropped),
            move |result| {
                let _ = ready_tx.send(result);
            },
        )
        .map_err(|e| VoiceError::NoMicAccess(format!("{:#}", e)))?;

        match ready_rx.await {
            Ok(Ok(name)) => {
                info!("Capturing from {}", name);
                self.stream = Some(stream);
                Ok(rx)
            }
            Ok(Err(e)) => Err(VoiceError::NoMicAccess(format!("{:#}", e))),
            Err(_) => Err(VoiceError::NoMicAccess(
                "Audio input thread exited".to_string(),
            )),
        }
    }

    fn stop(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.stop();
            let dropped = self.dropped.swap(0, Ordering::Relaxed);
            if dropped > 0 {
                warn!("Microphone dropped {} blocks", dropped);
            }
            info!("Microphone released");
        }
    }

    fn is_capturing(&self) -> bool {
        self.stream.is_some()
    }

    fn name(&self) -> &str {
        "device"
    }
}

impl Drop for DeviceMicrophone {
    fn drop(&mut self) {
        self.stop();
    }
}
