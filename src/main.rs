use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, error, info};
use tutor_voice::{
    load_lesson_audio, AudioEngine, Config, Conversation, DuplexSession, MicrophoneBackend,
    Personality, PrerenderedSpeech, RealtimeEngine, SeekablePlayer, SessionConfig,
    WavFileMicrophone, WebSocketTransport,
};
#[cfg(feature = "device")]
use tutor_voice::{DeviceEngine, DeviceMicrophone};

/// Live voice tutoring sessions and lesson playback
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file (without extension); missing files fall back to defaults
    #[arg(long, default_value = "config/tutor-voice")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Hold a live conversation with the tutor
    Talk {
        /// Replay this 16-bit mono WAV instead of the default microphone
        #[arg(long)]
        mic: Option<PathBuf>,

        /// Write the agent's audio to this WAV file instead of the speakers
        #[arg(long)]
        record: Option<PathBuf>,

        /// Tutor persona (friendly, strict, creative, caring, rude)
        #[arg(long, default_value = "friendly")]
        personality: Personality,

        /// System instruction sent with the setup
        #[arg(long)]
        instructions: Option<String>,

        /// Override the transport URL
        #[arg(long)]
        url: Option<String>,
    },

    /// Play lesson narration with seek and speed control
    Lesson {
        /// Base64 PCM text file or 16-bit WAV
        #[arg(long)]
        audio: PathBuf,

        /// Playback speed (0.25 to 4.0)
        #[arg(long, default_value_t = 1.0)]
        rate: f64,

        /// Start position in seconds
        #[arg(long)]
        seek: Option<f64>,

        /// Write the rendered output to this WAV file instead of the speakers
        #[arg(long)]
        record: Option<PathBuf>,
    },
}

/// Speakers by default, a WAV render when `record` is set
fn output_engine(sample_rate: u32, record: Option<PathBuf>) -> Result<Box<dyn AudioEngine>> {
    match record {
        Some(path) => Ok(Box::new(RealtimeEngine::new(sample_rate).with_recording(path))),
        None => speakers(),
    }
}

/// Default microphone, or a WAV replay when `mic` is set
fn microphone(cfg: &Config, mic: Option<PathBuf>) -> Result<Box<dyn MicrophoneBackend>> {
    match mic {
        Some(path) => Ok(Box::new(WavFileMicrophone::new(path, cfg.microphone()))),
        None => default_microphone(cfg),
    }
}

#[cfg(feature = "device")]
fn speakers() -> Result<Box<dyn AudioEngine>> {
    let engine = DeviceEngine::open().context("Failed to open output device")?;
    info!("Playing through {}", engine.device_name());
    Ok(Box::new(engine))
}

#[cfg(not(feature = "device"))]
fn speakers() -> Result<Box<dyn AudioEngine>> {
    anyhow::bail!("Built without the `device` feature; pass --record <wav> to render output")
}

#[cfg(feature = "device")]
fn default_microphone(cfg: &Config) -> Result<Box<dyn MicrophoneBackend>> {
    Ok(Box::new(DeviceMicrophone::new(cfg.microphone())))
}

#[cfg(not(feature = "device"))]
fn default_microphone(_cfg: &Config) -> Result<Box<dyn MicrophoneBackend>> {
    anyhow::bail!("Built without the `device` feature; pass --mic <wav> to replay a file")
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)?;

    info!("{} v{}", cfg.service.name, env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Talk {
            mic,
            record,
            personality,
            instructions,
            url,
        } => talk(&cfg, mic, record, personality, instructions, url).await,
        Commands::Lesson {
            audio,
            rate,
            seek,
            record,
        } => lesson(&cfg, audio, rate, seek, record).await,
    }
}

async fn talk(
    cfg: &Config,
    mic: Option<PathBuf>,
    record: Option<PathBuf>,
    personality: Personality,
    instructions: Option<String>,
    url: Option<String>,
) -> Result<()> {
    let mut ws_config = cfg.websocket();
    if let Some(url) = url {
        ws_config.url = url;
    }

    let microphone = microphone(cfg, mic)?;
    let engine = output_engine(cfg.playback.sample_rate, record)?;

    let session_config = SessionConfig {
        model: cfg.transport.model.clone(),
        personality,
        instructions,
        capture: cfg.capture(),
        output_sample_rate: cfg.playback.sample_rate,
        reap_interval: Duration::from_millis(cfg.playback.reap_interval_ms.max(1)),
        ..SessionConfig::default()
    };

    let session = DuplexSession::new(
        session_config,
        microphone,
        Box::new(WebSocketTransport::new(ws_config)),
        engine,
    );

    let mut conversation = Conversation::new();
    let session = match conversation.begin(session).await {
        Ok(session) => session,
        Err(e) => {
            let message = e.user_message();
            return Err(e).context(message);
        }
    };

    info!("Talking with personality '{}'. Press Ctrl+C to stop.", personality);
    let stats = session
        .run(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await;

    for entry in session.recent_transcript(10) {
        info!("[{:?}] {}", entry.speaker, entry.text);
    }
    if let Some(message) = session.failure_message() {
        error!("{}", message);
    }

    info!("Session stats: {}", serde_json::to_string_pretty(&stats)?);
    conversation.end();

    Ok(())
}

async fn lesson(
    cfg: &Config,
    audio: PathBuf,
    rate: f64,
    seek: Option<f64>,
    record: Option<PathBuf>,
) -> Result<()> {
    let synthesizer = PrerenderedSpeech::new(audio, cfg.playback.sample_rate);
    let buffer = load_lesson_audio(&synthesizer, "", cfg.playback.sample_rate)
        .await
        .context("Failed to load lesson audio")?;

    let engine = output_engine(cfg.playback.sample_rate, record)?;
    let mut player = SeekablePlayer::new(engine);
    player.load(buffer);
    let applied = player.set_rate(rate);
    if let Some(position) = seek {
        player.seek(position)?;
    }
    player.play()?;
    info!(
        "Playing {:.2}s lesson at {}x. Press Ctrl+C to pause.",
        player.duration(),
        applied
    );

    let mut ticker = tokio::time::interval(Duration::from_millis(cfg.player.tick_interval_ms.max(1)));
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let progress = player.tick();
                debug!("{:.2}/{:.2}s", progress.position, progress.duration);
                if !progress.is_playing {
                    info!("Lesson finished");
                    break;
                }
            }
            _ = &mut ctrl_c => {
                player.pause();
                info!("Paused at {:.2}s", player.position());
                break;
            }
        }
    }

    player.close();
    Ok(())
}
