// Integration tests for the duplex session state machine
//
// Sessions run against scripted microphones, in-memory transports and a
// VirtualEngine so every transition and release can be observed.

mod common;

use anyhow::Result;
use common::{pcm_chunk, ChannelTransport, Peer, ScriptedMicrophone};
use std::time::Duration;
use tokio::sync::mpsc;
use tutor_voice::audio::VirtualEngine;
use tutor_voice::transport::{ClientMessage, InboundEvent, TranscriptRole};
use tutor_voice::{
    CaptureConfig, DuplexSession, Personality, SessionConfig, SessionState, Speaker, VoiceError,
};

struct Harness {
    session: DuplexSession,
    engine: VirtualEngine,
    mic_blocks: mpsc::Sender<Vec<f32>>,
    mic: std::sync::Arc<common::MicProbe>,
    peer: Peer,
    transport: std::sync::Arc<common::TransportProbe>,
}

fn test_config() -> SessionConfig {
    SessionConfig {
        session_id: "session-test".to_string(),
        personality: Personality::Caring,
        capture: CaptureConfig {
            sample_rate: 16000,
            frame_size: 4,
        },
        output_sample_rate: 1000,
        reap_interval: Duration::from_millis(10),
        ..SessionConfig::default()
    }
}

fn harness() -> Harness {
    let engine = VirtualEngine::new();
    let (mic, mic_blocks, mic_probe) = ScriptedMicrophone::new();
    let (transport, peer, transport_probe) = ChannelTransport::new(16);
    let session = DuplexSession::new(
        test_config(),
        Box::new(mic),
        Box::new(transport),
        Box::new(engine.clone()),
    );

    Harness {
        session,
        engine,
        mic_blocks,
        mic: mic_probe,
        peer,
        transport: transport_probe,
    }
}

#[tokio::test]
async fn test_mic_denied_goes_straight_to_error() -> Result<()> {
    // Setup: microphone refuses access
    let (mic, mic_probe) = ScriptedMicrophone::denied();
    let (transport, _peer, transport_probe) = ChannelTransport::new(4);
    let engine = VirtualEngine::new();
    let mut session = DuplexSession::new(
        test_config(),
        Box::new(mic),
        Box::new(transport),
        Box::new(engine.clone()),
    );

    let result = session.start().await;

    // Verify: error surfaced, no handshake attempted, nothing released twice
    assert!(matches!(result, Err(VoiceError::NoMicAccess(_))));
    assert_eq!(session.state(), SessionState::Error);
    assert_eq!(transport_probe.connects(), 0);
    assert_eq!(transport_probe.closes(), 0);
    assert_eq!(mic_probe.stops(), 0);
    assert_eq!(session.stats().frames_sent, 0);
    assert_eq!(
        session.failure_message(),
        Some(VoiceError::NoMicAccess(String::new()).user_message())
    );

    // Teardown is idempotent
    session.stop();
    session.fail(VoiceError::TransportError("late".to_string()));
    drop(session);

    assert_eq!(transport_probe.closes(), 0);
    assert_eq!(mic_probe.stops(), 0);
    assert!(engine.is_closed());

    Ok(())
}

#[tokio::test]
async fn test_rejected_handshake_releases_microphone() -> Result<()> {
    let (mic, _blocks, mic_probe) = ScriptedMicrophone::new();
    let (transport, transport_probe) = ChannelTransport::rejecting("bad key");
    let mut session = DuplexSession::new(
        test_config(),
        Box::new(mic),
        Box::new(transport),
        Box::new(VirtualEngine::new()),
    );

    let result = session.start().await;

    assert_eq!(result, Err(VoiceError::TransportError("bad key".to_string())));
    assert_eq!(session.state(), SessionState::Error);
    assert_eq!(mic_probe.starts(), 1);
    assert_eq!(mic_probe.stops(), 1);
    // Never opened, so never closed
    assert_eq!(transport_probe.closes(), 0);

    Ok(())
}

#[tokio::test]
async fn test_start_sends_setup_and_captures() -> Result<()> {
    let mut h = harness();

    assert!(!h.session.is_connected());
    h.session.start().await?;
    assert_eq!(h.session.state(), SessionState::Active);
    assert!(h.session.is_connected());

    let setup = h.transport.setup().expect("setup sent");
    assert_eq!(setup.voice, "Kore");
    assert_eq!(setup.response_sample_rate, 1000);
    assert!(setup.input_transcription && setup.output_transcription);

    h.mic_blocks.send(vec![0.25; 4]).await?;
    let message = tokio::time::timeout(Duration::from_secs(1), h.peer.outbound.recv())
        .await?
        .expect("frame");
    assert!(matches!(message, ClientMessage::RealtimeInput { .. }));

    Ok(())
}

#[tokio::test]
async fn test_inbound_audio_is_gapless() -> Result<()> {
    let mut h = harness();
    h.session.start().await?;

    h.engine.set_time(0.5);
    for _ in 0..3 {
        h.session.handle_event(InboundEvent::Audio {
            data: pcm_chunk(1.0, 1000, 100),
        });
    }

    assert_eq!(h.engine.start_times(), vec![0.5, 1.5, 2.5]);
    assert_eq!(h.session.active_sources(), 3);
    assert_eq!(h.session.stats().chunks_scheduled, 3);

    Ok(())
}

#[tokio::test]
async fn test_interruption_cancels_playback() -> Result<()> {
    let mut h = harness();
    h.session.start().await?;

    for _ in 0..3 {
        h.session.handle_event(InboundEvent::Audio {
            data: pcm_chunk(1.0, 1000, 100),
        });
    }

    h.engine.set_time(1.5);
    h.session.handle_event(InboundEvent::Interrupted);

    assert_eq!(h.session.state(), SessionState::Active);
    assert_eq!(h.session.active_sources(), 0);
    assert_eq!(h.session.next_start(), 1.5);
    assert_eq!(h.engine.stopped_tokens().len(), 3);
    assert_eq!(h.session.stats().interruptions, 1);

    // Audio after the barge-in plays right away
    h.session.handle_event(InboundEvent::Audio {
        data: pcm_chunk(0.5, 1000, 100),
    });
    assert_eq!(h.engine.start_times().last(), Some(&1.5));

    Ok(())
}

#[tokio::test]
async fn test_bad_audio_chunks_are_skipped() -> Result<()> {
    let mut h = harness();
    h.session.start().await?;

    h.session.handle_event(InboundEvent::Audio {
        data: "%%%".to_string(),
    });
    // Three bytes is not a whole PCM16 sample
    h.session.handle_event(InboundEvent::Audio {
        data: tutor_voice::audio::codec::encode(&[1, 2, 3]),
    });

    assert_eq!(h.session.state(), SessionState::Active);
    let stats = h.session.stats();
    assert_eq!(stats.chunks_skipped, 2);
    assert_eq!(stats.chunks_scheduled, 0);

    Ok(())
}

#[tokio::test]
async fn test_transcript_keeps_arrival_order() -> Result<()> {
    let mut h = harness();
    h.session.start().await?;

    h.session.handle_event(InboundEvent::Transcript {
        role: TranscriptRole::Input,
        text: "How do I say hello?".to_string(),
    });
    h.session.handle_event(InboundEvent::Transcript {
        role: TranscriptRole::Output,
        text: "Hola!".to_string(),
    });
    h.session.handle_event(InboundEvent::TurnComplete);

    let speakers: Vec<Speaker> = h.session.transcript().iter().map(|e| e.speaker).collect();
    assert_eq!(speakers, vec![Speaker::Learner, Speaker::Agent]);
    assert_eq!(h.session.recent_transcript(1)[0].text, "Hola!");
    assert_eq!(h.session.stats().transcript_entries, 2);

    Ok(())
}

#[tokio::test]
async fn test_peer_close_releases_everything() -> Result<()> {
    let mut h = harness();
    h.session.start().await?;
    h.session.handle_event(InboundEvent::Audio {
        data: pcm_chunk(1.0, 1000, 100),
    });

    h.session.handle_event(InboundEvent::Closed);

    assert_eq!(h.session.state(), SessionState::Closed);
    assert!(h.session.failure().is_none());
    assert!(!h.session.is_connected());
    assert_eq!(h.mic.stops(), 1);
    assert_eq!(h.transport.closes(), 1);
    assert!(h.engine.is_closed());
    assert_eq!(h.engine.stopped_tokens().len(), 1);

    // Events after close are ignored
    h.session.handle_event(InboundEvent::Audio {
        data: pcm_chunk(1.0, 1000, 100),
    });
    h.session.stop();
    assert_eq!(h.session.stats().chunks_scheduled, 1);
    assert_eq!(h.mic.stops(), 1);
    assert_eq!(h.transport.closes(), 1);

    Ok(())
}

#[tokio::test]
async fn test_peer_error_fails_session() -> Result<()> {
    let mut h = harness();
    h.session.start().await?;

    h.session.handle_event(InboundEvent::Error {
        reason: "quota exceeded".to_string(),
    });

    assert_eq!(h.session.state(), SessionState::Error);
    assert_eq!(
        h.session.failure(),
        Some(&VoiceError::TransportError("quota exceeded".to_string()))
    );
    assert_eq!(h.transport.closes(), 1);

    Ok(())
}

#[tokio::test]
async fn test_malformed_message_fails_session() -> Result<()> {
    let mut h = harness();
    h.session.start().await?;

    h.session
        .handle_event(InboundEvent::parse(r#"{"type":"somethingElse"}"#));

    assert_eq!(h.session.state(), SessionState::Error);
    assert!(matches!(
        h.session.failure(),
        Some(VoiceError::TransportError(_))
    ));

    Ok(())
}

#[tokio::test]
async fn test_run_until_peer_closes() -> Result<()> {
    let mut h = harness();
    h.session.start().await?;

    h.peer
        .events
        .send(InboundEvent::Transcript {
            role: TranscriptRole::Output,
            text: "Bonjour".to_string(),
        })
        .await?;
    h.peer.events.send(InboundEvent::Closed).await?;

    let stats = tokio::time::timeout(
        Duration::from_secs(1),
        h.session.run(std::future::pending::<()>()),
    )
    .await?;

    assert_eq!(stats.state, SessionState::Closed);
    assert_eq!(stats.transcript_entries, 1);
    assert_eq!(h.mic.stops(), 1);

    Ok(())
}

#[tokio::test]
async fn test_run_stops_on_shutdown() -> Result<()> {
    let mut h = harness();
    h.session.start().await?;

    let stats = tokio::time::timeout(Duration::from_secs(1), h.session.run(async {})).await?;

    assert_eq!(stats.state, SessionState::Closed);
    assert_eq!(h.transport.closes(), 1);

    Ok(())
}

#[tokio::test]
async fn test_run_fails_when_stream_ends_without_close() -> Result<()> {
    let mut h = harness();
    h.session.start().await?;

    let Peer { events, outbound } = h.peer;
    drop(events);

    let stats = tokio::time::timeout(
        Duration::from_secs(1),
        h.session.run(std::future::pending::<()>()),
    )
    .await?;

    assert_eq!(stats.state, SessionState::Error);
    drop(outbound);

    Ok(())
}

#[tokio::test]
async fn test_drop_tears_down_live_session() -> Result<()> {
    let mut h = harness();
    h.session.start().await?;

    drop(h.session);

    assert_eq!(h.mic.stops(), 1);
    assert_eq!(h.transport.closes(), 1);
    assert!(h.engine.is_closed());

    Ok(())
}

#[tokio::test]
async fn test_zero_reap_interval_still_runs() -> Result<()> {
    let (mic, _blocks, _mic_probe) = ScriptedMicrophone::new();
    let (transport, peer, transport_probe) = ChannelTransport::new(4);
    let mut session = DuplexSession::new(
        SessionConfig {
            reap_interval: Duration::ZERO,
            ..test_config()
        },
        Box::new(mic),
        Box::new(transport),
        Box::new(VirtualEngine::new()),
    );
    session.start().await?;

    peer.events.send(InboundEvent::TurnComplete).await?;
    let stats = tokio::time::timeout(Duration::from_secs(1), session.run(async {})).await?;

    assert_eq!(stats.state, SessionState::Closed);
    assert_eq!(transport_probe.closes(), 1);

    Ok(())
}

#[tokio::test]
async fn test_stop_before_start_stays_idle() -> Result<()> {
    let mut h = harness();

    h.session.stop();

    assert_eq!(h.session.state(), SessionState::Idle);
    assert!(!h.engine.is_closed());
    assert_eq!(h.mic.stops(), 0);

    // The session can still be started afterwards
    h.session.start().await?;
    assert_eq!(h.session.state(), SessionState::Active);

    Ok(())
}
