// Integration tests for the transport wire format
//
// Messages are JSON objects tagged by "type" with camelCase fields.

use anyhow::Result;
use serde_json::json;
use tutor_voice::audio::AudioFrame;
use tutor_voice::transport::{ClientMessage, InboundEvent, ServerMessage, TranscriptRole};
use tutor_voice::{Personality, SessionConfig};

#[test]
fn test_realtime_input_shape() -> Result<()> {
    let message = ClientMessage::from(AudioFrame::new(vec![0, 1], 16000, 1, 0).encode());

    let value = serde_json::to_value(&message)?;
    assert_eq!(
        value,
        json!({
            "type": "realtimeInput",
            "media": { "mediaType": "audio/pcm;rate=16000", "data": "AAABAA==" }
        })
    );

    Ok(())
}

#[test]
fn test_setup_shape() -> Result<()> {
    let config = SessionConfig {
        model: "tutor-live".to_string(),
        personality: Personality::Strict,
        ..SessionConfig::default()
    };

    let value = serde_json::to_value(ClientMessage::Setup(config.setup()))?;
    assert_eq!(
        value,
        json!({
            "type": "setup",
            "model": "tutor-live",
            "voice": "Puck",
            "inputTranscription": true,
            "outputTranscription": true,
            "responseSampleRate": 24000
        })
    );

    let with_instructions = SessionConfig {
        instructions: Some("Speak slowly.".to_string()),
        ..config
    };
    let value = serde_json::to_value(ClientMessage::Setup(with_instructions.setup()))?;
    assert_eq!(value["instructions"], "Speak slowly.");

    Ok(())
}

#[test]
fn test_parse_server_messages() {
    assert_eq!(
        InboundEvent::parse(r#"{"type":"setupComplete"}"#),
        InboundEvent::SetupComplete
    );
    assert_eq!(
        InboundEvent::parse(r#"{"type":"audio","data":"AAAA"}"#),
        InboundEvent::Audio {
            data: "AAAA".to_string()
        }
    );
    assert_eq!(
        InboundEvent::parse(r#"{"type":"transcript","role":"input","text":"hi"}"#),
        InboundEvent::Transcript {
            role: TranscriptRole::Input,
            text: "hi".to_string()
        }
    );
    assert_eq!(
        InboundEvent::parse(r#"{"type":"interrupted"}"#),
        InboundEvent::Interrupted
    );
    assert_eq!(
        InboundEvent::parse(r#"{"type":"turnComplete"}"#),
        InboundEvent::TurnComplete
    );
    assert_eq!(InboundEvent::parse(r#"{"type":"close"}"#), InboundEvent::Closed);
    assert_eq!(
        InboundEvent::parse(r#"{"type":"error","reason":"denied"}"#),
        InboundEvent::Error {
            reason: "denied".to_string()
        }
    );
}

#[test]
fn test_parse_garbage_is_malformed() {
    for text in ["", "{}", "not json", r#"{"type":"audio"}"#, r#"{"type":"transcript","role":"narrator","text":"x"}"#] {
        assert!(
            matches!(InboundEvent::parse(text), InboundEvent::Malformed { .. }),
            "{:?} should be malformed",
            text
        );
    }
}

#[test]
fn test_server_message_serializes_tagged() -> Result<()> {
    let text = serde_json::to_string(&ServerMessage::Transcript {
        role: TranscriptRole::Output,
        text: "Hola".to_string(),
    })?;

    assert_eq!(text, r#"{"type":"transcript","role":"output","text":"Hola"}"#);
    Ok(())
}
