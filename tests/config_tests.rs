// Integration tests for config layering
//
// Environment variables are process-wide, so every case that touches them
// lives in this one test.

use anyhow::Result;
use std::time::Duration;
use tutor_voice::Config;

#[test]
fn test_environment_overrides_file_and_defaults() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("tutor-voice.toml");
    std::fs::write(
        &path,
        r#"
[capture]
frame_size = 1024

[transport]
url = "ws://from-file:9000/live"
handshake_timeout_secs = 3
"#,
    )?;
    let path = path.to_string_lossy().to_string();

    // File only
    let cfg = Config::load(&path)?;
    assert_eq!(cfg.capture.frame_size, 1024);
    assert_eq!(cfg.transport.url, "ws://from-file:9000/live");

    std::env::set_var("TUTOR__CAPTURE__FRAME_SIZE", "2048");
    std::env::set_var("TUTOR__TRANSPORT__URL", "wss://agent.example/live");
    let cfg = Config::load(&path);
    std::env::remove_var("TUTOR__CAPTURE__FRAME_SIZE");
    std::env::remove_var("TUTOR__TRANSPORT__URL");
    let cfg = cfg?;

    assert_eq!(cfg.capture.frame_size, 2048);
    assert_eq!(cfg.capture().frame_size, 2048);
    assert_eq!(cfg.websocket().url, "wss://agent.example/live");
    // Untouched keys keep the file value, then the default
    assert_eq!(cfg.websocket().handshake_timeout, Duration::from_secs(3));
    assert_eq!(cfg.playback.sample_rate, 24000);

    Ok(())
}
