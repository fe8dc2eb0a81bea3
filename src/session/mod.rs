//! Duplex voice sessions
//!
//! This module provides the `DuplexSession` state machine that manages:
//! - Microphone capture and frame hand-off to the transport
//! - Gapless scheduling of inbound agent audio
//! - Barge-in cancellation
//! - Transcript collection and session statistics
//!
//! `Conversation` keeps at most one session live at a time.

mod config;
mod conversation;
mod session;
mod state;
mod stats;

pub use config::{Personality, SessionConfig};
pub use conversation::Conversation;
pub use session::DuplexSession;
pub use state::SessionState;
pub use stats::{SessionStats, Speaker, TranscriptEntry, TranscriptLog};
