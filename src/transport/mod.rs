//! Transport to the live conversational agent
//!
//! The session talks to a transport only through two channels: an outbound
//! queue of [`ClientMessage`]s and an inbound stream of [`InboundEvent`]s.
//! `connect` returns once the setup handshake has completed.

pub mod messages;
pub mod websocket;

pub use messages::{
    ClientMessage, InboundEvent, MediaChunk, ServerMessage, SessionSetup, TranscriptRole,
};
pub use websocket::{WebSocketConfig, WebSocketTransport};

use tokio::sync::mpsc;

use crate::error::VoiceError;

/// Channel pair for an open transport
pub struct TransportLink {
    pub outbound: mpsc::Sender<ClientMessage>,
    pub inbound: mpsc::Receiver<InboundEvent>,
}

#[async_trait::async_trait]
pub trait Transport: Send {
    /// Open the connection and complete the setup handshake
    ///
    /// Fails with `TransportError` if the peer is unreachable or rejects the
    /// setup.
    async fn connect(&mut self, setup: &SessionSetup) -> Result<TransportLink, VoiceError>;

    /// Tear the connection down. Safe to call when not connected.
    fn close(&mut self);

    /// Get transport name for logging
    fn name(&self) -> &str;
}
