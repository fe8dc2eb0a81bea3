use tracing::info;

use super::session::DuplexSession;
use super::stats::SessionStats;
use crate::error::VoiceError;

/// Holder for the single live session of a learner
///
/// Starting a new session always stops the previous one first, so the
/// microphone and output engine are free before they are acquired again.
#[derive(Default)]
pub struct Conversation {
    current: Option<DuplexSession>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop any current session, then start `session` in its place
    pub async fn begin(&mut self, mut session: DuplexSession) -> Result<&mut DuplexSession, VoiceError> {
        if let Some(stats) = self.end() {
            info!("Replaced session {} ({})", stats.session_id, stats.state);
        }

        session.start().await?;
        Ok(self.current.insert(session))
    }

    /// Stop and release the current session, returning its final stats
    pub fn end(&mut self) -> Option<SessionStats> {
        self.current.take().map(|mut session| {
            session.stop();
            session.stats()
        })
    }

    pub fn current(&self) -> Option<&DuplexSession> {
        self.current.as_ref()
    }

    pub fn current_mut(&mut self) -> Option<&mut DuplexSession> {
        self.current.as_mut()
    }

    pub fn is_live(&self) -> bool {
        self.current
            .as_ref()
            .map(|s| s.state().is_live())
            .unwrap_or(false)
    }
}
