use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::state::SessionState;
use crate::transport::TranscriptRole;

/// Statistics about a duplex session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    /// Session identifier
    pub session_id: String,

    /// Current lifecycle state
    pub state: SessionState,

    /// When the session was created
    pub started_at: DateTime<Utc>,

    /// Elapsed time in seconds
    pub duration_secs: f64,

    /// Capture frames handed to the transport
    pub frames_sent: usize,

    /// Capture frames dropped because the transport queue was full
    pub frames_dropped: usize,

    /// Agent audio chunks placed on the output timeline
    pub chunks_scheduled: usize,

    /// Agent audio chunks skipped as undecodable
    pub chunks_skipped: usize,

    /// Barge-in signals handled
    pub interruptions: usize,

    /// Transcript fragments received
    pub transcript_entries: usize,
}

/// Who produced a transcript fragment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    /// The learner
    #[serde(rename = "self")]
    Learner,
    Agent,
}

impl From<TranscriptRole> for Speaker {
    fn from(role: TranscriptRole) -> Self {
        match role {
            TranscriptRole::Input => Speaker::Learner,
            TranscriptRole::Output => Speaker::Agent,
        }
    }
}

/// A single transcript fragment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub speaker: Speaker,

    /// Fragment text as received
    pub text: String,

    /// When this fragment was received
    pub timestamp: DateTime<Utc>,
}

/// Append-only transcript in arrival order
#[derive(Debug, Clone, Default)]
pub struct TranscriptLog {
    entries: Vec<TranscriptEntry>,
}

impl TranscriptLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, speaker: Speaker, text: impl Into<String>) -> &TranscriptEntry {
        self.entries.push(TranscriptEntry {
            speaker,
            text: text.into(),
            timestamp: Utc::now(),
        });
        &self.entries[self.entries.len() - 1]
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    /// The last `n` fragments, oldest first
    pub fn recent(&self, n: usize) -> &[TranscriptEntry] {
        let skip = self.entries.len().saturating_sub(n);
        &self.entries[skip..]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
