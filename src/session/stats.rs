use chrono::{DateTime, Utc};
use serde::Serialize;

use super::machine::TurnState;

/// Snapshot of a session's state for the UI
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    /// Whether the session is currently active
    pub active: bool,

    /// Current turn-taking state
    pub turn_state: TurnState,

    /// Most recent recognized user utterance
    pub transcript: String,

    /// Most recent assistant utterance
    pub last_utterance: String,

    /// When the session started
    pub started_at: DateTime<Utc>,

    /// Total duration in seconds
    pub duration_secs: f64,

    /// Number of events in the log (inbound + outbound)
    pub events_logged: usize,

    /// Number of assessment results extracted
    pub results_count: usize,
}
