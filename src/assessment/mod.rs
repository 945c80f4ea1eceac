//! Assessment result extraction
//!
//! Watches the inbound event stream for completed `assess_math_answer` tool
//! calls, deduplicates them by `call_id`, and keeps the ordered result list
//! the UI renders. After each newly accepted result the session schedules a
//! short-delay spoken follow-up so the conversation does not stall after a
//! structured tool call.

use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::protocol::{AssessmentArgs, ToolCallEvent};

/// Delay before the spoken follow-up response is requested
pub const FOLLOW_UP_DELAY: Duration = Duration::from_millis(500);

/// Instructions for the follow-up response after a recorded assessment
pub const FOLLOW_UP_INSTRUCTIONS: &str =
    "Briefly summarize the assessment you just recorded for the student, \
     mention the score, and ask if they would like to continue.";

/// One extracted assessment, keyed by the tool call's `call_id`
#[derive(Debug, Clone, Serialize)]
pub struct AssessmentResult {
    pub call_id: String,
    pub question: String,
    pub correct_answer: String,
    pub user_answer: String,
    pub score: f64,
    pub received_at: DateTime<Utc>,
}

/// Deduplicating extractor over completed tool calls
#[derive(Debug, Default)]
pub struct AssessmentExtractor {
    seen: HashSet<String>,
    /// Newest first
    results: Vec<AssessmentResult>,
}

impl AssessmentExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Observe a completed tool call.
    ///
    /// Returns `Ok(true)` when a new result was accepted, `Ok(false)` for an
    /// already-seen `call_id` (the first accepted result wins). A payload
    /// that fails to parse is reported as `MalformedToolArguments` and not
    /// retried; the conversation continues.
    pub fn observe(&mut self, call: &ToolCallEvent) -> Result<bool> {
        if self.seen.contains(&call.call_id) {
            debug!(call_id = %call.call_id, "duplicate tool call ignored");
            return Ok(false);
        }

        let args: AssessmentArgs = serde_json::from_str(&call.arguments)
            .map_err(|e| Error::MalformedToolArguments(e.to_string()))?;

        self.seen.insert(call.call_id.clone());
        self.results.insert(
            0,
            AssessmentResult {
                call_id: call.call_id.clone(),
                question: args.question,
                correct_answer: args.correct_answer,
                user_answer: args.user_answer,
                score: args.score,
                received_at: Utc::now(),
            },
        );

        Ok(true)
    }

    /// Extracted results, newest first
    pub fn results(&self) -> &[AssessmentResult] {
        &self.results
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}
