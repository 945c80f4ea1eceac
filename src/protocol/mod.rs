//! Wire protocol for the realtime control channel
//!
//! Outbound control intents are serialized into the exact event shapes the
//! remote endpoint expects; inbound messages are parsed into a tagged
//! `ServerEvent` so the turn-taking state machine can match on them
//! exhaustively. Unrecognized event types are retained raw for the event log
//! and otherwise ignored.

pub mod events;
pub mod tools;

pub use events::{decode_event, encode_event, ClientEvent, Role, ServerEvent, ToolCallEvent};
pub use tools::{assessment_tool, AssessmentArgs, ASSESSMENT_TOOL_NAME};
