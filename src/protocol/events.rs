use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Conversation role attached to message items
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// Outbound control intents, one wire shape per variant
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// Seed context for the conversation (sent once on session start)
    SeedContext { role: Role, text: String },
    /// A chunk of captured microphone audio
    AppendAudio { samples: Vec<i16> },
    /// Signal that the buffered audio is a complete utterance
    CommitAudioBuffer,
    /// Inject a text turn into the conversation
    CreateTextItem { role: Role, text: String },
    /// Request a model response, optionally with extra instructions
    CreateResponse { instructions: Option<String> },
    /// Declare the tool schema for this session
    UpdateSessionConfig { tools: Vec<Value> },
}

/// Encode a control intent into its wire shape.
///
/// Every encoded message carries an `event_id`; one is generated when the
/// caller does not supply it. Identifiers are never reused within a session.
pub fn encode_event(event: &ClientEvent, event_id: Option<String>) -> Value {
    let mut wire = match event {
        ClientEvent::SeedContext { role, text } => json!({
            "type": "conversation.item.create",
            "item": {
                "type": "message",
                "role": role.as_str(),
                "content": [{ "type": "input_text", "text": text }],
            },
        }),
        ClientEvent::AppendAudio { samples } => json!({
            "type": "input_audio_buffer.append",
            "audio_buffer": samples,
        }),
        ClientEvent::CommitAudioBuffer => json!({
            "type": "input_audio_buffer.commit",
        }),
        ClientEvent::CreateTextItem { role, text } => json!({
            "type": "conversation.item.create",
            "item": {
                "type": "message",
                "role": role.as_str(),
                "content": [{ "type": "text", "text": text }],
            },
        }),
        ClientEvent::CreateResponse { instructions } => match instructions {
            Some(text) => json!({
                "type": "response.create",
                "response": { "instructions": text },
            }),
            None => json!({ "type": "response.create" }),
        },
        ClientEvent::UpdateSessionConfig { tools } => json!({
            "type": "session.update",
            "session": { "tools": tools, "tool_choice": "auto" },
        }),
    };

    let id = event_id.unwrap_or_else(|| Uuid::new_v4().to_string());
    if let Some(object) = wire.as_object_mut() {
        object
            .entry("event_id".to_string())
            .or_insert_with(|| Value::String(id));
    }

    wire
}

/// A completed tool invocation observed on the inbound stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCallEvent {
    pub name: String,
    pub call_id: String,
    /// JSON-encoded argument payload, parsed by the assessment extractor
    pub arguments: String,
}

/// Inbound wire events the state machine recognizes
#[derive(Debug, Clone)]
pub enum ServerEvent {
    SessionCreated,
    /// Conversation item echo whose first content part is text
    ItemCreated { role: Role, text: String },
    /// Completed function call on an output item
    ToolCallDone(ToolCallEvent),
    /// Anything else; retained in the event log, ignored by the machine
    Other { event_type: String },
}

/// Parse an inbound control message.
///
/// Returns the raw value (for the event log) alongside the typed event.
/// Unknown event types are not an error; a non-JSON payload is fatal to the
/// session and reported as `MalformedEventStream`.
pub fn decode_event(raw: &str) -> Result<(Value, ServerEvent)> {
    let value: Value =
        serde_json::from_str(raw).map_err(|e| Error::MalformedEventStream(e.to_string()))?;

    let event_type = value
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let event = match event_type.as_str() {
        "session.created" => ServerEvent::SessionCreated,
        "conversation.item.create" => decode_item(&value)
            .unwrap_or(ServerEvent::Other { event_type }),
        "response.output_item.done" => decode_tool_call(&value)
            .unwrap_or(ServerEvent::Other { event_type }),
        _ => ServerEvent::Other { event_type },
    };

    Ok((value, event))
}

fn decode_item(value: &Value) -> Option<ServerEvent> {
    let item = value.get("item")?;
    let role = match item.get("role")?.as_str()? {
        "system" => Role::System,
        "user" => Role::User,
        "assistant" => Role::Assistant,
        _ => return None,
    };

    let part = item.get("content")?.get(0)?;
    if part.get("type")?.as_str()? != "text" {
        return None;
    }
    let text = part.get("text")?.as_str()?.to_string();

    Some(ServerEvent::ItemCreated { role, text })
}

fn decode_tool_call(value: &Value) -> Option<ServerEvent> {
    let item = value.get("item")?;
    if item.get("type")?.as_str()? != "function_call" {
        return None;
    }
    if item.get("status")?.as_str()? != "completed" {
        return None;
    }

    Some(ServerEvent::ToolCallDone(ToolCallEvent {
        name: item.get("name")?.as_str()?.to_string(),
        call_id: item.get("call_id")?.as_str()?.to_string(),
        arguments: item.get("arguments")?.as_str()?.to_string(),
    }))
}
