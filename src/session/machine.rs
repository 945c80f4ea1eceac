use serde::Serialize;
use tracing::warn;

use crate::protocol::{
    assessment_tool, ClientEvent, Role, ServerEvent, ToolCallEvent, ASSESSMENT_TOOL_NAME,
};

/// Turn-taking state. Exactly one per session; transitions happen only
/// through `TurnMachine`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnState {
    Idle,
    /// Session active, capture inactive, waiting for a cue
    Listening,
    /// Capture active
    Recording,
    /// Buffer committed, response requested, capture inactive
    AwaitingResponse,
}

/// What the driver should do with the capture pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptureAction {
    #[default]
    None,
    Start,
    Stop,
}

/// Ordered side effects of one transition
#[derive(Debug, Default)]
pub struct Effects {
    pub capture: CaptureAction,
    /// Control events to send, in this exact order
    pub outbound: Vec<ClientEvent>,
    /// Completed assessment tool call to hand to the extractor
    pub tool_call: Option<ToolCallEvent>,
}

impl Effects {
    fn none() -> Self {
        Self::default()
    }
}

/// The turn-taking state machine.
///
/// Pure: consumes UI commands and decoded server events, produces effects.
/// The driver owns the only instance and applies effects in order, which
/// keeps outbound events sequenced (audio appends never reorder past a
/// commit).
pub struct TurnMachine {
    state: TurnState,
    /// Most recent recognized user utterance
    transcript: String,
    /// Most recent assistant utterance
    last_utterance: String,
    /// Tool schema declared once per session
    session_configured: bool,
    seed_instructions: Option<String>,
}

impl TurnMachine {
    pub fn new(seed_instructions: Option<String>) -> Self {
        Self {
            state: TurnState::Idle,
            transcript: String::new(),
            last_utterance: String::new(),
            session_configured: false,
            seed_instructions,
        }
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    pub fn transcript(&self) -> &str {
        &self.transcript
    }

    pub fn last_utterance(&self) -> &str {
        &self.last_utterance
    }

    /// Session became active (control channel open). Seeds the configured
    /// system context into the conversation.
    pub fn on_activated(&mut self) -> Effects {
        self.state = TurnState::Listening;
        self.transcript.clear();

        let mut effects = Effects::none();
        if let Some(text) = &self.seed_instructions {
            effects.outbound.push(ClientEvent::SeedContext {
                role: Role::System,
                text: text.clone(),
            });
        }
        effects
    }

    /// Explicit "start recording" command from the UI
    pub fn on_start_recording(&mut self) -> Effects {
        match self.state {
            TurnState::Listening => self.arm_recording(),
            TurnState::Recording => Effects::none(), // idempotent
            state => {
                warn!(?state, "start recording ignored");
                Effects::none()
            }
        }
    }

    /// Explicit "stop recording" command from the UI.
    ///
    /// Commits the audio buffer, then surfaces the recognized transcript as
    /// the user's turn and requests a response. With an empty transcript only
    /// the commit goes out and no response is requested; the turn is dropped.
    pub fn on_stop_recording(&mut self) -> Effects {
        if self.state != TurnState::Recording {
            warn!(state = ?self.state, "stop recording ignored");
            return Effects::none();
        }

        self.state = TurnState::AwaitingResponse;

        let mut effects = Effects {
            capture: CaptureAction::Stop,
            ..Effects::none()
        };
        effects.outbound.push(ClientEvent::CommitAudioBuffer);

        if !self.transcript.is_empty() {
            effects.outbound.push(ClientEvent::CreateTextItem {
                role: Role::User,
                text: self.transcript.clone(),
            });
            effects
                .outbound
                .push(ClientEvent::CreateResponse { instructions: None });
        }

        effects
    }

    /// UI-injected assistant speech
    pub fn on_speak(&mut self, text: String) -> Effects {
        if self.state == TurnState::Idle {
            warn!("speak ignored: session not active");
            return Effects::none();
        }

        Effects {
            outbound: vec![ClientEvent::CreateTextItem {
                role: Role::Assistant,
                text,
            }],
            ..Effects::none()
        }
    }

    /// Deferred response request (assessment follow-up)
    pub fn on_respond(&mut self, instructions: String) -> Effects {
        if self.state == TurnState::Idle {
            return Effects::none();
        }

        Effects {
            outbound: vec![ClientEvent::CreateResponse {
                instructions: Some(instructions),
            }],
            ..Effects::none()
        }
    }

    /// Inbound event demultiplexing, applied regardless of current state
    pub fn on_server_event(&mut self, event: &ServerEvent) -> Effects {
        match event {
            ServerEvent::SessionCreated => {
                if self.session_configured {
                    return Effects::none();
                }
                self.session_configured = true;
                Effects {
                    outbound: vec![ClientEvent::UpdateSessionConfig {
                        tools: vec![assessment_tool()],
                    }],
                    ..Effects::none()
                }
            }
            ServerEvent::ItemCreated {
                role: Role::User,
                text,
            } => {
                self.transcript = text.clone();
                Effects::none()
            }
            ServerEvent::ItemCreated {
                role: Role::Assistant,
                text,
            } => {
                self.last_utterance = text.clone();
                // The assistant finished an utterance: re-arm capture so the
                // human can reply without an explicit UI action.
                match self.state {
                    TurnState::Listening | TurnState::AwaitingResponse => self.arm_recording(),
                    _ => Effects::none(),
                }
            }
            ServerEvent::ItemCreated {
                role: Role::System, ..
            } => Effects::none(),
            ServerEvent::ToolCallDone(call) if call.name == ASSESSMENT_TOOL_NAME => Effects {
                tool_call: Some(call.clone()),
                ..Effects::none()
            },
            ServerEvent::ToolCallDone(_) | ServerEvent::Other { .. } => Effects::none(),
        }
    }

    /// Session stopped or transport lost
    pub fn on_deactivated(&mut self) {
        self.state = TurnState::Idle;
        self.transcript.clear();
    }

    fn arm_recording(&mut self) -> Effects {
        self.transcript.clear();
        self.state = TurnState::Recording;
        Effects {
            capture: CaptureAction::Start,
            ..Effects::none()
        }
    }
}
