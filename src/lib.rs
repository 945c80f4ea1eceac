pub mod assessment;
pub mod audio;
pub mod config;
pub mod error;
pub mod http;
pub mod protocol;
pub mod session;
pub mod transport;

pub use assessment::{AssessmentExtractor, AssessmentResult};
pub use audio::{
    AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioFrame, CapturePipeline,
    PlaybackSink,
};
pub use config::Config;
pub use error::{Error, Result};
pub use http::{create_router, AppState};
pub use protocol::{ClientEvent, Role, ServerEvent, ToolCallEvent};
pub use session::{AssessmentSession, SessionConfig, SessionStatus, TurnMachine, TurnState};
pub use transport::{ChannelMessage, Connected, ControlChannel};
