use thiserror::Error;

/// Result type alias for session operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the realtime session core
#[derive(Debug, Error)]
pub enum Error {
    /// Microphone or playback device could not be acquired
    #[error("media acquisition failed: {0}")]
    MediaAcquisition(String),

    /// Transport connection could not be established
    #[error("transport connect failed: {0}")]
    Connect(String),

    /// Offer/answer negotiation with the remote endpoint failed
    #[error("negotiation failed: {0}")]
    Negotiation(String),

    /// Send attempted without an open control channel
    #[error("control channel closed")]
    ChannelClosed,

    /// Undecodable inbound payload; fatal to the session
    #[error("malformed event stream: {0}")]
    MalformedEventStream(String),

    /// Tool call arguments failed to parse; the conversation continues
    #[error("malformed tool arguments: {0}")]
    MalformedToolArguments(String),
}
