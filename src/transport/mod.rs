//! Realtime transport session
//!
//! Owns the media+control connection to the remote conversational endpoint.
//! Connecting performs, in order: microphone acquisition, control-channel
//! open (the point at which the session counts as active), offer/answer
//! negotiation with the short-lived credential, and playback wiring. Partial
//! failures unwind whatever was already built.

pub mod channel;
pub mod negotiate;
pub mod session;

pub use channel::{ChannelMessage, ControlChannel, WsControlChannel};
pub use session::{connect, Connected};
