//! HTTP API server for the UI (external collaborator)
//!
//! REST entry points into the session core:
//! - POST /session/start - Connect and activate a session
//! - POST /session/stop - Tear the session down
//! - POST /session/record/start - Begin capturing the user's turn
//! - POST /session/record/stop - Commit the turn and request a response
//! - POST /session/say - Inject assistant speech
//! - GET /session/status - Turn state, transcript, counters
//! - GET /session/results - Extracted assessment results
//! - GET /session/events - Debug event log (newest first)
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
