//! Live assessment session management
//!
//! This module provides:
//! - The pure turn-taking state machine (`TurnMachine`) that decides when
//!   capture starts/stops and which control events go out, in what order
//! - The `AssessmentSession` driver that serializes every transition on a
//!   single task fed by the control channel, capture frames, and UI commands
//! - Session status snapshots for the UI

mod config;
mod machine;
#[allow(clippy::module_inception)]
mod session;
mod stats;

pub use config::SessionConfig;
pub use machine::{CaptureAction, Effects, TurnMachine, TurnState};
pub use session::{connect, AssessmentSession, Command};
pub use stats::SessionStatus;
