use serde::{Deserialize, Serialize};

/// Configuration for one assessment session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Unique session identifier
    pub session_id: String,

    /// System context seeded into the conversation once the session is active
    pub seed_instructions: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_id: format!("session-{}", uuid::Uuid::new_v4()),
            seed_instructions: None,
        }
    }
}
