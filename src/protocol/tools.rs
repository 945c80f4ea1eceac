use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Name the remote model uses when invoking the assessment tool.
///
/// Matching is by literal string for compatibility with the remote endpoint;
/// any schema change must keep this constant in sync.
pub const ASSESSMENT_TOOL_NAME: &str = "assess_math_answer";

/// Function declaration sent in `session.update` once per session
pub fn assessment_tool() -> Value {
    json!({
        "type": "function",
        "name": ASSESSMENT_TOOL_NAME,
        "description": "Call this function when assessing a student's answer to a math question.",
        "parameters": {
            "type": "object",
            "strict": true,
            "properties": {
                "question": {
                    "type": "string",
                    "description": "The math question that was asked",
                },
                "correctAnswer": {
                    "type": "string",
                    "description": "Detailed correct answer explanation",
                },
                "userAnswer": {
                    "type": "string",
                    "description": "The student's provided answer",
                },
                "score": {
                    "type": "number",
                    "description": "Numerical score between 0-100",
                },
            },
            "required": ["question", "correctAnswer", "userAnswer", "score"],
        },
    })
}

/// Typed argument payload of a completed assessment tool call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssessmentArgs {
    pub question: String,
    #[serde(rename = "correctAnswer")]
    pub correct_answer: String,
    #[serde(rename = "userAnswer")]
    pub user_answer: String,
    pub score: f64,
}
