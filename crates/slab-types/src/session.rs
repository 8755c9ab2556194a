use serde::{Deserialize, Serialize};

/// Speaker role of a cached chat turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One message in a session's rolling window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

/// `{session_id, summary, messages}` (spec §3 "Session context").
///
/// Invariant: `messages.len() <= N_WINDOW` after any orchestrator step. The
/// oldest pair is consumed by a re-summary task and removed when the window
/// is exceeded — see `slab-session`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SessionContext {
    pub summary: Option<String>,
    pub messages: Vec<ChatTurn>,
}

impl SessionContext {
    pub fn new(summary: Option<String>, messages: Vec<ChatTurn>) -> Self {
        Self { summary, messages }
    }
}
