use thiserror::Error;

/// Errors produced by the runtime layer (KV store, broker, arbiter, stream
/// buffer, session cache, orchestrator, pipeline runners).
#[derive(Debug, Clone, Error)]
pub enum RuntimeError {
    /// The KV store did not respond, or responded with a transport error.
    #[error("kv store unavailable: {0}")]
    KvUnavailable(String),

    /// A value read back from the KV store could not be decoded.
    #[error("kv decode error at key '{key}': {message}")]
    KvDecode { key: String, message: String },

    /// GPU admission was refused; the caller should re-enqueue after
    /// `GPU_RETRY_COUNTDOWN`. Not a failure — see spec §7.
    #[error("gpu busy: kind {kind} refused")]
    GpuBusy { kind: String },

    /// The GPU model backend failed to load or run.
    #[error("gpu model failure ({kind}): {message}")]
    GpuModelFailure { kind: String, message: String },

    /// The referenced task does not exist or its record has expired.
    #[error("task not found: {task_id}")]
    TaskNotFound { task_id: String },

    /// The referenced session does not exist.
    #[error("session not found: {session_id}")]
    SessionNotFound { session_id: String },

    /// A peer-node HTTP call failed (transient transport, per spec §7).
    #[error("peer request failed: {0}")]
    PeerRequest(String),

    /// A peer-node HTTP call exceeded its timeout.
    #[error("peer request timed out after {0:?}")]
    PeerTimeout(std::time::Duration),

    /// The LLM backend failed to produce a response.
    #[error("llm backend failed: {0}")]
    LlmFailure(String),

    /// Request validation failed at a boundary (spec §7 "Validation").
    #[error("validation failed: {0}")]
    Validation(String),

    /// An unclassified internal error.
    #[error("internal error: {0}")]
    Internal(String),
}
