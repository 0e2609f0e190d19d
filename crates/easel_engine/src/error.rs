use easel_core::ValidationError;

/// Failure of one logical request, after retries where they apply.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    #[error("failed to serialize request body: {0}")]
    Serialization(String),
    #[error("request timed out after {budget_ms} ms")]
    Timeout { budget_ms: u64 },
    #[error("request aborted")]
    Aborted,
    #[error("http status {status}: {body}")]
    Status { status: u16, body: String },
    /// Connection refused, DNS failure, reset before any response.
    #[error("network connection failed: {0}")]
    Connect(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("invalid response body: {0}")]
    Decode(String),
}

impl RequestError {
    /// Explicit aborts are never retried.
    pub fn is_abort(&self) -> bool {
        matches!(self, RequestError::Aborted)
    }

    /// Low-level connectivity failures end polling immediately.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, RequestError::Connect(_))
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Request(#[from] RequestError),
    /// The backend answered with an `{ error }` body.
    #[error("backend rejected the request: {0}")]
    Rejected(String),
    #[error("generation task failed: {task_id}")]
    JobFailed { task_id: String },
    #[error("no terminal status after {ticks} polls ({budget_ms} ms)")]
    PollTimeout { ticks: u32, budget_ms: u64 },
}

/// The durable job slot could not be read or written.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("slot file is corrupt: {0}")]
    Corrupt(String),
    #[error("failed to encode slot: {0}")]
    Encode(String),
}
