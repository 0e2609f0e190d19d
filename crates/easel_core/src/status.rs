/// Closed set of outcomes a backend status string decodes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Success,
    Failure,
    Canceled,
    Pending,
    /// Not a recognized token, but it mentions cancellation.
    UnknownButCancelLike,
}

const SUCCESS_TOKENS: &[&str] = &["SUCCESS"];
const FAILURE_TOKENS: &[&str] = &["FAILED", "FAILURE", "ERROR"];
const CANCELED_TOKENS: &[&str] = &["CANCELED", "CANCELLED"];
const PENDING_TOKENS: &[&str] = &["WAITING", "PROCESSING", "PENDING", "QUEUED", "RUNNING"];

impl JobStatus {
    /// Case-insensitive decode. Unrecognized statuses are treated as pending
    /// unless [`is_cancel_shaped`] matches them.
    pub fn decode(raw: &str) -> Self {
        let status = raw.trim().to_uppercase();
        let token = status.as_str();
        if SUCCESS_TOKENS.contains(&token) {
            JobStatus::Success
        } else if FAILURE_TOKENS.contains(&token) {
            JobStatus::Failure
        } else if CANCELED_TOKENS.contains(&token) {
            JobStatus::Canceled
        } else if PENDING_TOKENS.contains(&token) {
            JobStatus::Pending
        } else if is_cancel_shaped(token) {
            // Compatibility shim: the backend's vocabulary is not fully
            // standardized and some cancel states arrive as free text.
            JobStatus::UnknownButCancelLike
        } else {
            JobStatus::Pending
        }
    }

    /// Whether `raw` is one of the enumerated tokens (in any case).
    pub fn is_recognized(raw: &str) -> bool {
        let status = raw.trim().to_uppercase();
        let token = status.as_str();
        [SUCCESS_TOKENS, FAILURE_TOKENS, CANCELED_TOKENS, PENDING_TOKENS]
            .iter()
            .any(|set| set.contains(&token))
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, JobStatus::Pending)
    }
}

/// True when free text (a status or an error message) indicates cancellation.
pub fn is_cancel_shaped(text: &str) -> bool {
    text.to_uppercase().contains("CANCEL") || text.contains("取消")
}
