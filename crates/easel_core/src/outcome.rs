use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::JobId;

/// Usage/accounting counters attached to a finished job.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct StaminaUsage {
    pub used: f64,
    pub consumed: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobResult {
    pub job_id: JobId,
    pub images: Vec<String>,
    pub usage: StaminaUsage,
    /// Backend-side task identifier, when the backend reports one.
    pub task_id: Option<String>,
}

/// What a caller of `generate` receives when nothing went wrong.
///
/// Cancellation is an expected user action and therefore not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerateOutcome {
    Completed(JobResult),
    Canceled { job_id: JobId, message: String },
}

impl GenerateOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, GenerateOutcome::Completed(_))
    }

    pub fn is_canceled(&self) -> bool {
        matches!(self, GenerateOutcome::Canceled { .. })
    }

    pub fn job_id(&self) -> &JobId {
        match self {
            GenerateOutcome::Completed(result) => &result.job_id,
            GenerateOutcome::Canceled { job_id, .. } => job_id,
        }
    }

    pub fn images(&self) -> &[String] {
        match self {
            GenerateOutcome::Completed(result) => &result.images,
            GenerateOutcome::Canceled { .. } => &[],
        }
    }
}

/// Serializes to the host-facing shapes
/// `{success: true, data, usage, jobId}` and
/// `{success: false, canceled: true, message, jobId}`.
impl Serialize for GenerateOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            GenerateOutcome::Completed(result) => {
                let mut map = serializer.serialize_map(Some(5))?;
                map.serialize_entry("success", &true)?;
                map.serialize_entry("data", &result.images)?;
                map.serialize_entry("usage", &result.usage)?;
                map.serialize_entry("task", &result.task_id)?;
                map.serialize_entry("jobId", &result.job_id)?;
                map.end()
            }
            GenerateOutcome::Canceled { job_id, message } => {
                let mut map = serializer.serialize_map(Some(4))?;
                map.serialize_entry("success", &false)?;
                map.serialize_entry("canceled", &true)?;
                map.serialize_entry("message", message)?;
                map.serialize_entry("jobId", job_id)?;
                map.end()
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StaminaInfo {
    pub used: f64,
    pub total: f64,
    pub last_update: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CredentialProbe {
    pub valid: bool,
    pub message: String,
    pub request_id: Option<String>,
    pub estimated_cost: f64,
    pub used: f64,
    pub total: f64,
}

impl CredentialProbe {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self {
            valid: false,
            message: message.into(),
            request_id: None,
            estimated_cost: 0.0,
            used: 0.0,
            total: 0.0,
        }
    }
}
