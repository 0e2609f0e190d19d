//! Decoding of backend replies.
//!
//! The backend is loose about types: ids may be numbers or strings and
//! counters may arrive as numeric strings. Everything here decodes leniently
//! and falls back to defaults instead of rejecting a reply.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::{JobId, JobResult, JobStatus, StaminaUsage};

/// Reply to `POST /generate`: `{ job_id }` or `{ error }`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerateReply {
    #[serde(default, deserialize_with = "lenient_string")]
    pub job_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub error: Option<String>,
}

/// Reply to `POST /jobResult`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobResultReply {
    #[serde(rename = "状态", alias = "status", default, deserialize_with = "lenient_string")]
    pub status: Option<String>,
    #[serde(default)]
    pub images: Vec<Value>,
    #[serde(rename = "任务", alias = "task", default, deserialize_with = "lenient_string")]
    pub task: Option<String>,
    #[serde(rename = "已用体力", default, deserialize_with = "lenient_number")]
    pub used_stamina: f64,
    #[serde(rename = "消耗体力", default, deserialize_with = "lenient_number")]
    pub consumed_stamina: f64,
    #[serde(default, deserialize_with = "lenient_string")]
    pub error: Option<String>,
}

impl JobResultReply {
    pub fn decoded_status(&self) -> Option<JobStatus> {
        self.status.as_deref().map(JobStatus::decode)
    }

    pub fn into_result(self, job_id: JobId) -> JobResult {
        JobResult {
            job_id,
            images: self.images.iter().filter_map(image_ref).collect(),
            usage: StaminaUsage {
                used: self.used_stamina,
                consumed: self.consumed_stamina,
            },
            task_id: self.task,
        }
    }
}

/// Reply to `POST /cancelTask`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CancelReply {
    #[serde(default)]
    pub success: bool,
}

/// Reply to `POST /get_stamina`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StaminaReply {
    #[serde(default)]
    pub success: bool,
    #[serde(rename = "总体力", default, deserialize_with = "lenient_number")]
    pub total: f64,
    #[serde(rename = "已用体力", default, deserialize_with = "lenient_number")]
    pub used: f64,
    #[serde(default, deserialize_with = "lenient_string")]
    pub last_update_time: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub message: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub error: Option<String>,
}

/// Reply to `POST /test_api_key`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProbeReply {
    #[serde(default)]
    pub success: bool,
    #[serde(default, deserialize_with = "lenient_string")]
    pub message: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub error: Option<String>,
    #[serde(rename = "请求ID", default, deserialize_with = "lenient_string")]
    pub request_id: Option<String>,
    #[serde(rename = "消耗体力", default, deserialize_with = "lenient_number")]
    pub estimated_cost: f64,
    #[serde(rename = "已用体力", default, deserialize_with = "lenient_number")]
    pub used: f64,
    #[serde(rename = "总体力", default, deserialize_with = "lenient_number")]
    pub total: f64,
}

/// Image entries are URLs or base64 strings; objects carrying a `url` or
/// `image` field are accepted too.
fn image_ref(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Object(map) => ["url", "image"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_str))
            .map(str::to_string),
        _ => None,
    }
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) if !s.is_empty() => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}

fn lenient_number<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    })
}
