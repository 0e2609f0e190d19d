use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Backend-issued identifier of one generation job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for JobId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Caller-supplied secret authorizing generate/status/cancel calls.
///
/// `Debug` never prints the secret; use [`Credential::masked`] for logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// First ten characters followed by `***`.
    pub fn masked(&self) -> String {
        let head: String = self.0.chars().take(10).collect();
        format!("{head}***")
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Credential").field(&"***").finish()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoraEntry {
    /// Numeric model id or a `tensor.art/models/<id>` link.
    pub model: String,
    pub weight: f32,
}

impl LoraEntry {
    pub fn new(model: impl Into<String>, weight: f32) -> Self {
        Self {
            model: model.into(),
            weight,
        }
    }
}

/// Second-pass upscale ("hires fix") settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpscaleSettings {
    pub model: String,
    pub resize_x: u32,
    pub resize_y: u32,
    pub steps: u32,
    pub denoising_strength: f32,
}

impl Default for UpscaleSettings {
    fn default() -> Self {
        Self {
            model: "4x-UltraSharp".to_string(),
            resize_x: 1024,
            resize_y: 1024,
            steps: 20,
            denoising_strength: 0.3,
        }
    }
}

/// Normalized generation parameters, independent of the backend's field names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationRequest {
    pub model: String,
    pub prompt: String,
    pub negative_prompt: String,
    pub width: u32,
    pub height: u32,
    pub count: u32,
    pub steps: u32,
    pub cfg_scale: f32,
    /// `-1` asks the backend for a random seed.
    pub seed: i64,
    pub sampler: String,
    pub vae: String,
    pub clip_skip: u32,
    pub loras: Vec<LoraEntry>,
    pub upscale: Option<UpscaleSettings>,
    pub credential: Option<Credential>,
}

impl Default for GenerationRequest {
    fn default() -> Self {
        Self {
            model: String::new(),
            prompt: String::new(),
            negative_prompt: String::new(),
            width: 512,
            height: 512,
            count: 1,
            steps: 20,
            cfg_scale: 7.0,
            seed: -1,
            sampler: "Euler".to_string(),
            vae: "ae.sft".to_string(),
            clip_skip: 1,
            loras: Vec::new(),
            upscale: None,
            credential: None,
        }
    }
}

impl GenerationRequest {
    pub fn with_credential(mut self, credential: Credential) -> Self {
        self.credential = Some(credential);
        self
    }
}

/// Created once per successful submission; owned by the polling loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle {
    pub job_id: JobId,
    pub submitted_at: DateTime<Utc>,
}

impl JobHandle {
    pub fn new(job_id: JobId) -> Self {
        Self {
            job_id,
            submitted_at: Utc::now(),
        }
    }
}
