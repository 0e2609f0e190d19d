//! Backend wire bodies built from normalized requests.
//!
//! The backend uses its own field names, some of them non-ASCII; they are
//! collected in [`fields`] so they appear in exactly one place.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::validate::normalize_lora_model;
use crate::{Credential, GenerationRequest, JobId};

pub mod fields {
    pub const CREDENTIAL: &str = "jjddApiKey";
    pub const POSITIVE_PROMPT: &str = "正提示词";
    pub const NEGATIVE_PROMPT: &str = "负提示词";
    pub const MODEL: &str = "sdModel";
    pub const VAE: &str = "sdVae";
    pub const SAMPLER: &str = "sampler";
    pub const SEED: &str = "seed";
    pub const COUNT: &str = "count";
    pub const WIDTH: &str = "width";
    pub const HEIGHT: &str = "height";
    pub const STEPS: &str = "steps";
    pub const CFG_SCALE: &str = "cfgScale";
    pub const CLIP_SKIP: &str = "clipSkip";
    pub const LORA_MODEL_PREFIX: &str = "loraModel";
    pub const LORA_WEIGHT_PREFIX: &str = "weight";
    pub const UPSCALE_SWITCH: &str = "upscaler-switch";
    pub const UPSCALE_MODEL: &str = "hrUpscaler";
    pub const UPSCALE_RESIZE_X: &str = "hrResizeX";
    pub const UPSCALE_RESIZE_Y: &str = "hrResizeY";
    pub const UPSCALE_STEPS: &str = "hrSecondPassSteps";
    pub const UPSCALE_DENOISE: &str = "denoisingStrength";
    pub const JOB_ID: &str = "job_id";
}

pub const MAX_BATCH_COUNT: u32 = 20;
pub const DEFAULT_LORA_WEIGHT: f32 = 0.8;
const DEFAULT_SAMPLER: &str = "Euler";
const DEFAULT_VAE: &str = "ae.sft";

/// Body for `POST /generate` (and `/test_api_key`).
///
/// `extra_text` is appended to the positive prompt as `"{prompt}, {extra}"`.
/// Loras with a blank model are skipped and the rest are numbered from 1.
pub fn build_generation_payload(
    request: &GenerationRequest,
    extra_text: &str,
) -> Map<String, Value> {
    let mut body = Map::new();

    if let Some(credential) = &request.credential {
        body.insert(fields::CREDENTIAL.into(), credential.expose().into());
    }
    body.insert(fields::SEED.into(), request.seed.into());
    body.insert(
        fields::COUNT.into(),
        request.count.clamp(1, MAX_BATCH_COUNT).into(),
    );
    body.insert(fields::WIDTH.into(), request.width.into());
    body.insert(fields::HEIGHT.into(), request.height.into());
    body.insert(
        fields::POSITIVE_PROMPT.into(),
        merge_prompt(&request.prompt, extra_text).into(),
    );
    body.insert(
        fields::NEGATIVE_PROMPT.into(),
        request.negative_prompt.clone().into(),
    );
    body.insert(fields::MODEL.into(), request.model.trim().into());
    body.insert(fields::VAE.into(), or_default(&request.vae, DEFAULT_VAE).into());
    body.insert(
        fields::SAMPLER.into(),
        or_default(&request.sampler, DEFAULT_SAMPLER).into(),
    );
    body.insert(fields::STEPS.into(), request.steps.into());
    body.insert(fields::CFG_SCALE.into(), f64::from(request.cfg_scale).into());
    body.insert(fields::CLIP_SKIP.into(), request.clip_skip.into());

    let loras = request
        .loras
        .iter()
        .filter(|lora| !lora.model.trim().is_empty());
    for (index, lora) in loras.enumerate() {
        let n = index + 1;
        let model = normalize_lora_model(&lora.model)
            .unwrap_or_else(|| lora.model.trim().to_string());
        let weight = if lora.weight.is_finite() {
            lora.weight
        } else {
            DEFAULT_LORA_WEIGHT
        };
        body.insert(format!("{}{n}", fields::LORA_MODEL_PREFIX), model.into());
        body.insert(
            format!("{}{n}", fields::LORA_WEIGHT_PREFIX),
            f64::from(weight).into(),
        );
    }

    if let Some(upscale) = &request.upscale {
        body.insert(fields::UPSCALE_SWITCH.into(), true.into());
        body.insert(
            fields::UPSCALE_MODEL.into(),
            or_default(&upscale.model, "4x-UltraSharp").into(),
        );
        body.insert(fields::UPSCALE_RESIZE_X.into(), upscale.resize_x.into());
        body.insert(fields::UPSCALE_RESIZE_Y.into(), upscale.resize_y.into());
        body.insert(fields::UPSCALE_STEPS.into(), upscale.steps.into());
        body.insert(
            fields::UPSCALE_DENOISE.into(),
            f64::from(upscale.denoising_strength).into(),
        );
    }

    body
}

/// Body shared by `/jobResult` and `/cancelTask`.
#[derive(Debug, Clone, Serialize)]
pub struct JobRequestBody<'a> {
    pub job_id: &'a str,
    #[serde(rename = "jjddApiKey")]
    pub credential: &'a str,
}

impl<'a> JobRequestBody<'a> {
    pub fn new(job_id: &'a JobId, credential: &'a Credential) -> Self {
        Self {
            job_id: job_id.as_str(),
            credential: credential.expose(),
        }
    }
}

/// Body for `/get_stamina`.
#[derive(Debug, Clone, Serialize)]
pub struct CredentialBody<'a> {
    #[serde(rename = "jjddApiKey")]
    pub credential: &'a str,
}

fn merge_prompt(prompt: &str, extra_text: &str) -> String {
    let extra = extra_text.trim();
    if extra.is_empty() {
        prompt.to_string()
    } else {
        format!("{prompt}, {extra}")
    }
}

fn or_default<'a>(value: &'a str, default: &'a str) -> &'a str {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        default
    } else {
        trimmed
    }
}
