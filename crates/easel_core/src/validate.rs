use std::fmt;
use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::{Credential, GenerationRequest, LoraEntry};

pub const WIDTH_RANGE: RangeInclusive<u32> = 256..=2300;
pub const HEIGHT_RANGE: RangeInclusive<u32> = 256..=3200;
pub const COUNT_RANGE: RangeInclusive<u32> = 1..=4;
pub const STEPS_RANGE: RangeInclusive<u32> = 10..=60;
pub const CFG_SCALE_RANGE: RangeInclusive<f32> = 1.0..=30.0;
pub const CLIP_SKIP_RANGE: RangeInclusive<u32> = 1..=12;
pub const LORA_WEIGHT_RANGE: RangeInclusive<f32> = 0.0..=2.0;

const LORA_HOST: &str = "tensor.art";

/// A precondition that failed before any network call was made.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("credential is missing")]
    MissingCredential,
    #[error("credential format is invalid")]
    MalformedCredential,
    #[error("model id is missing")]
    MissingModel,
    #[error("invalid parameters: {}", join_fields(.0))]
    InvalidParameters(Vec<FieldError>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn join_fields(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Prefix every backend-issued key carries.
pub const CREDENTIAL_PREFIX: &str = "jjdd-";
pub const CREDENTIAL_MIN_LEN: usize = 15;

/// Local format rules for credentials. The defaults match the keys the
/// backend issues; a config file can loosen them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialRules {
    pub required_prefix: Option<String>,
    pub min_len: usize,
}

impl Default for CredentialRules {
    fn default() -> Self {
        Self {
            required_prefix: Some(CREDENTIAL_PREFIX.to_string()),
            min_len: CREDENTIAL_MIN_LEN,
        }
    }
}

impl CredentialRules {
    /// Any non-blank credential.
    pub fn permissive() -> Self {
        Self {
            required_prefix: None,
            min_len: 1,
        }
    }

    pub fn check(&self, credential: Option<&Credential>) -> Result<(), ValidationError> {
        let credential = match credential {
            Some(c) if !c.is_blank() => c,
            _ => return Err(ValidationError::MissingCredential),
        };
        let secret = credential.expose();
        if let Some(prefix) = &self.required_prefix {
            if !secret.starts_with(prefix.as_str()) {
                return Err(ValidationError::MalformedCredential);
            }
        }
        if secret.chars().count() < self.min_len {
            return Err(ValidationError::MalformedCredential);
        }
        Ok(())
    }
}

impl GenerationRequest {
    /// Credential and model are checked first; then every bounded field is
    /// checked and all violations are reported together.
    pub fn validate(&self, rules: &CredentialRules) -> Result<(), ValidationError> {
        rules.check(self.credential.as_ref())?;
        if self.model.trim().is_empty() {
            return Err(ValidationError::MissingModel);
        }

        let mut errors = Vec::new();
        check_range(&mut errors, "width", self.width, &WIDTH_RANGE);
        check_range(&mut errors, "height", self.height, &HEIGHT_RANGE);
        check_range(&mut errors, "count", self.count, &COUNT_RANGE);
        check_range(&mut errors, "steps", self.steps, &STEPS_RANGE);
        check_range(&mut errors, "clip_skip", self.clip_skip, &CLIP_SKIP_RANGE);
        if !self.cfg_scale.is_finite() || !CFG_SCALE_RANGE.contains(&self.cfg_scale) {
            errors.push(out_of_range("cfg_scale", &CFG_SCALE_RANGE));
        }
        if self.seed < -1 {
            errors.push(FieldError::new("seed", "must be -1 (random) or non-negative"));
        }
        for (index, lora) in self.loras.iter().enumerate() {
            errors.extend(validate_lora(index, lora));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::InvalidParameters(errors))
        }
    }
}

fn check_range(errors: &mut Vec<FieldError>, field: &str, value: u32, range: &RangeInclusive<u32>) {
    if !range.contains(&value) {
        errors.push(out_of_range(field, range));
    }
}

fn out_of_range<T: fmt::Display>(field: &str, range: &RangeInclusive<T>) -> FieldError {
    FieldError::new(
        field,
        format!("must be between {} and {}", range.start(), range.end()),
    )
}

fn validate_lora(index: usize, lora: &LoraEntry) -> Vec<FieldError> {
    let mut errors = Vec::new();
    let field = |name: &str| format!("loras[{index}].{name}");
    if lora.model.trim().is_empty() {
        errors.push(FieldError::new(field("model"), "must not be empty"));
    } else if normalize_lora_model(&lora.model).is_none() {
        errors.push(FieldError::new(
            field("model"),
            "must be a numeric id or a tensor.art model link",
        ));
    }
    if !lora.weight.is_finite() || !LORA_WEIGHT_RANGE.contains(&lora.weight) {
        errors.push(out_of_range(&field("weight"), &LORA_WEIGHT_RANGE));
    }
    errors
}

/// Reduce a Lora reference to its numeric model id.
///
/// Accepts a bare id (`"123"`) or a link such as
/// `https://tensor.art/models/123/some-title`, with or without scheme.
pub fn normalize_lora_model(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if is_numeric_id(raw) {
        return Some(raw.to_string());
    }

    let with_scheme = if raw.starts_with("http://") || raw.starts_with("https://") {
        raw.to_string()
    } else {
        format!("https://{raw}")
    };
    let parsed = Url::parse(&with_scheme).ok()?;
    if parsed.host_str() != Some(LORA_HOST) {
        return None;
    }
    let mut segments = parsed.path_segments()?;
    if segments.next() != Some("models") {
        return None;
    }
    let id = segments.next()?;
    is_numeric_id(id).then(|| id.to_string())
}

fn is_numeric_id(value: &str) -> bool {
    !value.is_empty() && value.chars().all(|c| c.is_ascii_digit())
}
