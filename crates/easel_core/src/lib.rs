//! Easel core: request model, validation, wire payloads, status decoding and
//! the pure polling state machine. No IO happens in this crate.
pub mod duration_ms;
mod outcome;
pub mod payload;
mod poll;
pub mod progress;
mod reply;
mod request;
mod status;
mod validate;

pub use outcome::{CredentialProbe, GenerateOutcome, JobResult, StaminaInfo, StaminaUsage};
pub use payload::{build_generation_payload, CredentialBody, JobRequestBody};
pub use poll::{PollExit, PollMachine, PollPolicy, TickDecision, TickInput};
pub use progress::{poll_percent, ProgressSnapshot, ERROR_PERCENT};
pub use reply::{CancelReply, GenerateReply, JobResultReply, ProbeReply, StaminaReply};
pub use request::{Credential, GenerationRequest, JobHandle, JobId, LoraEntry, UpscaleSettings};
pub use status::{is_cancel_shaped, JobStatus};
pub use validate::{
    normalize_lora_model, CredentialRules, FieldError, ValidationError, CFG_SCALE_RANGE,
    CLIP_SKIP_RANGE, COUNT_RANGE, CREDENTIAL_MIN_LEN, CREDENTIAL_PREFIX, HEIGHT_RANGE,
    LORA_WEIGHT_RANGE, STEPS_RANGE, WIDTH_RANGE,
};
