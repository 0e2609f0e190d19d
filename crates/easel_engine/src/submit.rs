use easel_core::progress::stage;
use easel_core::{
    build_generation_payload, GenerateReply, GenerationRequest, JobHandle, JobId, ProgressSnapshot,
};
use easel_logging::{easel_debug, easel_info, easel_warn};

use crate::endpoints;
use crate::engine::GenerationEngine;
use crate::notify::{report_safely, EngineEvent, ProgressReporter};
use crate::EngineError;

impl GenerationEngine {
    /// Validate, send `POST /generate` and record the returned job as the
    /// active one.
    ///
    /// Validation runs before any network call. A failed durable slot write
    /// does not fail the submission; the job then stays cancelable from this
    /// process only.
    pub async fn submit(
        &self,
        request: &GenerationRequest,
        extra_text: &str,
        progress: &dyn ProgressReporter,
    ) -> Result<JobHandle, EngineError> {
        report_safely(
            progress,
            ProgressSnapshot::new(stage::VALIDATING, "validating parameters"),
        );
        let mut request = request.clone();
        request.credential = self.resolve_credential(&request);
        request.validate(&self.config.credential_rules)?;

        report_safely(
            progress,
            ProgressSnapshot::new(stage::PREPARING, "preparing parameters"),
        );
        let payload = build_generation_payload(&request, extra_text);
        easel_debug!(
            "generation payload for model {} with credential {}: {} fields",
            request.model,
            request
                .credential
                .as_ref()
                .map(|credential| credential.masked())
                .unwrap_or_default(),
            payload.len()
        );

        report_safely(
            progress,
            ProgressSnapshot::new(stage::SENDING, "sending generation request"),
        );
        let reply: GenerateReply = self
            .client
            .post_as(endpoints::GENERATE, &payload, None, &self.config.submit_policy())
            .await?;

        if let Some(error) = reply.error {
            return Err(EngineError::Rejected(error));
        }
        let job_id = reply
            .job_id
            .map(JobId::new)
            .ok_or_else(|| EngineError::Rejected("response carried no job_id".to_string()))?;

        self.remember_submission(&job_id, request.credential.as_ref());
        if let Err(err) = self.channel.record_job(&job_id) {
            easel_warn!(
                "could not persist job {} ({}); cancellation only works from this process",
                job_id,
                err
            );
        }

        let handle = JobHandle::new(job_id);
        easel_info!("submitted job {}", handle.job_id);
        self.events.emit(EngineEvent::JobStarted {
            job_id: handle.job_id.clone(),
            at: handle.submitted_at,
        });
        Ok(handle)
    }
}
