use std::sync::atomic::{AtomicBool, Ordering};

use easel_core::{CancelReply, JobId, JobRequestBody, ValidationError};
use easel_logging::{easel_info, easel_warn};
use serde::Serialize;

use crate::endpoints;
use crate::engine::GenerationEngine;
use crate::notify::{EngineEvent, Notice};

/// Result of [`GenerationEngine::cancel_active`]. Never an error: every
/// variant carries a message fit for the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CancelOutcome {
    /// The backend confirmed; the slot is cleared and the job's in-flight
    /// requests are severed.
    Canceled { job_id: JobId },
    NothingToCancel,
    AlreadyInProgress,
    MissingCredential,
    InvalidCredential,
    /// The backend answered but refused.
    Rejected { job_id: JobId },
    Failed { job_id: JobId, reason: String },
}

impl CancelOutcome {
    pub fn message(&self) -> String {
        match self {
            CancelOutcome::Canceled { .. } => "generation task canceled".to_string(),
            CancelOutcome::NothingToCancel => "no active generation task to cancel".to_string(),
            CancelOutcome::AlreadyInProgress => {
                "cancellation already in progress, please wait".to_string()
            }
            CancelOutcome::MissingCredential => "set a credential first".to_string(),
            CancelOutcome::InvalidCredential => "credential format is invalid".to_string(),
            CancelOutcome::Rejected { .. } => {
                "failed to cancel task; it may have finished or does not exist".to_string()
            }
            CancelOutcome::Failed { reason, .. } => {
                format!("error while canceling task: {reason}")
            }
        }
    }

    pub fn is_canceled(&self) -> bool {
        matches!(self, CancelOutcome::Canceled { .. })
    }

    fn notice(&self) -> Notice {
        match self {
            CancelOutcome::Canceled { .. } => Notice::canceled(self.message()),
            CancelOutcome::NothingToCancel | CancelOutcome::AlreadyInProgress => {
                Notice::info(self.message())
            }
            _ => Notice::error(self.message()),
        }
    }
}

struct CancelGuard<'a>(&'a AtomicBool);

impl Drop for CancelGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl GenerationEngine {
    /// Cancel whatever job the slot tracks.
    ///
    /// A poll loop watching that job stops on its next tick. Calls made
    /// while one is already in flight return `AlreadyInProgress` without
    /// touching the backend.
    pub async fn cancel_active(&self) -> CancelOutcome {
        if self.cancelling.swap(true, Ordering::AcqRel) {
            let outcome = CancelOutcome::AlreadyInProgress;
            self.notifier.notify(outcome.notice());
            return outcome;
        }
        let _guard = CancelGuard(&self.cancelling);

        let outcome = self.cancel_tracked_job().await;
        easel_info!("cancel: {}", outcome.message());
        self.notifier.notify(outcome.notice());
        outcome
    }

    async fn cancel_tracked_job(&self) -> CancelOutcome {
        let tracked = self.channel.current_job();
        let credential = self.credential_for(tracked.as_ref());
        match self.config.credential_rules.check(credential.as_ref()) {
            Ok(()) => {}
            Err(ValidationError::MissingCredential) => return CancelOutcome::MissingCredential,
            Err(_) => return CancelOutcome::InvalidCredential,
        }
        let Some(credential) = credential else {
            return CancelOutcome::MissingCredential;
        };
        let Some(job_id) = tracked else {
            return CancelOutcome::NothingToCancel;
        };

        easel_info!("requesting cancellation of job {}", job_id);
        let body = JobRequestBody::new(&job_id, &credential);
        let reply = self
            .client
            .post_as::<CancelReply, _>(
                endpoints::CANCEL_TASK,
                &body,
                None,
                &self.config.cancel_policy(),
            )
            .await;

        match reply {
            Ok(reply) if reply.success => {
                self.channel.clear_if(&job_id);
                let severed = self.registry().abort_job(&job_id);
                easel_info!("job {} canceled; severed {} in-flight request(s)", job_id, severed);
                self.events.emit(EngineEvent::JobCanceled {
                    job_id: job_id.clone(),
                });
                CancelOutcome::Canceled { job_id }
            }
            Ok(_) => {
                easel_warn!("backend refused to cancel job {}", job_id);
                CancelOutcome::Rejected { job_id }
            }
            Err(err) => CancelOutcome::Failed {
                job_id,
                reason: err.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_confirmed_cancel_is_canceled() {
        let job_id = JobId::from("abc");
        assert!(CancelOutcome::Canceled {
            job_id: job_id.clone()
        }
        .is_canceled());
        assert!(!CancelOutcome::Rejected { job_id }.is_canceled());
        assert!(!CancelOutcome::NothingToCancel.is_canceled());
    }

    #[test]
    fn failure_message_carries_reason() {
        let outcome = CancelOutcome::Failed {
            job_id: JobId::from("abc"),
            reason: "network connection failed: refused".to_string(),
        };
        assert_eq!(
            outcome.message(),
            "error while canceling task: network connection failed: refused"
        );
        assert_eq!(outcome.notice().level, crate::notify::NoticeLevel::Error);
    }
}
