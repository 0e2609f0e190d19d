use std::sync::atomic::AtomicBool;
use std::sync::{Arc, PoisonError, RwLock};

use easel_core::progress::stage;
use easel_core::{
    build_generation_payload, Credential, CredentialBody, CredentialProbe, GenerateOutcome,
    GenerationRequest, JobId, PollExit, PollMachine, ProbeReply, ProgressSnapshot, StaminaInfo,
    StaminaReply, ValidationError,
};
use easel_logging::{easel_info, easel_warn};

use crate::channel::{CancellationChannel, MemorySlotStore, SlotStore};
use crate::client::RequestClient;
use crate::config::EngineConfig;
use crate::endpoints;
use crate::notify::{
    report_safely, EngineEvent, EventSink, LogNotifier, Notice, Notifier, NullEventSink,
    ProgressReporter,
};
use crate::poll::JobPoller;
use crate::registry::RequestRegistry;
use crate::transport::{ReqwestTransport, Transport};
use crate::{EngineError, RequestError};

/// Reported when the backend omits the stamina total.
pub const DEFAULT_STAMINA_TOTAL: f64 = 10_000.0;

/// Submission, polling and cancellation against one backend.
pub struct GenerationEngine {
    pub(crate) config: EngineConfig,
    pub(crate) client: RequestClient,
    pub(crate) channel: Arc<CancellationChannel>,
    pub(crate) notifier: Arc<dyn Notifier>,
    pub(crate) events: Arc<dyn EventSink>,
    pub(crate) credential: RwLock<Option<Credential>>,
    /// Credential the most recent job was submitted with; kept in memory
    /// only, never in the slot store.
    pub(crate) submitted: RwLock<Option<(JobId, Credential)>>,
    pub(crate) cancelling: AtomicBool,
}

pub struct EngineBuilder {
    config: EngineConfig,
    transport: Option<Arc<dyn Transport>>,
    slot_store: Option<Arc<dyn SlotStore>>,
    notifier: Arc<dyn Notifier>,
    events: Arc<dyn EventSink>,
    credential: Option<Credential>,
}

impl EngineBuilder {
    /// Replace the HTTP transport; defaults to [`ReqwestTransport`] on
    /// `config.base_url`.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Durable slot for the active job; defaults to memory only.
    pub fn slot_store(mut self, store: Arc<dyn SlotStore>) -> Self {
        self.slot_store = Some(store);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn credential(mut self, credential: Credential) -> Self {
        self.credential = Some(credential);
        self
    }

    pub fn build(self) -> Result<GenerationEngine, RequestError> {
        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new(
                &self.config.base_url,
                self.config.transport_settings(),
            )?),
        };
        let store = self
            .slot_store
            .unwrap_or_else(|| Arc::new(MemorySlotStore::new()));
        let client = RequestClient::new(transport, RequestRegistry::new(), self.notifier.clone());

        Ok(GenerationEngine {
            config: self.config,
            client,
            channel: Arc::new(CancellationChannel::new(store)),
            notifier: self.notifier,
            events: self.events,
            credential: RwLock::new(self.credential),
            submitted: RwLock::new(None),
            cancelling: AtomicBool::new(false),
        })
    }
}

impl GenerationEngine {
    pub fn builder(config: EngineConfig) -> EngineBuilder {
        EngineBuilder {
            config,
            transport: None,
            slot_store: None,
            notifier: Arc::new(LogNotifier),
            events: Arc::new(NullEventSink),
            credential: None,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn channel(&self) -> &CancellationChannel {
        &self.channel
    }

    pub fn registry(&self) -> &RequestRegistry {
        self.client.registry()
    }

    /// Credential used for cancel and stamina calls, and for requests that
    /// carry none of their own.
    pub fn set_credential(&self, credential: Option<Credential>) {
        *self
            .credential
            .write()
            .unwrap_or_else(PoisonError::into_inner) = credential;
    }

    pub fn credential(&self) -> Option<Credential> {
        self.credential
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn remember_submission(&self, job_id: &JobId, credential: Option<&Credential>) {
        let entry = credential.map(|credential| (job_id.clone(), credential.clone()));
        *self
            .submitted
            .write()
            .unwrap_or_else(PoisonError::into_inner) = entry;
    }

    /// Credential for acting on `job_id`: the one it was submitted with,
    /// falling back to the engine's.
    pub(crate) fn credential_for(&self, job_id: Option<&JobId>) -> Option<Credential> {
        let submitted = self
            .submitted
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .filter(|(submitted_job, _)| Some(submitted_job) == job_id)
            .map(|(_, credential)| credential.clone());
        submitted.or_else(|| self.credential())
    }

    pub(crate) fn resolve_credential(&self, request: &GenerationRequest) -> Option<Credential> {
        request
            .credential
            .clone()
            .filter(|credential| !credential.is_blank())
            .or_else(|| self.credential())
    }

    /// Submit `request`, poll it to a terminal outcome and report progress
    /// along the way.
    ///
    /// Cancellation is returned as [`GenerateOutcome::Canceled`]. Every
    /// error is also reported as an error notice and a `-1` progress update.
    pub async fn generate(
        &self,
        request: &GenerationRequest,
        extra_text: &str,
        progress: &dyn ProgressReporter,
    ) -> Result<GenerateOutcome, EngineError> {
        let result = self.run_generation(request, extra_text, progress).await;
        match &result {
            Ok(GenerateOutcome::Completed(done)) => {
                report_safely(progress, ProgressSnapshot::new(stage::DONE, "generation complete"));
                easel_info!("job {} produced {} image(s)", done.job_id, done.images.len());
            }
            Ok(GenerateOutcome::Canceled { job_id, message }) => {
                report_safely(progress, ProgressSnapshot::new(stage::DONE, message.clone()));
                easel_info!("job {} canceled: {}", job_id, message);
                self.notifier.notify(Notice::canceled(message.clone()));
            }
            Err(err) => {
                report_safely(progress, ProgressSnapshot::error(err.to_string()));
                self.notifier
                    .notify(Notice::error(format!("image generation failed: {err}")));
            }
        }
        result
    }

    async fn run_generation(
        &self,
        request: &GenerationRequest,
        extra_text: &str,
        progress: &dyn ProgressReporter,
    ) -> Result<GenerateOutcome, EngineError> {
        let handle = self.submit(request, extra_text, progress).await?;
        let job_id = handle.job_id.clone();
        let credential = self
            .resolve_credential(request)
            .ok_or(ValidationError::MissingCredential)?;

        report_safely(progress, ProgressSnapshot::new(stage::GENERATING, "generating"));
        let poller = JobPoller::new(&self.client, &self.channel, self.config.poll_request_policy());
        let machine = PollMachine::new(job_id.clone(), self.config.poll);
        let exit = poller.run(machine, &credential, progress).await?;

        match exit {
            PollExit::Succeeded(result) => {
                self.channel.clear_if(&job_id);
                self.events.emit(EngineEvent::JobFinished {
                    job_id,
                    success: true,
                });
                Ok(GenerateOutcome::Completed(result))
            }
            PollExit::Failed { task_id } => {
                self.channel.clear_if(&job_id);
                self.events.emit(EngineEvent::JobFinished {
                    job_id,
                    success: false,
                });
                Err(EngineError::JobFailed { task_id })
            }
            PollExit::Canceled {
                message,
                clear_slot,
            } => {
                if clear_slot {
                    self.channel.clear_if(&job_id);
                    self.events.emit(EngineEvent::JobCanceled {
                        job_id: job_id.clone(),
                    });
                }
                Ok(GenerateOutcome::Canceled { job_id, message })
            }
            PollExit::TimedOut { ticks } => {
                easel_warn!(
                    "job {} still running after {} ticks; leaving it cancelable",
                    job_id,
                    ticks
                );
                let budget = self.config.poll.total_budget();
                Err(EngineError::PollTimeout {
                    ticks,
                    budget_ms: u64::try_from(budget.as_millis()).unwrap_or(u64::MAX),
                })
            }
        }
    }

    /// Current usage counters for the configured credential.
    pub async fn check_stamina(&self) -> Result<StaminaInfo, EngineError> {
        let credential = self.credential();
        self.config.credential_rules.check(credential.as_ref())?;
        let credential = credential.ok_or(ValidationError::MissingCredential)?;

        let body = CredentialBody {
            credential: credential.expose(),
        };
        let reply: StaminaReply = self
            .client
            .post_as(endpoints::GET_STAMINA, &body, None, &self.config.stamina_policy())
            .await?;

        if let Some(error) = reply.error {
            return Err(EngineError::Rejected(error));
        }
        if !reply.success {
            return Err(EngineError::Rejected(
                reply
                    .message
                    .unwrap_or_else(|| "failed to fetch stamina".to_string()),
            ));
        }
        Ok(StaminaInfo {
            used: reply.used,
            total: if reply.total > 0.0 {
                reply.total
            } else {
                DEFAULT_STAMINA_TOTAL
            },
            last_update: reply.last_update_time,
        })
    }

    /// Ask the backend whether `request` would be accepted and what it would
    /// cost. Never fails; problems come back as an invalid probe.
    pub async fn probe_credential(&self, request: &GenerationRequest) -> CredentialProbe {
        let credential = self.resolve_credential(request);
        if let Err(err) = self.config.credential_rules.check(credential.as_ref()) {
            return CredentialProbe::invalid(err.to_string());
        }
        if request.model.trim().is_empty() {
            return CredentialProbe::invalid(ValidationError::MissingModel.to_string());
        }

        let mut request = request.clone();
        request.credential = credential;
        let payload = build_generation_payload(&request, "");
        let reply: ProbeReply = match self
            .client
            .post_as(endpoints::TEST_API_KEY, &payload, None, &self.config.probe_policy())
            .await
        {
            Ok(reply) => reply,
            Err(err) => return CredentialProbe::invalid(err.to_string()),
        };

        if let Some(error) = reply.error {
            return CredentialProbe::invalid(error);
        }
        if !reply.success {
            return CredentialProbe::invalid(
                reply.message.unwrap_or_else(|| "probe failed".to_string()),
            );
        }
        CredentialProbe {
            valid: true,
            message: format!("credential is valid; estimated cost {}", reply.estimated_cost),
            request_id: reply.request_id,
            estimated_cost: reply.estimated_cost,
            used: reply.used,
            total: if reply.total > 0.0 {
                reply.total
            } else {
                DEFAULT_STAMINA_TOTAL
            },
        }
    }
}
