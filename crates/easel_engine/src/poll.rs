use easel_core::{
    Credential, JobRequestBody, JobResultReply, JobStatus, PollExit, PollMachine, TickDecision,
    TickInput,
};
use easel_logging::{easel_debug, easel_info, easel_warn};
use tokio::time::Instant;

use crate::channel::CancellationChannel;
use crate::client::{RequestClient, RetryPolicy};
use crate::endpoints;
use crate::notify::{report_safely, ProgressReporter};
use crate::RequestError;

/// Ticks below this are always logged in detail, later ones every
/// `DETAIL_EVERY` ticks.
const DETAIL_FIRST: u32 = 3;
const DETAIL_EVERY: u32 = 5;

/// Drives a [`PollMachine`] against the backend: one status request per
/// tick, ticks started a fixed interval apart.
pub struct JobPoller<'a> {
    client: &'a RequestClient,
    channel: &'a CancellationChannel,
    policy: RetryPolicy,
}

impl<'a> JobPoller<'a> {
    pub fn new(
        client: &'a RequestClient,
        channel: &'a CancellationChannel,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            client,
            channel,
            policy,
        }
    }

    /// Poll until the machine finishes. Progress is reported in the overall
    /// 15..95 band. Only a connectivity failure ends the loop with an error.
    pub async fn run(
        &self,
        mut machine: PollMachine,
        credential: &Credential,
        reporter: &dyn ProgressReporter,
    ) -> Result<PollExit, RequestError> {
        let job = machine.job_id().clone();
        easel_info!(
            "polling job {} every {:?} for at most {} ticks",
            job,
            machine.policy().interval,
            machine.policy().max_ticks
        );

        loop {
            let tracked = self.channel.current_job();
            if let Some(exit) = machine.begin_tick(tracked.as_ref()) {
                easel_info!(
                    "job {} is no longer the active job ({}); stopping",
                    job,
                    tracked.as_ref().map_or("none", |id| id.as_str())
                );
                return Ok(exit);
            }

            let tick = machine.ticks();
            let detailed = tick < DETAIL_FIRST || tick % DETAIL_EVERY == 0;
            let started = Instant::now();
            let body = JobRequestBody::new(&job, credential);
            let reply = self
                .client
                .post_as::<JobResultReply, _>(
                    endpoints::JOB_RESULT,
                    &body,
                    Some(&job),
                    &self.policy,
                )
                .await;

            let input = match reply {
                Ok(reply) => {
                    log_reply(tick, &reply, detailed);
                    TickInput::Reply(reply)
                }
                Err(RequestError::Aborted) if !self.channel.is_current_job(&job) => {
                    easel_info!("status request for job {} severed by cancellation", job);
                    return Ok(superseded());
                }
                Err(err) if err.is_connectivity() => {
                    easel_warn!("lost connection while polling job {}: {}", job, err);
                    return Err(err);
                }
                Err(err) => {
                    easel_warn!("tick {} for job {} failed, continuing: {}", tick, job, err);
                    TickInput::Hiccup(err.to_string())
                }
            };

            match machine.complete_tick(input, started.elapsed()) {
                TickDecision::Continue { progress, wait } => {
                    report_safely(reporter, progress.into_overall());
                    tokio::time::sleep(wait).await;
                }
                // The slot may have moved on while the request was in flight;
                // a late terminal reply must not outlive that.
                TickDecision::Finish(_) if !self.channel.is_current_job(&job) => {
                    easel_info!(
                        "job {} was superseded during tick {}; dropping its reply",
                        job,
                        tick
                    );
                    return Ok(superseded());
                }
                TickDecision::Finish(exit) => {
                    easel_info!("job {} finished polling after {} ticks", job, machine.ticks());
                    return Ok(exit);
                }
            }
        }
    }
}

fn superseded() -> PollExit {
    PollExit::Canceled {
        message: "task canceled".to_string(),
        clear_slot: false,
    }
}

fn log_reply(tick: u32, reply: &JobResultReply, detailed: bool) {
    let status = reply.status.as_deref().unwrap_or("<none>");
    if let Some(raw) = reply.status.as_deref() {
        if !JobStatus::is_recognized(raw) {
            easel_warn!("tick {}: unrecognized job status {:?}", tick, raw);
        }
    }
    if detailed {
        easel_info!(
            "tick {}: status={} images={} error={:?}",
            tick,
            status,
            reply.images.len(),
            reply.error
        );
    } else {
        easel_debug!("tick {}: status={}", tick, status);
    }
}
