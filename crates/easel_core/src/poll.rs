//! Pure polling state machine.
//!
//! The async driver in `easel_engine` owns the clock and the network; this
//! module owns every decision. Per tick the driver calls
//! [`PollMachine::begin_tick`] with the currently tracked job, performs one
//! status request, then feeds the result to [`PollMachine::complete_tick`]
//! together with how long the tick took.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::progress::poll_percent;
use crate::status::is_cancel_shaped;
use crate::{JobId, JobResult, JobResultReply, JobStatus, ProgressSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollPolicy {
    /// Start-to-start period between ticks.
    #[serde(rename = "interval_ms", with = "crate::duration_ms")]
    pub interval: Duration,
    pub max_ticks: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_ticks: 90,
        }
    }
}

impl PollPolicy {
    /// Upper bound on the whole job: `max_ticks * interval`.
    pub fn total_budget(&self) -> Duration {
        self.interval.saturating_mul(self.max_ticks)
    }

    /// Time left to sleep so ticks start exactly `interval` apart.
    pub fn wait_after(&self, elapsed: Duration) -> Duration {
        self.interval.saturating_sub(elapsed)
    }
}

/// Result of one tick's status request, as seen by the machine.
#[derive(Debug, Clone)]
pub enum TickInput {
    Reply(JobResultReply),
    /// The request failed without ending polling by itself.
    Hiccup(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollExit {
    Succeeded(JobResult),
    Failed { task_id: String },
    /// `clear_slot` is set when the backend (not the channel) reported the
    /// cancellation, so the tracked slot still needs clearing.
    Canceled { message: String, clear_slot: bool },
    TimedOut { ticks: u32 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum TickDecision {
    Continue {
        progress: ProgressSnapshot,
        wait: Duration,
    },
    Finish(PollExit),
}

#[derive(Debug, Clone)]
pub struct PollMachine {
    job_id: JobId,
    policy: PollPolicy,
    ticks: u32,
}

impl PollMachine {
    pub fn new(job_id: JobId, policy: PollPolicy) -> Self {
        Self {
            job_id,
            policy,
            ticks: 0,
        }
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    pub fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    pub fn ticks(&self) -> u32 {
        self.ticks
    }

    /// An empty slot or a different job in the slot means this job was
    /// canceled (or superseded) elsewhere.
    pub fn begin_tick(&self, tracked: Option<&JobId>) -> Option<PollExit> {
        if tracked == Some(&self.job_id) {
            None
        } else {
            Some(PollExit::Canceled {
                message: "task canceled".to_string(),
                clear_slot: false,
            })
        }
    }

    pub fn complete_tick(&mut self, input: TickInput, elapsed: Duration) -> TickDecision {
        match input {
            TickInput::Reply(reply) => {
                if let Some(error) = reply.error.clone() {
                    return self.on_hiccup(&error, elapsed);
                }
                match reply.decoded_status() {
                    Some(JobStatus::Success) => {
                        let result = reply.into_result(self.job_id.clone());
                        TickDecision::Finish(PollExit::Succeeded(result))
                    }
                    Some(JobStatus::Failure) => TickDecision::Finish(PollExit::Failed {
                        task_id: reply.task.unwrap_or_else(|| self.job_id.to_string()),
                    }),
                    Some(JobStatus::Canceled) => TickDecision::Finish(PollExit::Canceled {
                        message: "task canceled".to_string(),
                        clear_slot: true,
                    }),
                    Some(JobStatus::UnknownButCancelLike) => {
                        TickDecision::Finish(PollExit::Canceled {
                            message: format!(
                                "task canceled (status: {})",
                                reply.status.as_deref().unwrap_or_default()
                            ),
                            clear_slot: true,
                        })
                    }
                    Some(JobStatus::Pending) | None => self.advance(elapsed),
                }
            }
            TickInput::Hiccup(message) => self.on_hiccup(&message, elapsed),
        }
    }

    fn on_hiccup(&mut self, message: &str, elapsed: Duration) -> TickDecision {
        if is_cancel_shaped(message) {
            return TickDecision::Finish(PollExit::Canceled {
                message: "task canceled".to_string(),
                clear_slot: true,
            });
        }
        self.advance(elapsed)
    }

    fn advance(&mut self, elapsed: Duration) -> TickDecision {
        let percent = poll_percent(self.ticks, self.policy.max_ticks);
        let progress =
            ProgressSnapshot::new(percent, format!("generating... {}%", percent.round()));
        self.ticks += 1;
        if self.ticks >= self.policy.max_ticks {
            return TickDecision::Finish(PollExit::TimedOut { ticks: self.ticks });
        }
        TickDecision::Continue {
            progress,
            wait: self.policy.wait_after(elapsed),
        }
    }
}
