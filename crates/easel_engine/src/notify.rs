//! Outward-facing hooks: user notices, lifecycle events and progress.
//!
//! The engine never renders anything itself. Hosts inject implementations of
//! these traits; the defaults here only log or drop.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc;

use chrono::{DateTime, Utc};
use easel_core::{JobId, ProgressSnapshot};
use easel_logging::{easel_error, easel_info, easel_warn};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Error,
    Info,
    /// Cancellation is reported distinctly from both errors and info.
    Canceled,
}

/// A transient, dismissible message for the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    pub fn canceled(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Canceled,
            message: message.into(),
        }
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Routes notices into the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notice: Notice) {
        match notice.level {
            NoticeLevel::Error => easel_error!("{}", notice.message),
            NoticeLevel::Info | NoticeLevel::Canceled => easel_info!("{}", notice.message),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    JobStarted {
        job_id: JobId,
        at: DateTime<Utc>,
    },
    JobCanceled {
        job_id: JobId,
    },
    JobFinished {
        job_id: JobId,
        success: bool,
    },
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: EngineEvent);
}

pub struct ChannelEventSink {
    tx: mpsc::Sender<EngineEvent>,
}

impl ChannelEventSink {
    pub fn new(tx: mpsc::Sender<EngineEvent>) -> Self {
        Self { tx }
    }
}

impl EventSink for ChannelEventSink {
    fn emit(&self, event: EngineEvent) {
        let _ = self.tx.send(event);
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn emit(&self, _event: EngineEvent) {}
}

/// Receives `(percent, message)` updates while a job runs. Its return value
/// is never consulted and a panic inside it is contained by the engine.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, snapshot: &ProgressSnapshot);
}

impl<F> ProgressReporter for F
where
    F: Fn(&ProgressSnapshot) + Send + Sync,
{
    fn report(&self, snapshot: &ProgressSnapshot) {
        self(snapshot)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _snapshot: &ProgressSnapshot) {}
}

pub(crate) fn report_safely(reporter: &dyn ProgressReporter, snapshot: ProgressSnapshot) {
    let outcome = catch_unwind(AssertUnwindSafe(|| reporter.report(&snapshot)));
    if outcome.is_err() {
        easel_warn!(
            "progress reporter panicked at {}% ({}); ignoring",
            snapshot.percent,
            snapshot.message
        );
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[test]
    fn closures_are_reporters() {
        let seen = Mutex::new(Vec::new());
        let reporter = |snapshot: &ProgressSnapshot| seen.lock().unwrap().push(snapshot.percent);
        report_safely(&reporter, ProgressSnapshot::new(5.0, "preparing"));
        report_safely(&reporter, ProgressSnapshot::new(10.0, "sending"));
        assert_eq!(*seen.lock().unwrap(), vec![5.0, 10.0]);
    }

    #[test]
    fn panicking_reporter_is_contained() {
        let reporter = |_: &ProgressSnapshot| panic!("ui went away");
        report_safely(&reporter, ProgressSnapshot::new(50.0, "halfway"));
    }

    #[test]
    fn channel_sink_forwards_events() {
        let (tx, rx) = mpsc::channel();
        let sink = ChannelEventSink::new(tx);
        sink.emit(EngineEvent::JobCanceled {
            job_id: JobId::from("abc"),
        });
        assert_eq!(
            rx.try_recv().unwrap(),
            EngineEvent::JobCanceled {
                job_id: JobId::from("abc")
            }
        );
    }
}
