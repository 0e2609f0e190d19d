use std::io::{self, Write};
use std::sync::mpsc;
use std::thread;

use easel_core::ProgressSnapshot;
use easel_engine::{EngineEvent, Notice, NoticeLevel, Notifier, ProgressReporter};
use easel_logging::easel_info;

/// Prints notices to stderr so stdout stays clean for `--json`.
pub struct TerminalNotifier;

impl Notifier for TerminalNotifier {
    fn notify(&self, notice: Notice) {
        let tag = match notice.level {
            NoticeLevel::Error => "error",
            NoticeLevel::Info => "info",
            NoticeLevel::Canceled => "canceled",
        };
        eprintln!("[{tag}] {}", notice.message);
    }
}

/// Renders progress as a single rewritten stderr line.
pub struct ProgressPrinter;

impl ProgressReporter for ProgressPrinter {
    fn report(&self, snapshot: &ProgressSnapshot) {
        let mut stderr = io::stderr().lock();
        if snapshot.is_error() {
            let _ = writeln!(stderr, "\r[ failed ] {}", snapshot.message);
        } else {
            let _ = write!(stderr, "\r[{:>5.1}%] {:<48}", snapshot.percent, snapshot.message);
            if snapshot.percent >= 100.0 {
                let _ = writeln!(stderr);
            }
        }
        let _ = stderr.flush();
    }
}

/// Drain lifecycle events into the log until the engine drops its sender.
pub fn spawn_event_logger(rx: mpsc::Receiver<EngineEvent>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        while let Ok(event) = rx.recv() {
            match event {
                EngineEvent::JobStarted { job_id, at } => {
                    easel_info!("job {} started at {}", job_id, at.to_rfc3339());
                }
                EngineEvent::JobCanceled { job_id } => {
                    easel_info!("job {} canceled", job_id);
                }
                EngineEvent::JobFinished { job_id, success } => {
                    easel_info!("job {} finished (success={})", job_id, success);
                }
            }
        }
    })
}
