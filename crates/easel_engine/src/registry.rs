use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use easel_core::JobId;
use easel_logging::easel_debug;

use crate::abort::{AbortReason, AbortSignal};

#[derive(Debug)]
struct Entry {
    signal: AbortSignal,
    job: Option<JobId>,
}

/// In-flight requests and their abort signals.
///
/// Entries are removed when their [`Registration`] drops, so a request that
/// fails, times out or is aborted never leaks an entry.
#[derive(Debug, Clone, Default)]
pub struct RequestRegistry {
    inner: Arc<Mutex<HashMap<String, Entry>>>,
    next_id: Arc<AtomicU64>,
}

impl RequestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a new request to `endpoint`, optionally tagged with the job it
    /// belongs to.
    pub fn register(&self, endpoint: &str, job: Option<JobId>) -> Registration {
        let seq = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let id = format!("{}-{seq}", endpoint.trim_start_matches('/'));
        let signal = AbortSignal::new();
        self.entries().insert(
            id.clone(),
            Entry {
                signal: signal.clone(),
                job,
            },
        );
        Registration {
            id,
            signal,
            registry: self.clone(),
        }
    }

    pub fn abort(&self, request_id: &str) -> bool {
        match self.entries().remove(request_id) {
            Some(entry) => {
                entry.signal.abort(AbortReason::Caller);
                true
            }
            None => false,
        }
    }

    /// Abort every request tagged with `job`. Returns how many were aborted.
    pub fn abort_job(&self, job: &JobId) -> usize {
        let mut entries = self.entries();
        let ids: Vec<String> = entries
            .iter()
            .filter(|(_, entry)| entry.job.as_ref() == Some(job))
            .map(|(id, _)| id.clone())
            .collect();
        for id in &ids {
            if let Some(entry) = entries.remove(id) {
                easel_debug!("aborting request {} of job {}", id, job);
                entry.signal.abort(AbortReason::Caller);
            }
        }
        ids.len()
    }

    pub fn abort_all(&self) -> usize {
        let drained: Vec<(String, Entry)> = self.entries().drain().collect();
        for (id, entry) in &drained {
            easel_debug!("aborting request {}", id);
            entry.signal.abort(AbortReason::Caller);
        }
        drained.len()
    }

    pub fn is_registered(&self, request_id: &str) -> bool {
        self.entries().contains_key(request_id)
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn unregister(&self, request_id: &str) {
        self.entries().remove(request_id);
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Registry entry guard; dropping it unregisters the request.
#[derive(Debug)]
pub struct Registration {
    id: String,
    signal: AbortSignal,
    registry: RequestRegistry,
}

impl Registration {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn signal(&self) -> &AbortSignal {
        &self.signal
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry.unregister(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dropping_registration_removes_entry() {
        let registry = RequestRegistry::new();
        let registration = registry.register("/jobResult", None);
        let id = registration.id().to_string();
        assert!(id.starts_with("jobResult-"));
        assert!(registry.is_registered(&id));
        drop(registration);
        assert!(registry.is_empty());
    }

    #[test]
    fn abort_job_only_touches_that_job() {
        let registry = RequestRegistry::new();
        let mine = registry.register("/jobResult", Some(JobId::from("a")));
        let other = registry.register("/jobResult", Some(JobId::from("b")));
        let untagged = registry.register("/get_stamina", None);

        assert_eq!(registry.abort_job(&JobId::from("a")), 1);
        assert!(mine.signal().is_aborted());
        assert!(!other.signal().is_aborted());
        assert!(!untagged.signal().is_aborted());
        assert_eq!(registry.len(), 2);

        assert_eq!(registry.abort_all(), 2);
        assert!(other.signal().is_aborted());
        assert!(registry.is_empty());
    }

    #[test]
    fn abort_unknown_request_reports_false() {
        let registry = RequestRegistry::new();
        assert!(!registry.abort("generate-99"));
        let registration = registry.register("generate", None);
        assert!(registry.abort(registration.id()));
        assert!(registration.signal().is_aborted());
    }
}
