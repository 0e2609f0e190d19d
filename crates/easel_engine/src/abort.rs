use std::future::Future;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::RequestError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    Timeout,
    Caller,
}

/// Cooperative abort signal that remembers what fired it.
///
/// Firing is idempotent: the first `abort` wins and later calls are no-ops,
/// whether they come from a deadline or from a caller.
#[derive(Debug, Clone, Default)]
pub struct AbortSignal {
    token: CancellationToken,
    reason: Arc<OnceLock<AbortReason>>,
}

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// A signal that fires whenever `self` fires, and can also be fired on
    /// its own without affecting `self`.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            reason: Arc::new(OnceLock::new()),
        }
    }

    /// Returns `true` only for the call that actually fired the signal.
    pub fn abort(&self, reason: AbortReason) -> bool {
        if self.token.is_cancelled() {
            return false;
        }
        let fired = self.reason.set(reason).is_ok();
        if fired {
            self.token.cancel();
        }
        fired
    }

    pub fn is_aborted(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Why this signal fired; `None` if it has not fired or was fired
    /// through its parent.
    pub fn reason(&self) -> Option<AbortReason> {
        self.reason.get().copied()
    }

    pub async fn aborted(&self) {
        self.token.cancelled().await;
    }
}

/// Run `call` with a hard deadline.
///
/// The call receives a per-attempt child of `signal`. The attempt ends with
/// [`RequestError::Aborted`] if `signal` fires, or [`RequestError::Timeout`]
/// once `budget` elapses; either way the call's future is dropped, which
/// aborts the in-flight request.
pub async fn with_deadline<T, F, Fut>(
    signal: &AbortSignal,
    budget: Duration,
    call: F,
) -> Result<T, RequestError>
where
    F: FnOnce(AbortSignal) -> Fut,
    Fut: Future<Output = Result<T, RequestError>>,
{
    if signal.is_aborted() {
        return Err(RequestError::Aborted);
    }

    let attempt = signal.child();
    let watcher = attempt.clone();
    let call = call(attempt.clone());

    tokio::select! {
        biased;
        _ = watcher.aborted() => match attempt.reason() {
            Some(AbortReason::Timeout) => Err(timeout_error(budget)),
            _ => Err(RequestError::Aborted),
        },
        out = call => out,
        _ = tokio::time::sleep(budget) => {
            attempt.abort(AbortReason::Timeout);
            Err(timeout_error(budget))
        }
    }
}

fn timeout_error(budget: Duration) -> RequestError {
    RequestError::Timeout {
        budget_ms: u64::try_from(budget.as_millis()).unwrap_or(u64::MAX),
    }
}
