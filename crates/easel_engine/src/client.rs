use std::sync::Arc;
use std::time::Duration;

use easel_core::JobId;
use easel_logging::{easel_debug, easel_error, easel_warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::abort::with_deadline;
use crate::notify::{Notice, Notifier};
use crate::registry::RequestRegistry;
use crate::transport::Transport;
use crate::RequestError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Deadline for each individual attempt.
    #[serde(rename = "timeout_ms", with = "easel_core::duration_ms")]
    pub timeout: Duration,
    /// Retries after the first attempt.
    pub retry_count: u32,
    #[serde(rename = "retry_delay_ms", with = "easel_core::duration_ms")]
    pub retry_delay: Duration,
    /// Raise an error notice when the request finally fails.
    pub notify_on_failure: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            retry_count: 3,
            retry_delay: Duration::from_secs(5),
            notify_on_failure: true,
        }
    }
}

impl RetryPolicy {
    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    pub fn silent(mut self) -> Self {
        self.notify_on_failure = false;
        self
    }
}

/// Issues one logical request: serialize, register, attempt under a
/// deadline, retry transient failures with a fixed delay.
#[derive(Clone)]
pub struct RequestClient {
    transport: Arc<dyn Transport>,
    registry: RequestRegistry,
    notifier: Arc<dyn Notifier>,
}

impl RequestClient {
    pub fn new(
        transport: Arc<dyn Transport>,
        registry: RequestRegistry,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            transport,
            registry,
            notifier,
        }
    }

    pub fn registry(&self) -> &RequestRegistry {
        &self.registry
    }

    /// POST `body` to `endpoint`. Requests tagged with `job` are severed by
    /// [`RequestRegistry::abort_job`].
    pub async fn post<B>(
        &self,
        endpoint: &str,
        body: &B,
        job: Option<&JobId>,
        policy: &RetryPolicy,
    ) -> Result<Value, RequestError>
    where
        B: Serialize + ?Sized,
    {
        let body = serde_json::to_string(body).map_err(|err| {
            easel_error!("failed to serialize body for {}: {}", endpoint, err);
            RequestError::Serialization(err.to_string())
        })?;

        let registration = self.registry.register(endpoint, job.cloned());
        easel_debug!("request {} registered", registration.id());

        let mut retries = 0;
        let result = loop {
            let attempt = with_deadline(registration.signal(), policy.timeout, |_| {
                self.transport.post_json(endpoint, body.clone())
            })
            .await;

            match attempt {
                Ok(value) => break Ok(value),
                Err(err) if err.is_abort() || retries >= policy.retry_count => break Err(err),
                Err(err) => {
                    retries += 1;
                    easel_warn!(
                        "request to {} failed, retrying ({}/{}): {}",
                        endpoint,
                        retries,
                        policy.retry_count,
                        err
                    );
                    let aborted = tokio::select! {
                        _ = registration.signal().aborted() => true,
                        _ = tokio::time::sleep(policy.retry_delay) => false,
                    };
                    if aborted {
                        break Err(RequestError::Aborted);
                    }
                }
            }
        };

        if let Err(err) = &result {
            if err.is_abort() {
                easel_debug!("request {} aborted", registration.id());
            } else {
                easel_error!("request to {} failed: {}", endpoint, err);
                if policy.notify_on_failure {
                    self.notifier
                        .notify(Notice::error(format!("request failed: {err}")));
                }
            }
        }
        result
    }

    /// [`post`](Self::post), then decode the reply into `T`.
    pub async fn post_as<T, B>(
        &self,
        endpoint: &str,
        body: &B,
        job: Option<&JobId>,
        policy: &RetryPolicy,
    ) -> Result<T, RequestError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let value = self.post(endpoint, body, job, policy).await?;
        serde_json::from_value(value).map_err(|err| RequestError::Decode(err.to_string()))
    }
}
