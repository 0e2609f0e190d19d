use std::time::Duration;

use easel_core::{CredentialRules, PollPolicy};
use serde::{Deserialize, Serialize};

use crate::client::RetryPolicy;
use crate::transport::TransportSettings;

pub const DEFAULT_BASE_URL: &str = "http://localhost:1314";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub base_url: String,
    #[serde(rename = "connect_timeout_ms", with = "easel_core::duration_ms")]
    pub connect_timeout: Duration,
    /// Policy for status, cancel and stamina requests.
    pub request: RetryPolicy,
    /// `/generate` uses `request` with this shorter retry delay.
    #[serde(rename = "submit_retry_delay_ms", with = "easel_core::duration_ms")]
    pub submit_retry_delay: Duration,
    pub poll: PollPolicy,
    pub credential_rules: CredentialRules,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            connect_timeout: TransportSettings::default().connect_timeout,
            request: RetryPolicy::default(),
            submit_retry_delay: Duration::from_secs(1),
            poll: PollPolicy::default(),
            credential_rules: CredentialRules::default(),
        }
    }
}

impl EngineConfig {
    /// Generation requests never notify on their own; `generate` raises a
    /// single notice for whatever error it finally returns.
    pub fn submit_policy(&self) -> RetryPolicy {
        self.request
            .with_retry_delay(self.submit_retry_delay)
            .silent()
    }

    pub fn poll_request_policy(&self) -> RetryPolicy {
        self.request.silent()
    }

    pub fn cancel_policy(&self) -> RetryPolicy {
        self.request.silent()
    }

    pub fn stamina_policy(&self) -> RetryPolicy {
        self.request.with_retry_count(2)
    }

    /// Probing is advisory: one retry and no user-facing error notice.
    pub fn probe_policy(&self) -> RetryPolicy {
        self.request.with_retry_count(1).silent()
    }

    pub fn transport_settings(&self) -> TransportSettings {
        TransportSettings {
            connect_timeout: self.connect_timeout,
        }
    }
}
