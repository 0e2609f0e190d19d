use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use serde_json::Value;

use crate::RequestError;

/// One HTTP round trip against the backend. No retries, no deadline; the
/// retrying client layers those on top and drops the future to abort.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// POST an already-serialized JSON `body` to `endpoint` and decode the
    /// JSON reply.
    async fn post_json(&self, endpoint: &str, body: String) -> Result<Value, RequestError>;
}

#[derive(Debug, Clone)]
pub struct TransportSettings {
    pub connect_timeout: Duration,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    base_url: String,
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(base_url: &str, settings: TransportSettings) -> Result<Self, RequestError> {
        let base_url = base_url.trim_end_matches('/').to_string();
        reqwest::Url::parse(&base_url)
            .map_err(|err| RequestError::Transport(format!("invalid base url {base_url}: {err}")))?;
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .build()
            .map_err(|err| RequestError::Transport(err.to_string()))?;
        Ok(Self { base_url, client })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint_url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'))
    }
}

#[async_trait::async_trait]
impl Transport for ReqwestTransport {
    async fn post_json(&self, endpoint: &str, body: String) -> Result<Value, RequestError> {
        let response = self
            .client
            .post(self.endpoint_url(endpoint))
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "no error details".to_string());
            return Err(RequestError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let text = response.text().await.map_err(map_reqwest_error)?;
        serde_json::from_str(&text).map_err(|err| RequestError::Decode(err.to_string()))
    }
}

fn map_reqwest_error(err: reqwest::Error) -> RequestError {
    if err.is_connect() {
        return RequestError::Connect(err.to_string());
    }
    if err.is_decode() || err.is_body() {
        return RequestError::Decode(err.to_string());
    }
    RequestError::Transport(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_url_joins_with_single_slash() {
        let transport =
            ReqwestTransport::new("http://localhost:1314/", TransportSettings::default()).unwrap();
        assert_eq!(transport.endpoint_url("/generate"), "http://localhost:1314/generate");
        assert_eq!(transport.endpoint_url("jobResult"), "http://localhost:1314/jobResult");
    }

    #[test]
    fn rejects_unparseable_base_url() {
        assert!(ReqwestTransport::new("not a url", TransportSettings::default()).is_err());
    }
}
