//! Outbound HTTP delivery of a single attempt.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("request failed: {0}")]
    Request(String),
}

/// Sends one JSON POST and reports the response status.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn post_json(
        &self,
        url: &Url,
        headers: &[(&'static str, String)],
        body: &Value,
        timeout: Duration,
    ) -> Result<u16, TransportError>;
}

/// `reqwest`-backed transport.
#[derive(Clone, Default)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post_json(
        &self,
        url: &Url,
        headers: &[(&'static str, String)],
        body: &Value,
        timeout: Duration,
    ) -> Result<u16, TransportError> {
        let mut request = self.client.post(url.clone()).json(body).timeout(timeout);

        for (key, value) in headers {
            request = request.header(*key, value.as_str());
        }

        match request.send().await {
            Ok(resp) => Ok(resp.status().as_u16()),
            Err(e) => {
                if e.is_timeout() {
                    tracing::warn!(
                        url = %url,
                        timeout_seconds = timeout.as_secs_f64(),
                        "forward_request_timeout"
                    );
                    Err(TransportError::Timeout(timeout))
                } else {
                    tracing::warn!(url = %url, error = %e, "forward_request_error");
                    Err(TransportError::Request(e.to_string()))
                }
            }
        }
    }
}
