//! Lead delivery to the configured webhook.
//!
//! Each lead is POSTed as `{event: "lead.received", timestamp, lead}`. A
//! delivery is attempted up to `max_attempts` times; after failed attempt `k`
//! the forwarder waits `initial_backoff * 2^(k-1)` before the next one.

pub mod transport;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::json;
use tokio::time::sleep;
use tracing::{error, info, warn};
use url::Url;

use crate::lead::NormalizedLead;

pub use transport::{HttpTransport, Transport, TransportError};

/// Event name carried in every forwarded payload.
pub const LEAD_RECEIVED_EVENT: &str = "lead.received";

/// Value of the `X-Source` header on forwarded requests.
pub const SOURCE_HEADER_VALUE: &str = "lead-relay";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Wait after the first failed attempt
    pub initial_backoff: Duration,
    /// Bound on a single attempt
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(2),
            attempt_timeout: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay between failed attempt `attempt` (1-based) and the next one.
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.initial_backoff.saturating_mul(1 << exponent)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptOutcome {
    Success,
    Failure,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryAttempt {
    pub attempt_number: u32,
    pub outcome: AttemptOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryReport {
    pub delivered: bool,
    pub attempts: Vec<DeliveryAttempt>,
}

/// Delivers normalized leads to a destination URL.
///
/// Never fails past its own boundary: the caller learns whether the lead was
/// delivered and how each attempt went.
#[async_trait]
pub trait LeadForwarder: Send + Sync {
    async fn deliver(&self, lead: &NormalizedLead, destination: &Url) -> DeliveryReport;

    async fn forward(&self, lead: &NormalizedLead, destination: &Url) -> bool {
        self.deliver(lead, destination).await.delivered
    }
}

pub struct Forwarder<T = HttpTransport> {
    transport: T,
    policy: RetryPolicy,
}

impl<T: Transport> Forwarder<T> {
    pub fn new(transport: T, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

#[async_trait]
impl<T: Transport> LeadForwarder for Forwarder<T> {
    /// Deliver `lead`, retrying with exponential backoff.
    async fn deliver(&self, lead: &NormalizedLead, destination: &Url) -> DeliveryReport {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempts = Vec::new();

        for attempt in 1..=max_attempts {
            info!(
                lead_id = %lead.id,
                destination = %destination,
                attempt = attempt,
                max_attempts = max_attempts,
                "forward_attempt_starting"
            );

            let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
            let body = json!({
                "event": LEAD_RECEIVED_EVENT,
                "timestamp": timestamp,
                "lead": lead,
            });
            let headers = [
                ("X-Source", SOURCE_HEADER_VALUE.to_string()),
                ("X-Timestamp", timestamp),
            ];

            let result = self
                .transport
                .post_json(destination, &headers, &body, self.policy.attempt_timeout)
                .await;

            let failure = match result {
                Ok(status) if (200..300).contains(&status) => None,
                Ok(status) => Some(format!("destination returned status {}", status)),
                Err(e) => Some(e.to_string()),
            };

            match failure {
                None => {
                    info!(lead_id = %lead.id, attempt = attempt, "forward_succeeded");
                    attempts.push(DeliveryAttempt {
                        attempt_number: attempt,
                        outcome: AttemptOutcome::Success,
                        error: None,
                    });
                    return DeliveryReport {
                        delivered: true,
                        attempts,
                    };
                }
                Some(reason) => {
                    warn!(
                        lead_id = %lead.id,
                        attempt = attempt,
                        error = %reason,
                        "forward_attempt_failed"
                    );
                    attempts.push(DeliveryAttempt {
                        attempt_number: attempt,
                        outcome: AttemptOutcome::Failure,
                        error: Some(reason),
                    });
                }
            }

            if attempt < max_attempts {
                let wait = self.policy.backoff_after(attempt);
                info!(
                    lead_id = %lead.id,
                    wait_ms = wait.as_millis() as u64,
                    "forward_backoff"
                );
                sleep(wait).await;
            }
        }

        error!(
            lead_id = %lead.id,
            destination = %destination,
            attempts = max_attempts,
            "forward_exhausted"
        );

        DeliveryReport {
            delivered: false,
            attempts,
        }
    }
}
