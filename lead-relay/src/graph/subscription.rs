//! Webhook subscription management.
//!
//! Both calls are idempotent and safe to repeat on every setup pass. An
//! app-level failure usually means the subscription already exists and is
//! only logged by callers; a page-level failure stops the setup flow.

use serde::Serialize;
use serde_json::{json, Value};
use tracing::{error, info};

use super::{provider_error, GraphClient, GRAPH_REQUEST_TIMEOUT};
use crate::lead::LEADGEN_FIELD;

/// Outcome of a subscription call: `{success, data?, error?}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubscriptionResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

impl SubscriptionResult {
    fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    fn failed(error: Value) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
        }
    }
}

impl GraphClient {
    /// Register this service's lead event endpoint for the `page` object.
    pub async fn register_application_webhook(&self) -> SubscriptionResult {
        info!(
            app_id = %self.app_id,
            callback_url = %self.callback_url,
            "app_webhook_registering"
        );

        let body = json!({
            "object": "page",
            "callback_url": self.callback_url,
            "fields": LEADGEN_FIELD,
            "verify_token": self.verify_token,
            "access_token": self.app_access_token(),
        });
        let result = self
            .post_subscription(&[self.app_id.as_str(), "subscriptions"], &body)
            .await;
        if result.success {
            info!(app_id = %self.app_id, "app_webhook_registered");
        } else {
            error!(app_id = %self.app_id, error = ?result.error, "app_webhook_register_failed");
        }
        result
    }

    /// Opt `page_id` into sending `leadgen` events to this app.
    pub async fn subscribe_page(&self, page_id: &str, page_access_token: &str) -> SubscriptionResult {
        info!(page_id = %page_id, "page_subscribing");

        let body = json!({
            "subscribed_fields": LEADGEN_FIELD,
            "access_token": page_access_token,
        });
        let result = self
            .post_subscription(&[page_id, "subscribed_apps"], &body)
            .await;
        if result.success {
            info!(page_id = %page_id, "page_subscribed");
        } else {
            error!(page_id = %page_id, error = ?result.error, "page_subscribe_failed");
        }
        result
    }

    async fn post_subscription(&self, segments: &[&str], body: &Value) -> SubscriptionResult {
        let url = match self.endpoint(segments) {
            Ok(url) => url,
            Err(e) => return SubscriptionResult::failed(Value::String(e.to_string())),
        };

        let response = match self
            .http
            .post(url)
            .json(body)
            .timeout(GRAPH_REQUEST_TIMEOUT)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => return SubscriptionResult::failed(Value::String(e.to_string())),
        };

        let status = response.status();
        let data = response.json::<Value>().await.unwrap_or(Value::Null);

        if status.is_success() {
            SubscriptionResult::ok(data)
        } else {
            SubscriptionResult::failed(provider_error(&data))
        }
    }
}
