//! Graph API client.
//!
//! One client covers every provider call the relay makes:
//! - App-level and page-level webhook subscription (`subscription`)
//! - Lead lookup (`leads`)
//! - OAuth code exchange, page and form listing (`oauth`)

pub mod leads;
pub mod oauth;
pub mod subscription;

use std::time::Duration;

use reqwest::Client;
use serde_json::Value;
use url::Url;

use crate::config::Config;
use crate::error::RelayError;

pub use oauth::{authorization_url, PageAccount, OAUTH_SCOPES};
pub use subscription::SubscriptionResult;

/// Timeout applied to every Graph API call.
pub const GRAPH_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct GraphClient {
    http: Client,
    base_url: String,
    app_id: String,
    app_secret: String,
    verify_token: String,
    callback_url: String,
}

impl GraphClient {
    pub fn new(
        http: Client,
        base_url: impl Into<String>,
        app_id: impl Into<String>,
        app_secret: impl Into<String>,
        verify_token: impl Into<String>,
        callback_url: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            app_id: app_id.into(),
            app_secret: app_secret.into(),
            verify_token: verify_token.into(),
            callback_url: callback_url.into(),
        }
    }

    pub fn from_config(http: Client, config: &Config) -> Self {
        Self::new(
            http,
            config.graph_api_base_url.clone(),
            config.app_id.clone(),
            config.app_secret.clone(),
            config.verify_token.clone(),
            config.callback_url(),
        )
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    /// Graph URL for `segments`. Each segment is percent-encoded, so an id
    /// containing `/` or `?` stays a single path segment.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, RelayError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| RelayError::InvalidConfiguration(format!("Graph API base URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| {
                RelayError::InvalidConfiguration("Graph API base URL cannot carry a path".into())
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// App access token used for app-level operations.
    fn app_access_token(&self) -> String {
        format!("{}|{}", self.app_id, self.app_secret)
    }
}

/// Extract the provider's `error` object from a failed response body.
fn provider_error(body: &Value) -> Value {
    body.get("error").cloned().unwrap_or_else(|| body.clone())
}
