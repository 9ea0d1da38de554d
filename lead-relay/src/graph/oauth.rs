//! OAuth exchange and page/form discovery for the setup flow.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};
use url::Url;

use super::{provider_error, GraphClient, GRAPH_REQUEST_TIMEOUT};
use crate::error::RelayError;
use crate::store::FormConfig;

/// Permissions requested from the user.
pub const OAUTH_SCOPES: &str =
    "pages_show_list,pages_read_engagement,leads_retrieval,pages_manage_metadata";

/// A page the authorizing user manages, with its page access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageAccount {
    pub id: String,
    pub name: String,
    pub access_token: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
}

#[derive(Deserialize)]
struct DataList<T> {
    #[serde(default = "Vec::new")]
    data: Vec<T>,
}

/// Build the OAuth dialog URL; `state` carries the destination webhook URL
/// through the redirect.
pub fn authorization_url(
    dialog_url: &str,
    app_id: &str,
    redirect_uri: &str,
    state: &str,
) -> Result<Url, RelayError> {
    Url::parse_with_params(
        dialog_url,
        &[
            ("client_id", app_id),
            ("redirect_uri", redirect_uri),
            ("scope", OAUTH_SCOPES),
            ("response_type", "code"),
            ("state", state),
        ],
    )
    .map_err(|e| RelayError::InvalidConfiguration(format!("OAuth dialog URL: {}", e)))
}

impl GraphClient {
    /// Exchange an authorization code for a user access token.
    pub async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<String, RelayError> {
        let body: Value = self
            .get_json(
                &["oauth", "access_token"],
                &[
                    ("client_id", self.app_id.as_str()),
                    ("client_secret", self.app_secret.as_str()),
                    ("redirect_uri", redirect_uri),
                    ("code", code),
                ],
            )
            .await?;

        let token: TokenResponse = serde_json::from_value(body)
            .map_err(|e| RelayError::Provider(format!("token response: {}", e)))?;

        token
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| RelayError::Provider("token exchange returned no access token".into()))
    }

    /// Pages managed by the user owning `user_access_token`.
    pub async fn list_pages(&self, user_access_token: &str) -> Result<Vec<PageAccount>, RelayError> {
        let body = self
            .get_json(&["me", "accounts"], &[("access_token", user_access_token)])
            .await?;

        let pages: DataList<PageAccount> = serde_json::from_value(body)
            .map_err(|e| RelayError::Provider(format!("page list: {}", e)))?;

        info!(page_count = pages.data.len(), "pages_listed");
        Ok(pages.data)
    }

    /// Lead forms defined on `page_id`.
    pub async fn list_forms(
        &self,
        page_id: &str,
        page_access_token: &str,
    ) -> Result<Vec<FormConfig>, RelayError> {
        let body = self
            .get_json(
                &[page_id, "leadgen_forms"],
                &[("access_token", page_access_token), ("fields", "id,name")],
            )
            .await?;

        let forms: DataList<FormConfig> = serde_json::from_value(body)
            .map_err(|e| RelayError::Provider(format!("form list: {}", e)))?;

        info!(page_id = %page_id, form_count = forms.data.len(), "forms_listed");
        Ok(forms.data)
    }

    async fn get_json(&self, segments: &[&str], query: &[(&str, &str)]) -> Result<Value, RelayError> {
        let url = self.endpoint(segments)?;
        let path = url.path().to_string();

        let response = self
            .http
            .get(url)
            .query(query)
            .timeout(GRAPH_REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| RelayError::Provider(e.to_string()))?;

        let status = response.status();
        let body = response
            .json::<Value>()
            .await
            .map_err(|e| RelayError::Provider(format!("invalid response body: {}", e)))?;

        if !status.is_success() {
            warn!(path = %path, status_code = status.as_u16(), "graph_request_failed");
            return Err(RelayError::Provider(provider_error(&body).to_string()));
        }

        Ok(body)
    }
}
