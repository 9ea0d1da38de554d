//! Setup flow handlers.
//!
//! The flow is: `POST /connect` → provider OAuth dialog → `GET /oauth/callback`
//! (pages listed, app-level webhook registered) → `GET /pages/:id/forms` →
//! `POST /subscribe` (page subscribed, configuration stored).

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info, warn};

use crate::error::RelayError;
use crate::graph::authorization_url;
use crate::store::{parse_webhook_url, Configuration, FormConfig};
use crate::web::AppState;

fn bad_request(message: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
}

// =============================================================================
// OAuth
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectRequest {
    pub webhook_url: Option<String>,
}

/// Return the OAuth dialog URL; the destination webhook URL rides in `state`.
pub async fn connect(State(state): State<AppState>, Json(request): Json<ConnectRequest>) -> Response {
    let webhook_url = match request.webhook_url.as_deref().map(parse_webhook_url) {
        Some(Ok(url)) => url,
        Some(Err(e)) => return e.into_response(),
        None => return bad_request("Webhook URL is required"),
    };

    match authorization_url(
        &state.config.oauth_dialog_url,
        &state.config.app_id,
        &state.config.oauth_redirect_uri(),
        webhook_url.as_str(),
    ) {
        Ok(auth_url) => {
            info!(webhook_url = %webhook_url, "oauth_connect_started");
            Json(json!({ "authUrl": auth_url.as_str() })).into_response()
        }
        Err(e) => {
            error!(error = %e, "oauth_connect_failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Failed to initiate Facebook connection" })),
            )
                .into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

/// Exchange the OAuth code and list the user's pages.
pub async fn oauth_callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
) -> Response {
    if let Some(reason) = query.error {
        warn!(reason = %reason, "oauth_denied");
        return bad_request("facebook_denied");
    }

    let (code, webhook_url) = match (query.code, query.state) {
        (Some(code), Some(webhook_url)) if !code.is_empty() => (code, webhook_url),
        _ => return bad_request("missing_params"),
    };

    let user_token = match state
        .graph
        .exchange_code(&code, &state.config.oauth_redirect_uri())
        .await
    {
        Ok(token) => token,
        Err(e) => {
            error!(error = %e, "oauth_token_exchange_failed");
            return e.into_response();
        }
    };

    let pages = match state.graph.list_pages(&user_token).await {
        Ok(pages) if pages.is_empty() => {
            return (StatusCode::NOT_FOUND, Json(json!({ "error": "no_pages" }))).into_response();
        }
        Ok(pages) => pages,
        Err(e) => {
            error!(error = %e, "oauth_page_list_failed");
            return e.into_response();
        }
    };

    let registration = state.graph.register_application_webhook().await;
    if !registration.success {
        warn!(error = ?registration.error, "app_webhook_registration_skipped");
    }

    info!(page_count = pages.len(), "oauth_callback_complete");

    Json(json!({
        "webhookUrl": webhook_url,
        "pages": pages,
    }))
    .into_response()
}

// =============================================================================
// Forms
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct FormsQuery {
    pub access_token: Option<String>,
}

pub async fn page_forms(
    State(state): State<AppState>,
    Path(page_id): Path<String>,
    Query(query): Query<FormsQuery>,
) -> Response {
    let token = match query.access_token.filter(|t| !t.is_empty()) {
        Some(token) => token,
        None => return bad_request("access_token is required"),
    };

    match state.graph.list_forms(&page_id, &token).await {
        Ok(forms) => Json(json!({ "forms": forms })).into_response(),
        Err(e) => e.into_response(),
    }
}

// =============================================================================
// Subscribe
// =============================================================================

/// Page selection submitted at the end of setup.
///
/// Either `forms` or the single `formId`/`formName` pair may be given.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeRequest {
    pub page_id: Option<String>,
    pub page_name: Option<String>,
    pub page_access_token: Option<String>,
    #[serde(default)]
    pub forms: Vec<FormConfig>,
    pub form_id: Option<String>,
    pub form_name: Option<String>,
    pub webhook_url: Option<String>,
}

impl SubscribeRequest {
    pub fn into_configuration(self) -> Result<Configuration, RelayError> {
        let missing = |field: &str| RelayError::InvalidConfiguration(format!("{} is required", field));

        let page_id = self.page_id.filter(|v| !v.is_empty()).ok_or_else(|| missing("pageId"))?;
        let token = self
            .page_access_token
            .filter(|v| !v.is_empty())
            .ok_or_else(|| missing("pageAccessToken"))?;
        let webhook_url = self.webhook_url.ok_or_else(|| missing("webhookUrl"))?;

        let mut forms = self.forms;
        if let Some(form_id) = self.form_id.filter(|v| !v.is_empty()) {
            if !forms.iter().any(|f| f.id == form_id) {
                forms.push(FormConfig {
                    name: self.form_name.unwrap_or_else(|| form_id.clone()),
                    id: form_id,
                });
            }
        }

        Configuration::new(
            page_id,
            self.page_name.unwrap_or_default(),
            forms,
            &webhook_url,
            token,
        )
    }
}

/// Subscribe the page to lead events and store the configuration.
pub async fn subscribe(
    State(state): State<AppState>,
    Json(request): Json<SubscribeRequest>,
) -> Response {
    let configuration = match request.into_configuration() {
        Ok(configuration) => configuration,
        Err(e) => {
            warn!(error = %e, "subscribe_request_invalid");
            return e.into_response();
        }
    };

    let registration = state.graph.register_application_webhook().await;
    if !registration.success {
        warn!(error = ?registration.error, "app_webhook_registration_skipped");
    }

    let page = state
        .graph
        .subscribe_page(configuration.page_id(), configuration.access_token())
        .await;
    if !page.success {
        let err = RelayError::SubscriptionFailed(format!(
            "page {} could not be subscribed to lead events",
            configuration.page_id()
        ));
        error!(page_id = %configuration.page_id(), error = ?page.error, "subscribe_page_failed");
        return (
            err.status_code(),
            Json(json!({
                "error": err.to_string(),
                "details": page.error,
            })),
        )
            .into_response();
    }

    let page_id = configuration.page_id().to_string();
    state.store.set(configuration).await;
    info!(page_id = %page_id, "subscribe_complete");

    Json(json!({
        "success": true,
        "message": "Successfully subscribed to webhooks",
    }))
    .into_response()
}

// =============================================================================
// Configuration
// =============================================================================

pub async fn current_config(State(state): State<AppState>) -> Response {
    match state.store.get().await {
        Some(configuration) => Json(json!(configuration.redacted())).into_response(),
        None => RelayError::NoConfiguration.into_response(),
    }
}

pub async fn clear_config(State(state): State<AppState>) -> Json<serde_json::Value> {
    state.store.clear().await;
    Json(json!({ "success": true }))
}
