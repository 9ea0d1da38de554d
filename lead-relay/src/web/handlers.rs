//! Lead event endpoint handlers.
//!
//! `POST /webhooks/lead-events` acknowledges every event that passes the
//! gates with `{success: true}`, whatever happened to individual leads. The
//! provider redelivers the whole event on a non-2xx response, which would
//! resend leads that were already forwarded.

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use subtle::ConstantTimeEq;
use tracing::{info, warn};

use crate::web::signature::SIGNATURE_HEADER;
use crate::web::AppState;

// =============================================================================
// Health Check
// =============================================================================

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

// =============================================================================
// Lead Events
// =============================================================================

/// Webhook acknowledgement.
#[derive(Serialize)]
pub struct WebhookResponse {
    pub success: bool,
}

/// Inbound lead event endpoint.
///
/// This endpoint:
/// 1. Parses and verifies the raw body
/// 2. Fetches and forwards every matching lead
/// 3. Returns 200 OK, or 400/403/404 for gate failures
pub async fn lead_events(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    info!(
        body_length = body.len(),
        has_signature = signature.is_some(),
        "lead_event_received"
    );

    match state.events.handle_event(&body, signature).await {
        Ok(_) => (StatusCode::OK, Json(WebhookResponse { success: true })).into_response(),
        Err(e) => e.into_response(),
    }
}

// =============================================================================
// Subscription Handshake
// =============================================================================

/// Query of the provider's one-time subscription check.
#[derive(Debug, Deserialize)]
pub struct VerifyQuery {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

/// Echo `hub.challenge` when the mode is `subscribe` and the token matches.
pub async fn verify_subscription(
    State(state): State<AppState>,
    Query(query): Query<VerifyQuery>,
) -> Response {
    let token_matches = query
        .verify_token
        .as_deref()
        .map(|t| bool::from(t.as_bytes().ct_eq(state.config.verify_token.as_bytes())))
        .unwrap_or(false);

    match (query.mode.as_deref(), token_matches, query.challenge) {
        (Some("subscribe"), true, Some(challenge)) => {
            info!("webhook_subscription_verified");
            (StatusCode::OK, challenge).into_response()
        }
        (mode, _, _) => {
            warn!(mode = ?mode, token_matches = token_matches, "webhook_subscription_rejected");
            (
                StatusCode::FORBIDDEN,
                Json(json!({ "error": "Invalid verification request" })),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Configuration, FormConfig};
    use crate::web::build_router;
    use crate::web::signature::sign;
    use crate::web::test_support::{call, call_json, test_state, APP_SECRET, VERIFY_TOKEN};
    use axum::body::Body;
    use axum::http::Request;

    fn verify_request(token: &str, challenge: &str) -> Request<Body> {
        Request::builder()
            .uri(format!(
                "/webhooks/lead-events?hub.mode=subscribe&hub.verify_token={}&hub.challenge={}",
                token, challenge
            ))
            .body(Body::empty())
            .unwrap()
    }

    fn event_request(body: &[u8], signature: Option<String>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/webhooks/lead-events")
            .header("content-type", "application/json");
        if let Some(signature) = signature {
            builder = builder.header("X-Hub-Signature-256", signature);
        }
        builder.body(Body::from(body.to_vec())).unwrap()
    }

    async fn configure(state: &AppState) {
        state
            .store
            .set(
                Configuration::new(
                    "page-1",
                    "Bakery",
                    vec![FormConfig {
                        id: "form-1".into(),
                        name: "Spring promo".into(),
                    }],
                    "https://hooks.example.com/leads",
                    "page-token",
                )
                .unwrap(),
            )
            .await;
    }

    fn lead_event(page_id: &str) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "object": "page",
            "entry": [{"id": page_id, "changes": [
                {"field": "leadgen", "value": {"leadgen_id": "lead-1", "form_id": "form-1"}}
            ]}]
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (state, _) = test_state("http://127.0.0.1:9");
        let app = build_router(state);

        let (status, body) = call_json(
            &app,
            Request::builder().uri("/health").body(Body::empty()).unwrap(),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_handshake_echoes_challenge() {
        let (state, _) = test_state("http://127.0.0.1:9");
        let app = build_router(state);

        let (status, body) = call(&app, verify_request(VERIFY_TOKEN, "1158201444")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"1158201444");
    }

    #[tokio::test]
    async fn test_handshake_wrong_token_forbidden() {
        let (state, _) = test_state("http://127.0.0.1:9");
        let app = build_router(state);

        let (status, body) = call(&app, verify_request("guess", "1158201444")).await;

        assert_eq!(status, StatusCode::FORBIDDEN);
        assert!(!String::from_utf8_lossy(&body).contains("1158201444"));
    }

    #[tokio::test]
    async fn test_handshake_wrong_mode_forbidden() {
        let (state, _) = test_state("http://127.0.0.1:9");
        let app = build_router(state);

        let request = Request::builder()
            .uri(format!(
                "/webhooks/lead-events?hub.mode=unsubscribe&hub.verify_token={}&hub.challenge=42",
                VERIFY_TOKEN
            ))
            .body(Body::empty())
            .unwrap();
        let (status, _) = call(&app, request).await;

        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_signed_event_acknowledged_and_forwarded() {
        let (state, forwarder) = test_state("http://127.0.0.1:9");
        configure(&state).await;
        let app = build_router(state);
        let body = lead_event("page-1");
        let signature = sign(&body, APP_SECRET).unwrap();

        let (status, json) = call_json(&app, event_request(&body, Some(signature))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json, json!({"success": true}));
        assert_eq!(forwarder.leads.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_other_page_still_acknowledged() {
        let (state, forwarder) = test_state("http://127.0.0.1:9");
        configure(&state).await;
        let app = build_router(state);
        let body = lead_event("page-2");
        let signature = sign(&body, APP_SECRET).unwrap();

        let (status, json) = call_json(&app, event_request(&body, Some(signature))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["success"], true);
        assert!(forwarder.leads.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_gate_failures_map_to_status() {
        let (state, _) = test_state("http://127.0.0.1:9");
        let app = build_router(state.clone());
        let body = lead_event("page-1");

        let (status, json) = call_json(&app, event_request(b"not json", None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].is_string());

        let forged = sign(&body, "wrong").unwrap();
        let (status, json) = call_json(&app, event_request(&body, Some(forged))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(json["error"], "Invalid signature");

        let signature = sign(&body, APP_SECRET).unwrap();
        let (status, json) = call_json(&app, event_request(&body, Some(signature))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error"], "No configuration");
    }
}
