//! Web server module.
//!
//! Routes:
//! - `GET  /health`
//! - `GET  /webhooks/lead-events`: provider subscription handshake
//! - `POST /webhooks/lead-events`: inbound lead events
//! - `POST /connect`, `GET /oauth/callback`, `GET /pages/:page_id/forms`,
//!   `POST /subscribe`, `GET|DELETE /config`: setup flow
//! - `GET|POST|DELETE /debug`: recent pipeline events

pub mod debug;
pub mod handlers;
pub mod setup;
pub mod signature;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    routing::{get, post},
    Router,
};
use reqwest::Client;
use tower_http::trace::TraceLayer;

use crate::config::{Config, LEAD_EVENTS_PATH, OAUTH_CALLBACK_PATH};
use crate::debug_log::DebugLog;
use crate::forward::{Forwarder, HttpTransport, LeadForwarder};
use crate::graph::GraphClient;
use crate::lead::LeadFetcher;
use crate::router::EventRouter;
use crate::store::{ConfigurationStore, InMemoryConfigurationStore};

pub use handlers::{health, lead_events, verify_subscription, HealthResponse, WebhookResponse};
pub use signature::{is_signature_verification_enabled, verify_signature, SIGNATURE_HEADER};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn ConfigurationStore>,
    pub graph: GraphClient,
    pub events: Arc<EventRouter>,
    pub debug_log: DebugLog,
}

impl AppState {
    /// Wire the production components from configuration.
    pub fn new(config: Config) -> Result<Self> {
        let client = Client::builder()
            .pool_max_idle_per_host(20)
            .build()
            .context("Failed to create HTTP client")?;

        let graph = GraphClient::from_config(client.clone(), &config);
        let forwarder = Forwarder::new(HttpTransport::new(client), config.retry_policy());

        Ok(Self::from_parts(
            config,
            Arc::new(InMemoryConfigurationStore::new()),
            graph.clone(),
            Arc::new(graph),
            Arc::new(forwarder),
        ))
    }

    /// Assemble state from explicit components.
    pub fn from_parts(
        config: Config,
        store: Arc<dyn ConfigurationStore>,
        graph: GraphClient,
        fetcher: Arc<dyn LeadFetcher>,
        forwarder: Arc<dyn LeadForwarder>,
    ) -> Self {
        let debug_log = DebugLog::new(config.debug_log_capacity);
        let events = EventRouter::new(store.clone(), fetcher, forwarder, debug_log.clone())
            .with_app_secret(config.app_secret.clone())
            .require_signature(config.require_signature);

        Self {
            config: Arc::new(config),
            store,
            graph,
            events: Arc::new(events),
            debug_log,
        }
    }
}

/// Build the HTTP router for all endpoints.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            LEAD_EVENTS_PATH,
            get(verify_subscription).post(lead_events),
        )
        .route("/connect", post(setup::connect))
        .route(OAUTH_CALLBACK_PATH, get(setup::oauth_callback))
        .route("/pages/:page_id/forms", get(setup::page_forms))
        .route("/subscribe", post(setup::subscribe))
        .route(
            "/config",
            get(setup::current_config).delete(setup::clear_config),
        )
        .route(
            "/debug",
            get(debug::list_entries)
                .post(debug::add_entry)
                .delete(debug::clear_entries),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::Router;
    use http_body_util::BodyExt;
    use reqwest::Client;
    use serde_json::Value;
    use tokio::sync::Mutex;
    use tower::ServiceExt;
    use url::Url;

    use super::AppState;
    use crate::config::Config;
    use crate::error::RelayError;
    use crate::forward::{AttemptOutcome, DeliveryAttempt, DeliveryReport, LeadForwarder};
    use crate::graph::GraphClient;
    use crate::lead::{LeadFetcher, LeadRecord, NormalizedLead};
    use crate::store::InMemoryConfigurationStore;

    pub const APP_SECRET: &str = "app-secret";
    pub const VERIFY_TOKEN: &str = "verify-me";

    /// Returns a fixed lead for every id.
    pub struct StaticFetcher;

    #[async_trait]
    impl LeadFetcher for StaticFetcher {
        async fn fetch_lead(&self, lead_id: &str, _token: &str) -> Result<LeadRecord, RelayError> {
            Ok(LeadRecord::from_provider(
                lead_id,
                serde_json::json!({"field_data": [{"name": "email", "values": ["a@b.com"]}]}),
            ))
        }
    }

    #[derive(Default)]
    pub struct CollectingForwarder {
        pub leads: Mutex<Vec<NormalizedLead>>,
    }

    #[async_trait]
    impl LeadForwarder for CollectingForwarder {
        async fn deliver(&self, lead: &NormalizedLead, _destination: &Url) -> DeliveryReport {
            self.leads.lock().await.push(lead.clone());
            DeliveryReport {
                delivered: true,
                attempts: vec![DeliveryAttempt {
                    attempt_number: 1,
                    outcome: AttemptOutcome::Success,
                    error: None,
                }],
            }
        }
    }

    pub fn test_config(graph_base_url: &str) -> Config {
        let graph_base_url = graph_base_url.to_string();
        Config::from_lookup(move |name: &str| match name {
            "FACEBOOK_APP_ID" => Some("app-123".into()),
            "FACEBOOK_APP_SECRET" => Some(APP_SECRET.into()),
            "FACEBOOK_VERIFY_TOKEN" => Some(VERIFY_TOKEN.into()),
            "PUBLIC_BASE_URL" => Some("https://relay.example.com".into()),
            "GRAPH_API_BASE_URL" => Some(graph_base_url.clone()),
            _ => None,
        })
        .unwrap()
    }

    /// State backed by in-memory fakes; Graph calls go to `graph_base_url`.
    pub fn test_state(graph_base_url: &str) -> (AppState, Arc<CollectingForwarder>) {
        let config = test_config(graph_base_url);
        let graph = GraphClient::from_config(Client::new(), &config);
        let forwarder = Arc::new(CollectingForwarder::default());
        let state = AppState::from_parts(
            config,
            Arc::new(InMemoryConfigurationStore::new()),
            graph,
            Arc::new(StaticFetcher),
            forwarder.clone(),
        );
        (state, forwarder)
    }

    pub async fn call(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, body.to_vec())
    }

    pub async fn call_json(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let (status, body) = call(app, request).await;
        let value = serde_json::from_slice(&body).unwrap_or(Value::Null);
        (status, value)
    }
}
