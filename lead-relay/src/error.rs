//! Error taxonomy for the lead relay.
//!
//! Gate failures on the inbound path (`MalformedPayload`, `SignatureInvalid`,
//! `NoConfiguration`) become HTTP responses. Per-lead failures (`FetchFailed`,
//! `ForwardFailed`) are logged by the event router and never reach the caller.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    /// Body is not valid JSON.
    #[error("Invalid JSON: {0}")]
    MalformedPayload(String),

    #[error("Invalid signature")]
    SignatureInvalid,

    /// Nothing has been configured through the setup flow yet.
    #[error("No configuration")]
    NoConfiguration,

    #[error("Failed to fetch lead {lead_id}: {reason}")]
    FetchFailed { lead_id: String, reason: String },

    #[error("Failed to forward lead {lead_id} after {attempts} attempts")]
    ForwardFailed { lead_id: String, attempts: u32 },

    #[error("Subscription failed: {0}")]
    SubscriptionFailed(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A provider call outside the lead path (OAuth, page or form listing) failed.
    #[error("Provider request failed: {0}")]
    Provider(String),
}

impl RelayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            RelayError::MalformedPayload(_) | RelayError::InvalidConfiguration(_) => {
                StatusCode::BAD_REQUEST
            }
            RelayError::SignatureInvalid => StatusCode::FORBIDDEN,
            RelayError::NoConfiguration => StatusCode::NOT_FOUND,
            RelayError::FetchFailed { .. }
            | RelayError::SubscriptionFailed(_)
            | RelayError::Provider(_) => StatusCode::BAD_GATEWAY,
            RelayError::ForwardFailed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
