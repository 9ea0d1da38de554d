//! Event router - per-event lead pipeline.
//!
//! ```text
//! raw body → parse → verify signature → load configuration
//!          → for each leadgen change: filter page/form → fetch → forward
//! ```
//!
//! Gate failures (body that is not JSON, bad signature, no configuration)
//! reject the whole event. Past the gates every change is resolved
//! independently; an unusual entry, a failed fetch or a failed forward is
//! logged and the loop moves on.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::debug_log::{DebugEventType, DebugLog};
use crate::error::RelayError;
use crate::forward::LeadForwarder;
use crate::lead::{EventChange, LeadEvent, LeadFetcher, NormalizedLead};
use crate::store::{Configuration, ConfigurationStore};
use crate::web::signature::verify_signature;

/// Terminal state of a single leadgen change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeadOutcome {
    Forwarded,
    /// Change belongs to a page other than the configured one
    IgnoredPage,
    /// Change belongs to a form that is not configured
    IgnoredForm,
    /// Change value carried no usable `leadgen_id`
    Malformed,
    FetchFailed,
    ForwardFailed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeadResult {
    pub lead_id: Option<String>,
    pub outcome: LeadOutcome,
}

/// Per-change outcomes of one accepted event, in processing order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventSummary {
    pub results: Vec<LeadResult>,
}

impl EventSummary {
    pub fn count(&self, outcome: LeadOutcome) -> usize {
        self.results.iter().filter(|r| r.outcome == outcome).count()
    }
}

pub struct EventRouter {
    store: Arc<dyn ConfigurationStore>,
    fetcher: Arc<dyn LeadFetcher>,
    forwarder: Arc<dyn LeadForwarder>,
    debug_log: DebugLog,
    app_secret: Option<String>,
    require_signature: bool,
}

impl EventRouter {
    pub fn new(
        store: Arc<dyn ConfigurationStore>,
        fetcher: Arc<dyn LeadFetcher>,
        forwarder: Arc<dyn LeadForwarder>,
        debug_log: DebugLog,
    ) -> Self {
        Self {
            store,
            fetcher,
            forwarder,
            debug_log,
            app_secret: None,
            require_signature: false,
        }
    }

    /// Key used to verify event signatures.
    pub fn with_app_secret(mut self, secret: impl Into<String>) -> Self {
        self.app_secret = Some(secret.into());
        self
    }

    /// Reject events that arrive without a signature header.
    pub fn require_signature(mut self, required: bool) -> Self {
        self.require_signature = required;
        self
    }

    /// Process one inbound event body.
    ///
    /// Returns an error only for gate failures; per-lead failures are
    /// reported in the summary.
    pub async fn handle_event(
        &self,
        raw_body: &[u8],
        signature: Option<&str>,
    ) -> Result<EventSummary, RelayError> {
        let document: Value = serde_json::from_slice(raw_body).map_err(|e| {
            warn!(error = %e, body_length = raw_body.len(), "webhook_body_malformed");
            RelayError::MalformedPayload(e.to_string())
        })?;

        if !self.signature_accepted(raw_body, signature) {
            warn!(
                has_signature = signature.is_some(),
                body_length = raw_body.len(),
                "webhook_signature_invalid"
            );
            return Err(RelayError::SignatureInvalid);
        }

        let event = LeadEvent::from_value(&document);

        let config = match self.store.get().await {
            Some(config) => config,
            None => {
                warn!(entries = event.entry.len(), "webhook_no_configuration");
                return Err(RelayError::NoConfiguration);
            }
        };

        info!(
            object = ?event.object,
            entries = event.entry.len(),
            "webhook_received"
        );
        self.debug_log
            .record(
                DebugEventType::WebhookReceived,
                json!({
                    "object": event.object,
                    "entries": event.entry.len(),
                    "body_length": raw_body.len(),
                }),
                None,
                None,
            )
            .await;

        let mut summary = EventSummary::default();
        for entry in &event.entry {
            // An entry without an id matches no page and is ignored like any other page.
            let page_id = entry.id.as_deref().unwrap_or_default();
            for change in entry.changes.iter().filter(|c| c.is_leadgen()) {
                let result = self.process_change(page_id, change, &config).await;
                summary.results.push(result);
            }
        }

        info!(
            changes = summary.results.len(),
            forwarded = summary.count(LeadOutcome::Forwarded),
            fetch_failed = summary.count(LeadOutcome::FetchFailed),
            forward_failed = summary.count(LeadOutcome::ForwardFailed),
            "webhook_processed"
        );

        Ok(summary)
    }

    fn signature_accepted(&self, raw_body: &[u8], signature: Option<&str>) -> bool {
        if self.require_signature && signature.is_none() {
            return false;
        }
        verify_signature(raw_body, signature, self.app_secret.as_deref())
    }

    async fn process_change(
        &self,
        page_id: &str,
        change: &EventChange,
        config: &Configuration,
    ) -> LeadResult {
        let value = match change.leadgen() {
            Some(value) => value,
            None => {
                warn!(page_id = %page_id, value = %change.value, "leadgen_change_malformed");
                return LeadResult {
                    lead_id: None,
                    outcome: LeadOutcome::Malformed,
                };
            }
        };
        let lead_id = value.leadgen_id.clone();
        let result = |outcome| LeadResult {
            lead_id: Some(lead_id.clone()),
            outcome,
        };

        if page_id != config.page_id() {
            info!(lead_id = %lead_id, page_id = %page_id, "lead_ignored_other_page");
            return result(LeadOutcome::IgnoredPage);
        }

        if !config.accepts_form(value.form_id.as_deref()) {
            info!(lead_id = %lead_id, form_id = ?value.form_id, "lead_ignored_other_form");
            return result(LeadOutcome::IgnoredForm);
        }

        info!(lead_id = %lead_id, page_id = %page_id, form_id = ?value.form_id, "lead_processing");

        let record = match self.fetcher.fetch_lead(&lead_id, config.access_token()).await {
            Ok(record) => record,
            Err(e) => {
                error!(lead_id = %lead_id, error = %e, "lead_fetch_failed");
                self.debug_log
                    .record(
                        DebugEventType::Error,
                        json!({ "lead_id": lead_id, "stage": "fetch" }),
                        Some(false),
                        Some(e.to_string()),
                    )
                    .await;
                return result(LeadOutcome::FetchFailed);
            }
        };

        let lead = NormalizedLead::assemble(record, &value, page_id, config);
        self.debug_log
            .record(
                DebugEventType::LeadProcessed,
                json!({
                    "lead_id": lead.id,
                    "form_id": lead.form_id,
                    "field_count": lead.fields.len(),
                }),
                Some(true),
                None,
            )
            .await;

        let report = self.forwarder.deliver(&lead, config.webhook_url()).await;
        let failure = (!report.delivered).then(|| RelayError::ForwardFailed {
            lead_id: lead_id.clone(),
            attempts: report.attempts.len() as u32,
        });

        match &failure {
            None => info!(lead_id = %lead_id, attempts = report.attempts.len(), "lead_forwarded"),
            Some(e) => error!(
                lead_id = %lead_id,
                webhook_url = %config.webhook_url(),
                error = %e,
                "lead_forward_failed"
            ),
        }

        self.debug_log
            .record(
                DebugEventType::WebhookForwarded,
                json!({
                    "lead_id": lead_id,
                    "webhook_url": config.webhook_url().as_str(),
                    "attempts": report.attempts,
                }),
                Some(report.delivered),
                failure.map(|e| e.to_string()),
            )
            .await;

        let delivered = report.delivered;
        if delivered {
            result(LeadOutcome::Forwarded)
        } else {
            result(LeadOutcome::ForwardFailed)
        }
    }
}
