//! Lead lookup by `leadgen_id`.

use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, warn};

use super::{GraphClient, GRAPH_REQUEST_TIMEOUT};
use crate::error::RelayError;
use crate::lead::{LeadFetcher, LeadRecord};

#[async_trait]
impl LeadFetcher for GraphClient {
    async fn fetch_lead(
        &self,
        lead_id: &str,
        access_token: &str,
    ) -> Result<LeadRecord, RelayError> {
        let fetch_failed = |reason: String| RelayError::FetchFailed {
            lead_id: lead_id.to_string(),
            reason,
        };

        let url = self
            .endpoint(&[lead_id])
            .map_err(|e| fetch_failed(e.to_string()))?;

        let response = self
            .http
            .get(url)
            .query(&[("access_token", access_token)])
            .timeout(GRAPH_REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| fetch_failed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            warn!(lead_id = %lead_id, status_code = status.as_u16(), "lead_lookup_rejected");
            return Err(fetch_failed(format!("provider returned status {}", status.as_u16())));
        }

        let raw: Value = response
            .json()
            .await
            .map_err(|e| fetch_failed(format!("invalid lead body: {}", e)))?;

        let record = LeadRecord::from_provider(lead_id, raw);
        info!(lead_id = %lead_id, field_count = record.fields.len(), "lead_fetched");

        Ok(record)
    }
}
