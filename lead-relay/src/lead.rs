//! Lead data types.
//!
//! This module defines:
//! - The inbound event envelope pushed by the provider
//! - `LeadRecord`: a lead as returned by the provider lookup
//! - `NormalizedLead`: the record decorated with page/form names, as forwarded

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RelayError;
use crate::store::Configuration;

/// `field` value of a change that carries a lead.
pub const LEADGEN_FIELD: &str = "leadgen";

// =============================================================================
// Inbound Event Envelope
// =============================================================================

/// Provider event envelope: `{ entry: [{ id, changes: [{ field, value }] }] }`.
///
/// Decoding never fails. Missing, null or mistyped parts decode as absent so
/// one odd entry cannot take the rest of the batch down with it.
#[derive(Debug, Clone, Default)]
pub struct LeadEvent {
    pub object: Option<String>,
    pub entry: Vec<EventEntry>,
}

#[derive(Debug, Clone, Default)]
pub struct EventEntry {
    /// Page the changes belong to
    pub id: Option<String>,
    pub changes: Vec<EventChange>,
}

#[derive(Debug, Clone, Default)]
pub struct EventChange {
    pub field: Option<String>,
    pub value: Value,
}

impl LeadEvent {
    pub fn from_value(document: &Value) -> Self {
        Self {
            object: document
                .get("object")
                .and_then(Value::as_str)
                .map(str::to_string),
            entry: array_of(document, "entry", EventEntry::from_value),
        }
    }
}

impl EventEntry {
    fn from_value(raw: &Value) -> Self {
        Self {
            id: raw.get("id").and_then(id_string),
            changes: array_of(raw, "changes", EventChange::from_value),
        }
    }
}

impl EventChange {
    fn from_value(raw: &Value) -> Self {
        Self {
            field: raw.get("field").and_then(Value::as_str).map(str::to_string),
            value: raw.get("value").cloned().unwrap_or(Value::Null),
        }
    }

    pub fn is_leadgen(&self) -> bool {
        self.field.as_deref() == Some(LEADGEN_FIELD)
    }

    /// Decode the change value as a lead reference.
    pub fn leadgen(&self) -> Option<LeadgenValue> {
        serde_json::from_value(self.value.clone()).ok()
    }
}

/// Value of a `leadgen` change.
#[derive(Debug, Clone, Deserialize)]
pub struct LeadgenValue {
    #[serde(deserialize_with = "string_or_number")]
    pub leadgen_id: String,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub form_id: Option<String>,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub created_time: Option<String>,
}

/// Decode `parent[key]` element-wise; anything but an array is empty.
fn array_of<T>(parent: &Value, key: &str, decode: fn(&Value) -> T) -> Vec<T> {
    parent
        .get(key)
        .and_then(Value::as_array)
        .map(|items| items.iter().map(decode).collect())
        .unwrap_or_default()
}

fn id_string(raw: &Value) -> Option<String> {
    match raw {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Provider ids and timestamps arrive as strings or bare numbers.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {}",
            other
        ))),
    }
}

fn opt_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::String(s) if s.is_empty() => Ok(None),
        Value::String(s) => Ok(Some(s)),
        Value::Number(n) => Ok(Some(n.to_string())),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {}",
            other
        ))),
    }
}

// =============================================================================
// Provider Lead Record
// =============================================================================

/// A lead as returned by the provider lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct LeadRecord {
    pub id: String,
    pub created_time: Option<String>,
    /// `field_data` flattened to name → first value
    pub fields: BTreeMap<String, String>,
    /// Full provider payload
    pub raw: Value,
}

impl LeadRecord {
    pub fn from_provider(lead_id: &str, raw: Value) -> Self {
        let fields = raw
            .get("field_data")
            .and_then(Value::as_array)
            .map(|entries| flatten_field_data(entries))
            .unwrap_or_default();

        let created_time = raw.get("created_time").and_then(|v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        });

        Self {
            id: lead_id.to_string(),
            created_time,
            fields,
            raw,
        }
    }
}

/// Flatten `[{name, values: [..]}]` into name → first value.
///
/// Missing or empty `values` yield an empty string; entries without a name
/// are dropped.
pub fn flatten_field_data(entries: &[Value]) -> BTreeMap<String, String> {
    entries
        .iter()
        .filter_map(|entry| {
            let name = entry.get("name")?.as_str()?;
            let first = entry
                .get("values")
                .and_then(Value::as_array)
                .and_then(|values| values.first());

            let value = match first {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Null) | None => String::new(),
                Some(other) => other.to_string(),
            };

            Some((name.to_string(), value))
        })
        .collect()
}

// =============================================================================
// Normalized Lead
// =============================================================================

/// Lead as delivered to the configured webhook.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedLead {
    pub id: String,
    pub form_id: Option<String>,
    pub form_name: Option<String>,
    pub page_id: String,
    pub page_name: String,
    pub created_time: Option<String>,
    pub fields: BTreeMap<String, String>,
    pub raw_data: Value,
}

impl NormalizedLead {
    /// Decorate a fetched record with the configured page and form names.
    ///
    /// When the change carries no form id and exactly one form is configured,
    /// that form is assumed.
    pub fn assemble(
        record: LeadRecord,
        change: &LeadgenValue,
        page_id: &str,
        config: &Configuration,
    ) -> Self {
        let form_id = change
            .form_id
            .clone()
            .or_else(|| config.single_form().map(|f| f.id.clone()));
        let form_name = form_id
            .as_deref()
            .and_then(|id| config.form_name(id))
            .map(str::to_string);

        Self {
            id: record.id,
            form_id,
            form_name,
            page_id: page_id.to_string(),
            page_name: config.page_name().to_string(),
            created_time: record.created_time.or_else(|| change.created_time.clone()),
            fields: record.fields,
            raw_data: record.raw,
        }
    }
}

/// Retrieves full lead records from the provider.
#[async_trait]
pub trait LeadFetcher: Send + Sync {
    async fn fetch_lead(&self, lead_id: &str, access_token: &str)
        -> Result<LeadRecord, RelayError>;
}
