//! Debug log endpoints.

use axum::{extract::State, Json};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::debug_log::{DebugEventType, DEFAULT_RECENT_LIMIT};
use crate::web::AppState;

/// Most recent entries, newest first.
pub async fn list_entries(State(state): State<AppState>) -> Json<Value> {
    let entries = state.debug_log.recent(DEFAULT_RECENT_LIMIT).await;
    let total = state.debug_log.total().await;

    Json(json!({
        "debug_data": entries,
        "total_count": total,
    }))
}

#[derive(Debug, Deserialize)]
pub struct NewEntry {
    #[serde(rename = "type")]
    pub kind: DebugEventType,
    #[serde(default)]
    pub data: Value,
    pub success: Option<bool>,
    pub error: Option<String>,
}

pub async fn add_entry(State(state): State<AppState>, Json(entry): Json<NewEntry>) -> Json<Value> {
    let entry = state
        .debug_log
        .record(entry.kind, entry.data, entry.success, entry.error)
        .await;

    Json(json!({ "success": true, "entry": entry }))
}

pub async fn clear_entries(State(state): State<AppState>) -> Json<Value> {
    state.debug_log.clear().await;
    Json(json!({ "success": true, "message": "Debug data cleared" }))
}
