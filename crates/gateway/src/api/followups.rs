//! Scheduled-message endpoints under `/v1/tenants/:tenant/scheduled-messages`.
//!
//! Payloads use the camelCase wire shape of the scheduled-message store.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;

use crate::api::{api_error, error_response, resolve_tenant};
use crate::runtime::followups::{FollowUpFilter, NewScheduledMessage, ScheduledMessagePatch};
use crate::state::AppState;

macro_rules! tenant_or_return {
    ($state:expr, $id:expr) => {
        match resolve_tenant(&$state, &$id) {
            Ok(t) => t,
            Err(resp) => return resp,
        }
    };
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Single rows
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// `POST /v1/tenants/:tenant/scheduled-messages`
pub async fn create(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
    Json(payload): Json<NewScheduledMessage>,
) -> Response {
    let tenant = tenant_or_return!(state, tenant_id);
    match state.scheduler.create(&tenant.id, payload) {
        Ok(msg) => (StatusCode::CREATED, Json(msg)).into_response(),
        Err(e) => error_response(e),
    }
}

/// `GET /v1/tenants/:tenant/scheduled-messages/:id`
pub async fn get_one(
    State(state): State<AppState>,
    Path((tenant_id, id)): Path<(String, String)>,
) -> Response {
    let tenant = tenant_or_return!(state, tenant_id);
    match state.scheduler.get(&tenant.id, &id) {
        Ok(Some(msg)) => Json(msg).into_response(),
        Ok(None) => api_error(StatusCode::NOT_FOUND, format!("scheduled message {id} not found")),
        Err(e) => error_response(e),
    }
}

/// `PUT /v1/tenants/:tenant/scheduled-messages/:id`
pub async fn update(
    State(state): State<AppState>,
    Path((tenant_id, id)): Path<(String, String)>,
    Json(patch): Json<ScheduledMessagePatch>,
) -> Response {
    let tenant = tenant_or_return!(state, tenant_id);
    match state.scheduler.update(&tenant.id, &id, patch) {
        Ok(msg) => Json(msg).into_response(),
        Err(e) => error_response(e),
    }
}

/// `DELETE /v1/tenants/:tenant/scheduled-messages/:id`
pub async fn delete_one(
    State(state): State<AppState>,
    Path((tenant_id, id)): Path<(String, String)>,
) -> Response {
    let tenant = tenant_or_return!(state, tenant_id);
    match state.scheduler.delete_one(&tenant.id, &id) {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => api_error(StatusCode::NOT_FOUND, format!("scheduled message {id} not found")),
        Err(e) => error_response(e),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Filter operations
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn check_filter(filter: &FollowUpFilter) -> Option<Response> {
    filter
        .chat_id
        .trim()
        .is_empty()
        .then(|| api_error(StatusCode::BAD_REQUEST, "chatId must not be empty"))
}

/// `POST /v1/tenants/:tenant/scheduled-messages/pause`
pub async fn pause(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
    Json(filter): Json<FollowUpFilter>,
) -> Response {
    let tenant = tenant_or_return!(state, tenant_id);
    if let Some(resp) = check_filter(&filter) {
        return resp;
    }
    match state.scheduler.pause(&tenant.id, &filter) {
        Ok(ids) => Json(serde_json::json!({ "paused": ids.len(), "ids": ids })).into_response(),
        Err(e) => error_response(e),
    }
}

/// `POST /v1/tenants/:tenant/scheduled-messages/resume`
pub async fn resume(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
    Json(filter): Json<FollowUpFilter>,
) -> Response {
    let tenant = tenant_or_return!(state, tenant_id);
    if let Some(resp) = check_filter(&filter) {
        return resp;
    }
    match state.scheduler.resume(&tenant.id, &filter) {
        Ok(outcome) => Json(outcome).into_response(),
        Err(e) => error_response(e),
    }
}

/// `POST /v1/tenants/:tenant/scheduled-messages/delete`
pub async fn delete_matching(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
    Json(filter): Json<FollowUpFilter>,
) -> Response {
    let tenant = tenant_or_return!(state, tenant_id);
    if let Some(resp) = check_filter(&filter) {
        return resp;
    }
    match state.scheduler.delete(&tenant.id, &filter) {
        Ok(n) => Json(serde_json::json!({ "deleted": n })).into_response(),
        Err(e) => error_response(e),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupRequest {
    pub contact_id: String,
    #[serde(rename = "type")]
    pub message_type: String,
    #[serde(default)]
    pub step: Option<u32>,
}

/// `POST /v1/tenants/:tenant/scheduled-messages/cleanup`
pub async fn cleanup(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
    Json(req): Json<CleanupRequest>,
) -> Response {
    let tenant = tenant_or_return!(state, tenant_id);
    if req.contact_id.trim().is_empty() || req.message_type.trim().is_empty() {
        return api_error(StatusCode::BAD_REQUEST, "contactId and type are required");
    }
    match state
        .scheduler
        .cleanup(&tenant.id, &req.contact_id, &req.message_type, req.step)
    {
        Ok(n) => Json(serde_json::json!({ "deleted": n })).into_response(),
        Err(e) => error_response(e),
    }
}
