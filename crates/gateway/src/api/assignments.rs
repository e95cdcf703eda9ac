use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;

use rd_domain::config::Employee;

use crate::api::{api_error, error_response, resolve_tenant};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AssignRequest {
    pub contact_id: String,
    /// Business event that triggered the assignment (e.g. `"lead_created"`).
    #[serde(default)]
    pub event: Option<String>,
}

/// `POST /v1/tenants/:tenant/assignments`
pub async fn assign(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
    Json(body): Json<AssignRequest>,
) -> Response {
    let tenant = match resolve_tenant(&state, &tenant_id) {
        Ok(t) => t,
        Err(resp) => return resp,
    };
    if body.contact_id.trim().is_empty() {
        return api_error(StatusCode::BAD_REQUEST, "contact_id must not be empty");
    }
    tracing::info!(
        tenant = %tenant.id,
        contact_id = %body.contact_id,
        event = body.event.as_deref().unwrap_or("-"),
        "assignment requested"
    );
    match state.assignment.assign_contact(&tenant, &body.contact_id).await {
        Ok(a) => Json(a).into_response(),
        Err(e) => error_response(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct RosterRequest {
    pub staff: Vec<Employee>,
}

/// `PUT /v1/tenants/:tenant/roster` replaces the cached staff roster.
pub async fn refresh_roster(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
    Json(body): Json<RosterRequest>,
) -> Response {
    let tenant = match resolve_tenant(&state, &tenant_id) {
        Ok(t) => t,
        Err(resp) => return resp,
    };
    if body.staff.iter().any(|e| e.name.trim().is_empty()) {
        return api_error(StatusCode::BAD_REQUEST, "every staff member needs a name");
    }
    let count = body.staff.len();
    let active = body.staff.iter().filter(|e| e.weight > 0).count();
    state.roster.refresh(&tenant.id, body.staff);
    Json(serde_json::json!({ "staff": count, "active": active })).into_response()
}
