use axum::extract::{Path, State};
use axum::response::{IntoResponse, Json, Response};

use crate::api::{error_response, resolve_tenant};
use crate::state::AppState;

/// `DELETE /v1/tenants/:tenant/sessions/:contact`
///
/// Forget the contact's assistant thread; the next message starts fresh.
pub async fn reset_session(
    State(state): State<AppState>,
    Path((tenant_id, contact_id)): Path<(String, String)>,
) -> Response {
    let tenant = match resolve_tenant(&state, &tenant_id) {
        Ok(t) => t,
        Err(resp) => return resp,
    };
    match state.threads.reset(&tenant.id, &contact_id) {
        Ok(had_thread) => Json(serde_json::json!({
            "contact_id": contact_id,
            "had_thread": had_thread,
        }))
        .into_response(),
        Err(e) => error_response(e),
    }
}
