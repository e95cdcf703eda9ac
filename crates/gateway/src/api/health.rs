use axum::extract::State;
use axum::response::Json;

use crate::state::AppState;

/// `GET /v1/health`
pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "tenants": state.tenants.len(),
        "pending_conversations": state.debouncer.pending_count(),
    }))
}
