pub mod assignments;
pub mod auth;
pub mod followups;
pub mod health;
pub mod inbound;
pub mod sessions;

use std::sync::Arc;

use axum::http::StatusCode;
use axum::middleware;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{delete, get, post, put};
use axum::Router;

use rd_domain::error::Error;

use crate::state::AppState;
use crate::tenants::Tenant;

/// Build the full API router.
///
/// `/v1/health` is public; every `/v1/tenants/*` route sits behind the
/// bearer-token middleware.
pub fn router(state: AppState) -> Router {
    let public = Router::new().route("/v1/health", get(health::health));

    let protected = Router::new()
        // Inbound (transport webhook)
        .route("/v1/tenants/:tenant/inbound", post(inbound::inbound))
        // Scheduled messages
        .route(
            "/v1/tenants/:tenant/scheduled-messages",
            post(followups::create),
        )
        .route(
            "/v1/tenants/:tenant/scheduled-messages/pause",
            post(followups::pause),
        )
        .route(
            "/v1/tenants/:tenant/scheduled-messages/resume",
            post(followups::resume),
        )
        .route(
            "/v1/tenants/:tenant/scheduled-messages/delete",
            post(followups::delete_matching),
        )
        .route(
            "/v1/tenants/:tenant/scheduled-messages/cleanup",
            post(followups::cleanup),
        )
        .route(
            "/v1/tenants/:tenant/scheduled-messages/:id",
            get(followups::get_one),
        )
        .route(
            "/v1/tenants/:tenant/scheduled-messages/:id",
            put(followups::update),
        )
        .route(
            "/v1/tenants/:tenant/scheduled-messages/:id",
            delete(followups::delete_one),
        )
        // Assignment
        .route(
            "/v1/tenants/:tenant/assignments",
            post(assignments::assign),
        )
        .route(
            "/v1/tenants/:tenant/roster",
            put(assignments::refresh_roster),
        )
        // Sessions
        .route(
            "/v1/tenants/:tenant/sessions/:contact",
            delete(sessions::reset_session),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_api_token,
        ));

    public.merge(protected).with_state(state)
}

// ── Shared helpers ─────────────────────────────────────────────────

pub(crate) fn api_error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}

/// Map a domain error onto an HTTP status and JSON body.
pub(crate) fn error_response(e: Error) -> Response {
    let status = match &e {
        Error::Validation(_) | Error::Json(_) => StatusCode::BAD_REQUEST,
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::Conflict(_) => StatusCode::CONFLICT,
        Error::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        e if e.is_transient() => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        tracing::warn!(error = %e, kind = e.kind(), "request failed");
    }
    (
        status,
        Json(serde_json::json!({ "error": e.to_string(), "kind": e.kind() })),
    )
        .into_response()
}

/// Resolve a path tenant or produce the 404 response.
pub(crate) fn resolve_tenant(state: &AppState, tenant_id: &str) -> Result<Arc<Tenant>, Response> {
    state
        .tenants
        .get(tenant_id)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, format!("unknown tenant: {tenant_id}")))
}
