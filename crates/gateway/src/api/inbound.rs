//! Transport webhook: `POST /v1/tenants/:tenant/inbound`.
//!
//! The message is normalized to text and buffered in the debouncer; the
//! turn runs later on the debounce timer, so the response is always
//! `202 Accepted`.  When an inbound secret is configured the raw body must
//! carry an HMAC-SHA256 signature in `X-Signature-256` (`sha256=<hex>`).

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use rd_domain::message::InboundMessage;

use crate::api::{api_error, resolve_tenant};
use crate::runtime::normalize::normalize;
use crate::state::AppState;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-signature-256";

pub async fn inbound(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let tenant = match resolve_tenant(&state, &tenant_id) {
        Ok(t) => t,
        Err(resp) => return resp,
    };

    if let Some(secret) = &state.inbound_secret {
        let provided = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        let provided = provided.strip_prefix("sha256=").unwrap_or(provided);
        match sign(secret, &body) {
            Some(expected) if bool::from(expected.as_bytes().ct_eq(provided.as_bytes())) => {}
            _ => {
                tracing::warn!(tenant = %tenant.id, "inbound signature mismatch");
                return api_error(StatusCode::UNAUTHORIZED, "invalid inbound signature");
            }
        }
    }

    let msg: InboundMessage = match serde_json::from_slice(&body) {
        Ok(m) => m,
        Err(e) => return api_error(StatusCode::BAD_REQUEST, format!("invalid message: {e}")),
    };
    if msg.chat_id.trim().is_empty() {
        return api_error(StatusCode::BAD_REQUEST, "chatId must not be empty");
    }

    let text = normalize(
        &msg,
        &tenant.id,
        state.transport.as_ref(),
        &state.config.debounce.transcription_apology,
    )
    .await;
    if text.is_empty() {
        tracing::debug!(tenant = %tenant.id, chat_id = %msg.chat_id, "empty inbound message dropped");
        return (
            StatusCode::ACCEPTED,
            Json(serde_json::json!({ "status": "ignored" })),
        )
            .into_response();
    }

    state.debouncer.push(
        &tenant.id,
        &msg.chat_id,
        msg.contact_id(),
        text,
        tenant.debounce_window(),
    );

    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({
            "status": "buffered",
            "chat_id": msg.chat_id,
        })),
    )
        .into_response()
}

/// Lowercase hex HMAC-SHA256 of `body`.
pub fn sign(secret: &[u8], body: &[u8]) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret).ok()?;
    mac.update(body);
    Some(hex::encode(mac.finalize().into_bytes()))
}
