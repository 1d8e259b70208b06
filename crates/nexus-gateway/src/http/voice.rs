//! Voice webhook ingress — POST /voice/webhook.
//!
//! The HTTP layer only shapes the request; signature verification and
//! payload decoding belong to the telephony provider behind the call
//! manager. Whatever the manager decides (including 401 on a bad
//! signature) is relayed verbatim so the provider's retry semantics see a
//! consistent endpoint.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use tracing::{info, warn};

use nexus_voice::provider::WebhookContext;

use crate::app::AppState;

pub async fn webhook_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(calls) = &state.calls else {
        return (StatusCode::NOT_FOUND, "voice is not enabled").into_response();
    };

    let header_map: HashMap<String, String> = headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();
    let ctx = WebhookContext {
        headers: header_map,
        body: body.to_vec(),
    };

    info!(bytes = ctx.body.len(), "voice webhook arrived");
    match calls.handle_webhook(&ctx).await {
        Ok(reply) => {
            let status =
                StatusCode::from_u16(reply.status_code).unwrap_or(StatusCode::OK);
            (status, reply.body).into_response()
        }
        Err(e) => {
            warn!(error = %e, "voice webhook processing failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response()
        }
    }
}
