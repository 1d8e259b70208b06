//! Operator controls — POST /wake and POST /heartbeat/trigger.

use std::sync::Arc;

use axum::{extract::State, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use nexus_scheduler::types::WakeRequest;

use crate::app::AppState;

#[derive(Debug, Deserialize)]
pub struct WakeBody {
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub payload: Option<Value>,
}

/// POST /wake — dispatch an immediate wake to the registered handler.
pub async fn wake_handler(
    State(state): State<Arc<AppState>>,
    Json(body): Json<WakeBody>,
) -> Json<Value> {
    let req = WakeRequest {
        reason: body.reason.unwrap_or_else(|| "manual".to_string()),
        payload: body.payload,
    };
    match state
        .wake
        .request_wake_now(&CancellationToken::new(), &req)
        .await
    {
        Ok(result) => Json(json!({
            "status": result.status,
            "reason": result.reason,
        })),
        Err(e) => {
            warn!(error = %e, "wake dispatch failed");
            Json(json!({"status": "failed", "reason": e.to_string()}))
        }
    }
}

/// POST /heartbeat/trigger — fire all enabled agents now.
pub async fn trigger_heartbeats_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    state.scheduler.trigger_now("manual").await;
    Json(json!({"triggered": true}))
}
