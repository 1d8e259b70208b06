use std::sync::Arc;

use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::app::AppState;

/// GET /healthz — liveness plus channel and heartbeat visibility.
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let (channels, traffic) = {
        let manager = state.channels.lock().await;
        let channels: Vec<Value> = manager
            .statuses()
            .into_iter()
            .map(|(kind, status)| json!({"channel": kind, "connected": status.connected}))
            .collect();
        let totals = manager.metrics_total();
        (
            channels,
            json!({
                "messages_in": totals.messages_in,
                "messages_out": totals.messages_out,
                "errors": totals.errors,
            }),
        )
    };

    let agents: Vec<Value> = state
        .monitor
        .snapshot()
        .into_iter()
        .map(|(agent_id, record)| {
            json!({
                "agent": agent_id,
                "healthy": record.healthy,
                "missed": record.missed_count,
            })
        })
        .collect();

    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "heartbeat_interval_ms": state.config.heartbeat.interval_ms,
        "channels": channels,
        "traffic": traffic,
        "agents": agents,
    }))
}
