//! Web-chat ingress — POST /chat.
//!
//! The built-in web channel: messages land in the inbound debouncer keyed
//! by conversation, so a burst of quick messages reaches the agent as one
//! turn. The reply is delivered asynchronously; this endpoint only queues.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use nexus_channels::types::{ChannelKind, InboundMessage};

use crate::app::AppState;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub conversation_id: String,
    #[serde(default)]
    pub sender: String,
    pub text: String,
}

pub async fn chat_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    if req.conversation_id.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "conversation_id is required"})),
        ));
    }
    if req.text.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "text is required"})),
        ));
    }

    let message = InboundMessage {
        channel: ChannelKind::Web,
        conversation_id: req.conversation_id,
        sender: if req.sender.is_empty() {
            "web".to_string()
        } else {
            req.sender
        },
        text: req.text,
        received_at: Utc::now(),
    };
    state.debouncer.enqueue(message).await;
    Ok(Json(json!({"queued": true})))
}
