use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Rough chars-per-token divisor used everywhere token budgets are estimated.
pub const CHARS_PER_TOKEN: usize = 4;

/// Who produced a message in the conversation history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Tool,
    System,
}

/// A single message in an agent's conversation history.
///
/// Tool payloads are carried as their serialized JSON text — the gateway
/// never interprets them, it only needs their size for token estimation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub role: Role,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_results: Option<String>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: None,
            role,
            content: content.into(),
            tool_calls: None,
            tool_results: None,
        }
    }

    /// Estimated token count: total payload chars divided by
    /// [`CHARS_PER_TOKEN`], rounded up. A fully empty message costs nothing.
    pub fn estimate_tokens(&self) -> u64 {
        let chars = self.content.len()
            + self.tool_calls.as_deref().map_or(0, str::len)
            + self.tool_results.as_deref().map_or(0, str::len);
        estimate_tokens_for_len(chars)
    }

    /// True when the message carries no content at all.
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
            && self.tool_calls.as_deref().map_or(true, str::is_empty)
            && self.tool_results.as_deref().map_or(true, str::is_empty)
    }
}

/// Estimate tokens for a plain text string.
pub fn estimate_tokens(text: &str) -> u64 {
    estimate_tokens_for_len(text.len())
}

fn estimate_tokens_for_len(chars: usize) -> u64 {
    (chars as u64).div_ceil(CHARS_PER_TOKEN as u64)
}

/// Total estimated tokens across a slice of messages.
pub fn estimate_total_tokens(messages: &[Message]) -> u64 {
    messages.iter().map(Message::estimate_tokens).sum()
}

/// Time source used by schedulers, monitors, and call records.
///
/// Components take an `Arc<dyn Clock>` so tests can substitute a fixed or
/// stepped clock without touching tokio's timer machinery.
pub trait Clock: Send + Sync {
    /// Milliseconds since the Unix epoch.
    fn now_ms(&self) -> u64;

    /// Current wall-clock instant.
    fn now_utc(&self) -> DateTime<Utc>;
}

/// Production clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        Utc::now().timestamp_millis().max(0) as u64
    }

    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
