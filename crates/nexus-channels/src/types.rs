use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which kind of external surface a channel adapter bridges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Telegram,
    Discord,
    Slack,
    Matrix,
    Sms,
    Web,
    Voice,
}

impl ChannelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Telegram => "telegram",
            Self::Discord => "discord",
            Self::Slack => "slack",
            Self::Matrix => "matrix",
            Self::Sms => "sms",
            Self::Web => "web",
            Self::Voice => "voice",
        }
    }
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runtime status snapshot for an adapter.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ChannelStatus {
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub since: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Counters an adapter accumulates over its lifetime.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ChannelMetrics {
    pub messages_in: u64,
    pub messages_out: u64,
    pub errors: u64,
}

/// A message arriving from a channel, normalized for the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub channel: ChannelKind,
    /// Stable conversation key (room, chat, or phone number) — this is the
    /// debounce key, so bursts within one conversation coalesce.
    pub conversation_id: String,
    pub sender: String,
    pub text: String,
    pub received_at: DateTime<Utc>,
}

/// A message to deliver out through a channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub conversation_id: String,
    pub text: String,
}
