use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a voice call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallState {
    Initiated,
    Ringing,
    Answered,
    Active,
    Speaking,
    Listening,
    // Terminal states — no transitions out except an idempotent end.
    Completed,
    HangupUser,
    HangupBot,
    Timeout,
    Error,
    Failed,
    NoAnswer,
    Busy,
    Voicemail,
}

impl CallState {
    /// True for states that admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed
                | Self::HangupUser
                | Self::HangupBot
                | Self::Timeout
                | Self::Error
                | Self::Failed
                | Self::NoAnswer
                | Self::Busy
                | Self::Voicemail
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallDirection {
    Inbound,
    Outbound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    Bot,
    User,
}

/// One utterance in a call, in event-receive order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub timestamp: DateTime<Utc>,
    pub speaker: Speaker,
    pub text: String,
    /// Interim speech-to-text results arrive with `is_final = false`.
    pub is_final: bool,
}

/// Full record of one telephony session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallRecord {
    /// Gateway-assigned ID.
    pub call_id: String,
    /// The telephony provider's own ID; webhook events carry this.
    pub provider_call_id: String,
    pub provider: String,
    pub direction: CallDirection,
    pub state: CallState,
    pub from: String,
    pub to: String,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answered_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_reason: Option<CallState>,
    #[serde(default)]
    pub transcript: Vec<TranscriptEntry>,
}

/// Normalized telephony event, parsed from a provider webhook.
#[derive(Debug, Clone)]
pub enum CallEvent {
    CallInitiated {
        provider_call_id: String,
        direction: CallDirection,
        from: String,
        to: String,
    },
    CallRinging {
        provider_call_id: String,
    },
    CallAnswered {
        provider_call_id: String,
    },
    /// The bot spoke `text` (TTS playback finished or began).
    CallSpeaking {
        provider_call_id: String,
        text: String,
    },
    /// The user spoke; `is_final` distinguishes interim STT results.
    CallSpeech {
        provider_call_id: String,
        transcript: String,
        is_final: bool,
    },
    CallEnded {
        provider_call_id: String,
        reason: CallState,
    },
    CallError {
        provider_call_id: String,
        message: String,
    },
}

impl CallEvent {
    pub fn provider_call_id(&self) -> &str {
        match self {
            Self::CallInitiated {
                provider_call_id, ..
            }
            | Self::CallRinging { provider_call_id }
            | Self::CallAnswered { provider_call_id }
            | Self::CallSpeaking {
                provider_call_id, ..
            }
            | Self::CallSpeech {
                provider_call_id, ..
            }
            | Self::CallEnded {
                provider_call_id, ..
            }
            | Self::CallError {
                provider_call_id, ..
            } => provider_call_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_set_is_exactly_nine_states() {
        let all = [
            CallState::Initiated,
            CallState::Ringing,
            CallState::Answered,
            CallState::Active,
            CallState::Speaking,
            CallState::Listening,
            CallState::Completed,
            CallState::HangupUser,
            CallState::HangupBot,
            CallState::Timeout,
            CallState::Error,
            CallState::Failed,
            CallState::NoAnswer,
            CallState::Busy,
            CallState::Voicemail,
        ];
        let terminal = all.iter().filter(|s| s.is_terminal()).count();
        assert_eq!(terminal, 9);
        assert!(!CallState::Active.is_terminal());
        assert!(CallState::Voicemail.is_terminal());
    }
}
