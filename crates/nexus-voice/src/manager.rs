//! Call manager — owns call records and drives their state machine from
//! provider webhook events.
//!
//! Records live in a concurrent map keyed by the gateway call ID, with a
//! secondary index on the provider's own call ID (webhook events carry the
//! latter). Provider operations (`hangup`, TTS) execute outside any map
//! guard, and webhook handling always acknowledges so the provider's retry
//! machinery never hammers a failing handler.

use std::sync::Arc;

use chrono::Duration;
use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use nexus_core::types::Clock;

use crate::error::{Result, VoiceError};
use crate::provider::{TelephonyProvider, WebhookContext};
use crate::types::{CallDirection, CallEvent, CallRecord, CallState, Speaker, TranscriptEntry};

/// HTTP reply the webhook endpoint should send.
#[derive(Debug, Clone)]
pub struct WebhookReply {
    pub status_code: u16,
    pub body: String,
}

pub struct CallManager {
    provider: Arc<dyn TelephonyProvider>,
    clock: Arc<dyn Clock>,
    calls: DashMap<String, CallRecord>,
    /// provider_call_id → call_id.
    by_provider_id: DashMap<String, String>,
}

impl CallManager {
    pub fn new(provider: Arc<dyn TelephonyProvider>, clock: Arc<dyn Clock>) -> Self {
        Self {
            provider,
            clock,
            calls: DashMap::new(),
            by_provider_id: DashMap::new(),
        }
    }

    /// Dial out. The record is created in `Initiated` and inserted *before*
    /// the provider dials: the dial can trigger webhook events (ringing,
    /// early errors) ahead of its own return, and those must find a record
    /// to land on. A failed dial closes the record as `Failed`.
    pub async fn initiate_call(
        &self,
        ctx: &CancellationToken,
        from: &str,
        to: &str,
    ) -> Result<String> {
        let call_id = Uuid::new_v4().to_string();
        let record = CallRecord {
            call_id: call_id.clone(),
            // Filled in once the provider assigns its ID.
            provider_call_id: String::new(),
            provider: self.provider.name().to_string(),
            direction: CallDirection::Outbound,
            state: CallState::Initiated,
            from: from.to_string(),
            to: to.to_string(),
            started_at: self.clock.now_utc(),
            answered_at: None,
            ended_at: None,
            end_reason: None,
            transcript: Vec::new(),
        };
        self.calls.insert(call_id.clone(), record);

        match self.provider.initiate_call(ctx, from, to).await {
            Ok(provider_call_id) => {
                self.by_provider_id
                    .insert(provider_call_id.clone(), call_id.clone());
                if let Some(mut record) = self.calls.get_mut(&call_id) {
                    record.provider_call_id = provider_call_id;
                }
                info!(call = %call_id, %to, "outbound call initiated");
                Ok(call_id)
            }
            Err(e) => {
                if let Some(mut record) = self.calls.get_mut(&call_id) {
                    record.state = CallState::Failed;
                    record.end_reason = Some(CallState::Failed);
                    record.ended_at = Some(self.clock.now_utc());
                }
                warn!(call = %call_id, %to, error = %e, "outbound dial failed");
                Err(e)
            }
        }
    }

    /// Snapshot of one call record.
    pub fn get(&self, call_id: &str) -> Option<CallRecord> {
        self.calls.get(call_id).map(|r| r.value().clone())
    }

    /// Snapshot of the record for a provider call ID.
    pub fn get_by_provider_id(&self, provider_call_id: &str) -> Option<CallRecord> {
        let call_id = self.by_provider_id.get(provider_call_id)?;
        self.get(call_id.value())
    }

    /// All non-terminal calls.
    pub fn active_calls(&self) -> Vec<CallRecord> {
        self.calls
            .iter()
            .filter(|r| !r.value().state.is_terminal())
            .map(|r| r.value().clone())
            .collect()
    }

    /// Apply one telephony event to its call record.
    ///
    /// `CallInitiated` creates an inbound record when none exists. Terminal
    /// records accept only `CallEnded` (an idempotent no-op); any other
    /// event on a terminal call is logged and dropped.
    pub fn handle_event(&self, event: &CallEvent) -> Result<()> {
        let now = self.clock.now_utc();
        let provider_call_id = event.provider_call_id().to_string();

        if let CallEvent::CallInitiated {
            direction,
            from,
            to,
            ..
        } = event
        {
            if !self.by_provider_id.contains_key(&provider_call_id) {
                if *direction != CallDirection::Inbound {
                    return Err(VoiceError::InvalidEvent(format!(
                        "initiated event for unknown outbound call {provider_call_id}"
                    )));
                }
                let call_id = Uuid::new_v4().to_string();
                let record = CallRecord {
                    call_id: call_id.clone(),
                    provider_call_id: provider_call_id.clone(),
                    provider: self.provider.name().to_string(),
                    direction: CallDirection::Inbound,
                    state: CallState::Initiated,
                    from: from.clone(),
                    to: to.clone(),
                    started_at: now,
                    answered_at: None,
                    ended_at: None,
                    end_reason: None,
                    transcript: Vec::new(),
                };
                self.by_provider_id
                    .insert(provider_call_id.clone(), call_id.clone());
                self.calls.insert(call_id.clone(), record);
                info!(call = %call_id, from = %from, "inbound call created");
            }
            return Ok(());
        }

        let call_id = self
            .by_provider_id
            .get(&provider_call_id)
            .map(|e| e.value().clone())
            .ok_or_else(|| VoiceError::CallNotFound(provider_call_id.clone()))?;
        let mut record = self
            .calls
            .get_mut(&call_id)
            .ok_or_else(|| VoiceError::CallNotFound(call_id.clone()))?;

        if record.state.is_terminal() {
            if !matches!(event, CallEvent::CallEnded { .. }) {
                debug!(call = %call_id, state = ?record.state, "event on terminal call dropped");
            }
            return Ok(());
        }

        match event {
            CallEvent::CallInitiated { .. } => {}
            CallEvent::CallRinging { .. } => {
                record.state = CallState::Ringing;
            }
            CallEvent::CallAnswered { .. } => {
                record.state = CallState::Active;
                record.answered_at = Some(now);
            }
            CallEvent::CallSpeaking { text, .. } => {
                record.state = CallState::Speaking;
                record.transcript.push(TranscriptEntry {
                    timestamp: now,
                    speaker: Speaker::Bot,
                    text: text.clone(),
                    is_final: true,
                });
            }
            CallEvent::CallSpeech {
                transcript,
                is_final,
                ..
            } => {
                record.state = CallState::Listening;
                record.transcript.push(TranscriptEntry {
                    timestamp: now,
                    speaker: Speaker::User,
                    text: transcript.clone(),
                    is_final: *is_final,
                });
            }
            CallEvent::CallEnded { reason, .. } => {
                if !reason.is_terminal() {
                    return Err(VoiceError::InvalidEvent(format!(
                        "end reason {reason:?} is not terminal"
                    )));
                }
                record.state = *reason;
                record.end_reason = Some(*reason);
                record.ended_at = Some(now);
                info!(call = %call_id, reason = ?reason, "call ended");
            }
            CallEvent::CallError { message, .. } => {
                record.state = CallState::Error;
                record.end_reason = Some(CallState::Error);
                record.ended_at = Some(now);
                warn!(call = %call_id, error = %message, "call errored");
            }
        }
        Ok(())
    }

    /// Speak `text` on a live call. Fails with [`VoiceError::CallEnded`]
    /// once the call is terminal. The TTS request runs before any record
    /// mutation, outside the map guard.
    pub async fn speak_to_user(
        &self,
        ctx: &CancellationToken,
        call_id: &str,
        text: &str,
    ) -> Result<()> {
        let provider_call_id = {
            let record = self
                .calls
                .get(call_id)
                .ok_or_else(|| VoiceError::CallNotFound(call_id.to_string()))?;
            if record.state.is_terminal() {
                return Err(VoiceError::CallEnded(call_id.to_string()));
            }
            record.provider_call_id.clone()
        };

        self.provider.play_tts(ctx, &provider_call_id, text).await?;

        if let Some(mut record) = self.calls.get_mut(call_id) {
            // The call may have ended while TTS was in flight.
            if !record.state.is_terminal() {
                record.state = CallState::Speaking;
                let now = self.clock.now_utc();
                record.transcript.push(TranscriptEntry {
                    timestamp: now,
                    speaker: Speaker::Bot,
                    text: text.to_string(),
                    is_final: true,
                });
            }
        }
        Ok(())
    }

    /// Hang up a call from the bot side. Ending a terminal call is a
    /// successful no-op; otherwise the provider hangup runs first and the
    /// record transitions to `HangupBot`.
    pub async fn end_call(&self, ctx: &CancellationToken, call_id: &str) -> Result<()> {
        let provider_call_id = {
            let record = self
                .calls
                .get(call_id)
                .ok_or_else(|| VoiceError::CallNotFound(call_id.to_string()))?;
            if record.state.is_terminal() {
                return Ok(());
            }
            record.provider_call_id.clone()
        };

        self.provider.hangup_call(ctx, &provider_call_id).await?;

        if let Some(mut record) = self.calls.get_mut(call_id) {
            if !record.state.is_terminal() {
                record.state = CallState::HangupBot;
                record.end_reason = Some(CallState::HangupBot);
                record.ended_at = Some(self.clock.now_utc());
                info!(call = %call_id, "call hung up by bot");
            }
        }
        Ok(())
    }

    /// Verify, parse, and apply a provider webhook.
    ///
    /// Verification errors propagate; an invalid signature yields a 401
    /// reply. Per-event handler errors are logged and swallowed so the
    /// webhook always acknowledges — the provider would otherwise retry a
    /// payload we already know we can't process.
    pub async fn handle_webhook(&self, ctx: &WebhookContext) -> Result<WebhookReply> {
        let valid = self.provider.verify_webhook(ctx).await?;
        if !valid {
            warn!("webhook signature rejected");
            return Ok(WebhookReply {
                status_code: 401,
                body: "Unauthorized".to_string(),
            });
        }

        let parsed = self.provider.parse_webhook(ctx).await?;
        for event in &parsed.events {
            if let Err(e) = self.handle_event(event) {
                warn!(error = %e, "webhook event dropped");
            }
        }
        Ok(WebhookReply {
            status_code: parsed.status_code,
            body: parsed.response_body,
        })
    }

    /// Remove terminal records whose `ended_at` is older than `older_than`.
    /// Returns how many were removed.
    pub fn cleanup_stale_calls(&self, older_than: Duration) -> usize {
        let cutoff = self.clock.now_utc() - older_than;
        let stale: Vec<(String, String)> = self
            .calls
            .iter()
            .filter(|r| {
                let record = r.value();
                record.state.is_terminal() && record.ended_at.map(|t| t < cutoff).unwrap_or(false)
            })
            .map(|r| (r.value().call_id.clone(), r.value().provider_call_id.clone()))
            .collect();

        for (call_id, provider_call_id) in &stale {
            self.calls.remove(call_id);
            self.by_provider_id.remove(provider_call_id);
        }
        if !stale.is_empty() {
            debug!(count = stale.len(), "stale call records removed");
        }
        stale.len()
    }
}
