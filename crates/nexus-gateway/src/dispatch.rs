//! Inbound dispatch — where coalesced message batches meet the agent.
//!
//! The debouncer flushes one batch per conversation; the dispatcher shapes
//! that conversation's in-memory history to the configured token budget and
//! hands it to the [`AgentInvoker`]. Heartbeats flow through the same
//! invoker so a real agent backend plugs in at exactly one seam.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use nexus_agent::context::{resolve_context_window, ContextWindowInfo};
use nexus_agent::prune::prune_to_budget;
use nexus_channels::debounce::DebounceSink;
use nexus_channels::error::ChannelError;
use nexus_channels::types::InboundMessage;
use nexus_core::config::NexusConfig;
use nexus_core::types::{Message, Role};
use nexus_scheduler::error::SchedulerError;
use nexus_scheduler::types::{HeartbeatConfig, RunResult};
use nexus_scheduler::HeartbeatHandler;

/// Keep at least this many messages per conversation when pruning.
const MIN_KEEP_MESSAGES: usize = 2;

/// The seam to a concrete agent backend (LLM pipeline, tool loop, …).
#[async_trait]
pub trait AgentInvoker: Send + Sync {
    /// Run one agent turn over the (already pruned) history. Returns the
    /// assistant's reply text.
    async fn invoke(
        &self,
        ctx: &CancellationToken,
        conversation_id: &str,
        history: &[Message],
    ) -> Result<String, ChannelError>;
}

/// Placeholder invoker used until a real backend is wired in: logs the turn
/// and answers with a canned notice.
pub struct LoggingInvoker;

#[async_trait]
impl AgentInvoker for LoggingInvoker {
    async fn invoke(
        &self,
        _ctx: &CancellationToken,
        conversation_id: &str,
        history: &[Message],
    ) -> Result<String, ChannelError> {
        info!(
            conversation = %conversation_id,
            messages = history.len(),
            "agent turn (no backend configured)"
        );
        Ok("No agent backend is configured.".to_string())
    }
}

/// Debounce sink + heartbeat handler over a shared conversation store.
pub struct Dispatcher {
    invoker: Arc<dyn AgentInvoker>,
    /// In-memory conversation histories; process-lifetime only.
    histories: DashMap<String, Vec<Message>>,
    context_tokens: u64,
    history_share: f64,
    cancel: CancellationToken,
}

impl Dispatcher {
    pub fn new(config: &NexusConfig, invoker: Arc<dyn AgentInvoker>) -> Self {
        // No model metadata at the composition root: the agent-config and
        // gateway defaults are the live candidates.
        let window: ContextWindowInfo = resolve_context_window(
            None,
            None,
            "",
            "",
            0.0,
            config.agent.context_tokens as f64,
        );
        debug!(tokens = window.tokens, source = %window.source, "context window resolved");
        Self {
            invoker,
            histories: DashMap::new(),
            context_tokens: window.tokens,
            history_share: config.agent.history_share,
            cancel: CancellationToken::new(),
        }
    }

    /// Cancel in-flight agent turns (used at shutdown).
    pub fn cancel_all(&self) {
        self.cancel.cancel();
    }

    /// Append `messages` to the conversation, prune to budget, and return
    /// the shaped history.
    fn shape_history(&self, conversation_id: &str, messages: Vec<Message>) -> Vec<Message> {
        let mut entry = self
            .histories
            .entry(conversation_id.to_string())
            .or_default();
        entry.extend(messages);
        let result = prune_to_budget(
            entry.as_slice(),
            self.context_tokens,
            self.history_share,
            MIN_KEEP_MESSAGES,
        );
        if result.dropped_count > 0 {
            debug!(
                conversation = %conversation_id,
                dropped = result.dropped_count,
                kept_tokens = result.kept_tokens,
                "history pruned"
            );
            *entry = result.kept.clone();
        }
        result.kept
    }

    fn record_reply(&self, conversation_id: &str, reply: &str) {
        if let Some(mut entry) = self.histories.get_mut(conversation_id) {
            entry.push(Message::new(Role::Assistant, reply));
        }
    }
}

#[async_trait]
impl DebounceSink<InboundMessage> for Dispatcher {
    fn key_for(&self, item: &InboundMessage) -> String {
        item.conversation_id.clone()
    }

    async fn on_flush(&self, items: &[InboundMessage]) -> Result<(), ChannelError> {
        let Some(first) = items.first() else {
            return Ok(());
        };
        let conversation_id = first.conversation_id.clone();
        let turn: Vec<Message> = items
            .iter()
            .map(|m| Message::new(Role::User, m.text.clone()))
            .collect();

        let history = self.shape_history(&conversation_id, turn);
        let reply = self
            .invoker
            .invoke(&self.cancel, &conversation_id, &history)
            .await?;
        self.record_reply(&conversation_id, &reply);
        Ok(())
    }

    async fn on_error(&self, error: ChannelError, items: Vec<InboundMessage>) {
        warn!(
            error = %error,
            dropped = items.len(),
            "inbound batch failed; messages dropped"
        );
    }
}

#[async_trait]
impl HeartbeatHandler for Dispatcher {
    async fn on_run(
        &self,
        ctx: &CancellationToken,
        agent_id: &str,
        _config: &HeartbeatConfig,
    ) -> Result<RunResult, SchedulerError> {
        let prompt = vec![Message::new(
            Role::System,
            "Periodic heartbeat: review pending work and check in if needed.",
        )];
        match self.invoker.invoke(ctx, agent_id, &prompt).await {
            Ok(reply) if reply.trim().is_empty() => Ok(RunResult::ran("ok-empty")),
            Ok(_) => Ok(RunResult::ran("delivered")),
            Err(e) => Err(SchedulerError::Run(e.to_string())),
        }
    }
}
