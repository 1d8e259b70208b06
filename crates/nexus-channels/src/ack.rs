//! Per-session ack runner — delivers short status texts on an interval.
//!
//! Each tick drains a FIFO queue of acks. Delivery is bounded by a timeout,
//! retried a configurable number of times, and truncated grapheme-safe so a
//! multi-codepoint emoji is never split mid-character. Cancelling the parent
//! token is fatal: in-flight retries abort and the runner stops.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use unicode_segmentation::UnicodeSegmentation;
use uuid::Uuid;

use crate::error::ChannelError;

/// Default cap on ack length in user-perceived characters.
pub const DEFAULT_ACK_MAX_CHARS: usize = 500;

#[derive(Debug, Clone)]
pub struct AckRunnerConfig {
    pub interval_ms: u64,
    /// Grapheme cap per ack; 0 means [`DEFAULT_ACK_MAX_CHARS`].
    pub ack_max_chars: usize,
    pub timeout_ms: u64,
    /// Additional tries after the first failed delivery.
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
}

impl Default for AckRunnerConfig {
    fn default() -> Self {
        Self {
            interval_ms: 1_000,
            ack_max_chars: 0,
            timeout_ms: 5_000,
            retry_attempts: 2,
            retry_delay_ms: 250,
        }
    }
}

/// Lifecycle events observable by the session owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AckEvent {
    Started,
    Tick,
    Ack { text: String },
    Error { message: String },
    Stopped,
}

/// External delivery capability (a channel send in production).
#[async_trait]
pub trait AckDelivery: Send + Sync {
    async fn deliver(&self, ctx: &CancellationToken, text: &str) -> Result<(), ChannelError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Running,
    Stopped,
}

/// Truncate to `max_chars` user-perceived characters, appending `"..."`
/// when anything was cut. 0 falls back to the default cap.
pub fn truncate_ack(text: &str, max_chars: usize) -> String {
    let max = if max_chars == 0 {
        DEFAULT_ACK_MAX_CHARS
    } else {
        max_chars
    };
    let mut graphemes = text.grapheme_indices(true);
    match graphemes.nth(max) {
        None => text.to_string(),
        Some((cut, _)) => format!("{}...", &text[..cut]),
    }
}

struct AckInner {
    id: String,
    session_id: String,
    config: AckRunnerConfig,
    delivery: Arc<dyn AckDelivery>,
    events: Option<mpsc::Sender<AckEvent>>,
    queue: Mutex<VecDeque<String>>,
    cancel: CancellationToken,
    phase: Mutex<Phase>,
}

pub struct AckRunner {
    inner: Arc<AckInner>,
}

impl AckRunner {
    /// `parent` is the session's cancellation context; its cancellation is
    /// fatal to this runner.
    pub fn new(
        session_id: impl Into<String>,
        config: AckRunnerConfig,
        delivery: Arc<dyn AckDelivery>,
        parent: &CancellationToken,
        events: Option<mpsc::Sender<AckEvent>>,
    ) -> Self {
        Self {
            inner: Arc::new(AckInner {
                id: Uuid::new_v4().to_string(),
                session_id: session_id.into(),
                config,
                delivery,
                events,
                queue: Mutex::new(VecDeque::new()),
                cancel: parent.child_token(),
                phase: Mutex::new(Phase::Idle),
            }),
        }
    }

    /// Stable runner ID — unchanged across redundant `start` calls.
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn session_id(&self) -> &str {
        &self.inner.session_id
    }

    /// Queue an ack for the next tick.
    pub fn enqueue(&self, text: impl Into<String>) {
        self.inner.queue.lock().unwrap().push_back(text.into());
    }

    /// Begin ticking. Starting a running runner is a no-op; starting after
    /// `stop` is an error.
    pub fn start(&self) -> Result<(), ChannelError> {
        {
            let mut phase = self.inner.phase.lock().unwrap();
            match *phase {
                Phase::Running => return Ok(()),
                Phase::Stopped => return Err(ChannelError::Stopped),
                Phase::Idle => *phase = Phase::Running,
            }
        }

        self.inner.emit(AckEvent::Started);
        let inner = self.inner.clone();
        tokio::spawn(async move {
            AckInner::run_loop(inner).await;
        });
        Ok(())
    }

    /// Stop ticking. Idempotent; pending queue entries are dropped.
    pub fn stop(&self) {
        self.inner.stop();
    }
}

impl AckInner {
    fn stop(&self) {
        {
            let mut phase = self.phase.lock().unwrap();
            if *phase == Phase::Stopped {
                return;
            }
            *phase = Phase::Stopped;
        }
        self.cancel.cancel();
        self.emit(AckEvent::Stopped);
    }

    async fn run_loop(inner: Arc<Self>) {
        let mut interval =
            tokio::time::interval(Duration::from_millis(inner.config.interval_ms.max(1)));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = inner.cancel.cancelled() => {
                    debug!(session = %inner.session_id, "ack runner cancelled");
                    break;
                }
                _ = interval.tick() => {
                    inner.emit(AckEvent::Tick);
                    if !inner.drain_queue().await {
                        break;
                    }
                }
            }
        }

        // Cancellation from the parent stops the runner for good.
        inner.stop();
    }

    /// Deliver every queued ack in FIFO order. Returns `false` when the
    /// runner was cancelled mid-delivery.
    async fn drain_queue(&self) -> bool {
        loop {
            let next = self.queue.lock().unwrap().pop_front();
            let Some(text) = next else {
                return true;
            };
            match self.deliver_one(&text).await {
                Ok(()) => {}
                Err(ChannelError::Cancelled) => return false,
                Err(e) => {
                    warn!(session = %self.session_id, error = %e, "ack delivery failed");
                    self.emit(AckEvent::Error {
                        message: e.to_string(),
                    });
                }
            }
        }
    }

    async fn deliver_one(&self, text: &str) -> Result<(), ChannelError> {
        let text = truncate_ack(text, self.config.ack_max_chars);
        let timeout = Duration::from_millis(self.config.timeout_ms);
        let mut last_err = ChannelError::DeliveryTimeout {
            ms: self.config.timeout_ms,
        };

        for attempt in 0..=self.config.retry_attempts {
            if self.cancel.is_cancelled() {
                return Err(ChannelError::Cancelled);
            }

            let outcome = tokio::select! {
                _ = self.cancel.cancelled() => return Err(ChannelError::Cancelled),
                res = tokio::time::timeout(timeout, self.delivery.deliver(&self.cancel, &text)) => res,
            };

            match outcome {
                Ok(Ok(())) => {
                    self.emit(AckEvent::Ack { text });
                    return Ok(());
                }
                Ok(Err(e)) => last_err = e,
                Err(_elapsed) => {
                    last_err = ChannelError::DeliveryTimeout {
                        ms: self.config.timeout_ms,
                    };
                }
            }

            if attempt < self.config.retry_attempts {
                tokio::select! {
                    _ = self.cancel.cancelled() => return Err(ChannelError::Cancelled),
                    _ = tokio::time::sleep(Duration::from_millis(self.config.retry_delay_ms)) => {}
                }
            }
        }

        Err(last_err)
    }

    fn emit(&self, event: AckEvent) {
        if let Some(tx) = &self.events {
            // Never block the tick loop on a slow observer.
            let _ = tx.try_send(event);
        }
    }
}
