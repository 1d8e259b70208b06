//! Channel adapter registry and supervised startup.
//!
//! Adapters register under their kind and are brought up as a group. A
//! failed start is retried on a doubling delay with deterministic jitter,
//! so a gateway restart doesn't slam every platform at the same instant;
//! an adapter that exhausts its attempts stays registered but disconnected
//! and can be retried on the next `start_all`.

use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::{
    channel::ChannelAdapter,
    types::{ChannelMetrics, ChannelStatus},
};

/// Delay before the first retry of a failed start.
const INITIAL_RETRY_DELAY_MS: u64 = 2_000;
/// Retry delays stop doubling here.
const RETRY_DELAY_CAP_MS: u64 = 120_000;
/// Start attempts per adapter before it is left disconnected.
const START_ATTEMPTS: u32 = 6;

/// Manages the set of registered channel adapters.
///
/// Keyed by [`ChannelAdapter::kind`], so there is at most one adapter per
/// surface and iteration order (status output, startup) is stable.
pub struct ChannelManager {
    channels: BTreeMap<String, Box<dyn ChannelAdapter + Send + Sync>>,
}

impl ChannelManager {
    pub fn new() -> Self {
        Self {
            channels: BTreeMap::new(),
        }
    }

    /// Register an adapter under its kind, replacing any previous one.
    pub fn register(&mut self, adapter: Box<dyn ChannelAdapter + Send + Sync>) {
        let kind = adapter.kind().as_str().to_string();
        if self.channels.insert(kind.clone(), adapter).is_some() {
            warn!(channel = %kind, "replacing previously registered adapter");
        } else {
            info!(channel = %kind, "channel adapter registered");
        }
    }

    /// Bring every registered adapter up, one at a time.
    ///
    /// Each adapter gets [`START_ATTEMPTS`] tries; between tries the delay
    /// doubles from [`INITIAL_RETRY_DELAY_MS`] up to [`RETRY_DELAY_CAP_MS`],
    /// plus jitter. An adapter that never comes up is logged and skipped —
    /// one dead platform must not block the rest of the gateway.
    pub async fn start_all(&mut self) {
        for (kind, adapter) in self.channels.iter_mut() {
            let mut attempt: u32 = 1;
            loop {
                match adapter.start().await {
                    Ok(()) => {
                        info!(channel = %kind, attempt, "channel up");
                        break;
                    }
                    Err(e) if attempt >= START_ATTEMPTS => {
                        error!(
                            channel = %kind,
                            attempts = attempt,
                            error = %e,
                            "channel failed to start, leaving it disconnected"
                        );
                        break;
                    }
                    Err(e) => {
                        let delay = retry_delay(kind, attempt);
                        warn!(
                            channel = %kind,
                            attempt,
                            error = %e,
                            next_try_in_ms = delay.as_millis() as u64,
                            "channel start failed"
                        );
                        sleep(delay).await;
                        attempt += 1;
                    }
                }
            }
        }
    }

    /// Stop every adapter. Failures are logged and do not stop the sweep;
    /// adapter `stop` is idempotent, so stopping twice is harmless.
    pub async fn stop_all(&mut self) {
        for (kind, adapter) in self.channels.iter_mut() {
            if let Err(e) = adapter.stop().await {
                warn!(channel = %kind, error = %e, "error while stopping channel");
            }
        }
    }

    /// The adapter registered for `kind`, if any.
    pub fn get(&self, kind: &str) -> Option<&(dyn ChannelAdapter + Send + Sync)> {
        self.channels.get(kind).map(|b| b.as_ref())
    }

    /// Status per adapter, in kind order.
    pub fn statuses(&self) -> Vec<(String, ChannelStatus)> {
        self.channels
            .iter()
            .map(|(kind, adapter)| (kind.clone(), adapter.status()))
            .collect()
    }

    /// Traffic counters summed across all adapters.
    pub fn metrics_total(&self) -> ChannelMetrics {
        let mut total = ChannelMetrics::default();
        for adapter in self.channels.values() {
            let m = adapter.metrics();
            total.messages_in = total.messages_in.saturating_add(m.messages_in);
            total.messages_out = total.messages_out.saturating_add(m.messages_out);
            total.errors = total.errors.saturating_add(m.errors);
        }
        total
    }
}

impl Default for ChannelManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Delay before retry `attempt` for `kind`: doubling from the initial
/// delay, capped, plus up to 25% jitter.
///
/// The jitter is a hash of the channel kind and attempt number rather than
/// a random draw. That keeps the schedule reproducible in tests while still
/// spreading simultaneously-restarted adapters apart, and needs no rand
/// dependency.
fn retry_delay(kind: &str, attempt: u32) -> Duration {
    let doublings = (attempt - 1).min(16);
    let base = INITIAL_RETRY_DELAY_MS
        .saturating_mul(1u64 << doublings)
        .min(RETRY_DELAY_CAP_MS);

    let mut hasher = DefaultHasher::new();
    kind.hash(&mut hasher);
    attempt.hash(&mut hasher);
    let jitter = hasher.finish() % (base / 4).max(1);

    Duration::from_millis(base + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ChannelError;
    use crate::types::{ChannelKind, InboundMessage, OutboundMessage};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use tokio::sync::broadcast;

    struct FakeAdapter {
        kind: ChannelKind,
        connected: AtomicBool,
        fail_starts: AtomicU32,
        messages_in: u64,
        msg_tx: broadcast::Sender<InboundMessage>,
        err_tx: broadcast::Sender<ChannelError>,
    }

    impl FakeAdapter {
        fn new(kind: ChannelKind, fail_starts: u32) -> Self {
            let (msg_tx, _) = broadcast::channel(8);
            let (err_tx, _) = broadcast::channel(8);
            Self {
                kind,
                connected: AtomicBool::new(false),
                fail_starts: AtomicU32::new(fail_starts),
                messages_in: 0,
                msg_tx,
                err_tx,
            }
        }

        fn with_traffic(kind: ChannelKind, messages_in: u64) -> Self {
            Self {
                messages_in,
                ..Self::new(kind, 0)
            }
        }
    }

    #[async_trait]
    impl ChannelAdapter for FakeAdapter {
        fn kind(&self) -> ChannelKind {
            self.kind
        }

        fn status(&self) -> ChannelStatus {
            ChannelStatus {
                connected: self.connected.load(Ordering::SeqCst),
                since: None,
                detail: None,
            }
        }

        fn metrics(&self) -> ChannelMetrics {
            ChannelMetrics {
                messages_in: self.messages_in,
                messages_out: 0,
                errors: 0,
            }
        }

        fn messages(&self) -> broadcast::Receiver<InboundMessage> {
            self.msg_tx.subscribe()
        }

        fn errors(&self) -> broadcast::Receiver<ChannelError> {
            self.err_tx.subscribe()
        }

        async fn start(&mut self) -> Result<(), ChannelError> {
            if self.fail_starts.load(Ordering::SeqCst) > 0 {
                self.fail_starts.fetch_sub(1, Ordering::SeqCst);
                return Err(ChannelError::Connect {
                    channel: self.kind.as_str().into(),
                    reason: "refused".into(),
                });
            }
            self.connected.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn stop(&mut self) -> Result<(), ChannelError> {
            self.connected.store(false, Ordering::SeqCst);
            Ok(())
        }

        async fn send(&self, _msg: &OutboundMessage) -> Result<(), ChannelError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn register_replaces_same_kind() {
        let mut mgr = ChannelManager::new();
        mgr.register(Box::new(FakeAdapter::new(ChannelKind::Telegram, 0)));
        mgr.register(Box::new(FakeAdapter::new(ChannelKind::Telegram, 0)));
        assert_eq!(mgr.statuses().len(), 1);
    }

    #[tokio::test]
    async fn statuses_come_out_in_kind_order() {
        let mut mgr = ChannelManager::new();
        mgr.register(Box::new(FakeAdapter::new(ChannelKind::Telegram, 0)));
        mgr.register(Box::new(FakeAdapter::new(ChannelKind::Discord, 0)));
        let statuses = mgr.statuses();
        assert_eq!(statuses[0].0, "discord");
        assert_eq!(statuses[1].0, "telegram");
    }

    #[tokio::test(start_paused = true)]
    async fn start_all_retries_until_the_adapter_comes_up() {
        let mut mgr = ChannelManager::new();
        mgr.register(Box::new(FakeAdapter::new(ChannelKind::Slack, 2)));
        mgr.start_all().await;
        assert!(mgr.statuses()[0].1.connected);
    }

    #[tokio::test(start_paused = true)]
    async fn start_all_gives_up_after_the_attempt_budget() {
        let mut mgr = ChannelManager::new();
        mgr.register(Box::new(FakeAdapter::new(ChannelKind::Slack, START_ATTEMPTS + 5)));
        mgr.start_all().await;
        assert!(!mgr.statuses()[0].1.connected);
    }

    #[tokio::test]
    async fn stop_all_is_idempotent() {
        let mut mgr = ChannelManager::new();
        mgr.register(Box::new(FakeAdapter::new(ChannelKind::Web, 0)));
        mgr.start_all().await;
        mgr.stop_all().await;
        mgr.stop_all().await;
        assert!(!mgr.statuses()[0].1.connected);
    }

    #[tokio::test]
    async fn metrics_total_sums_adapters() {
        let mut mgr = ChannelManager::new();
        mgr.register(Box::new(FakeAdapter::with_traffic(ChannelKind::Telegram, 3)));
        mgr.register(Box::new(FakeAdapter::with_traffic(ChannelKind::Web, 4)));
        assert_eq!(mgr.metrics_total().messages_in, 7);
    }

    #[test]
    fn retry_delay_doubles_and_caps() {
        let d1 = retry_delay("slack", 1).as_millis() as u64;
        let d2 = retry_delay("slack", 2).as_millis() as u64;
        let d3 = retry_delay("slack", 3).as_millis() as u64;
        // Each step's floor doubles; jitter stays under 25% of the floor.
        assert!((INITIAL_RETRY_DELAY_MS..INITIAL_RETRY_DELAY_MS * 5 / 4).contains(&d1));
        assert!(d2 >= INITIAL_RETRY_DELAY_MS * 2);
        assert!(d3 >= INITIAL_RETRY_DELAY_MS * 4);

        let capped = retry_delay("slack", 30).as_millis() as u64;
        assert!(capped < RETRY_DELAY_CAP_MS * 5 / 4);
    }

    #[test]
    fn retry_delay_is_deterministic_but_spread_across_kinds() {
        assert_eq!(retry_delay("slack", 2), retry_delay("slack", 2));
        // Different kinds hash to different jitter (with overwhelming odds).
        let a = retry_delay("slack", 1);
        let b = retry_delay("telegram", 1);
        let c = retry_delay("discord", 1);
        assert!(a != b || b != c);
    }
}
