//! Heartbeat scheduler — periodic agent invocation with a single timer.
//!
//! One loop sleeps until the earliest `next_due_ms` across all enabled
//! agents, then fires every due agent. Registration changes nudge the loop
//! so a new earliest deadline takes effect immediately. Runs are serial per
//! agent (a running flag guards re-entry) and parallel across agents; the
//! external `on_run` callback always executes outside the scheduler lock.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use nexus_core::types::Clock;

use crate::error::SchedulerError;
use crate::hours;
use crate::types::{indicator_for, HeartbeatConfig, HeartbeatEvent, RunResult, RunStatus};

/// Trigger reason that restricts the run to agents whose deadline passed.
pub const REASON_INTERVAL: &str = "interval";
/// Reason attached to runs suppressed by the active-hours window.
pub const REASON_QUIET_HOURS: &str = "quiet-hours";

/// External heartbeat execution capability.
#[async_trait]
pub trait HeartbeatHandler: Send + Sync {
    async fn on_run(
        &self,
        ctx: &CancellationToken,
        agent_id: &str,
        config: &HeartbeatConfig,
    ) -> Result<RunResult, SchedulerError>;
}

/// Snapshot of one agent's schedule, for diagnostics and tests.
#[derive(Debug, Clone, Copy)]
pub struct ScheduleInfo {
    pub enabled: bool,
    pub interval_ms: u64,
    pub last_run_ms: u64,
    pub next_due_ms: u64,
}

struct AgentSchedule {
    config: HeartbeatConfig,
    last_run_ms: u64,
    next_due_ms: u64,
    running: bool,
}

struct SchedInner {
    agents: Mutex<HashMap<String, AgentSchedule>>,
    /// Nudged on every registration change and run completion so the loop
    /// re-reads the earliest deadline.
    notify: Notify,
    stopped: AtomicBool,
    started: AtomicBool,
    handler: Arc<dyn HeartbeatHandler>,
    events: Option<mpsc::Sender<HeartbeatEvent>>,
    clock: Arc<dyn Clock>,
    /// Cancels the timer loop on `stop`. In-flight runs are left to finish.
    loop_cancel: CancellationToken,
    /// Handed to `on_run`; never cancelled by `stop`.
    run_ctx: CancellationToken,
}

pub struct HeartbeatScheduler {
    inner: Arc<SchedInner>,
}

impl HeartbeatScheduler {
    pub fn new(
        handler: Arc<dyn HeartbeatHandler>,
        events: Option<mpsc::Sender<HeartbeatEvent>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner: Arc::new(SchedInner {
                agents: Mutex::new(HashMap::new()),
                notify: Notify::new(),
                stopped: AtomicBool::new(false),
                started: AtomicBool::new(false),
                handler,
                events,
                clock,
                loop_cancel: CancellationToken::new(),
                run_ctx: CancellationToken::new(),
            }),
        }
    }

    /// Create or replace an agent's schedule.
    ///
    /// Re-registration preserves a positive `last_run_ms` and keeps
    /// `next_due_ms` when it is still in the future, so reconfiguring an
    /// agent doesn't reset its cadence. No-op after `stop`, and for
    /// intervals of zero.
    pub fn register(&self, agent_id: &str, config: HeartbeatConfig) {
        if self.inner.stopped.load(Ordering::SeqCst) {
            return;
        }
        if config.interval_ms == 0 {
            warn!(agent = %agent_id, "heartbeat interval of 0 rejected");
            return;
        }

        let now = self.inner.clock.now_ms();
        {
            let mut agents = self.inner.agents.lock().unwrap();
            let (last_run_ms, next_due_ms) = match agents.get(agent_id) {
                Some(prev) => {
                    let last = prev.last_run_ms;
                    let next = if prev.next_due_ms > now {
                        prev.next_due_ms
                    } else {
                        now + config.interval_ms
                    };
                    (last, next)
                }
                None => (0, now + config.interval_ms),
            };
            agents.insert(
                agent_id.to_string(),
                AgentSchedule {
                    config,
                    last_run_ms,
                    next_due_ms,
                    running: false,
                },
            );
        }
        debug!(agent = %agent_id, "heartbeat registered");
        self.inner.notify.notify_one();
    }

    /// Remove an agent's schedule.
    pub fn unregister(&self, agent_id: &str) {
        let removed = {
            let mut agents = self.inner.agents.lock().unwrap();
            agents.remove(agent_id).is_some()
        };
        if removed {
            debug!(agent = %agent_id, "heartbeat unregistered");
            self.inner.notify.notify_one();
        }
    }

    /// Spawn the timer loop. No-op when already started or stopped.
    pub fn start(&self) {
        if self.inner.stopped.load(Ordering::SeqCst)
            || self.inner.started.swap(true, Ordering::SeqCst)
        {
            return;
        }
        info!("heartbeat scheduler started");
        let inner = self.inner.clone();
        tokio::spawn(async move {
            SchedInner::run_loop(inner).await;
        });
    }

    /// Stop for good: the pending timer is cancelled and further `register`
    /// or `start` calls are ignored. In-flight runs complete.
    pub fn stop(&self) {
        if self.inner.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("heartbeat scheduler stopped");
        self.inner.loop_cancel.cancel();
    }

    /// Run agents immediately. With `reason == "interval"` only agents whose
    /// deadline has passed fire; any other reason fires all enabled agents.
    /// Returns after every triggered run has completed.
    pub async fn trigger_now(&self, reason: &str) {
        if self.inner.stopped.load(Ordering::SeqCst) {
            return;
        }
        SchedInner::trigger(self.inner.clone(), reason).await;
    }

    /// Schedule snapshot for one agent.
    pub fn schedule_info(&self, agent_id: &str) -> Option<ScheduleInfo> {
        let agents = self.inner.agents.lock().unwrap();
        agents.get(agent_id).map(|a| ScheduleInfo {
            enabled: a.config.enabled,
            interval_ms: a.config.interval_ms,
            last_run_ms: a.last_run_ms,
            next_due_ms: a.next_due_ms,
        })
    }
}

impl SchedInner {
    async fn run_loop(inner: Arc<Self>) {
        loop {
            if inner.stopped.load(Ordering::SeqCst) {
                return;
            }

            let next_due = {
                let agents = inner.agents.lock().unwrap();
                agents
                    .values()
                    .filter(|a| a.config.enabled && !a.running)
                    .map(|a| a.next_due_ms)
                    .min()
            };

            let Some(due) = next_due else {
                tokio::select! {
                    _ = inner.loop_cancel.cancelled() => return,
                    _ = inner.notify.notified() => continue,
                }
            };

            let now = inner.clock.now_ms();
            if due > now {
                tokio::select! {
                    _ = inner.loop_cancel.cancelled() => return,
                    _ = inner.notify.notified() => continue,
                    _ = tokio::time::sleep(Duration::from_millis(due - now)) => {}
                }
            }

            Self::trigger(inner.clone(), REASON_INTERVAL).await;
        }
    }

    /// Fire due (or all) enabled agents. State mutation happens under the
    /// lock; the runs themselves are spawned per agent and awaited together.
    async fn trigger(inner: Arc<Self>, reason: &str) {
        let now = inner.clock.now_ms();
        let selected: Vec<(String, HeartbeatConfig)> = {
            let mut agents = inner.agents.lock().unwrap();
            agents
                .iter_mut()
                .filter(|(_, a)| {
                    a.config.enabled
                        && !a.running
                        && (reason != REASON_INTERVAL || a.next_due_ms <= now)
                })
                .map(|(id, a)| {
                    a.running = true;
                    (id.clone(), a.config.clone())
                })
                .collect()
        };

        if selected.is_empty() {
            return;
        }
        debug!(count = selected.len(), %reason, "heartbeat trigger");

        let runs: Vec<_> = selected
            .into_iter()
            .map(|(agent_id, config)| {
                let inner = inner.clone();
                tokio::spawn(async move {
                    Self::run_agent(inner, agent_id, config).await;
                })
            })
            .collect();
        futures_util::future::join_all(runs).await;
    }

    async fn run_agent(inner: Arc<Self>, agent_id: String, config: HeartbeatConfig) {
        let result = Self::execute(&inner, &agent_id, &config).await;

        // Every run attempt advances the schedule — a quiet-hours skip that
        // left next_due in the past would otherwise re-fire immediately.
        let now = inner.clock.now_ms();
        {
            let mut agents = inner.agents.lock().unwrap();
            if let Some(agent) = agents.get_mut(&agent_id) {
                agent.last_run_ms = now;
                agent.next_due_ms = now + agent.config.interval_ms;
                agent.running = false;
            }
        }
        inner.notify.notify_one();

        let indicator = indicator_for(&result);
        match result.status {
            RunStatus::Failed => {
                warn!(agent = %agent_id, reason = ?result.reason, "heartbeat failed")
            }
            _ => debug!(agent = %agent_id, status = ?result.status, "heartbeat finished"),
        }

        if config.visibility.use_indicator || result.status == RunStatus::Failed {
            if let Some(tx) = &inner.events {
                let _ = tx.try_send(HeartbeatEvent {
                    agent_id,
                    status: result.status,
                    reason: result.reason,
                    indicator,
                });
            }
        }
    }

    async fn execute(inner: &Arc<Self>, agent_id: &str, config: &HeartbeatConfig) -> RunResult {
        if config.active_hours.enabled {
            let now = inner.clock.now_utc();
            match hours::is_active_at(&config.active_hours, now, &config.user_timezone) {
                Ok(false) => return RunResult::skipped(REASON_QUIET_HOURS),
                Ok(true) => {}
                Err(e) => {
                    // Fail open: a misconfigured timezone shouldn't silence
                    // the agent, it should show up in the logs.
                    warn!(agent = %agent_id, error = %e, "active-hours check failed");
                }
            }
        }

        match inner
            .handler
            .on_run(&inner.run_ctx, agent_id, config)
            .await
        {
            Ok(result) => result,
            Err(e) => RunResult::failed(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexus_core::types::SystemClock;
    use std::sync::atomic::AtomicU32;
    use tokio::time::sleep;

    use crate::types::{ActiveHoursConfig, Indicator, VisibilityConfig};

    struct CountingHandler {
        runs: AtomicU32,
        concurrent: AtomicU32,
        max_concurrent: AtomicU32,
        result: RunResult,
        delay_ms: u64,
    }

    impl CountingHandler {
        fn new(result: RunResult) -> Arc<Self> {
            Self::slow(result, 0)
        }

        fn slow(result: RunResult, delay_ms: u64) -> Arc<Self> {
            Arc::new(Self {
                runs: AtomicU32::new(0),
                concurrent: AtomicU32::new(0),
                max_concurrent: AtomicU32::new(0),
                result,
                delay_ms,
            })
        }
    }

    #[async_trait]
    impl HeartbeatHandler for CountingHandler {
        async fn on_run(
            &self,
            _ctx: &CancellationToken,
            _agent_id: &str,
            _config: &HeartbeatConfig,
        ) -> Result<RunResult, SchedulerError> {
            let live = self.concurrent.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_concurrent.fetch_max(live, Ordering::SeqCst);
            if self.delay_ms > 0 {
                sleep(Duration::from_millis(self.delay_ms)).await;
            }
            self.runs.fetch_add(1, Ordering::SeqCst);
            self.concurrent.fetch_sub(1, Ordering::SeqCst);
            Ok(self.result.clone())
        }
    }

    fn config(interval_ms: u64) -> HeartbeatConfig {
        HeartbeatConfig {
            interval_ms,
            ..HeartbeatConfig::default()
        }
    }

    fn scheduler(
        handler: Arc<dyn HeartbeatHandler>,
    ) -> (HeartbeatScheduler, mpsc::Receiver<HeartbeatEvent>) {
        let (tx, rx) = mpsc::channel(64);
        let clock = Arc::new(SystemClock);
        (HeartbeatScheduler::new(handler, Some(tx), clock), rx)
    }

    #[tokio::test]
    async fn interval_drives_repeated_runs() {
        let handler = CountingHandler::new(RunResult::ran("delivered"));
        let (sched, _rx) = scheduler(handler.clone());

        sched.register("agent-1", config(100));
        sched.start();
        sleep(Duration::from_millis(360)).await;
        sched.stop();

        let runs = handler.runs.load(Ordering::SeqCst);
        assert!(runs >= 3, "expected >=3 runs in 360ms at 100ms, got {runs}");

        let info = sched.schedule_info("agent-1").expect("registered");
        assert!(info.last_run_ms > 0);
        assert!(info.next_due_ms >= info.last_run_ms);
    }

    #[tokio::test]
    async fn runs_never_overlap_per_agent() {
        // Runs take 80ms at a 20ms interval — without the running guard the
        // loop would stack executions.
        let handler = CountingHandler::slow(RunResult::ran("delivered"), 80);
        let (sched, _rx) = scheduler(handler.clone());

        sched.register("agent-1", config(20));
        sched.start();
        sleep(Duration::from_millis(300)).await;
        sched.stop();

        assert_eq!(handler.max_concurrent.load(Ordering::SeqCst), 1);
        assert!(handler.runs.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn trigger_now_interval_fires_only_due_agents() {
        let handler = CountingHandler::new(RunResult::ran("delivered"));
        let (sched, _rx) = scheduler(handler.clone());

        // Freshly registered: next_due is one interval away, so an
        // interval-reason trigger finds nothing due.
        sched.register("agent-1", config(60_000));
        sched.trigger_now(REASON_INTERVAL).await;
        assert_eq!(handler.runs.load(Ordering::SeqCst), 0);

        // A manual reason fires all enabled agents regardless of deadline.
        sched.trigger_now("manual").await;
        assert_eq!(handler.runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn disabled_agents_never_fire() {
        let handler = CountingHandler::new(RunResult::ran("delivered"));
        let (sched, _rx) = scheduler(handler.clone());

        let mut cfg = config(50);
        cfg.enabled = false;
        sched.register("agent-1", cfg);
        sched.trigger_now("manual").await;
        assert_eq!(handler.runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn reregistration_preserves_last_run_and_future_deadline() {
        let handler = CountingHandler::new(RunResult::ran("delivered"));
        let (sched, _rx) = scheduler(handler.clone());

        sched.register("agent-1", config(60_000));
        sched.trigger_now("manual").await;
        let before = sched.schedule_info("agent-1").unwrap();
        assert!(before.last_run_ms > 0);

        sched.register("agent-1", config(60_000));
        let after = sched.schedule_info("agent-1").unwrap();
        assert_eq!(after.last_run_ms, before.last_run_ms);
        assert_eq!(after.next_due_ms, before.next_due_ms);
    }

    #[tokio::test]
    async fn unregister_removes_the_schedule() {
        let handler = CountingHandler::new(RunResult::ran("delivered"));
        let (sched, _rx) = scheduler(handler.clone());

        sched.register("agent-1", config(50));
        sched.unregister("agent-1");
        assert!(sched.schedule_info("agent-1").is_none());

        sched.trigger_now("manual").await;
        assert_eq!(handler.runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn stop_is_sticky() {
        let handler = CountingHandler::new(RunResult::ran("delivered"));
        let (sched, _rx) = scheduler(handler.clone());

        sched.stop();
        sched.register("agent-1", config(50));
        sched.start();
        sched.trigger_now("manual").await;
        sleep(Duration::from_millis(80)).await;
        assert_eq!(handler.runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn quiet_hours_skip_emits_no_indicator_event() {
        let handler = CountingHandler::new(RunResult::ran("delivered"));
        let (sched, mut rx) = scheduler(handler.clone());

        let mut cfg = config(50);
        cfg.active_hours = ActiveHoursConfig {
            enabled: true,
            // A window that is never active: start == end.
            start: "03:00".to_string(),
            end: "03:00".to_string(),
            timezone: "UTC".to_string(),
            days: Vec::new(),
        };
        sched.register("agent-1", cfg);
        sched.trigger_now("manual").await;

        // Handler untouched, schedule still advanced.
        assert_eq!(handler.runs.load(Ordering::SeqCst), 0);
        let info = sched.schedule_info("agent-1").unwrap();
        assert!(info.last_run_ms > 0);
        // Skips are not failures and use_indicator is off — no event.
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn failure_always_emits_event() {
        struct FailingHandler;

        #[async_trait]
        impl HeartbeatHandler for FailingHandler {
            async fn on_run(
                &self,
                _ctx: &CancellationToken,
                _agent_id: &str,
                _config: &HeartbeatConfig,
            ) -> Result<RunResult, SchedulerError> {
                Err(SchedulerError::Run("provider exploded".into()))
            }
        }

        let (sched, mut rx) = scheduler(Arc::new(FailingHandler));
        sched.register("agent-1", config(50));
        sched.trigger_now("manual").await;

        let event = rx.try_recv().expect("failure event");
        assert_eq!(event.status, RunStatus::Failed);
        assert_eq!(event.indicator, Indicator::Failed);
        assert!(event.reason.unwrap().contains("provider exploded"));
    }

    #[tokio::test]
    async fn use_indicator_emits_events_for_successes() {
        let handler = CountingHandler::new(RunResult::ran("ok-empty"));
        let (sched, mut rx) = scheduler(handler);

        let mut cfg = config(50);
        cfg.visibility = VisibilityConfig { use_indicator: true };
        sched.register("agent-1", cfg);
        sched.trigger_now("manual").await;

        let event = rx.try_recv().expect("indicator event");
        assert_eq!(event.status, RunStatus::Ran);
        assert_eq!(event.indicator, Indicator::OkEmpty);
    }

    #[tokio::test]
    async fn zero_interval_registration_is_rejected() {
        let handler = CountingHandler::new(RunResult::ran("delivered"));
        let (sched, _rx) = scheduler(handler);
        sched.register("agent-1", config(0));
        assert!(sched.schedule_info("agent-1").is_none());
    }
}
