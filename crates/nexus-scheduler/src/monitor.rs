//! Heartbeat health monitor — liveness tracking independent of scheduling.
//!
//! The scheduler decides *when* to run; the monitor records *whether* runs
//! are actually arriving. An agent is healthy while its missed-beat count
//! stays under the threshold. The monitor never schedules anything itself.

use dashmap::DashMap;
use std::sync::Arc;

use nexus_core::types::Clock;

use crate::types::RunStatus;

/// Health record for one agent.
#[derive(Debug, Clone, Copy)]
pub struct MonitorRecord {
    /// Milliseconds since epoch of the last recorded heartbeat; 0 = never.
    pub last_seen_ms: u64,
    pub missed_count: u32,
    pub healthy: bool,
}

/// Concurrent monitor over all registered agents.
pub struct HeartbeatMonitor {
    /// Misses tolerated before an agent flips unhealthy.
    threshold: u32,
    /// Expected beat interval; staleness is measured against this.
    interval_ms: u64,
    records: DashMap<String, MonitorRecord>,
    clock: Arc<dyn Clock>,
}

impl HeartbeatMonitor {
    pub fn new(threshold: u32, interval_ms: u64, clock: Arc<dyn Clock>) -> Self {
        Self {
            threshold: threshold.max(1),
            interval_ms,
            records: DashMap::new(),
            clock,
        }
    }

    /// Record an observed heartbeat: resets the missed counter and marks the
    /// agent healthy regardless of the run's status — a failed run still
    /// proves the agent is alive.
    pub fn record(&self, agent_id: &str, _status: RunStatus) {
        let now = self.clock.now_ms();
        let mut entry = self
            .records
            .entry(agent_id.to_string())
            .or_insert(MonitorRecord {
                last_seen_ms: 0,
                missed_count: 0,
                healthy: true,
            });
        entry.last_seen_ms = now;
        entry.missed_count = 0;
        entry.healthy = true;
    }

    /// Count one missed beat. Returns the agent's health after the miss.
    pub fn mark_missed(&self, agent_id: &str) -> bool {
        let mut entry = self
            .records
            .entry(agent_id.to_string())
            .or_insert(MonitorRecord {
                last_seen_ms: 0,
                missed_count: 0,
                healthy: true,
            });
        entry.missed_count += 1;
        entry.healthy = entry.missed_count < self.threshold;
        entry.healthy
    }

    /// Evaluate staleness: when more than one interval has passed since the
    /// last beat, a miss is counted. Unknown agents return an unhealthy
    /// placeholder without creating a record.
    pub fn check(&self, agent_id: &str) -> MonitorRecord {
        let now = self.clock.now_ms();
        let snapshot = match self.records.get(agent_id) {
            Some(entry) => *entry,
            None => {
                return MonitorRecord {
                    last_seen_ms: 0,
                    missed_count: 0,
                    healthy: false,
                };
            }
        };
        if now.saturating_sub(snapshot.last_seen_ms) > self.interval_ms {
            self.mark_missed(agent_id);
            if let Some(entry) = self.records.get(agent_id) {
                return *entry;
            }
        }
        snapshot
    }

    pub fn is_healthy(&self, agent_id: &str) -> bool {
        self.records
            .get(agent_id)
            .map(|r| r.healthy)
            .unwrap_or(false)
    }

    /// Snapshot of all records, sorted by agent ID.
    pub fn snapshot(&self) -> Vec<(String, MonitorRecord)> {
        let mut all: Vec<(String, MonitorRecord)> = self
            .records
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }
}
