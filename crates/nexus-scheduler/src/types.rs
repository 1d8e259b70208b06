use serde::{Deserialize, Serialize};

/// When an agent's heartbeats are allowed to fire, in some local timezone.
///
/// `start > end` wraps through midnight. `days` uses 0 = Sunday … 6 =
/// Saturday; empty means every day. The day filter is evaluated against the
/// current local day — for an overnight window this means the post-midnight
/// half belongs to the new calendar day.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveHoursConfig {
    #[serde(default)]
    pub enabled: bool,
    /// "HH:MM", 00:00–23:59.
    #[serde(default = "default_start")]
    pub start: String,
    /// "HH:MM", 00:00–23:59, or exactly "24:00" for end-of-day.
    #[serde(default = "default_end")]
    pub end: String,
    /// "", "local", "user", "utc", or an IANA name.
    #[serde(default)]
    pub timezone: String,
    #[serde(default)]
    pub days: Vec<u8>,
}

impl Default for ActiveHoursConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            start: default_start(),
            end: default_end(),
            timezone: String::new(),
            days: Vec::new(),
        }
    }
}

fn default_start() -> String {
    "00:00".to_string()
}

fn default_end() -> String {
    "24:00".to_string()
}

/// How heartbeat outcomes surface to users.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct VisibilityConfig {
    /// Emit an event for every run, not only failures.
    #[serde(default)]
    pub use_indicator: bool,
}

/// Per-agent heartbeat schedule configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatConfig {
    #[serde(default = "bool_true")]
    pub enabled: bool,
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default)]
    pub active_hours: ActiveHoursConfig,
    /// The agent owner's IANA timezone, consulted when `active_hours.timezone`
    /// is `"user"`.
    #[serde(default)]
    pub user_timezone: String,
    #[serde(default)]
    pub visibility: VisibilityConfig,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: default_interval_ms(),
            active_hours: ActiveHoursConfig::default(),
            user_timezone: String::new(),
            visibility: VisibilityConfig::default(),
        }
    }
}

fn bool_true() -> bool {
    true
}

fn default_interval_ms() -> u64 {
    30 * 60 * 1000
}

/// Outcome class of one heartbeat run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Ran,
    Skipped,
    Failed,
}

/// Outcome of one heartbeat run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunResult {
    pub status: RunStatus,
    pub reason: Option<String>,
}

impl RunResult {
    pub fn ran(reason: impl Into<String>) -> Self {
        Self {
            status: RunStatus::Ran,
            reason: Some(reason.into()),
        }
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            status: RunStatus::Skipped,
            reason: Some(reason.into()),
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            status: RunStatus::Failed,
            reason: Some(reason.into()),
        }
    }
}

/// Rendering hint derived from a run result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Indicator {
    Sent,
    OkEmpty,
    OkToken,
    Failed,
    None,
}

/// Map a run result onto its indicator.
pub fn indicator_for(result: &RunResult) -> Indicator {
    match result.status {
        RunStatus::Failed => Indicator::Failed,
        RunStatus::Ran => match result.reason.as_deref() {
            Some("ok-empty") => Indicator::OkEmpty,
            Some("ok-token") => Indicator::OkToken,
            _ => Indicator::Sent,
        },
        RunStatus::Skipped => Indicator::None,
    }
}

/// Event emitted after a heartbeat run, suitable for rendering.
#[derive(Debug, Clone)]
pub struct HeartbeatEvent {
    pub agent_id: String,
    pub status: RunStatus,
    pub reason: Option<String>,
    pub indicator: Indicator,
}

/// An on-demand wake request routed through the [`WakeHub`](crate::WakeHub).
#[derive(Debug, Clone)]
pub struct WakeRequest {
    pub reason: String,
    pub payload: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indicator_mapping() {
        assert_eq!(indicator_for(&RunResult::failed("x")), Indicator::Failed);
        assert_eq!(indicator_for(&RunResult::ran("ok-empty")), Indicator::OkEmpty);
        assert_eq!(indicator_for(&RunResult::ran("ok-token")), Indicator::OkToken);
        assert_eq!(indicator_for(&RunResult::ran("delivered")), Indicator::Sent);
        assert_eq!(
            indicator_for(&RunResult {
                status: RunStatus::Ran,
                reason: None
            }),
            Indicator::Sent
        );
        assert_eq!(
            indicator_for(&RunResult::skipped("quiet-hours")),
            Indicator::None
        );
    }

    #[test]
    fn active_hours_defaults_cover_all_day() {
        let cfg = ActiveHoursConfig::default();
        assert!(!cfg.enabled);
        assert_eq!(cfg.start, "00:00");
        assert_eq!(cfg.end, "24:00");
        assert!(cfg.days.is_empty());
    }
}
