use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    #[error("Invalid time format: {0}")]
    InvalidTimeFormat(String),

    #[error("Invalid interval: {0}")]
    InvalidInterval(String),

    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    #[error("scheduler is stopped")]
    Stopped,

    #[error("Heartbeat run failed: {0}")]
    Run(String),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
