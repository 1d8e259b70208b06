pub mod error;
pub mod heartbeat;
pub mod hours;
pub mod monitor;
pub mod types;
pub mod wake;

pub use error::{Result, SchedulerError};
pub use heartbeat::{HeartbeatHandler, HeartbeatScheduler};
pub use monitor::HeartbeatMonitor;
pub use wake::WakeHub;
