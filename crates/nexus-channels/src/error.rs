use thiserror::Error;

/// Channel-layer errors. `Clone` so adapter error streams can broadcast them.
#[derive(Debug, Clone, Error)]
pub enum ChannelError {
    #[error("Channel error ({channel}): {reason}")]
    Adapter { channel: String, reason: String },

    #[error("Connect failed ({channel}): {reason}")]
    Connect { channel: String, reason: String },

    #[error("Send failed ({channel}): {reason}")]
    Send { channel: String, reason: String },

    #[error("Flush failed: {0}")]
    Flush(String),

    #[error("Delivery timed out after {ms}ms")]
    DeliveryTimeout { ms: u64 },

    #[error("component is stopped")]
    Stopped,

    #[error("operation cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, ChannelError>;
