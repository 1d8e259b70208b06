use thiserror::Error;

#[derive(Debug, Error)]
pub enum VoiceError {
    #[error("Call not found: {0}")]
    CallNotFound(String),

    #[error("Call already ended: {0}")]
    CallEnded(String),

    #[error("Telephony provider error: {0}")]
    Provider(String),

    #[error("Invalid webhook event: {0}")]
    InvalidEvent(String),

    #[error("Webhook signature rejected")]
    Unauthorized,

    #[error("operation cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, VoiceError>;
