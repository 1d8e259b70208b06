use thiserror::Error;

#[derive(Debug, Error)]
pub enum NexusError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Illegal state: {0}")]
    IllegalState(String),

    #[error("Transient provider error: {0}")]
    ProviderTransient(String),

    #[error("Provider error: {0}")]
    ProviderFatal(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("Corrupt data: {0}")]
    Corrupt(String),

    #[error("Delivery timed out after {ms}ms")]
    DeliveryTimeout { ms: u64 },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl NexusError {
    /// Short error code string for structured log fields and API responses.
    pub fn code(&self) -> &'static str {
        match self {
            NexusError::InvalidInput(_) => "INVALID_INPUT",
            NexusError::NotFound(_) => "NOT_FOUND",
            NexusError::IllegalState(_) => "ILLEGAL_STATE",
            NexusError::ProviderTransient(_) => "PROVIDER_TRANSIENT",
            NexusError::ProviderFatal(_) => "PROVIDER_FATAL",
            NexusError::Cancelled => "CANCELLED",
            NexusError::Corrupt(_) => "CORRUPT",
            NexusError::DeliveryTimeout { .. } => "DELIVERY_TIMEOUT",
            NexusError::Config(_) => "CONFIG_ERROR",
            NexusError::Serialization(_) => "SERIALIZATION_ERROR",
            NexusError::Io(_) => "IO_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, NexusError>;
