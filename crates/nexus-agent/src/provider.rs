use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use nexus_core::types::Message;

use crate::stream::CompletionChunk;

/// A model advertised by a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub name: String,
    /// Declared context window in tokens; 0 when the provider doesn't say.
    pub context_size: u64,
    pub supports_vision: bool,
}

/// Tool definition sent to the LLM API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// Request to an LLM provider.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub system: String,
    pub messages: Vec<Message>,
    /// Tools to expose to the LLM. Empty when tools are disabled.
    pub tools: Vec<ToolDefinition>,
    pub max_tokens: u32,
}

/// Common interface for all LLM providers (Anthropic, OpenAI-compatible, local).
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name for logging and error messages.
    fn name(&self) -> &str;

    /// Models this provider can serve.
    fn models(&self) -> Vec<ModelInfo>;

    /// Whether the provider accepts tool definitions on requests.
    fn supports_tools(&self) -> bool;

    /// Stream a completion through `tx` as a lazy sequence of chunks.
    ///
    /// The stream ends with either a `Done` or an `Error` chunk; cancelling
    /// `ctx` aborts the request and surfaces [`LlmError::Cancelled`].
    async fn complete(
        &self,
        ctx: &CancellationToken,
        req: &CompletionRequest,
        tx: mpsc::Sender<CompletionChunk>,
    ) -> Result<(), LlmError>;
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    #[error("operation cancelled")]
    Cancelled,
}

/// Error text fragments that mark a failure as retryable.
const TRANSIENT_MARKERS: &[&str] = &[
    "rate limit",
    "429",
    "500",
    "502",
    "503",
    "504",
    "timeout",
    "deadline exceeded",
];

impl LlmError {
    /// Transient failures are worth retrying; everything else surfaces
    /// immediately (bad credentials, unknown model, cancelled request).
    pub fn is_transient(&self) -> bool {
        match self {
            LlmError::Cancelled => false,
            LlmError::Http(e) if e.is_timeout() || e.is_connect() => true,
            other => is_transient_message(&other.to_string()),
        }
    }
}

/// True when an error message matches one of the transient markers.
pub fn is_transient_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    TRANSIENT_MARKERS.iter().any(|m| lower.contains(m))
}

/// Retry transient provider failures with linear backoff.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Run `op`, retrying transient errors up to `max_retries` times with a
    /// `retry_delay × attempt` pause between tries. Cancellation aborts the
    /// backoff wait immediately.
    pub async fn run<T, F, Fut>(
        &self,
        ctx: &CancellationToken,
        provider: &str,
        mut op: F,
    ) -> Result<T, LlmError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, LlmError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            if ctx.is_cancelled() {
                return Err(LlmError::Cancelled);
            }
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) if attempt < self.max_retries && e.is_transient() => {
                    attempt += 1;
                    let delay = self.retry_delay * attempt;
                    warn!(
                        provider = %provider,
                        attempt,
                        max = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transient provider error, retrying"
                    );
                    tokio::select! {
                        _ = ctx.cancelled() => return Err(LlmError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn transient_markers_match() {
        assert!(is_transient_message("Rate Limit exceeded"));
        assert!(is_transient_message("upstream returned 503"));
        assert!(is_transient_message("request timeout"));
        assert!(is_transient_message("context deadline exceeded"));
        assert!(!is_transient_message("invalid api key"));
        assert!(!is_transient_message("model not found"));
    }

    #[test]
    fn api_401_is_not_transient() {
        let err = LlmError::Api {
            status: 401,
            message: "unauthorized".into(),
        };
        assert!(!err.is_transient());
    }

    #[test]
    fn api_503_is_transient() {
        let err = LlmError::Api {
            status: 503,
            message: "overloaded".into(),
        };
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn retry_recovers_after_transient_failures() {
        let policy = RetryPolicy {
            max_retries: 3,
            retry_delay: Duration::from_millis(1),
        };
        let calls = AtomicU32::new(0);
        let ctx = CancellationToken::new();

        let result = policy
            .run(&ctx, "test", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(LlmError::Unavailable("503 service unavailable".into()))
                    } else {
                        Ok(42u32)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_gives_up_after_max_retries() {
        let policy = RetryPolicy {
            max_retries: 2,
            retry_delay: Duration::from_millis(1),
        };
        let calls = AtomicU32::new(0);
        let ctx = CancellationToken::new();

        let result: Result<u32, _> = policy
            .run(&ctx, "test", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(LlmError::Unavailable("502 bad gateway".into())) }
            })
            .await;

        assert!(result.is_err());
        // 1 initial try + 2 retries.
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_does_not_retry_fatal_errors() {
        let policy = RetryPolicy::default();
        let calls = AtomicU32::new(0);
        let ctx = CancellationToken::new();

        let result: Result<u32, _> = policy
            .run(&ctx, "test", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(LlmError::Api {
                        status: 400,
                        message: "bad request".into(),
                    })
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancelled_context_short_circuits() {
        let policy = RetryPolicy::default();
        let ctx = CancellationToken::new();
        ctx.cancel();

        let result: Result<u32, _> = policy.run(&ctx, "test", || async { Ok(1) }).await;
        assert!(matches!(result, Err(LlmError::Cancelled)));
    }
}
