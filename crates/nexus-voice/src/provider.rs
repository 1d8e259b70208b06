use std::collections::HashMap;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::VoiceError;
use crate::types::CallEvent;

/// Raw webhook request as received by the HTTP layer, provider-agnostic.
#[derive(Debug, Clone, Default)]
pub struct WebhookContext {
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

/// Parsed webhook: ordered events plus the HTTP reply the provider expects.
#[derive(Debug, Clone)]
pub struct WebhookParse {
    pub events: Vec<CallEvent>,
    pub status_code: u16,
    pub response_body: String,
}

/// Common interface for telephony providers (Twilio, Vonage, …).
///
/// All call operations take the provider's own call ID; the gateway keeps
/// the mapping to its records. Signature verification stays behind this
/// trait because every provider signs webhooks differently.
#[async_trait]
pub trait TelephonyProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Dial out. Returns the provider's call ID.
    async fn initiate_call(
        &self,
        ctx: &CancellationToken,
        from: &str,
        to: &str,
    ) -> Result<String, VoiceError>;

    async fn hangup_call(
        &self,
        ctx: &CancellationToken,
        provider_call_id: &str,
    ) -> Result<(), VoiceError>;

    /// Speak `text` to the remote party.
    async fn play_tts(
        &self,
        ctx: &CancellationToken,
        provider_call_id: &str,
        text: &str,
    ) -> Result<(), VoiceError>;

    /// Begin streaming the remote party's speech as `CallSpeech` events.
    async fn start_listening(
        &self,
        ctx: &CancellationToken,
        provider_call_id: &str,
    ) -> Result<(), VoiceError>;

    async fn stop_listening(
        &self,
        ctx: &CancellationToken,
        provider_call_id: &str,
    ) -> Result<(), VoiceError>;

    /// Check the webhook signature. `Ok(false)` means a well-formed but
    /// unauthentic request; errors mean verification itself failed.
    async fn verify_webhook(&self, ctx: &WebhookContext) -> Result<bool, VoiceError>;

    /// Decode the webhook into ordered events and the expected HTTP reply.
    async fn parse_webhook(&self, ctx: &WebhookContext) -> Result<WebhookParse, VoiceError>;
}
