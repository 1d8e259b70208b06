use std::collections::HashSet;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::{
    error::ChannelError,
    types::{ChannelKind, ChannelMetrics, ChannelStatus, InboundMessage, OutboundMessage},
};

/// Common interface implemented by every channel adapter (Telegram, Discord,
/// Matrix, SMS, web chat, …).
///
/// Implementations must be `Send + Sync` so they can be stored in a
/// [`ChannelManager`](crate::manager::ChannelManager) and driven from
/// multiple Tokio tasks. Inbound traffic is published on broadcast streams
/// so the gateway and any diagnostics consumers can subscribe independently.
#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    /// Which surface this adapter bridges. Used as the registry key, so a
    /// manager holds at most one adapter per kind.
    fn kind(&self) -> ChannelKind;

    /// Current runtime status without blocking.
    fn status(&self) -> ChannelStatus;

    /// Lifetime traffic counters.
    fn metrics(&self) -> ChannelMetrics;

    /// Subscribe to messages decoded from the external service.
    fn messages(&self) -> broadcast::Receiver<InboundMessage>;

    /// Subscribe to adapter-level errors (disconnects, decode failures).
    fn errors(&self) -> broadcast::Receiver<ChannelError>;

    /// Connect and begin receiving. Starting an already-started adapter is
    /// implementation-defined; most treat it as a reconnect.
    async fn start(&mut self) -> Result<(), ChannelError>;

    /// Disconnect. Must be idempotent — stopping a stopped adapter is a
    /// successful no-op.
    async fn stop(&mut self) -> Result<(), ChannelError>;

    /// Deliver a single outbound message.
    async fn send(&self, msg: &OutboundMessage) -> Result<(), ChannelError>;

    /// Rooms this adapter accepts traffic from; `None` means unrestricted.
    fn allowed_rooms(&self) -> Option<&HashSet<String>> {
        None
    }

    /// Users this adapter accepts traffic from; `None` means unrestricted.
    fn allowed_users(&self) -> Option<&HashSet<String>> {
        None
    }
}
