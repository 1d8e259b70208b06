use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use nexus_channels::debounce::Debouncer;
use nexus_channels::manager::ChannelManager;
use nexus_channels::types::InboundMessage;
use nexus_core::config::NexusConfig;
use nexus_core::sentinel::SentinelStore;
use nexus_core::types::{Clock, SystemClock};
use nexus_scheduler::types::HeartbeatConfig;
use nexus_scheduler::{HeartbeatMonitor, HeartbeatScheduler, WakeHub};
use nexus_voice::CallManager;

use crate::dispatch::{Dispatcher, LoggingInvoker};

/// Central shared state — passed as `Arc<AppState>` to all Axum handlers.
pub struct AppState {
    pub config: NexusConfig,
    pub dispatcher: Arc<Dispatcher>,
    pub debouncer: Debouncer<InboundMessage>,
    pub scheduler: HeartbeatScheduler,
    pub monitor: HeartbeatMonitor,
    pub wake: WakeHub,
    /// Present only when `[voice]` is enabled and a provider is configured.
    pub calls: Option<Arc<CallManager>>,
    /// Channel adapters are registered by the host process before `start`.
    pub channels: tokio::sync::Mutex<ChannelManager>,
    pub sentinel: SentinelStore,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    pub fn new(config: NexusConfig) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let dispatcher = Arc::new(Dispatcher::new(&config, Arc::new(LoggingInvoker)));
        let debouncer = Debouncer::new(config.inbound.debounce_ms, dispatcher.clone());
        let scheduler = HeartbeatScheduler::new(dispatcher.clone(), None, clock.clone());
        let monitor = HeartbeatMonitor::new(
            config.heartbeat.miss_threshold,
            config.heartbeat.interval_ms,
            clock.clone(),
        );
        let sentinel = SentinelStore::new(config.gateway.state_dir.clone());

        Self {
            dispatcher,
            debouncer,
            scheduler,
            monitor,
            wake: WakeHub::new(),
            calls: None,
            channels: tokio::sync::Mutex::new(ChannelManager::new()),
            sentinel,
            clock,
            config,
        }
    }

    /// Attach a call manager (requires a telephony provider).
    #[allow(dead_code)]
    pub fn with_calls(mut self, calls: Arc<CallManager>) -> Self {
        self.calls = Some(calls);
        self
    }

    /// Register the default agent's heartbeat and start the scheduler.
    pub fn start(&self) {
        if self.config.heartbeat.enabled {
            self.scheduler.register(
                "default",
                HeartbeatConfig {
                    interval_ms: self.config.heartbeat.interval_ms,
                    ..HeartbeatConfig::default()
                },
            );
        }
        self.scheduler.start();
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(crate::http::health::health_handler))
        .route("/chat", post(crate::http::chat::chat_handler))
        .route("/wake", post(crate::http::control::wake_handler))
        .route(
            "/heartbeat/trigger",
            post(crate::http::control::trigger_heartbeats_handler),
        )
        .route(
            "/voice/webhook",
            post(crate::http::voice::webhook_handler),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
