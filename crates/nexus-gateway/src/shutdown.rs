//! Graceful shutdown and the restart-sentinel handoff.
//!
//! On the way down the gateway stops its schedulers, disconnects channels,
//! and writes a sentinel recording the outcome. The next process consumes
//! that sentinel exactly once at boot and logs how its predecessor exited.

use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};

use nexus_core::config::NexusConfig;
use nexus_core::sentinel::{
    restart_payload, SentinelStats, SentinelStatus, SentinelStep, SentinelStore,
};
use nexus_core::types::Clock;

use crate::app::AppState;

/// Consume any sentinel left by the previous process and log its outcome.
pub fn report_previous_exit(config: &NexusConfig) {
    let store = SentinelStore::new(config.gateway.state_dir.clone());
    match store.consume() {
        Ok(Some(sentinel)) => {
            info!(
                kind = ?sentinel.payload.kind,
                status = ?sentinel.payload.status,
                ts_ms = sentinel.payload.ts_ms,
                "previous process left a restart sentinel"
            );
        }
        Ok(None) => {}
        Err(e) => warn!(error = %e, "failed to consume restart sentinel"),
    }
}

/// Resolves when SIGINT (and on Unix, SIGTERM) arrives.
pub async fn wait_for_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                ctrl_c.await;
                return;
            }
        };
        tokio::select! {
            _ = ctrl_c => {}
            _ = term.recv() => {}
        }
    }

    #[cfg(not(unix))]
    ctrl_c.await;
}

/// Tear the gateway down and hand off a sentinel to the next process.
pub async fn finalize(state: &Arc<AppState>) {
    info!("shutting down");
    let mut steps: Vec<SentinelStep> = Vec::new();

    let timed = Instant::now();
    state.scheduler.stop();
    state.debouncer.stop();
    state.dispatcher.cancel_all();
    steps.push(SentinelStep {
        name: "stop-schedulers".to_string(),
        ok: true,
        duration_ms: Some(timed.elapsed().as_millis() as u64),
        log_tail: None,
    });

    let timed = Instant::now();
    {
        let mut channels = state.channels.lock().await;
        channels.stop_all().await;
    }
    steps.push(SentinelStep {
        name: "stop-channels".to_string(),
        ok: true,
        duration_ms: Some(timed.elapsed().as_millis() as u64),
        log_tail: None,
    });

    let mut payload = restart_payload(SentinelStatus::Ok, state.clock.now_ms());
    payload.stats = Some(SentinelStats { steps });
    if let Err(e) = state.sentinel.write(&payload) {
        warn!(error = %e, "failed to write restart sentinel");
    }
    info!("shutdown complete");
}
