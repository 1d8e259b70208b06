//! Wake hub — routes on-demand wake requests to the registered handler.
//!
//! A single handler serves the whole process, but the hub is an ordinary
//! value composed into the gateway's state rather than a hidden global, so
//! tests can build their own.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{Result, SchedulerError};
use crate::types::{RunResult, WakeRequest};

/// External wake execution capability.
#[async_trait]
pub trait WakeHandler: Send + Sync {
    async fn wake(&self, ctx: &CancellationToken, req: &WakeRequest) -> Result<RunResult>;
}

#[derive(Default)]
pub struct WakeHub {
    handler: Mutex<Option<Arc<dyn WakeHandler>>>,
}

impl WakeHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the process-wide wake handler, replacing any previous one.
    pub fn set_handler(&self, handler: Arc<dyn WakeHandler>) {
        *self.handler.lock().unwrap() = Some(handler);
    }

    pub fn clear_handler(&self) {
        *self.handler.lock().unwrap() = None;
    }

    /// Dispatch a wake request. With no handler installed the request is
    /// reported as skipped rather than failing — wake is best-effort.
    ///
    /// The handler runs outside the hub's lock.
    pub async fn request_wake_now(
        &self,
        ctx: &CancellationToken,
        req: &WakeRequest,
    ) -> Result<RunResult> {
        let handler = { self.handler.lock().unwrap().clone() };
        match handler {
            Some(h) => h.wake(ctx, req).await,
            None => {
                debug!(reason = %req.reason, "wake requested with no handler installed");
                Ok(RunResult::skipped("no-handler"))
            }
        }
    }
}
