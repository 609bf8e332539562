//! Lifecycle coordinator - owns every target monitor
//!
//! All monitors share one [`CancellationToken`]. Cancelling it is the only
//! way to stop them, and it is never re-opened.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::beacon::{BeaconClient, Fetcher};
use crate::config::ResolvedTarget;

use super::monitor::{MonitorContext, TargetHandle};

pub struct Coordinator {
    token: CancellationToken,
    handles: Vec<TargetHandle>,
    tasks: Vec<JoinHandle<()>>,
}

impl Coordinator {
    /// Start one monitor per target, each polling its own beacon node
    pub fn start(targets: Vec<ResolvedTarget>, ctx: MonitorContext) -> Result<Self> {
        let mut monitors = Vec::with_capacity(targets.len());
        for target in targets {
            let client = BeaconClient::new(target.beacon_api.clone()).with_context(|| {
                format!("failed to build beacon client for {}", target.network())
            })?;
            monitors.push((target, Arc::new(client) as Arc<dyn Fetcher>));
        }

        Ok(Self::start_with_fetchers(monitors, ctx))
    }

    /// Start one monitor per `(target, fetcher)` pair
    pub fn start_with_fetchers(
        monitors: Vec<(ResolvedTarget, Arc<dyn Fetcher>)>,
        ctx: MonitorContext,
    ) -> Self {
        let token = CancellationToken::new();
        let mut handles = Vec::with_capacity(monitors.len());
        let mut tasks = Vec::with_capacity(monitors.len());

        for (target, fetcher) in monitors {
            let (handle, task) = TargetHandle::spawn(target, fetcher, ctx.clone(), token.clone());
            handles.push(handle);
            tasks.push(task);
        }

        info!("started {} target monitors", handles.len());
        Self {
            token,
            handles,
            tasks,
        }
    }

    pub fn handles(&self) -> &[TargetHandle] {
        &self.handles
    }

    /// Token observed by every monitor
    pub fn shutdown_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Signal every monitor to stop
    ///
    /// Idempotent. In-flight fetches complete before a monitor exits.
    pub fn shutdown(&self) {
        if !self.token.is_cancelled() {
            info!("shutting down {} target monitors", self.handles.len());
        }
        self.token.cancel();
    }

    /// Wait for every monitor task to finish
    ///
    /// Returns the number of tasks that panicked or were aborted.
    pub async fn wait(self) -> usize {
        let mut failed = 0;
        for (handle, task) in self.handles.iter().zip(self.tasks) {
            if let Err(e) = task.await {
                error!("monitor for {} terminated abnormally: {e}", handle.network);
                failed += 1;
            }
        }
        failed
    }
}
