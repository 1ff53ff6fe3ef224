//! Background maintenance task driving periodic policy sweeps.
//!
//! One task per registry, woken on a fixed interval. Cycles never overlap:
//! the task runs sweeps inline, and a tick that fires while a sweep is
//! still in progress is skipped rather than queued.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::registry::ModelRegistry;

/// Handle to a running maintenance task.
///
/// Dropping the handle requests cancellation; [`cancel`](Self::cancel)
/// additionally waits for the task to wind down.
pub struct MaintenanceHandle {
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl MaintenanceHandle {
    /// Stop the task and wait for it to finish. A sweep already in
    /// progress runs to completion first.
    pub async fn cancel(mut self) {
        self.token.cancel();
        if let Some(task) = self.task.take() {
            // The task never panics; join errors only surface on runtime
            // shutdown, where there is nothing left to do.
            let _ = task.await;
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |t| t.is_finished())
    }
}

impl Drop for MaintenanceHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

pub(crate) fn spawn(registry: ModelRegistry, interval: Duration) -> MaintenanceHandle {
    let token = CancellationToken::new();
    let task_token = token.clone();

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // Skip, not burst: a long sweep must not be followed by a
        // back-to-back catch-up sweep.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick resolves immediately; consume it so the first
        // sweep happens one full interval after startup.
        ticker.tick().await;

        info!(interval_secs = interval.as_secs(), "maintenance task started");
        loop {
            tokio::select! {
                biased;
                _ = task_token.cancelled() => {
                    info!("maintenance task stopping");
                    break;
                }
                _ = ticker.tick() => {
                    let summary = registry.sweep().await;
                    debug!(
                        evicted = summary.evicted.len(),
                        freed_bytes = summary.freed_bytes,
                        "maintenance cycle complete"
                    );
                }
            }
        }
    });

    MaintenanceHandle {
        token,
        task: Some(task),
    }
}
