use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::scheduler::SyncScheduler;

/// Owns the background timer of a started scheduler.
pub struct SchedulerHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop the timer and wait for it. A cycle already in progress completes first.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            warn!(error = %e, "sync timer task ended abnormally");
        }
    }
}

impl SyncScheduler {
    /// Spawn the single timer task that ticks after each interval.
    pub fn start(self: Arc<Self>) -> SchedulerHandle {
        let cancel = CancellationToken::new();
        let interval = self.interval_receiver();
        let task = tokio::spawn(run_timer(self, interval, cancel.clone()));
        SchedulerHandle { cancel, task }
    }
}

async fn run_timer(
    scheduler: Arc<SyncScheduler>,
    mut interval: watch::Receiver<Duration>,
    cancel: CancellationToken,
) {
    info!(interval = ?*interval.borrow(), "sync timer started");
    loop {
        let wait = *interval.borrow_and_update();
        tokio::select! {
            _ = cancel.cancelled() => break,
            changed = interval.changed() => {
                if changed.is_err() {
                    break;
                }
                debug!(interval = ?*interval.borrow(), "sync timer restarted");
            }
            _ = tokio::time::sleep(wait) => {
                scheduler.tick().await;
            }
        }
    }
    info!("sync timer stopped");
}
