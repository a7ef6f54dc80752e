//! Background sweep loop.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::config::SweepConfig;
use crate::worker::NotificationWorker;

/// Handle to running sweepers.
#[derive(Debug)]
pub struct SweepHandle {
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl SweepHandle {
    /// Number of sweeper tasks.
    #[must_use]
    pub fn workers(&self) -> usize {
        self.tasks.len()
    }

    /// Stops the sweepers and waits for them to exit.
    ///
    /// A slot already being processed is finished first.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Sweeper task panicked");
            }
        }
    }
}

/// Starts `config.workers` sweepers, each calling
/// [`NotificationWorker::process_next_slot`] once per tick.
///
/// The sweepers stop when `cancel` is cancelled or the handle is shut down.
pub fn spawn_sweepers(
    worker: Arc<NotificationWorker>,
    config: &SweepConfig,
    cancel: CancellationToken,
) -> SweepHandle {
    let interval = config.tick_interval;
    let tasks = (0..config.workers)
        .map(|index| {
            let worker = worker.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tracing::info!(
                    sweeper = index,
                    interval = ?interval,
                    "Starting sweeper"
                );

                let mut ticker = tokio::time::interval(interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

                loop {
                    tokio::select! {
                        () = cancel.cancelled() => break,
                        _ = ticker.tick() => {
                            if let Err(e) = worker.process_next_slot().await {
                                tracing::error!(sweeper = index, error = %e, "Sweep tick failed");
                            }
                        }
                    }
                }

                tracing::info!(sweeper = index, "Sweeper stopped");
            })
        })
        .collect();

    SweepHandle { cancel, tasks }
}
