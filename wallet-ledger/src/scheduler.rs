//! Periodic background reconciliation
//!
//! Runs [`Ledger::reconcile`] on a fixed interval. The first run starts
//! immediately. A failed run is logged and the schedule continues; drift is
//! reported through logs and the mismatch gauge, never corrected.

use crate::{ledger::Ledger, reconciliation::count_mismatches, Result};
use std::time::Duration;
use tokio::{
    sync::oneshot,
    task::JoinHandle,
    time::{interval, MissedTickBehavior},
};

/// Spawns the reconciliation loop
#[derive(Debug)]
pub struct ReconciliationScheduler;

impl ReconciliationScheduler {
    /// Start reconciling `ledger` every `every`
    pub fn spawn(ledger: Ledger, every: Duration) -> ReconciliationHandle {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let every = every.max(Duration::from_millis(1));

        let task = tokio::spawn(async move {
            let mut ticker = interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            tracing::info!(interval_secs = every.as_secs_f64(), "Reconciliation scheduler started");

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = ticker.tick() => match ledger.reconcile().await {
                        Ok(results) => {
                            tracing::debug!(
                                checked = results.len(),
                                mismatches = count_mismatches(&results),
                                "Scheduled reconciliation finished"
                            );
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "Scheduled reconciliation failed");
                        }
                    },
                }
            }

            tracing::info!("Reconciliation scheduler stopped");
        });

        ReconciliationHandle {
            shutdown: shutdown_tx,
            task,
        }
    }
}

/// Handle to a running scheduler
#[derive(Debug)]
pub struct ReconciliationHandle {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl ReconciliationHandle {
    /// Stop the loop, waiting for an in-flight run to finish
    pub async fn shutdown(self) -> Result<()> {
        // The loop may already have exited
        let _ = self.shutdown.send(());
        self.task.await?;
        Ok(())
    }
}
