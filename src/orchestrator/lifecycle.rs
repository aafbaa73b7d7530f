//! Shutdown coordination.

use super::EpisodeOrchestrator;
use crate::error::Result;
use crate::types::Event;
use std::time::Duration;

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

impl EpisodeOrchestrator {
    /// Shut the orchestrator down
    ///
    /// 1. Stops every worker pool: new submissions are refused and all tasks
    ///    are canceled, queued or running
    /// 2. Waits for the workers to unwind, up to 30 seconds
    /// 3. Publishes `Shutdown`
    ///
    /// Export steps interrupted this way keep their resume records, so the
    /// next run can pick them up with
    /// [`resume_interrupted_exports`](Self::resume_interrupted_exports).
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Initiating shutdown");

        self.pools.shutdown_now();
        tracing::info!("Canceled all pipeline tasks");

        match tokio::time::timeout(SHUTDOWN_TIMEOUT, self.wait_for_workers()).await {
            Ok(()) => tracing::info!("All workers stopped"),
            Err(_) => tracing::warn!("Timeout waiting for workers to stop, proceeding with shutdown"),
        }

        self.events.publish(Event::Shutdown);
        tracing::info!("Shutdown complete");
        Ok(())
    }

    /// Whether [`shutdown`](Self::shutdown) was called
    pub fn is_shut_down(&self) -> bool {
        self.pools.retrieve.is_shut_down()
    }

    async fn wait_for_workers(&self) {
        loop {
            let outstanding = self.pools.outstanding();
            if outstanding == 0 {
                return;
            }
            tracing::debug!(outstanding, "Waiting for workers to stop");
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}
