//! Operator controls: restart, cancel and the downloaded-episode index.

use super::EpisodeOrchestrator;
use super::admission::lock_state;
use crate::db::FailureRecord;
use crate::error::Result;
use crate::pipeline::RetrieveTask;
use crate::task::Admission;
use crate::types::{CategoryRef, Episode};
use std::collections::HashSet;

impl EpisodeOrchestrator {
    /// Retrieve an episode again on operator request
    ///
    /// With `export_only` the check and download are skipped and the whole
    /// export chain runs on the file already downloaded. Refused with
    /// [`Admission::AlreadyAdded`] while the episode is being retrieved.
    pub async fn restart(&self, episode: Episode, export_only: bool) -> Result<Admission> {
        tracing::info!(episode = %episode, export_only, "restarting episode");
        let mut task = RetrieveTask::new(episode, self.ctx.clone()).manual(true);
        if export_only {
            task = task.resuming_at(0);
        }
        self.ctx.admission.admit_retrieve(task).await
    }

    /// Cancel everything in flight for an episode
    ///
    /// Returns whether any task was found. Export resume records are kept, so
    /// a canceled export chain can still be resumed.
    pub fn cancel(&self, episode: &Episode) -> bool {
        let retrieve = self.pools.retrieve.cancel(episode);
        let download = self.pools.download.cancel(episode);
        let export = self.pools.export.cancel(episode);
        let found = retrieve || download || export;
        tracing::info!(episode = %episode, found, "cancel requested");
        found
    }

    /// Whether a retrieve task is admitted and not finished for the episode
    pub fn is_retrieving(&self, episode: &Episode) -> bool {
        lock_state(&self.state).running.contains(episode)
    }

    /// Consecutive failures counted for the episode since its last success
    pub fn retry_count(&self, episode: &Episode) -> u32 {
        lock_state(&self.state)
            .attempts
            .get(episode)
            .copied()
            .unwrap_or(0)
    }

    /// Mark an episode as downloaded without downloading it
    pub async fn set_downloaded(&self, episode: &Episode) -> Result<()> {
        tracing::info!(episode = %episode, "marking episode downloaded");
        self.stores.downloaded.mark_downloaded(episode, true).await
    }

    /// Names of the episodes of a category already downloaded
    pub async fn find_downloaded(&self, category: &CategoryRef) -> Result<HashSet<String>> {
        self.stores.downloaded.list_downloaded(category).await
    }

    /// Episodes given up on after too many failures, oldest first
    pub async fn failed_episodes(&self) -> Result<Vec<FailureRecord>> {
        self.stores.errors.list_failures().await
    }
}
