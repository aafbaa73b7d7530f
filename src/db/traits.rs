//! Store contracts used by the orchestrator and the pipeline tasks

use crate::Result;
use crate::db::{Database, FailureRecord};
use crate::types::{CategoryRef, Episode, EpisodeExportState};
use async_trait::async_trait;
use std::collections::HashSet;

/// Durable record of export steps in flight
///
/// `add` and `remove` are idempotent for a given `(episode, step)`.
#[async_trait]
pub trait ExportStateStore: Send + Sync {
    /// Record that `state.step` of `state.episode` is in flight
    async fn add(&self, state: &EpisodeExportState) -> Result<()>;
    /// Forget a step; a missing record is not an error
    async fn remove(&self, state: &EpisodeExportState) -> Result<()>;
    /// Every step in flight when the store was last written
    async fn load_all(&self) -> Result<Vec<EpisodeExportState>>;
    /// Forget every step
    async fn clear(&self) -> Result<()>;
}

/// Index of already-downloaded episodes, by episode name within a category
#[async_trait]
pub trait DownloadedIndex: Send + Sync {
    /// Record an episode as downloaded (`manual` when an operator did it)
    async fn mark_downloaded(&self, episode: &Episode, manual: bool) -> Result<()>;
    /// Names of the downloaded episodes of a category
    async fn list_downloaded(&self, category: &CategoryRef) -> Result<HashSet<String>>;
    /// Whether the category has been searched at least once
    async fn is_index_created(&self, category: &CategoryRef) -> Result<bool>;
    /// Record the category's first search
    async fn mark_index_created(&self, category: &CategoryRef) -> Result<()>;
}

/// Permanent log of episodes given up on
#[async_trait]
pub trait ErrorLog: Send + Sync {
    /// Record an episode that failed too many times
    async fn record_failure(&self, episode: &Episode, attempts: u32, error: &str) -> Result<()>;
    /// Every recorded failure, oldest first
    async fn list_failures(&self) -> Result<Vec<FailureRecord>>;
}

#[async_trait]
impl ExportStateStore for Database {
    async fn add(&self, state: &EpisodeExportState) -> Result<()> {
        self.add_export_state(state).await
    }

    async fn remove(&self, state: &EpisodeExportState) -> Result<()> {
        self.remove_export_state(state).await
    }

    async fn load_all(&self) -> Result<Vec<EpisodeExportState>> {
        self.load_export_states().await
    }

    async fn clear(&self) -> Result<()> {
        self.clear_export_states().await
    }
}

#[async_trait]
impl DownloadedIndex for Database {
    async fn mark_downloaded(&self, episode: &Episode, manual: bool) -> Result<()> {
        self.add_downloaded(episode, manual).await
    }

    async fn list_downloaded(&self, category: &CategoryRef) -> Result<HashSet<String>> {
        self.downloaded_names(category).await
    }

    async fn is_index_created(&self, category: &CategoryRef) -> Result<bool> {
        self.is_category_indexed(category).await
    }

    async fn mark_index_created(&self, category: &CategoryRef) -> Result<()> {
        self.mark_category_indexed(category).await
    }
}

#[async_trait]
impl ErrorLog for Database {
    async fn record_failure(&self, episode: &Episode, attempts: u32, error: &str) -> Result<()> {
        self.insert_download_error(episode, attempts, error).await
    }

    async fn list_failures(&self) -> Result<Vec<FailureRecord>> {
        self.list_download_errors().await
    }
}
