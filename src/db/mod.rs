//! Database layer for episode-grab
//!
//! Handles SQLite persistence for resumable export steps, the downloaded-episode
//! index and the permanent-failure log.
//!
//! ## Submodules
//!
//! Methods on [`Database`] are organized by domain:
//! - [`migrations`] — Database lifecycle, schema migrations
//! - [`export_state`] — Export steps in flight, for crash recovery
//! - [`downloaded`] — Downloaded-episode index and first-search markers
//! - [`failures`] — Episodes given up on after too many failures
//!
//! The pipeline only sees the [`ExportStateStore`], [`DownloadedIndex`] and
//! [`ErrorLog`] traits, which [`Database`] implements.

use crate::types::{CategoryRef, Episode};
use sqlx::{FromRow, sqlite::SqlitePool};
use std::collections::BTreeMap;

mod downloaded;
mod export_state;
mod failures;
mod migrations;
mod traits;

pub use traits::{DownloadedIndex, ErrorLog, ExportStateStore};

/// Episode columns shared by the export_state and download_errors tables
#[derive(Debug, Clone, FromRow)]
pub(crate) struct EpisodeRow {
    pub channel: String,
    pub category_id: String,
    pub category_name: String,
    pub extension: String,
    pub parameters: String,
    pub episode_name: String,
    pub episode_id: String,
}

impl EpisodeRow {
    pub(crate) fn from_episode(episode: &Episode) -> crate::Result<Self> {
        Ok(Self {
            channel: episode.category.channel.clone(),
            category_id: episode.category.id.clone(),
            category_name: episode.category.name.clone(),
            extension: episode.category.extension.clone(),
            parameters: serde_json::to_string(&episode.category.parameters)?,
            episode_name: episode.name.clone(),
            episode_id: episode.id.clone(),
        })
    }

    pub(crate) fn into_episode(self) -> Episode {
        let parameters: BTreeMap<String, String> =
            serde_json::from_str(&self.parameters).unwrap_or_else(|e| {
                tracing::warn!(
                    channel = %self.channel,
                    category = %self.category_id,
                    error = %e,
                    "unreadable category parameters, using none"
                );
                BTreeMap::new()
            });
        Episode {
            category: CategoryRef {
                channel: self.channel,
                id: self.category_id,
                name: self.category_name,
                extension: self.extension,
                parameters,
            },
            name: self.episode_name,
            id: self.episode_id,
        }
    }
}

/// Entry of the permanent-failure log
#[derive(Debug, Clone)]
pub struct FailureRecord {
    /// The episode given up on
    pub episode: Episode,
    /// Failed attempts counted before giving up
    pub attempts: u32,
    /// Last error message
    pub error: String,
    /// Unix timestamp when the episode was given up on
    pub recorded_at: i64,
}

/// Database handle for episode-grab
pub struct Database {
    pool: SqlitePool,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish_non_exhaustive()
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
