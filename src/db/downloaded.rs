//! Downloaded-episode index and first-search markers.

use crate::error::DatabaseError;
use crate::types::{CategoryRef, Episode};
use crate::{Error, Result};
use std::collections::HashSet;

use super::Database;

impl Database {
    /// Record an episode as downloaded
    ///
    /// A later call for the same episode name updates the source id and the
    /// manual flag.
    pub async fn add_downloaded(&self, episode: &Episode, manual: bool) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT INTO downloaded (channel, category_id, episode_name, episode_id, manual, downloaded_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(channel, category_id, episode_name) DO UPDATE SET
                episode_id = excluded.episode_id,
                manual = excluded.manual,
                downloaded_at = excluded.downloaded_at
            "#,
        )
        .bind(&episode.category.channel)
        .bind(&episode.category.id)
        .bind(&episode.name)
        .bind(&episode.id)
        .bind(manual)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to mark episode downloaded: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Names of the downloaded episodes of a category
    pub async fn downloaded_names(&self, category: &CategoryRef) -> Result<HashSet<String>> {
        let names: Vec<String> = sqlx::query_scalar(
            "SELECT episode_name FROM downloaded WHERE channel = ? AND category_id = ?",
        )
        .bind(&category.channel)
        .bind(&category.id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list downloaded episodes: {}",
                e
            )))
        })?;

        Ok(names.into_iter().collect())
    }

    /// Whether a category has been searched before
    pub async fn is_category_indexed(&self, category: &CategoryRef) -> Result<bool> {
        let found: Option<i64> = sqlx::query_scalar(
            "SELECT 1 FROM indexed_categories WHERE channel = ? AND category_id = ?",
        )
        .bind(&category.channel)
        .bind(&category.id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to check category index: {}",
                e
            )))
        })?;

        Ok(found.is_some())
    }

    /// Record a category's first search
    pub async fn mark_category_indexed(&self, category: &CategoryRef) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT INTO indexed_categories (channel, category_id, indexed_at)
            VALUES (?, ?, ?)
            ON CONFLICT(channel, category_id) DO NOTHING
            "#,
        )
        .bind(&category.channel)
        .bind(&category.id)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to mark category indexed: {}",
                e
            )))
        })?;

        Ok(())
    }
}
