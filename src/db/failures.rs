//! Episodes given up on after too many failures.

use crate::error::DatabaseError;
use crate::types::Episode;
use crate::{Error, Result};
use sqlx::FromRow;

use super::{Database, EpisodeRow, FailureRecord};

#[derive(FromRow)]
struct FailureRow {
    #[sqlx(flatten)]
    episode: EpisodeRow,
    attempts: i64,
    error: String,
    recorded_at: i64,
}

impl Database {
    /// Append an episode to the permanent-failure log
    pub async fn insert_download_error(
        &self,
        episode: &Episode,
        attempts: u32,
        error: &str,
    ) -> Result<()> {
        let row = EpisodeRow::from_episode(episode)?;
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO download_errors (
                channel, category_id, category_name, extension, parameters,
                episode_name, episode_id, attempts, error, recorded_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&row.channel)
        .bind(&row.category_id)
        .bind(&row.category_name)
        .bind(&row.extension)
        .bind(&row.parameters)
        .bind(&row.episode_name)
        .bind(&row.episode_id)
        .bind(i64::from(attempts))
        .bind(error)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to record download error: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// The permanent-failure log, oldest first
    pub async fn list_download_errors(&self) -> Result<Vec<FailureRecord>> {
        let rows = sqlx::query_as::<_, FailureRow>(
            r#"
            SELECT channel, category_id, category_name, extension, parameters,
                   episode_name, episode_id, attempts, error, recorded_at
            FROM download_errors
            ORDER BY recorded_at ASC, rowid ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list download errors: {}",
                e
            )))
        })?;

        Ok(rows
            .into_iter()
            .map(|row| FailureRecord {
                episode: row.episode.into_episode(),
                attempts: u32::try_from(row.attempts).unwrap_or_default(),
                error: row.error,
                recorded_at: row.recorded_at,
            })
            .collect())
    }
}
