//! Export steps in flight, for crash recovery.

use crate::error::DatabaseError;
use crate::types::EpisodeExportState;
use crate::{Error, Result};
use sqlx::FromRow;

use super::{Database, EpisodeRow};

#[derive(FromRow)]
struct ExportStateRow {
    #[sqlx(flatten)]
    episode: EpisodeRow,
    step: i64,
}

impl Database {
    /// Record an export step as in flight
    ///
    /// Recording the same `(episode, step)` twice keeps a single row.
    pub async fn add_export_state(&self, state: &EpisodeExportState) -> Result<()> {
        let row = EpisodeRow::from_episode(&state.episode)?;
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO export_state (
                channel, category_id, category_name, extension, parameters,
                episode_name, episode_id, step, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(channel, category_id, episode_name, episode_id, step) DO NOTHING
            "#,
        )
        .bind(&row.channel)
        .bind(&row.category_id)
        .bind(&row.category_name)
        .bind(&row.extension)
        .bind(&row.parameters)
        .bind(&row.episode_name)
        .bind(&row.episode_id)
        .bind(i64::from(state.step))
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to add export state: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Remove an export step record; removing a missing record is a no-op
    pub async fn remove_export_state(&self, state: &EpisodeExportState) -> Result<()> {
        let episode = &state.episode;
        sqlx::query(
            r#"
            DELETE FROM export_state
            WHERE channel = ? AND category_id = ? AND episode_name = ? AND episode_id = ? AND step = ?
            "#,
        )
        .bind(&episode.category.channel)
        .bind(&episode.category.id)
        .bind(&episode.name)
        .bind(&episode.id)
        .bind(i64::from(state.step))
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to remove export state: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// All export steps in flight, oldest first
    pub async fn load_export_states(&self) -> Result<Vec<EpisodeExportState>> {
        let rows = sqlx::query_as::<_, ExportStateRow>(
            r#"
            SELECT channel, category_id, category_name, extension, parameters,
                   episode_name, episode_id, step
            FROM export_state
            ORDER BY created_at ASC, step ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to load export states: {}",
                e
            )))
        })?;

        Ok(rows
            .into_iter()
            .map(|row| EpisodeExportState {
                episode: row.episode.into_episode(),
                step: u32::try_from(row.step).unwrap_or_default(),
            })
            .collect())
    }

    /// Remove every export step record
    pub async fn clear_export_states(&self) -> Result<()> {
        sqlx::query("DELETE FROM export_state")
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to clear export states: {}",
                    e
                )))
            })?;

        Ok(())
    }
}
