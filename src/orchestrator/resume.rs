//! Resuming export chains interrupted by a previous run.

use super::EpisodeOrchestrator;
use crate::error::Result;
use crate::pipeline::RetrieveTask;
use crate::types::Event;

impl EpisodeOrchestrator {
    /// Resubmit every episode with an export step recorded as in flight
    ///
    /// Each episode resumes at its recorded step, skipping check and download.
    /// `channels` restricts the resume to episodes of those providers; an
    /// empty list restricts nothing.
    /// Episodes with a retrieve task already running are left alone.
    ///
    /// Returns the number of retrieve tasks admitted.
    pub async fn resume_interrupted_exports(&self, channels: Option<&[String]>) -> Result<usize> {
        let channels = channels.filter(|channels| !channels.is_empty());
        let mut states = self.stores.export_state.load_all().await?;
        states.retain(|state| {
            channels.is_none_or(|channels| channels.contains(&state.episode.category.channel))
        });
        if states.is_empty() {
            tracing::debug!("no interrupted export to resume");
            return Ok(0);
        }

        // the earliest recorded step of an episode wins; later ones are refused as duplicates
        states.sort_by_key(|state| state.step);
        tracing::info!(count = states.len(), "resuming interrupted exports");
        self.events.publish(Event::ResumeExport {
            count: states.len(),
        });

        let mut admitted = 0;
        for state in states {
            let task = RetrieveTask::new(state.episode, self.ctx.clone()).resuming_at(state.step);
            if self.ctx.admission.admit_retrieve(task).await?.is_added() {
                admitted += 1;
            }
        }
        Ok(admitted)
    }

    /// Whether an interrupted export chain is waiting to be resumed
    pub async fn has_export_to_resume(&self) -> Result<bool> {
        Ok(!self.stores.export_state.load_all().await?.is_empty())
    }

    /// Forget every interrupted export chain
    pub async fn clear_export(&self) -> Result<()> {
        tracing::info!("clearing export resume records");
        self.stores.export_state.clear().await
    }
}
