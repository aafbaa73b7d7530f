use super::PipelineContext;
use crate::error::{Error, Result};
use crate::plugin::{ExporterPlugin, run_process};
use crate::task::Task;
use crate::types::{Episode, EpisodeExportState, Event, TaskKind};
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Runs one step of an episode's export chain
pub struct ExportTask {
    episode: Episode,
    name: String,
    rank: u32,
    cmd: String,
    exporter: Arc<dyn ExporterPlugin>,
    ctx: PipelineContext,
}

impl ExportTask {
    /// Create an export task for an already token-replaced command
    pub fn new(
        episode: Episode,
        name: impl Into<String>,
        rank: u32,
        cmd: impl Into<String>,
        exporter: Arc<dyn ExporterPlugin>,
        ctx: PipelineContext,
    ) -> Self {
        Self {
            episode,
            name: name.into(),
            rank,
            cmd: cmd.into(),
            exporter,
            ctx,
        }
    }

    /// The resume record describing this step
    pub fn export_state(&self) -> EpisodeExportState {
        EpisodeExportState::new(self.episode.clone(), self.rank)
    }

    /// Rank of the step in the export chain
    pub fn rank(&self) -> u32 {
        self.rank
    }

    /// The episode being exported
    pub fn episode(&self) -> &Episode {
        &self.episode
    }
}

#[async_trait]
impl Task for ExportTask {
    type Output = ();

    fn kind(&self) -> TaskKind {
        TaskKind::Export
    }

    fn describe(&self) -> String {
        format!("export {} #{} of {}", self.name, self.rank, self.episode)
    }

    fn adding(&self) {
        self.ctx.events.publish(Event::ToExport {
            episode: self.episode.clone(),
            export: self.name.clone(),
        });
    }

    fn started(&self) {
        self.ctx.events.publish(Event::ExportStarting {
            episode: self.episode.clone(),
            export: self.name.clone(),
            rank: self.rank,
        });
    }

    async fn do_call(&self, cancel: &CancellationToken) -> Result<()> {
        tracing::info!(
            episode = %self.episode,
            export = %self.name,
            rank = self.rank,
            exporter = self.exporter.name(),
            cmd = %self.cmd,
            "running export step"
        );
        let process = self
            .exporter
            .export(&self.ctx.config.export.cmd_processor, &self.cmd)?;
        run_process(process.as_ref(), cancel).await
    }

    fn failed(&self, error: &Error) {
        self.ctx.events.publish(Event::ExportFailed {
            episode: self.episode.clone(),
            export: self.name.clone(),
            error: error.to_string(),
        });
    }
}
