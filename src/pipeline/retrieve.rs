use super::{DownloadTask, ExportTask, PipelineContext};
use crate::config::ExportDefinition;
use crate::error::{Error, Result};
use crate::task::{Admission, Task};
use crate::token::TokenReplacer;
use crate::types::{Episode, Event, TaskKind};
use crate::utils::find_file_without_extension;
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio_util::sync::CancellationToken;

/// Checks, downloads and exports one episode
///
/// The task keeps its retrieve worker for the whole run and waits on the
/// download and on every export step in turn, so the retrieve pool size bounds
/// the number of episodes in flight end to end.
///
/// Export steps are ranked depth-first across the whole export tree. A step
/// runs only when its guard passes, and its sub-steps only after it
/// succeeded. A failing step ends its own level of the tree: later siblings
/// and its sub-steps are skipped, enclosing levels carry on.
pub struct RetrieveTask {
    episode: Episode,
    ctx: PipelineContext,
    manual: bool,
    resume_from: Option<u32>,
    failed_exports: AtomicUsize,
}

impl RetrieveTask {
    /// Create a retrieve task for a found episode
    pub fn new(episode: Episode, ctx: PipelineContext) -> Self {
        Self {
            episode,
            ctx,
            manual: false,
            resume_from: None,
            failed_exports: AtomicUsize::new(0),
        }
    }

    /// Mark the retrieval as requested by an operator
    pub fn manual(mut self, manual: bool) -> Self {
        self.manual = manual;
        self
    }

    /// Skip check and download, resuming the export chain at `step`
    pub fn resuming_at(mut self, step: u32) -> Self {
        self.resume_from = Some(step);
        self
    }

    /// The episode being retrieved
    pub fn episode(&self) -> &Episode {
        &self.episode
    }

    /// Export step the chain resumes at, if resuming
    pub fn resume_from(&self) -> Option<u32> {
        self.resume_from
    }

    async fn check(&self, cancel: &CancellationToken) -> Result<()> {
        let provider = self.ctx.plugins.provider(&self.episode.category.channel)?;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Canceled),
            checked = provider.check_episode(&self.episode) => checked,
        }
    }

    async fn download(&self, cancel: &CancellationToken) -> Result<PathBuf> {
        let task = DownloadTask::new(self.episode.clone(), self.ctx.clone(), self.manual);
        match self
            .ctx
            .admission
            .admit_download(task, &self.episode.category.channel)
            .await?
        {
            Admission::Added(handle) => handle.wait_or_cancel(cancel).await,
            Admission::AlreadyAdded => Err(Error::Other(format!(
                "download of {} already running",
                self.episode
            ))),
        }
    }

    async fn export_step(
        &self,
        def: &ExportDefinition,
        rank: u32,
        tokens: &TokenReplacer,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let exporter = self.ctx.plugins.exporter(def.exporter.as_deref())?;
        let category = exporter.name().to_string();
        let task = ExportTask::new(
            self.episode.clone(),
            def.name.clone(),
            rank,
            tokens.replace(&def.cmd),
            exporter,
            self.ctx.clone(),
        );
        match self.ctx.admission.admit_export(task, &category).await? {
            Admission::Added(handle) => handle.wait_or_cancel(cancel).await,
            Admission::AlreadyAdded => Ok(()),
        }
    }

    /// Run one level of the export tree whose first step has rank `base`
    fn run_exports<'a>(
        &'a self,
        defs: &'a [ExportDefinition],
        base: u32,
        tokens: &'a TokenReplacer,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut next = base;
            for def in defs {
                let rank = next;
                next += def.step_count();

                if !def.guard_passes(tokens)? {
                    tracing::debug!(episode = %self.episode, export = %def.name, rank, "export guard not matched, skipping");
                    continue;
                }

                if self.resume_from.is_some_and(|resume| rank < resume) {
                    self.run_exports(&def.sub_exports, rank + 1, tokens, cancel)
                        .await?;
                    continue;
                }

                match self.export_step(def, rank, tokens, cancel).await {
                    Ok(()) => {
                        self.run_exports(&def.sub_exports, rank + 1, tokens, cancel)
                            .await?
                    }
                    Err(e) if e.is_cancellation() => return Err(e),
                    Err(e) => {
                        self.failed_exports.fetch_add(1, Ordering::SeqCst);
                        tracing::warn!(
                            episode = %self.episode,
                            export = %def.name,
                            rank,
                            error = %e,
                            "export step failed, skipping the rest of its branch"
                        );
                        return Ok(());
                    }
                }
            }
            Ok(())
        })
    }
}

#[async_trait]
impl Task for RetrieveTask {
    type Output = ();

    fn kind(&self) -> TaskKind {
        TaskKind::Retrieve
    }

    fn describe(&self) -> String {
        match self.resume_from {
            Some(step) => format!("retrieve {} from export #{}", self.episode, step),
            None => format!("retrieve {}", self.episode),
        }
    }

    fn adding(&self) {
        self.ctx.events.publish(Event::ToDownload {
            episode: self.episode.clone(),
        });
    }

    async fn do_call(&self, cancel: &CancellationToken) -> Result<()> {
        let output = match self.resume_from {
            None => {
                self.check(cancel).await?;
                self.download(cancel).await?
            }
            Some(step) => {
                tracing::info!(episode = %self.episode, step, "resuming export chain");
                let output = DownloadTask::output_path(&self.episode, &self.ctx.config);
                if tokio::fs::try_exists(&output).await? {
                    output
                } else {
                    // the downloader may have changed the extension in the interrupted run
                    let found = find_file_without_extension(&output).await?;
                    found.unwrap_or(output)
                }
            }
        };

        let tokens = TokenReplacer::for_episode(&self.episode)
            .with_cut_size(&self.episode, self.ctx.config.download.file_name_cut_size)
            .with_download_output(output.to_string_lossy());
        self.run_exports(&self.ctx.config.export.exporters, 0, &tokens, cancel)
            .await
    }

    fn ended(&self, _output: &()) {
        let failed_steps = self.failed_exports.load(Ordering::SeqCst);
        if failed_steps == 0 {
            tracing::info!(episode = %self.episode, "episode ready");
            self.ctx.events.publish(Event::Ready {
                episode: self.episode.clone(),
            });
        } else {
            tracing::warn!(episode = %self.episode, failed_steps, "episode retrieved with failed exports");
            self.ctx.events.publish(Event::ExportIncomplete {
                episode: self.episode.clone(),
                failed_steps,
            });
        }
    }

    fn failed(&self, error: &Error) {
        self.ctx.events.publish(Event::RetrieveFailed {
            episode: self.episode.clone(),
            error: error.to_string(),
        });
    }

    fn canceled(&self) {
        self.ctx.events.publish(Event::Stopped {
            episode: self.episode.clone(),
        });
    }
}
