use super::PipelineContext;
use crate::config::Config;
use crate::error::{Error, Result, TaskError};
use crate::plugin::{DownloadParams, run_process};
use crate::task::Task;
use crate::token::TokenReplacer;
use crate::types::{Episode, Event, TaskKind};
use crate::utils::{find_file_without_extension, partial_path, remove_if_exists};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

/// Downloads one episode into its final output path
///
/// The downloader writes to `<output>.tmp`, which is renamed into place once
/// the download succeeded, so a leftover partial file always means an
/// interrupted attempt. Both the partial file and any previous output are
/// deleted before the next attempt.
pub struct DownloadTask {
    episode: Episode,
    ctx: PipelineContext,
    manual: bool,
}

impl DownloadTask {
    /// Create a download task
    pub fn new(episode: Episode, ctx: PipelineContext, manual: bool) -> Self {
        Self {
            episode,
            ctx,
            manual,
        }
    }

    /// The episode to download
    pub fn episode(&self) -> &Episode {
        &self.episode
    }

    /// Final output path of an episode's download
    pub fn output_path(episode: &Episode, config: &Config) -> PathBuf {
        let tokens = TokenReplacer::for_episode(episode)
            .with_cut_size(episode, config.download.file_name_cut_size);
        PathBuf::from(tokens.replace(&config.download.output_template))
    }

    /// Locate what the downloader actually produced and where it should end up
    async fn locate_output(partial: &Path, output: &Path) -> Result<(PathBuf, PathBuf)> {
        if tokio::fs::try_exists(partial).await? {
            return Ok((partial.to_path_buf(), output.to_path_buf()));
        }

        // Downloader appended its own extension to the partial file
        if let Some(found) = find_file_without_extension(partial).await? {
            let target = match found.extension() {
                Some(ext) => output.with_extension(ext),
                None => output.to_path_buf(),
            };
            tracing::debug!(found = %found.display(), target = %target.display(), "download output renamed by downloader");
            return Ok((found, target));
        }

        // Downloader wrote the final name itself, possibly with another extension
        if tokio::fs::try_exists(output).await? {
            return Ok((output.to_path_buf(), output.to_path_buf()));
        }
        if let Some(found) = find_file_without_extension(output).await? {
            return Ok((found.clone(), found));
        }

        Err(Error::Task(TaskError::OutputMissing {
            path: partial.to_path_buf(),
        }))
    }
}

#[async_trait]
impl Task for DownloadTask {
    type Output = PathBuf;

    fn kind(&self) -> TaskKind {
        TaskKind::Download
    }

    fn describe(&self) -> String {
        format!("download {}", self.episode)
    }

    fn started(&self) {
        self.ctx.events.publish(Event::DownloadStarting {
            episode: self.episode.clone(),
        });
    }

    async fn do_call(&self, cancel: &CancellationToken) -> Result<PathBuf> {
        let output = Self::output_path(&self.episode, &self.ctx.config);
        let partial = partial_path(&output);

        if let Some(parent) = output.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        if remove_if_exists(&partial).await? {
            tracing::debug!(path = %partial.display(), "removed stale partial download");
        }
        if remove_if_exists(&output).await? {
            tracing::debug!(path = %output.display(), "removed previous download output");
        }

        let params = DownloadParams {
            episode: self.episode.clone(),
            url: self.episode.id.clone(),
            output: partial.clone(),
            parameters: self.episode.category.parameters.clone(),
        };
        let downloader = self.ctx.plugins.select_downloader(&params)?;
        tracing::info!(
            episode = %self.episode,
            downloader = downloader.name(),
            output = %output.display(),
            "downloading episode"
        );

        let process = downloader.download(&params)?;
        run_process(process.as_ref(), cancel).await?;

        let (produced, target) = Self::locate_output(&partial, &output).await?;
        if produced != target {
            tokio::fs::rename(&produced, &target).await?;
        }

        self.ctx
            .downloaded
            .mark_downloaded(&self.episode, self.manual)
            .await?;

        Ok(target)
    }

    fn ended(&self, output: &PathBuf) {
        tracing::info!(episode = %self.episode, output = %output.display(), "episode downloaded");
        self.ctx.events.publish(Event::Downloaded {
            episode: self.episode.clone(),
        });
    }

    fn failed(&self, error: &Error) {
        if error.is_stopped() {
            self.ctx.events.publish(Event::Stopped {
                episode: self.episode.clone(),
            });
        } else {
            self.ctx.events.publish(Event::DownloadFailed {
                episode: self.episode.clone(),
                error: error.to_string(),
            });
        }
    }
}
