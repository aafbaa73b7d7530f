//! External command execution for exporters and command-line downloaders

use crate::config::CMD_TOKEN;
use crate::error::{Error, PluginError, Result};
use crate::plugin::traits::{DownloadParams, DownloaderPlugin, ExporterPlugin, ProcessHandle};
use crate::token::TokenReplacer;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::LinesStream;
use tokio_util::sync::CancellationToken;

/// Output lines kept for the failure report
const OUTPUT_TAIL_LINES: usize = 50;

/// Name of the built-in command exporter
pub const CMD_EXPORTER: &str = "cmd";

/// One external command, run through a command processor
///
/// The processor template (for instance `sh -c #CMD#`) is split on whitespace
/// and the argument holding `#CMD#` receives the whole command, so the command
/// keeps its quoting.
#[derive(Debug)]
pub struct CommandProcess {
    program: PathBuf,
    args: Vec<String>,
    cmd: String,
    hung_timeout: Option<Duration>,
    stop: CancellationToken,
}

impl CommandProcess {
    /// Build the process for `cmd` wrapped by `processor`
    ///
    /// The processor program is resolved from PATH.
    pub fn from_processor(processor: &str, cmd: &str, hung_timeout: Option<Duration>) -> Result<Self> {
        let mut parts = processor.split_whitespace();
        let program = parts.next().ok_or_else(|| Error::Config {
            message: "empty command processor".into(),
            key: Some("export.cmd_processor".into()),
        })?;
        let args = parts.map(|arg| arg.replace(CMD_TOKEN, cmd)).collect();

        let program = which::which(program).map_err(|e| {
            Error::Plugin(PluginError::Failed {
                plugin: CMD_EXPORTER.into(),
                message: format!("command processor '{program}' not found: {e}"),
            })
        })?;

        Ok(Self {
            program,
            args,
            cmd: cmd.to_string(),
            hung_timeout,
            stop: CancellationToken::new(),
        })
    }

    /// The wrapped command line
    pub fn cmd(&self) -> &str {
        &self.cmd
    }

    fn stopped(&self) -> Error {
        Error::Plugin(PluginError::ExecutorStopped {
            cmd: self.cmd.clone(),
        })
    }
}

async fn idle(timeout: Option<Duration>) {
    match timeout {
        Some(d) => tokio::time::sleep(d).await,
        None => std::future::pending().await,
    }
}

#[async_trait]
impl ProcessHandle for CommandProcess {
    async fn start(&self) -> Result<()> {
        if self.stop.is_cancelled() {
            return Err(self.stopped());
        }

        tracing::debug!(cmd = %self.cmd, program = %self.program.display(), "starting external command");

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let mut lines = match (child.stdout.take(), child.stderr.take()) {
            (Some(out), Some(err)) => LinesStream::new(BufReader::new(out).lines())
                .merge(LinesStream::new(BufReader::new(err).lines())),
            _ => {
                return Err(Error::Other(format!("no output pipes for {}", self.cmd)));
            }
        };

        let mut tail: VecDeque<String> = VecDeque::with_capacity(OUTPUT_TAIL_LINES);
        loop {
            tokio::select! {
                biased;
                _ = self.stop.cancelled() => {
                    child.kill().await.ok();
                    tracing::info!(cmd = %self.cmd, "external command stopped");
                    return Err(self.stopped());
                }
                line = lines.next() => match line {
                    Some(Ok(line)) => {
                        tracing::trace!(cmd = %self.cmd, line = %line, "command output");
                        if tail.len() == OUTPUT_TAIL_LINES {
                            tail.pop_front();
                        }
                        tail.push_back(line);
                    }
                    Some(Err(e)) => {
                        tracing::debug!(cmd = %self.cmd, error = %e, "unreadable command output");
                    }
                    None => break,
                },
                _ = idle(self.hung_timeout) => {
                    child.kill().await.ok();
                    let idle_secs = self.hung_timeout.map(|d| d.as_secs()).unwrap_or_default();
                    tracing::warn!(cmd = %self.cmd, idle_secs, "external command hung, killed");
                    return Err(Error::Plugin(PluginError::HungProcess {
                        cmd: self.cmd.clone(),
                        idle_secs,
                    }));
                }
            }
        }

        let status = tokio::select! {
            biased;
            _ = self.stop.cancelled() => {
                child.kill().await.ok();
                return Err(self.stopped());
            }
            status = child.wait() => status?,
        };

        if status.success() {
            Ok(())
        } else {
            tracing::warn!(cmd = %self.cmd, status = %status, "external command failed");
            Err(Error::Plugin(PluginError::ExecutorFailed {
                cmd: self.cmd.clone(),
                output: Vec::from(tail).join("\n"),
            }))
        }
    }

    fn stop(&self) {
        self.stop.cancel();
    }
}

/// Exporter running its command through the configured command processor
#[derive(Clone, Debug)]
pub struct CommandExporter {
    name: String,
    hung_timeout: Option<Duration>,
}

impl CommandExporter {
    /// Create a command exporter
    pub fn new(name: impl Into<String>, hung_timeout: Option<Duration>) -> Self {
        Self {
            name: name.into(),
            hung_timeout,
        }
    }
}

impl ExporterPlugin for CommandExporter {
    fn name(&self) -> &str {
        &self.name
    }

    fn export(&self, processor: &str, cmd: &str) -> Result<Box<dyn ProcessHandle>> {
        Ok(Box::new(CommandProcess::from_processor(
            processor,
            cmd,
            self.hung_timeout,
        )?))
    }
}

/// Downloader running a command-line tool
///
/// The command template sees the episode tokens plus `#DOWNLOAD_OUTPUT#`, the
/// partial file to write. `#EPISODE_ID#` is the source to fetch.
#[derive(Clone, Debug)]
pub struct CommandDownloader {
    name: String,
    template: String,
    processor: String,
    hung_timeout: Option<Duration>,
}

impl CommandDownloader {
    /// Create a command-line downloader
    pub fn new(
        name: impl Into<String>,
        template: impl Into<String>,
        processor: impl Into<String>,
        hung_timeout: Option<Duration>,
    ) -> Self {
        Self {
            name: name.into(),
            template: template.into(),
            processor: processor.into(),
            hung_timeout,
        }
    }
}

impl DownloaderPlugin for CommandDownloader {
    fn name(&self) -> &str {
        &self.name
    }

    fn download(&self, params: &DownloadParams) -> Result<Box<dyn ProcessHandle>> {
        let cmd = TokenReplacer::for_episode(&params.episode)
            .with_download_output(params.output.to_string_lossy())
            .replace(&self.template);
        Ok(Box::new(CommandProcess::from_processor(
            &self.processor,
            &cmd,
            self.hung_timeout,
        )?))
    }
}
