//! Plugin contracts and their registry
//!
//! Providers discover categories and episodes, downloaders fetch them and
//! exporters run post-download commands. The pipeline only ever talks to these
//! traits; [`cmd`] holds the generic external-command implementations.

pub mod cmd;
mod registry;
mod traits;

pub use cmd::{CMD_EXPORTER, CommandDownloader, CommandExporter, CommandProcess};
pub use registry::PluginRegistry;
pub use traits::{
    DOWNLOADER_PARAMETER, DownloadParams, DownloaderPlugin, ExporterPlugin, ProcessHandle,
    ProviderPlugin,
};

use crate::error::{Error, Result};
use tokio_util::sync::CancellationToken;

/// Run a process handle until it finishes or `cancel` fires
///
/// On cancellation the handle is stopped and awaited so it can clean up, and
/// the outcome is reported as [`Error::Canceled`] whatever the handle returned.
pub async fn run_process(process: &dyn ProcessHandle, cancel: &CancellationToken) -> Result<()> {
    let start = process.start();
    tokio::pin!(start);

    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            process.stop();
            if let Err(e) = start.await {
                tracing::debug!(error = %e, "process ended after stop");
            }
            Err(Error::Canceled)
        }
        result = &mut start => result,
    }
}
