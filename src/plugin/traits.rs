//! Contracts of the external collaborators driven by the pipeline

use crate::error::Result;
use crate::types::{CategoryNode, Episode};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Handle on an external piece of work (a download, an export command)
///
/// `start` runs the work to completion. `stop` may be called from any task
/// while `start` is pending and must make it return promptly, typically with
/// [`PluginError::ExecutorStopped`](crate::error::PluginError::ExecutorStopped).
#[async_trait]
pub trait ProcessHandle: Send + Sync {
    /// Run the work until it finishes
    async fn start(&self) -> Result<()>;

    /// Ask a running `start` to give up
    fn stop(&self);
}

/// Source of categories and episodes (a channel)
///
/// # Examples
///
/// ```
/// use async_trait::async_trait;
/// use episode_grab::{CategoryNode, Episode, ProviderPlugin, Result};
///
/// struct Static;
///
/// #[async_trait]
/// impl ProviderPlugin for Static {
///     fn name(&self) -> &str {
///         "static"
///     }
///
///     async fn find_category(&self) -> Result<Vec<CategoryNode>> {
///         Ok(vec![CategoryNode::new("static", "news", "News").downloadable()])
///     }
///
///     async fn find_episode(&self, category: &CategoryNode) -> Result<Vec<Episode>> {
///         Ok(vec![Episode::new(category.category_ref(), "Monday", "http://news/monday")])
///     }
/// }
/// ```
#[async_trait]
pub trait ProviderPlugin: Send + Sync {
    /// Channel name, unique among providers
    fn name(&self) -> &str;

    /// Discover the channel's category tree
    async fn find_category(&self) -> Result<Vec<CategoryNode>>;

    /// List the episodes currently offered in a downloadable category
    async fn find_episode(&self, category: &CategoryNode) -> Result<Vec<Episode>>;

    /// Fail with `InvalidEpisode` when the episode is stale or removed
    async fn check_episode(&self, _episode: &Episode) -> Result<()> {
        Ok(())
    }

    /// The provider's own downloader, if it downloads its episodes itself
    fn downloader(&self) -> Option<Arc<dyn DownloaderPlugin>> {
        None
    }
}

/// Everything a downloader needs to fetch one episode
#[derive(Clone, Debug)]
pub struct DownloadParams {
    /// Episode being downloaded
    pub episode: Episode,
    /// What to download (the episode's source id)
    pub url: String,
    /// Partial file to write; renamed into place once the download succeeds
    pub output: PathBuf,
    /// Category download parameters
    pub parameters: BTreeMap<String, String>,
}

impl DownloadParams {
    /// Name of the downloader explicitly requested by the category, if any
    pub fn requested_downloader(&self) -> Option<&str> {
        self.parameters.get(DOWNLOADER_PARAMETER).map(String::as_str)
    }
}

/// Category parameter naming the downloader to use
pub const DOWNLOADER_PARAMETER: &str = "downloader";

/// Download capability
pub trait DownloaderPlugin: Send + Sync {
    /// Downloader name
    fn name(&self) -> &str;

    /// Whether this downloader recognizes the source on its own
    fn accepts(&self, _params: &DownloadParams) -> bool {
        false
    }

    /// Prepare the download; the returned handle runs it
    fn download(&self, params: &DownloadParams) -> Result<Box<dyn ProcessHandle>>;
}

/// Export capability
pub trait ExporterPlugin: Send + Sync {
    /// Exporter name, also its export pool category
    fn name(&self) -> &str;

    /// Prepare `cmd` wrapped by the command `processor`; the returned handle runs it
    fn export(&self, processor: &str, cmd: &str) -> Result<Box<dyn ProcessHandle>>;
}
