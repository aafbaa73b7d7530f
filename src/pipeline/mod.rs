//! The pipeline stage tasks
//!
//! Search tasks find episodes and hand them over as retrieve tasks; a retrieve
//! task checks its episode, then drives a download task and the export chain,
//! waiting on each. Follow-on work always goes back through [`TaskAdmission`],
//! so the orchestrator decides about deduplication, retries and resume state.

use crate::config::Config;
use crate::db::DownloadedIndex;
use crate::error::Result;
use crate::events::EventBus;
use crate::plugin::PluginRegistry;
use crate::task::Admission;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

mod download;
mod export;
mod retrieve;
mod search;
mod search_category;

pub use download::DownloadTask;
pub use export::ExportTask;
pub use retrieve::RetrieveTask;
pub use search::SearchTask;
pub use search_category::{SearchCategoryResult, SearchCategoryTask};

/// How stage tasks hand follow-on work to the orchestrator
#[async_trait]
pub trait TaskAdmission: Send + Sync {
    /// Submit a retrieve task unless one is already running for its episode
    async fn admit_retrieve(&self, task: RetrieveTask) -> Result<Admission>;

    /// Submit a download task to the pool of `channel`
    async fn admit_download(&self, task: DownloadTask, channel: &str) -> Result<Admission<PathBuf>>;

    /// Record the export step as in flight and submit it to the pool of `category`
    async fn admit_export(&self, task: ExportTask, category: &str) -> Result<Admission>;
}

/// Shared collaborators of every stage task
#[derive(Clone)]
pub struct PipelineContext {
    /// Configuration
    pub config: Arc<Config>,
    /// Plugins
    pub plugins: Arc<PluginRegistry>,
    /// Event publisher
    pub events: EventBus,
    /// Downloaded-episode index
    pub downloaded: Arc<dyn DownloadedIndex>,
    /// Where follow-on work goes
    pub admission: Arc<dyn TaskAdmission>,
}

impl std::fmt::Debug for PipelineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineContext")
            .field("plugins", &self.plugins)
            .finish_non_exhaustive()
    }
}
