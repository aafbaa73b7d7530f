use super::{PipelineContext, RetrieveTask};
use crate::error::{Error, Result};
use crate::filter::EpisodeFilter;
use crate::plugin::ProviderPlugin;
use crate::task::Task;
use crate::types::{CategoryNode, Event, TaskKind};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Looks for new episodes in a provider's selected categories
///
/// Every episode that passes the category filters and is not downloaded yet
/// is handed to the orchestrator as a retrieve task. A category failing to
/// list its episodes is reported and skipped; the other categories go on.
pub struct SearchTask {
    provider: Arc<dyn ProviderPlugin>,
    categories: Vec<CategoryNode>,
    ctx: PipelineContext,
}

impl SearchTask {
    /// Create a search task over already-pruned category trees
    pub fn new(
        provider: Arc<dyn ProviderPlugin>,
        categories: Vec<CategoryNode>,
        ctx: PipelineContext,
    ) -> Self {
        Self {
            provider,
            categories,
            ctx,
        }
    }

    /// Name of the searched provider
    pub fn plugin(&self) -> &str {
        self.provider.name()
    }

    async fn search_category(&self, node: &CategoryNode, cancel: &CancellationToken) -> Result<()> {
        let filter = EpisodeFilter::for_category(node)?;
        let category = node.category_ref();

        let episodes = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Canceled),
            found = self.provider.find_episode(node) => found?,
        };

        let downloaded = self.ctx.downloaded.list_downloaded(&category).await?;
        let first_search = !self.ctx.downloaded.is_index_created(&category).await?;
        let index_only = first_search && self.ctx.config.download.index_on_first_search;
        tracing::debug!(
            plugin = self.plugin(),
            category = %category.name,
            found = episodes.len(),
            index_only,
            "episodes found"
        );

        let mut seen = HashSet::new();
        for episode in episodes {
            if !seen.insert(episode.clone())
                || !filter.accepts(&episode.name)
                || downloaded.contains(&episode.name)
            {
                continue;
            }

            if index_only {
                self.ctx.downloaded.mark_downloaded(&episode, false).await?;
                self.ctx.events.publish(Event::Indexed { episode });
                continue;
            }

            let task = RetrieveTask::new(episode, self.ctx.clone());
            if let Err(e) = self.ctx.admission.admit_retrieve(task).await {
                tracing::warn!(plugin = self.plugin(), error = %e, "could not admit retrieve task");
            }
        }

        if first_search {
            self.ctx.downloaded.mark_index_created(&category).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Task for SearchTask {
    type Output = ();

    fn kind(&self) -> TaskKind {
        TaskKind::Search
    }

    fn describe(&self) -> String {
        format!("search {}", self.plugin())
    }

    fn started(&self) {
        self.ctx.events.publish(Event::Searching {
            plugin: self.plugin().to_string(),
        });
    }

    async fn do_call(&self, cancel: &CancellationToken) -> Result<()> {
        for root in &self.categories {
            for node in root.grabbable() {
                match self.search_category(node, cancel).await {
                    Ok(()) => {}
                    Err(e) if e.is_cancellation() => return Err(e),
                    Err(e) => {
                        tracing::warn!(
                            plugin = self.plugin(),
                            category = %node.name,
                            error = %e,
                            "category search failed"
                        );
                        self.ctx.events.publish(Event::SearchFailed {
                            plugin: self.plugin().to_string(),
                            error: format!("{}: {}", node.name, e),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    fn ended(&self, _output: &()) {
        self.ctx.events.publish(Event::SearchDone {
            plugin: self.plugin().to_string(),
        });
    }

    fn failed(&self, error: &Error) {
        self.ctx.events.publish(Event::SearchFailed {
            plugin: self.plugin().to_string(),
            error: error.to_string(),
        });
    }
}
