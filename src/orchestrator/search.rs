//! Search rounds and category discovery.

use super::EpisodeOrchestrator;
use crate::error::Result;
use crate::pipeline::{SearchCategoryResult, SearchCategoryTask, SearchTask};
use crate::task::TaskHandle;
use crate::types::{CategoryNode, Episode, Event, TaskKind};
use std::collections::BTreeMap;
use std::sync::Arc;

impl EpisodeOrchestrator {
    /// Start a search round over the operator's category selection
    ///
    /// `categories` are category trees with their `selected` flags set; they
    /// are grouped by channel and pruned of unselected branches. One search
    /// task is submitted per provider with something selected, unless a search
    /// of that provider is still running.
    ///
    /// Publishes `SearchStarting` with the number of providers searched. When
    /// nothing is left to search, `AllSearchDone` follows immediately;
    /// otherwise it is published once the search pool drains.
    pub fn start_search(
        &self,
        categories: impl IntoIterator<Item = CategoryNode>,
    ) -> Result<Vec<TaskHandle<()>>> {
        let mut selection: BTreeMap<String, Vec<CategoryNode>> = BTreeMap::new();
        for root in categories {
            if let Some(pruned) = root.prune_unselected() {
                selection
                    .entry(pruned.channel.clone())
                    .or_default()
                    .push(pruned);
            }
        }

        let mut searches = Vec::new();
        for (channel, roots) in selection {
            let provider = match self.plugins.provider(&channel) {
                Ok(provider) => provider,
                Err(e) => {
                    tracing::warn!(channel = %channel, error = %e, "selected categories of an unknown provider");
                    continue;
                }
            };
            if self.pools.search.is_active(&channel) {
                tracing::debug!(channel = %channel, "search already running, skipping provider");
                continue;
            }
            searches.push((channel, SearchTask::new(provider, roots, self.ctx.clone())));
        }

        tracing::info!(plugin_count = searches.len(), "starting search");
        self.events.publish(Event::SearchStarting {
            plugin_count: searches.len(),
        });
        if searches.is_empty() {
            self.events.publish(Event::AllSearchDone);
            return Ok(Vec::new());
        }

        searches
            .into_iter()
            .map(|(channel, task)| {
                self.pools
                    .search
                    .submit(channel, Arc::new(task), TaskKind::Search.as_str(), None)
            })
            .collect()
    }

    /// Start category discovery on every provider
    pub fn discover_categories(&self) -> Result<Vec<TaskHandle<SearchCategoryResult>>> {
        self.plugins
            .providers()
            .map(|provider| {
                let channel = provider.name().to_string();
                let task = SearchCategoryTask::new(provider.clone(), self.events.clone());
                self.pools.category.submit(
                    channel,
                    Arc::new(task),
                    TaskKind::Category.as_str(),
                    None,
                )
            })
            .collect()
    }

    /// Discover every provider's category tree and wait for the results
    ///
    /// Providers whose discovery failed are included with `success == false`.
    pub async fn find_categories(&self) -> Result<Vec<SearchCategoryResult>> {
        let mut results = Vec::new();
        for handle in self.discover_categories()? {
            results.push(handle.wait_end_of_treatment().await?);
        }
        Ok(results)
    }

    /// List the episodes a provider currently offers in a category
    ///
    /// Unfiltered and regardless of the downloaded index.
    pub async fn find_episodes(&self, category: &CategoryNode) -> Result<Vec<Episode>> {
        let provider = self.plugins.provider(&category.channel)?;
        provider.find_episode(category).await
    }
}
