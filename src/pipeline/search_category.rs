use crate::error::{Error, Result};
use crate::events::EventBus;
use crate::plugin::ProviderPlugin;
use crate::task::Task;
use crate::types::{CategoryNode, Event, TaskKind};
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Category tree discovered for one channel
#[derive(Clone, Debug)]
pub struct SearchCategoryResult {
    /// Provider name
    pub channel: String,
    /// Top-level categories found (empty when discovery failed)
    pub categories: Vec<CategoryNode>,
    /// Whether discovery succeeded
    pub success: bool,
}

/// Discovers a provider's category tree
///
/// A failing provider produces an unsuccessful result rather than a task
/// failure, so one broken channel never hides the others' trees.
pub struct SearchCategoryTask {
    provider: Arc<dyn ProviderPlugin>,
    events: EventBus,
}

impl SearchCategoryTask {
    /// Create a category discovery task
    pub fn new(provider: Arc<dyn ProviderPlugin>, events: EventBus) -> Self {
        Self { provider, events }
    }

    fn channel(&self) -> String {
        self.provider.name().to_string()
    }
}

#[async_trait]
impl Task for SearchCategoryTask {
    type Output = SearchCategoryResult;

    fn kind(&self) -> TaskKind {
        TaskKind::Category
    }

    fn describe(&self) -> String {
        format!("categories of {}", self.provider.name())
    }

    fn adding(&self) {
        self.events.publish(Event::CategoriesToBuild {
            channel: self.channel(),
        });
    }

    fn started(&self) {
        self.events.publish(Event::BuildingCategories {
            channel: self.channel(),
        });
    }

    async fn do_call(&self, cancel: &CancellationToken) -> Result<SearchCategoryResult> {
        let found = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Canceled),
            found = self.provider.find_category() => found,
        };

        match found {
            Ok(categories) => Ok(SearchCategoryResult {
                channel: self.channel(),
                categories,
                success: true,
            }),
            Err(e) => {
                tracing::warn!(channel = %self.provider.name(), error = %e, "category discovery failed");
                self.events.publish(Event::CategoriesFailed {
                    channel: self.channel(),
                    error: e.to_string(),
                });
                Ok(SearchCategoryResult {
                    channel: self.channel(),
                    categories: Vec::new(),
                    success: false,
                })
            }
        }
    }

    fn ended(&self, output: &SearchCategoryResult) {
        if output.success {
            self.events.publish(Event::CategoriesBuilt {
                channel: output.channel.clone(),
                count: output.categories.len(),
            });
        }
    }
}
