//! Common test utilities for episode-grab end-to-end tests

use async_trait::async_trait;
use episode_grab::{CategoryNode, Episode, Event, ProviderPlugin, Result};
use std::time::Duration;
use tokio::sync::broadcast;

/// Provider serving one fixed category with fixed episodes
pub struct StaticProvider {
    pub category: CategoryNode,
    pub episodes: Vec<String>,
}

impl StaticProvider {
    pub fn new(category: CategoryNode, episodes: &[&str]) -> Self {
        Self {
            category,
            episodes: episodes.iter().map(|e| e.to_string()).collect(),
        }
    }
}

#[async_trait]
impl ProviderPlugin for StaticProvider {
    fn name(&self) -> &str {
        &self.category.channel
    }

    async fn find_category(&self) -> Result<Vec<CategoryNode>> {
        Ok(vec![self.category.clone()])
    }

    async fn find_episode(&self, category: &CategoryNode) -> Result<Vec<Episode>> {
        Ok(self
            .episodes
            .iter()
            .map(|name| {
                Episode::new(
                    category.category_ref(),
                    name.clone(),
                    format!("http://{}/{}", category.channel, name),
                )
            })
            .collect())
    }
}

/// Receive events until one matches, panicking after ten seconds
pub async fn wait_for_event(
    rx: &mut broadcast::Receiver<Event>,
    matches: impl Fn(&Event) -> bool,
) -> Event {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            match rx.recv().await {
                Ok(event) if matches(&event) => return event,
                Ok(_) => {}
                Err(e) => panic!("event channel failed: {e}"),
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for event"))
}
