//! The episode orchestrator, split into focused submodules.
//!
//! - [`admission`] - Deduplicated task admission, retry counting, resume records
//! - [`search`] - Search rounds and category discovery
//! - [`resume`] - Resuming export chains interrupted by a previous run
//! - [`control`] - Operator controls (restart, cancel, downloaded index)
//! - [`lifecycle`] - Shutdown coordination

mod admission;
mod control;
mod lifecycle;
mod resume;
mod search;

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

use crate::config::Config;
use crate::db::{Database, DownloadedIndex, ErrorLog, ExportStateStore};
use crate::error::Result;
use crate::events::EventBus;
use crate::pipeline::PipelineContext;
use crate::plugin::PluginRegistry;
use crate::types::Event;
use admission::{Admitter, SharedAdmissionState, StagePools};
use std::sync::Arc;

/// Persistence collaborators of the orchestrator
#[derive(Clone)]
pub struct Stores {
    /// Resume records of in-flight export steps
    pub export_state: Arc<dyn ExportStateStore>,
    /// Downloaded-episode index
    pub downloaded: Arc<dyn DownloadedIndex>,
    /// Permanent failure log
    pub errors: Arc<dyn ErrorLog>,
}

impl Stores {
    /// All three stores backed by one database
    pub fn from_database(db: Arc<Database>) -> Self {
        Self {
            export_state: db.clone(),
            downloaded: db.clone(),
            errors: db,
        }
    }
}

/// Drives searches, retrievals, downloads and exports (cloneable - all fields are Arc-wrapped)
///
/// Every episode found by a search goes through one retrieve task at a time;
/// the orchestrator keeps the registry of running retrievals, counts their
/// failures and persists which export step each episode is in, so an
/// interrupted export chain can be resumed by the next run.
#[derive(Clone)]
pub struct EpisodeOrchestrator {
    pub(crate) config: Arc<Config>,
    pub(crate) plugins: Arc<PluginRegistry>,
    pub(crate) events: EventBus,
    pub(crate) stores: Stores,
    pub(crate) pools: StagePools,
    pub(crate) state: SharedAdmissionState,
    pub(crate) ctx: PipelineContext,
}

impl EpisodeOrchestrator {
    /// Create an orchestrator persisting to the configured SQLite database
    ///
    /// Validates the configuration, opens (or creates) the database and runs
    /// its migrations.
    pub async fn new(config: Config, plugins: PluginRegistry) -> Result<Self> {
        config.validate()?;
        let db = Database::new(&config.persistence.database_path).await?;
        Self::with_stores(config, plugins, Stores::from_database(Arc::new(db)))
    }

    /// Create an orchestrator over an already opened database
    pub fn with_database(config: Config, plugins: PluginRegistry, db: Arc<Database>) -> Result<Self> {
        Self::with_stores(config, plugins, Stores::from_database(db))
    }

    /// Create an orchestrator over arbitrary stores
    pub fn with_stores(config: Config, plugins: PluginRegistry, stores: Stores) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);
        let plugins = Arc::new(plugins);
        let events = EventBus::new(config.event_buffer);
        let pools = StagePools::new(&config, &events);
        let state = SharedAdmissionState::default();

        let admitter = Arc::new(Admitter {
            config: config.clone(),
            events: events.clone(),
            export_store: stores.export_state.clone(),
            error_log: stores.errors.clone(),
            pools: pools.clone(),
            state: state.clone(),
        });

        let ctx = PipelineContext {
            config: config.clone(),
            plugins: plugins.clone(),
            events: events.clone(),
            downloaded: stores.downloaded.clone(),
            admission: admitter,
        };

        tracing::info!(
            providers = plugins.provider_count(),
            max_attempts = ?config.max_attempts,
            "episode orchestrator created"
        );

        Ok(Self {
            config,
            plugins,
            events,
            stores,
            pools,
            state,
            ctx,
        })
    }

    /// Subscribe to pipeline events
    ///
    /// Each subscriber receives every event published after it subscribed.
    /// A subscriber lagging behind by more than the configured buffer gets a
    /// `RecvError::Lagged` error.
    ///
    /// ```no_run
    /// use episode_grab::{Config, EpisodeOrchestrator, plugin::PluginRegistry};
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let config = Config::default();
    ///     let plugins = PluginRegistry::new(&config);
    ///     let orchestrator = EpisodeOrchestrator::new(config, plugins).await?;
    ///
    ///     let mut events = orchestrator.subscribe();
    ///     tokio::spawn(async move {
    ///         while let Ok(event) = events.recv().await {
    ///             tracing::info!(?event, "pipeline event");
    ///         }
    ///     });
    ///     Ok(())
    /// }
    /// ```
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    /// The event bus, for stream-style consumers
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Get the current configuration
    pub fn config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// Get the plugin registry
    pub fn plugins(&self) -> Arc<PluginRegistry> {
        Arc::clone(&self.plugins)
    }
}

impl std::fmt::Debug for EpisodeOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EpisodeOrchestrator")
            .field("plugins", &self.plugins)
            .finish_non_exhaustive()
    }
}
