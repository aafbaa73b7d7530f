//! Admission of retrieve, download and export tasks
//!
//! All admission decisions for an episode go through one mutex-guarded
//! [`AdmissionState`], so at most one retrieve task per episode key is ever
//! registered and retry counters are updated atomically with the registry.

use crate::config::Config;
use crate::db::{ErrorLog, ExportStateStore};
use crate::error::{Error, Result};
use crate::events::EventBus;
use crate::pipeline::{DownloadTask, ExportTask, RetrieveTask, TaskAdmission};
use crate::task::{Admission, CategoryPools, PoolListener, TaskListener};
use crate::types::{Episode, EpisodeExportState, Event, TaskKind};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Running-task registry and retry counters
#[derive(Debug, Default)]
pub(crate) struct AdmissionState {
    /// Episodes with a retrieve task admitted and not yet finished
    pub(crate) running: HashSet<Episode>,
    /// Consecutive retrieve failures per episode
    pub(crate) attempts: HashMap<Episode, u32>,
}

pub(crate) type SharedAdmissionState = Arc<Mutex<AdmissionState>>;

pub(crate) fn lock_state(state: &Mutex<AdmissionState>) -> MutexGuard<'_, AdmissionState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The worker pools of every stage
#[derive(Clone)]
pub(crate) struct StagePools {
    pub(crate) search: CategoryPools<String>,
    pub(crate) category: CategoryPools<String>,
    pub(crate) retrieve: CategoryPools<Episode>,
    pub(crate) download: CategoryPools<Episode>,
    pub(crate) export: CategoryPools<Episode>,
}

impl StagePools {
    pub(crate) fn new(config: &Config, events: &EventBus) -> Self {
        let listener = |drained: Option<Event>| -> Arc<dyn PoolListener> {
            Arc::new(StageListener {
                events: events.clone(),
                drained,
            })
        };
        let sizes = config.pools.clone();
        Self {
            search: CategoryPools::new(TaskKind::Search, sizes.clone())
                .with_listener(listener(Some(Event::AllSearchDone))),
            category: CategoryPools::new(TaskKind::Category, sizes.clone())
                .with_listener(listener(None)),
            retrieve: CategoryPools::new(TaskKind::Retrieve, sizes.clone())
                .with_listener(listener(Some(Event::AllRetrieveDone))),
            download: CategoryPools::new(TaskKind::Download, sizes.clone())
                .with_listener(listener(None)),
            export: CategoryPools::new(TaskKind::Export, sizes).with_listener(listener(None)),
        }
    }

    /// Queued plus running tasks across every stage
    pub(crate) fn outstanding(&self) -> usize {
        self.search.total_outstanding()
            + self.category.total_outstanding()
            + self.retrieve.total_outstanding()
            + self.download.total_outstanding()
            + self.export.total_outstanding()
    }

    pub(crate) fn shutdown_now(&self) {
        self.search.shutdown_now();
        self.category.shutdown_now();
        self.retrieve.shutdown_now();
        self.download.shutdown_now();
        self.export.shutdown_now();
    }
}

/// Publishes the stage's "all done" event and worker crashes
struct StageListener {
    events: EventBus,
    drained: Option<Event>,
}

impl PoolListener for StageListener {
    fn on_drained(&self, _category: &str) {
        if let Some(event) = &self.drained {
            self.events.publish(event.clone());
        }
    }

    fn on_crash(&self, category: &str, error: &Error) {
        self.events.publish(Event::PoolFailure {
            category: category.to_string(),
            error: error.to_string(),
        });
    }
}

/// The orchestrator's side of [`TaskAdmission`]
pub(crate) struct Admitter {
    pub(crate) config: Arc<Config>,
    pub(crate) events: EventBus,
    pub(crate) export_store: Arc<dyn ExportStateStore>,
    pub(crate) error_log: Arc<dyn ErrorLog>,
    pub(crate) pools: StagePools,
    pub(crate) state: SharedAdmissionState,
}

#[async_trait]
impl TaskAdmission for Admitter {
    async fn admit_retrieve(&self, task: RetrieveTask) -> Result<Admission> {
        let episode = task.episode().clone();
        if !lock_state(&self.state).running.insert(episode.clone()) {
            tracing::debug!(episode = %episode, "retrieve already running");
            return Ok(Admission::AlreadyAdded);
        }

        let listener = Arc::new(RetrieveListener {
            episode: episode.clone(),
            state: self.state.clone(),
            max_attempts: self.config.max_attempts,
            error_log: self.error_log.clone(),
            events: self.events.clone(),
        });

        match self.pools.retrieve.submit(
            episode.clone(),
            Arc::new(task),
            TaskKind::Retrieve.as_str(),
            Some(listener),
        ) {
            Ok(handle) => {
                tracing::debug!(episode = %episode, "retrieve admitted");
                Ok(Admission::Added(handle))
            }
            Err(e) => {
                lock_state(&self.state).running.remove(&episode);
                Err(e)
            }
        }
    }

    async fn admit_download(&self, task: DownloadTask, channel: &str) -> Result<Admission<PathBuf>> {
        let episode = task.episode().clone();
        let handle = self
            .pools
            .download
            .submit(episode, Arc::new(task), channel, None)?;
        Ok(Admission::Added(handle))
    }

    async fn admit_export(&self, task: ExportTask, category: &str) -> Result<Admission> {
        let state = task.export_state();
        self.export_store.add(&state).await?;

        let listener = Arc::new(ExportListener {
            state: state.clone(),
            store: self.export_store.clone(),
        });
        let handle =
            self.pools
                .export
                .submit(state.episode, Arc::new(task), category, Some(listener))?;
        Ok(Admission::Added(handle))
    }
}

/// Keeps the registry and retry counter of one retrieve task current
struct RetrieveListener {
    episode: Episode,
    state: SharedAdmissionState,
    max_attempts: Option<u32>,
    error_log: Arc<dyn ErrorLog>,
    events: EventBus,
}

#[async_trait]
impl TaskListener for RetrieveListener {
    async fn on_task_ended(&self) {
        let mut state = lock_state(&self.state);
        state.running.remove(&self.episode);
        state.attempts.remove(&self.episode);
    }

    async fn on_task_failed(&self, error: &Error) {
        let gave_up = {
            let mut state = lock_state(&self.state);
            state.running.remove(&self.episode);
            let attempts = state.attempts.entry(self.episode.clone()).or_insert(0);
            *attempts += 1;
            let count = *attempts;
            if self.max_attempts.is_some_and(|max| count >= max) {
                state.attempts.remove(&self.episode);
                Some(count)
            } else {
                tracing::info!(episode = %self.episode, attempts = count, "retrieve failed, will retry on a later search");
                None
            }
        };

        if let Some(attempts) = gave_up {
            tracing::warn!(episode = %self.episode, attempts, error = %error, "too many failures, giving up on episode");
            if let Err(e) = self
                .error_log
                .record_failure(&self.episode, attempts, &error.to_string())
                .await
            {
                tracing::error!(episode = %self.episode, error = %e, "failed to record permanent failure");
            }
            self.events.publish(Event::TooManyFailures {
                episode: self.episode.clone(),
                attempts,
            });
        }
    }

    async fn on_task_canceled(&self) {
        lock_state(&self.state).running.remove(&self.episode);
    }
}

/// Removes an export step's resume record once the step succeeded
struct ExportListener {
    state: EpisodeExportState,
    store: Arc<dyn ExportStateStore>,
}

#[async_trait]
impl TaskListener for ExportListener {
    async fn on_task_ended(&self) {
        if let Err(e) = self.store.remove(&self.state).await {
            tracing::error!(
                episode = %self.state.episode,
                step = self.state.step,
                error = %e,
                "failed to remove export resume record"
            );
        }
    }

    async fn on_task_failed(&self, error: &Error) {
        tracing::debug!(
            episode = %self.state.episode,
            step = self.state.step,
            error = %error,
            "export step failed, resume record kept"
        );
    }
}
