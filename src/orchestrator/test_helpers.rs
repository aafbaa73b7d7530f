//! Fake plugins and a database-backed orchestrator for tests.

use crate::config::Config;
use crate::db::Database;
use crate::error::{Error, PluginError, Result};
use crate::orchestrator::EpisodeOrchestrator;
use crate::plugin::{DownloadParams, DownloaderPlugin, ExporterPlugin, PluginRegistry, ProcessHandle, ProviderPlugin};
use crate::types::{CategoryNode, Episode, Event};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::{Semaphore, broadcast};
use tokio_util::sync::CancellationToken;

pub(crate) const CHANNEL: &str = "arte";
pub(crate) const EXPORTER: &str = "fake-export";

/// Selected downloadable category "ShowX" of the fake channel
pub(crate) fn show() -> CategoryNode {
    let mut node = CategoryNode::new(CHANNEL, "42", "ShowX").downloadable().selected();
    node.extension = "mp4".into();
    node
}

pub(crate) fn episode(name: &str) -> Episode {
    Episode::new(show().category_ref(), name, format!("http://arte/{name}"))
}

/// Blocks until the gate hands out a permit, or until stopped
async fn pass_gate(gate: Option<&Arc<Semaphore>>, stop: &CancellationToken, what: &str) -> Result<()> {
    let Some(gate) = gate else {
        return Ok(());
    };
    tokio::select! {
        _ = stop.cancelled() => Err(PluginError::ExecutorStopped { cmd: what.to_string() }.into()),
        permit = gate.acquire() => {
            permit.map_err(|e| Error::Other(e.to_string()))?.forget();
            Ok(())
        }
    }
}

/// Provider offering a fixed list of episodes in [`show`]
#[derive(Default)]
pub(crate) struct FakeProvider {
    pub(crate) episodes: Mutex<Vec<Episode>>,
    /// Every check waits for a permit when set
    pub(crate) check_gate: Option<Arc<Semaphore>>,
    pub(crate) fail_checks: AtomicBool,
    pub(crate) fail_categories: AtomicBool,
    pub(crate) checks: AtomicUsize,
}

impl FakeProvider {
    pub(crate) fn offering(names: &[&str]) -> Self {
        Self {
            episodes: Mutex::new(names.iter().map(|name| episode(name)).collect()),
            ..Self::default()
        }
    }

    pub(crate) fn gated(mut self, gate: Arc<Semaphore>) -> Self {
        self.check_gate = Some(gate);
        self
    }
}

#[async_trait]
impl ProviderPlugin for FakeProvider {
    fn name(&self) -> &str {
        CHANNEL
    }

    async fn find_category(&self) -> Result<Vec<CategoryNode>> {
        if self.fail_categories.load(Ordering::SeqCst) {
            return Err(PluginError::Failed {
                plugin: CHANNEL.into(),
                message: "site unreachable".into(),
            }
            .into());
        }
        Ok(vec![CategoryNode::new(CHANNEL, "root", "Arte").with_child(show())])
    }

    async fn find_episode(&self, _category: &CategoryNode) -> Result<Vec<Episode>> {
        Ok(self.episodes.lock().unwrap().clone())
    }

    async fn check_episode(&self, episode: &Episode) -> Result<()> {
        self.checks.fetch_add(1, Ordering::SeqCst);
        pass_gate(self.check_gate.as_ref(), &CancellationToken::new(), "check").await?;
        if self.fail_checks.load(Ordering::SeqCst) {
            return Err(PluginError::InvalidEpisode {
                episode: episode.to_string(),
                reason: "gone".into(),
            }
            .into());
        }
        Ok(())
    }
}

/// Process writing a file, or failing, once past its gate
struct FakeProcess {
    what: String,
    write_to: Option<PathBuf>,
    fail: bool,
    gate: Option<Arc<Semaphore>>,
    stop: CancellationToken,
}

#[async_trait]
impl ProcessHandle for FakeProcess {
    async fn start(&self) -> Result<()> {
        pass_gate(self.gate.as_ref(), &self.stop, &self.what).await?;
        if self.fail {
            return Err(PluginError::ExecutorFailed {
                cmd: self.what.clone(),
                output: "exit status 1".into(),
            }
            .into());
        }
        if let Some(path) = &self.write_to {
            tokio::fs::write(path, b"video").await?;
        }
        Ok(())
    }

    fn stop(&self) {
        self.stop.cancel();
    }
}

/// Downloader accepting everything and writing a small file, unless silent
#[derive(Default)]
pub(crate) struct FakeDownloader {
    pub(crate) gate: Option<Arc<Semaphore>>,
    pub(crate) silent: bool,
    pub(crate) downloads: AtomicUsize,
}

impl DownloaderPlugin for FakeDownloader {
    fn name(&self) -> &str {
        "fake"
    }

    fn accepts(&self, _params: &DownloadParams) -> bool {
        true
    }

    fn download(&self, params: &DownloadParams) -> Result<Box<dyn ProcessHandle>> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeProcess {
            what: params.url.clone(),
            write_to: (!self.silent).then(|| params.output.clone()),
            fail: false,
            gate: self.gate.clone(),
            stop: CancellationToken::new(),
        }))
    }
}

/// Exporter recording its commands; commands containing "fail" fail
#[derive(Default)]
pub(crate) struct FakeExporter {
    pub(crate) gate: Option<Arc<Semaphore>>,
    pub(crate) cmds: Mutex<Vec<String>>,
}

impl FakeExporter {
    pub(crate) fn cmds(&self) -> Vec<String> {
        self.cmds.lock().unwrap().clone()
    }
}

impl ExporterPlugin for FakeExporter {
    fn name(&self) -> &str {
        EXPORTER
    }

    fn export(&self, _processor: &str, cmd: &str) -> Result<Box<dyn ProcessHandle>> {
        self.cmds.lock().unwrap().push(cmd.to_string());
        Ok(Box::new(FakeProcess {
            what: cmd.to_string(),
            write_to: None,
            fail: cmd.contains("fail"),
            gate: self.gate.clone(),
            stop: CancellationToken::new(),
        }))
    }
}

/// Plugins shared by a test and its orchestrator
pub(crate) struct Fakes {
    pub(crate) provider: Arc<FakeProvider>,
    pub(crate) downloader: Arc<FakeDownloader>,
    pub(crate) exporter: Arc<FakeExporter>,
}

impl Fakes {
    pub(crate) fn new(provider: FakeProvider) -> Self {
        Self {
            provider: Arc::new(provider),
            downloader: Arc::new(FakeDownloader::default()),
            exporter: Arc::new(FakeExporter::default()),
        }
    }
}

/// Configuration writing into `dir`, with the fake exporter as default
pub(crate) fn test_config(dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.persistence.database_path = dir.path().join("test.db");
    config.download.output_template = dir
        .path()
        .join("downloads/#CATEGORY#/#FILE_NAME#.#EXTENSION#")
        .to_string_lossy()
        .into_owned();
    config.download.index_on_first_search = false;
    config.export.default_exporter = Some(EXPORTER.into());
    config
}

/// Orchestrator over a fresh database in a temp dir (which must be kept alive)
pub(crate) async fn create_test_orchestrator(
    config: Config,
    fakes: &Fakes,
) -> (EpisodeOrchestrator, Arc<Database>) {
    let db = Arc::new(Database::new(&config.persistence.database_path).await.unwrap());
    let plugins = PluginRegistry::new(&config)
        .with_provider(fakes.provider.clone())
        .with_downloader(fakes.downloader.clone())
        .with_exporter(fakes.exporter.clone());
    let orchestrator = EpisodeOrchestrator::with_database(config, plugins, db.clone()).unwrap();
    (orchestrator, db)
}

/// Retrieve an episode through `restart` and wait for the outcome
pub(crate) async fn retrieve(
    orchestrator: &EpisodeOrchestrator,
    episode: &Episode,
    export_only: bool,
) -> Result<()> {
    orchestrator
        .restart(episode.clone(), export_only)
        .await?
        .into_handle()
        .expect("episode already being retrieved")
        .wait_end_of_treatment()
        .await
}

/// Receive events until one matches, failing after five seconds
pub(crate) async fn wait_for_event(
    rx: &mut broadcast::Receiver<Event>,
    matches: impl Fn(&Event) -> bool,
) -> Event {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = rx.recv().await.unwrap();
            if matches(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

/// Every event already received, without waiting
pub(crate) fn drain_events(rx: &mut broadcast::Receiver<Event>) -> Vec<Event> {
    std::iter::from_fn(|| rx.try_recv().ok()).collect()
}

/// Poll `condition` until it holds, failing after five seconds
pub(crate) async fn eventually(condition: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition never held");
}
