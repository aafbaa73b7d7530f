//! Lookup of providers, downloaders and exporters by name

use crate::config::Config;
use crate::error::{PluginError, Result};
use crate::plugin::cmd::{CMD_EXPORTER, CommandExporter};
use crate::plugin::traits::{DownloadParams, DownloaderPlugin, ExporterPlugin, ProviderPlugin};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Registered plugins
///
/// Providers are kept in name order so searches visit channels deterministically.
/// A command exporter named `cmd` is always available and is the default
/// exporter unless the configuration names another.
#[derive(Clone)]
pub struct PluginRegistry {
    providers: BTreeMap<String, Arc<dyn ProviderPlugin>>,
    downloaders: Vec<Arc<dyn DownloaderPlugin>>,
    exporters: HashMap<String, Arc<dyn ExporterPlugin>>,
    default_downloader: Option<String>,
    default_exporter: String,
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("providers", &self.providers.keys().collect::<Vec<_>>())
            .field(
                "downloaders",
                &self.downloaders.iter().map(|d| d.name()).collect::<Vec<_>>(),
            )
            .field("exporters", &self.exporters.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl PluginRegistry {
    /// Empty registry with the defaults of `config`
    pub fn new(config: &Config) -> Self {
        let mut exporters: HashMap<String, Arc<dyn ExporterPlugin>> = HashMap::new();
        exporters.insert(
            CMD_EXPORTER.into(),
            Arc::new(CommandExporter::new(CMD_EXPORTER, config.export.hung_timeout)),
        );
        Self {
            providers: BTreeMap::new(),
            downloaders: Vec::new(),
            exporters,
            default_downloader: config.download.default_downloader.clone(),
            default_exporter: config
                .export
                .default_exporter
                .clone()
                .unwrap_or_else(|| CMD_EXPORTER.into()),
        }
    }

    /// Register a provider (replaces one with the same name)
    pub fn with_provider(mut self, provider: Arc<dyn ProviderPlugin>) -> Self {
        self.providers.insert(provider.name().to_string(), provider);
        self
    }

    /// Register a downloader
    pub fn with_downloader(mut self, downloader: Arc<dyn DownloaderPlugin>) -> Self {
        self.downloaders.retain(|d| d.name() != downloader.name());
        self.downloaders.push(downloader);
        self
    }

    /// Register an exporter (replaces one with the same name)
    pub fn with_exporter(mut self, exporter: Arc<dyn ExporterPlugin>) -> Self {
        self.exporters.insert(exporter.name().to_string(), exporter);
        self
    }

    /// Provider registered under `name`
    pub fn provider(&self, name: &str) -> Result<Arc<dyn ProviderPlugin>> {
        self.providers
            .get(name)
            .cloned()
            .ok_or_else(|| PluginError::ProviderNotFound(name.to_string()).into())
    }

    /// All providers, in name order
    pub fn providers(&self) -> impl Iterator<Item = &Arc<dyn ProviderPlugin>> {
        self.providers.values()
    }

    /// Number of providers
    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }

    fn downloader_named(&self, name: &str) -> Option<Arc<dyn DownloaderPlugin>> {
        self.downloaders.iter().find(|d| d.name() == name).cloned()
    }

    /// Pick the downloader for a download
    ///
    /// Order: the category's `downloader` parameter, the provider acting as its
    /// own downloader, the first downloader accepting the parameters, the
    /// configured default.
    pub fn select_downloader(&self, params: &DownloadParams) -> Result<Arc<dyn DownloaderPlugin>> {
        if let Some(name) = params.requested_downloader() {
            return self
                .downloader_named(name)
                .ok_or_else(|| PluginError::NoDownloader(name.to_string()).into());
        }

        if let Some(provider) = self.providers.get(&params.episode.category.channel)
            && let Some(own) = provider.downloader()
        {
            return Ok(own);
        }

        if let Some(accepting) = self.downloaders.iter().find(|d| d.accepts(params)) {
            return Ok(accepting.clone());
        }

        self.default_downloader
            .as_deref()
            .and_then(|name| self.downloader_named(name))
            .ok_or_else(|| PluginError::NoDownloader(params.episode.to_string()).into())
    }

    /// Exporter registered under `name`, or the default exporter
    pub fn exporter(&self, name: Option<&str>) -> Result<Arc<dyn ExporterPlugin>> {
        let name = name.unwrap_or(&self.default_exporter);
        self.exporters
            .get(name)
            .cloned()
            .ok_or_else(|| PluginError::NoExporter(name.to_string()).into())
    }
}
