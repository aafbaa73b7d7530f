//! # episode-grab
//!
//! Pipeline engine for grabbing episodes from online channels.
//!
//! Provider plugins list the categories and episodes of a channel. For every
//! episode found in a selected category and not downloaded yet, the
//! orchestrator runs a retrieve task: the provider checks the episode, a
//! downloader plugin fetches it, then a configurable chain of export commands
//! runs on the downloaded file.
//!
//! ## Design
//!
//! - **Bounded pools** - every stage runs on worker pools sized per category
//! - **One retrieval per episode** - duplicates found by overlapping searches are refused
//! - **Resumable exports** - the step in flight is persisted and picked up after a restart
//! - **Event-driven** - consumers subscribe to pipeline events, no polling required
//!
//! ## Quick Start
//!
//! ```no_run
//! use episode_grab::config::ExportDefinition;
//! use episode_grab::plugin::PluginRegistry;
//! use episode_grab::{CategoryNode, Config, EpisodeOrchestrator};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.export.exporters = vec![
//!         ExportDefinition::new("archive", "cp '#DOWNLOAD_OUTPUT#' /srv/archive/")
//!             .with_sub_export(ExportDefinition::new("notify", "echo '#EPISODE# archived'")),
//!     ];
//!
//!     // register provider and downloader plugins here
//!     let plugins = PluginRegistry::new(&config);
//!     let orchestrator = EpisodeOrchestrator::new(config, plugins).await?;
//!
//!     let mut events = orchestrator.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     orchestrator.resume_interrupted_exports(None).await?;
//!     let news = CategoryNode::new("example", "news", "News").downloadable().selected();
//!     orchestrator.start_search(vec![news])?;
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Database persistence layer
pub mod db;
/// Error types
pub mod error;
/// Event broadcasting
pub mod events;
/// Episode-name filters
pub mod filter;
/// Orchestration of the pipeline stages
pub mod orchestrator;
/// Pipeline stage tasks
pub mod pipeline;
/// Plugin contracts and registry
pub mod plugin;
/// Task lifecycle and worker pools
pub mod task;
/// Template token replacement
pub mod token;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use config::{Config, ExportDefinition};
pub use db::{Database, DownloadedIndex, ErrorLog, ExportStateStore, FailureRecord};
pub use error::{DatabaseError, Error, PluginError, Result, TaskError};
pub use events::EventBus;
pub use orchestrator::{EpisodeOrchestrator, Stores};
pub use plugin::{
    DownloadParams, DownloaderPlugin, ExporterPlugin, PluginRegistry, ProcessHandle,
    ProviderPlugin,
};
pub use task::{Admission, TaskHandle, TaskState};
pub use types::{CategoryNode, CategoryRef, Episode, EpisodeExportState, Event, TaskKind};

/// Helper function to run the orchestrator with graceful signal handling.
///
/// Waits for a termination signal and then calls the orchestrator's `shutdown()` method.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use episode_grab::{Config, EpisodeOrchestrator, PluginRegistry, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = Config::default();
///     let plugins = PluginRegistry::new(&config);
///     let orchestrator = EpisodeOrchestrator::new(config, plugins).await?;
///
///     // Run with automatic signal handling
///     run_with_shutdown(orchestrator).await?;
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(orchestrator: EpisodeOrchestrator) -> Result<()> {
    let signal = wait_for_signal().await;
    tracing::info!(signal, "stopping episode pipeline");
    orchestrator.shutdown().await
}

/// Wait for the first termination signal and name it
#[cfg(unix)]
async fn wait_for_signal() -> &'static str {
    use tokio::signal::unix::{SignalKind, signal};

    // registration can fail in restricted environments; listen to whatever registered
    let mut sigterm = signal(SignalKind::terminate())
        .inspect_err(|e| tracing::warn!(error = %e, "SIGTERM handler unavailable"))
        .ok();
    let mut sigint = signal(SignalKind::interrupt())
        .inspect_err(|e| tracing::warn!(error = %e, "SIGINT handler unavailable"))
        .ok();

    if sigterm.is_none() && sigint.is_none() {
        return wait_for_ctrl_c().await;
    }

    tokio::select! {
        Some(()) = async { sigterm.as_mut()?.recv().await } => "SIGTERM",
        Some(()) = async { sigint.as_mut()?.recv().await } => "SIGINT",
        else => "signal stream closed",
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> &'static str {
    wait_for_ctrl_c().await
}

async fn wait_for_ctrl_c() -> &'static str {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for Ctrl+C");
    }
    "Ctrl+C"
}
