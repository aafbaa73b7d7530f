//! Error types for episode-grab
//!
//! This module provides error handling for the library, including:
//! - Domain-specific error types (Database, Plugin, Task)
//! - Context information (episode, command, task description)
//! - Cancellation detection so a canceled task is never counted as a failure

use crate::types::TaskKind;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for episode-grab operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for episode-grab
///
/// This is the primary error type used throughout the library. Each variant includes
/// contextual information to help diagnose issues.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "pools.download")
        key: Option<String>,
    },

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// SQLx database error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Provider, downloader or exporter plugin error
    #[error("plugin error: {0}")]
    Plugin(#[from] PluginError),

    /// Task execution error
    #[error("task error: {0}")]
    Task(#[from] TaskError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid regular expression in a filter or export guard
    #[error("invalid pattern: {0}")]
    Regex(#[from] regex::Error),

    /// Requested item not found
    #[error("not found: {0}")]
    NotFound(String),

    /// Shutdown in progress - not accepting new tasks
    #[error("shutdown in progress: not accepting new tasks")]
    ShuttingDown,

    /// The task was canceled before or while running
    #[error("task canceled")]
    Canceled,

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Returns true if this error only reports a cancellation
    ///
    /// Cancellation is terminal for the attempt but never counts as a failure.
    pub fn is_cancellation(&self) -> bool {
        match self {
            Error::Canceled => true,
            Error::Task(TaskError::Failed { source, .. }) => source.is_cancellation(),
            _ => false,
        }
    }

    /// Returns true if an external executor reported it was stopped on request
    pub fn is_stopped(&self) -> bool {
        match self {
            Error::Plugin(PluginError::ExecutorStopped { .. }) => true,
            Error::Task(TaskError::Failed { source, .. }) => source.is_stopped(),
            _ => false,
        }
    }
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),
}

/// Errors raised by provider, downloader and exporter plugins
#[derive(Debug, Error)]
pub enum PluginError {
    /// The provider reports the episode as stale or removed
    #[error("invalid episode {episode}: {reason}")]
    InvalidEpisode {
        /// Display form of the episode
        episode: String,
        /// Why the provider rejected it
        reason: String,
    },

    /// An external command exited unsuccessfully
    #[error("command failed: {cmd}")]
    ExecutorFailed {
        /// The command line that was run
        cmd: String,
        /// Combined stdout/stderr captured while it ran
        output: String,
    },

    /// An external command was stopped on request
    #[error("command stopped: {cmd}")]
    ExecutorStopped {
        /// The command line that was stopped
        cmd: String,
    },

    /// An external command produced no output for too long and was killed
    #[error("command hung for {idle_secs}s without output: {cmd}")]
    HungProcess {
        /// The command line that hung
        cmd: String,
        /// Seconds without output before it was killed
        idle_secs: u64,
    },

    /// No downloader plugin can handle the download parameters
    #[error("no downloader available for {0}")]
    NoDownloader(String),

    /// No exporter plugin registered under the name and no default set
    #[error("no exporter available for {0}")]
    NoExporter(String),

    /// No provider plugin registered under the name
    #[error("provider plugin {0} not found")]
    ProviderNotFound(String),

    /// Plugin-specific failure
    #[error("{plugin}: {message}")]
    Failed {
        /// Plugin name
        plugin: String,
        /// Failure description
        message: String,
    },
}

/// Task execution errors
#[derive(Debug, Error)]
pub enum TaskError {
    /// A task failed; wraps the original cause with the stage it ran in
    #[error("{kind} task {task} failed: {source}")]
    Failed {
        /// Stage of the failed task
        kind: TaskKind,
        /// Task description
        task: String,
        /// Original failure cause
        source: Box<Error>,
    },

    /// A task panicked while running
    #[error("task {task} panicked")]
    Panicked {
        /// Task description
        task: String,
    },

    /// A task was aborted before reporting an outcome
    #[error("task {task} aborted")]
    Aborted {
        /// Task description
        task: String,
    },

    /// The downloader finished without leaving an output file behind
    #[error("download output not found at {path}")]
    OutputMissing {
        /// The expected output path
        path: PathBuf,
    },
}
