//! Unit-of-work lifecycle shared by every pipeline stage
//!
//! A [`Task`] goes `Pending → Started → {Succeeded | Failed | Canceled}`, with
//! `Pending → Canceled` when cancellation arrives before a worker picks it up.
//! Hooks run in a fixed order:
//!
//! 1. `adding()` synchronously at submission, before queuing
//! 2. `started()` when a worker begins
//! 3. `do_call()`, the work itself
//! 4. exactly one of `ended()`, `failed()` or `canceled()`
//!
//! The attached [`TaskListener`] is told the outcome before the task's own
//! terminal hook runs, and both happen before [`TaskHandle::wait_end_of_treatment`]
//! resolves.

use crate::error::{Error, Result, TaskError};
use crate::types::TaskKind;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

mod pool;

pub use pool::{CategoryPools, PoolListener};

/// A unit of work run by a [`CategoryPools`] worker
#[async_trait]
pub trait Task: Send + Sync + 'static {
    /// Value produced on success
    type Output: Send + 'static;

    /// Stage the task belongs to
    fn kind(&self) -> TaskKind;

    /// Short description for logs and errors
    fn describe(&self) -> String;

    /// Called synchronously when the task is submitted
    fn adding(&self) {}

    /// Called when a worker starts the task
    fn started(&self) {}

    /// The work itself
    ///
    /// `cancel` fires when the task is canceled while running; long waits should
    /// select on it and return [`Error::Canceled`].
    async fn do_call(&self, cancel: &CancellationToken) -> Result<Self::Output>;

    /// Called after a successful run
    fn ended(&self, _output: &Self::Output) {}

    /// Called after a failed run
    fn failed(&self, _error: &Error) {}

    /// Called instead of `ended`/`failed` when the task was canceled
    fn canceled(&self) {}
}

/// Observer of a task's outcome
#[async_trait]
pub trait TaskListener: Send + Sync {
    /// The task succeeded
    async fn on_task_ended(&self);

    /// The task failed (cancellation excluded)
    async fn on_task_failed(&self, error: &Error);

    /// The task was canceled before or while running
    async fn on_task_canceled(&self) {}
}

/// Lifecycle state of a submitted task
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskState {
    /// Queued, waiting for a worker
    Pending,
    /// Running
    Started,
    /// Finished successfully
    Succeeded,
    /// Finished with an error
    Failed,
    /// Canceled before or while running
    Canceled,
}

impl TaskState {
    /// Whether the task reached a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Succeeded | TaskState::Failed | TaskState::Canceled
        )
    }
}

/// Shared cancellation flag and state of one submitted task
#[derive(Clone, Debug)]
pub struct TaskControl {
    token: CancellationToken,
    state: Arc<watch::Sender<TaskState>>,
}

impl TaskControl {
    pub(crate) fn new(token: CancellationToken) -> Self {
        let (state, _rx) = watch::channel(TaskState::Pending);
        Self {
            token,
            state: Arc::new(state),
        }
    }

    /// Request cancellation; idempotent, callable from anywhere
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Current lifecycle state
    pub fn state(&self) -> TaskState {
        *self.state.borrow()
    }

    pub(crate) fn set_state(&self, state: TaskState) {
        self.state.send_replace(state);
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        &self.token
    }
}

/// Handle on a submitted task
#[derive(Debug)]
pub struct TaskHandle<R> {
    control: TaskControl,
    kind: TaskKind,
    name: String,
    join: JoinHandle<Result<R>>,
}

impl<R> TaskHandle<R> {
    pub(crate) fn new(
        control: TaskControl,
        kind: TaskKind,
        name: String,
        join: JoinHandle<Result<R>>,
    ) -> Self {
        Self {
            control,
            kind,
            name,
            join,
        }
    }

    /// Request cancellation of the task
    pub fn cancel(&self) {
        self.control.cancel();
    }

    /// Current lifecycle state
    pub fn state(&self) -> TaskState {
        self.control.state()
    }

    /// Task description
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wait until the task and all its hooks finished
    ///
    /// A cancellation comes back as [`Error::Canceled`]. Any other failure is
    /// wrapped in [`TaskError::Failed`] naming the stage and the task.
    pub async fn wait_end_of_treatment(self) -> Result<R> {
        match self.join.await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) if e.is_cancellation() => Err(Error::Canceled),
            Ok(Err(e @ Error::Task(TaskError::Panicked { .. }))) => Err(e),
            Ok(Err(e)) => Err(Error::Task(TaskError::Failed {
                kind: self.kind,
                task: self.name,
                source: Box::new(e),
            })),
            Err(join_err) if join_err.is_panic() => {
                Err(Error::Task(TaskError::Panicked { task: self.name }))
            }
            Err(_) => Err(Error::Task(TaskError::Aborted { task: self.name })),
        }
    }

    /// Wait for the task, canceling it if `cancel` fires first
    ///
    /// Either way the task's hooks have all run when this returns.
    pub async fn wait_or_cancel(self, cancel: &CancellationToken) -> Result<R> {
        let control = self.control.clone();
        let wait = self.wait_end_of_treatment();
        tokio::pin!(wait);
        tokio::select! {
            biased;
            result = &mut wait => result,
            _ = cancel.cancelled() => {
                control.cancel();
                wait.await
            }
        }
    }
}

/// Outcome of asking the orchestrator to take on a task
#[derive(Debug)]
pub enum Admission<R = ()> {
    /// The task was submitted
    Added(TaskHandle<R>),
    /// An equivalent task is already running; nothing was submitted
    AlreadyAdded,
}

impl<R> Admission<R> {
    /// Whether the task was submitted
    pub fn is_added(&self) -> bool {
        matches!(self, Admission::Added(_))
    }

    /// The handle of the submitted task
    pub fn into_handle(self) -> Option<TaskHandle<R>> {
        match self {
            Admission::Added(handle) => Some(handle),
            Admission::AlreadyAdded => None,
        }
    }
}

async fn finish_canceled<T: Task>(
    task: &T,
    control: &TaskControl,
    listener: Option<&dyn TaskListener>,
) -> Result<T::Output> {
    control.set_state(TaskState::Canceled);
    tracing::debug!(task = %task.describe(), kind = %task.kind(), "task canceled");
    if let Some(listener) = listener {
        listener.on_task_canceled().await;
    }
    task.canceled();
    Err(Error::Canceled)
}

/// Run one task through its lifecycle
pub(crate) async fn execute<T: Task>(
    task: &T,
    control: &TaskControl,
    listener: Option<&dyn TaskListener>,
) -> Result<T::Output> {
    if control.is_cancelled() {
        return finish_canceled(task, control, listener).await;
    }

    control.set_state(TaskState::Started);
    tracing::debug!(task = %task.describe(), kind = %task.kind(), "task started");
    task.started();

    let result = task.do_call(control.token()).await;

    if control.is_cancelled() || result.as_ref().is_err_and(|e| e.is_cancellation()) {
        return finish_canceled(task, control, listener).await;
    }

    match result {
        Ok(output) => {
            control.set_state(TaskState::Succeeded);
            tracing::debug!(task = %task.describe(), kind = %task.kind(), "task ended");
            if let Some(listener) = listener {
                listener.on_task_ended().await;
            }
            task.ended(&output);
            Ok(output)
        }
        Err(e) => {
            control.set_state(TaskState::Failed);
            tracing::warn!(task = %task.describe(), kind = %task.kind(), error = %e, "task failed");
            if let Some(listener) = listener {
                listener.on_task_failed(&e).await;
            }
            task.failed(&e);
            Err(e)
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests;
