//! Bounded worker pools, one per category, with a key→task registry

use super::{Task, TaskControl, TaskHandle, TaskListener, TaskState, execute};
use crate::config::PoolConfig;
use crate::error::{Error, Result, TaskError};
use crate::types::TaskKind;
use futures::FutureExt;
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

/// Observer of pool-level conditions
pub trait PoolListener: Send + Sync {
    /// A category's pool has no queued and no running task left
    fn on_drained(&self, _category: &str) {}

    /// A worker crashed outside the task's own failure handling
    fn on_crash(&self, _category: &str, _error: &Error) {}
}

struct Pool {
    semaphore: Arc<Semaphore>,
    outstanding: Arc<AtomicUsize>,
    token: CancellationToken,
}

impl Pool {
    fn new(size: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(size)),
            outstanding: Arc::new(AtomicUsize::new(0)),
            token: CancellationToken::new(),
        }
    }
}

struct Inner<K> {
    pools: HashMap<String, Pool>,
    tasks: HashMap<K, TaskControl>,
    shut_down: bool,
}

/// Worker pools of one pipeline stage, keyed by category name
///
/// Each category gets its own pool, created on first use, whose size comes
/// from [`PoolConfig::pool_size`]. A worker is a spawned task holding one of
/// the pool's semaphore permits; tasks waiting for a permit form the backlog,
/// served in submission order.
///
/// The key→task registry lets callers cancel a task by business key. Entries
/// of finished tasks are swept after every completion.
pub struct CategoryPools<K> {
    kind: TaskKind,
    sizes: PoolConfig,
    inner: Arc<Mutex<Inner<K>>>,
    listener: Option<Arc<dyn PoolListener>>,
}

impl<K> Clone for CategoryPools<K> {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            sizes: self.sizes.clone(),
            inner: self.inner.clone(),
            listener: self.listener.clone(),
        }
    }
}

impl<K> CategoryPools<K>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
{
    /// Pools of a stage, sized by `sizes`
    pub fn new(kind: TaskKind, sizes: PoolConfig) -> Self {
        Self {
            kind,
            sizes,
            inner: Arc::new(Mutex::new(Inner {
                pools: HashMap::new(),
                tasks: HashMap::new(),
                shut_down: false,
            })),
            listener: None,
        }
    }

    /// Attach a pool listener
    pub fn with_listener(mut self, listener: Arc<dyn PoolListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    fn lock(&self) -> MutexGuard<'_, Inner<K>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Submit a task to a category's pool
    ///
    /// Calls the task's `adding()` hook, creates the pool if needed, records
    /// `key` for cancellation and returns without waiting for the task.
    pub fn submit<T: Task>(
        &self,
        key: K,
        task: Arc<T>,
        category: &str,
        listener: Option<Arc<dyn TaskListener>>,
    ) -> Result<TaskHandle<T::Output>> {
        if self.lock().shut_down {
            return Err(Error::ShuttingDown);
        }

        task.adding();

        let (semaphore, outstanding, control) = {
            let mut inner = self.lock();
            if inner.shut_down {
                return Err(Error::ShuttingDown);
            }
            let size = self.sizes.pool_size(self.kind, category);
            let pool = inner.pools.entry(category.to_string()).or_insert_with(|| {
                tracing::debug!(stage = %self.kind, category, size, "creating worker pool");
                Pool::new(size)
            });
            let control = TaskControl::new(pool.token.child_token());
            pool.outstanding.fetch_add(1, Ordering::SeqCst);
            let handles = (pool.semaphore.clone(), pool.outstanding.clone());
            inner.tasks.insert(key, control.clone());
            (handles.0, handles.1, control)
        };

        let kind = task.kind();
        let name = task.describe();
        let pools = self.clone();
        let category = category.to_string();
        let worker_control = control.clone();
        let worker_name = name.clone();

        let join = tokio::spawn(async move {
            let permit = tokio::select! {
                biased;
                _ = worker_control.token().cancelled() => None,
                permit = semaphore.acquire_owned() => permit.ok(),
            };

            let run = execute(task.as_ref(), &worker_control, listener.as_deref());
            let result = match AssertUnwindSafe(run).catch_unwind().await {
                Ok(result) => result,
                Err(_) => {
                    worker_control.set_state(TaskState::Failed);
                    let err = Error::Task(TaskError::Panicked {
                        task: worker_name.clone(),
                    });
                    tracing::error!(task = %worker_name, category = %category, "worker panicked");
                    if let Some(listener) = &listener {
                        listener.on_task_failed(&err).await;
                    }
                    if let Some(pool_listener) = &pools.listener {
                        pool_listener.on_crash(&category, &err);
                    }
                    Err(err)
                }
            };
            drop(permit);

            pools.sweep();
            if outstanding.fetch_sub(1, Ordering::SeqCst) == 1 {
                tracing::debug!(stage = %pools.kind, category = %category, "worker pool drained");
                if let Some(pool_listener) = &pools.listener {
                    pool_listener.on_drained(&category);
                }
            }
            result
        });

        Ok(TaskHandle::new(control, kind, name, join))
    }

    fn sweep(&self) {
        self.lock()
            .tasks
            .retain(|_, control| !control.state().is_terminal());
    }

    /// Cancel the task registered under `key`; no-op if there is none
    pub fn cancel(&self, key: &K) -> bool {
        match self.lock().tasks.get(key) {
            Some(control) => {
                tracing::debug!(stage = %self.kind, key = ?key, "canceling task");
                control.cancel();
                true
            }
            None => false,
        }
    }

    /// Whether a task registered under `key` has not finished yet
    pub fn is_active(&self, key: &K) -> bool {
        self.lock()
            .tasks
            .get(key)
            .is_some_and(|control| !control.state().is_terminal())
    }

    /// Queued plus running tasks of a category
    pub fn outstanding(&self, category: &str) -> usize {
        self.lock()
            .pools
            .get(category)
            .map(|pool| pool.outstanding.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    /// Queued plus running tasks across all categories
    pub fn total_outstanding(&self) -> usize {
        self.lock()
            .pools
            .values()
            .map(|pool| pool.outstanding.load(Ordering::SeqCst))
            .sum()
    }

    /// Stop every pool: cancel all tasks and refuse new ones
    pub fn shutdown_now(&self) {
        let mut inner = self.lock();
        inner.shut_down = true;
        for (category, pool) in &inner.pools {
            tracing::debug!(stage = %self.kind, category = %category, "shutting down worker pool");
            pool.token.cancel();
            pool.semaphore.close();
        }
    }

    /// Whether `shutdown_now` was called
    pub fn is_shut_down(&self) -> bool {
        self.lock().shut_down
    }
}
