use super::*;
use crate::config::PoolConfig;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Semaphore;


#[derive(Clone, Copy, Debug)]
enum Behavior {
    Succeed,
    Fail,
    Panic,
    /// Block until canceled
    Hang,
    /// Block until the test releases a permit of the gate
    Gated,
}

/// Task recording its hooks, with shared concurrency accounting
struct Probe {
    name: String,
    behavior: Behavior,
    hooks: Mutex<Vec<&'static str>>,
    gate: Arc<Semaphore>,
    running: Arc<AtomicUsize>,
    max_running: Arc<AtomicUsize>,
}

impl Probe {
    fn new(name: &str, behavior: Behavior) -> Self {
        Self {
            name: name.into(),
            behavior,
            hooks: Mutex::new(Vec::new()),
            gate: Arc::new(Semaphore::new(0)),
            running: Arc::new(AtomicUsize::new(0)),
            max_running: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn sharing(name: &str, behavior: Behavior, other: &Probe) -> Self {
        Self {
            gate: other.gate.clone(),
            running: other.running.clone(),
            max_running: other.max_running.clone(),
            ..Self::new(name, behavior)
        }
    }

    fn hooks(&self) -> Vec<&'static str> {
        self.hooks.lock().unwrap().clone()
    }

    fn record(&self, hook: &'static str) {
        self.hooks.lock().unwrap().push(hook);
    }
}

#[async_trait]
impl Task for Probe {
    type Output = String;

    fn kind(&self) -> TaskKind {
        TaskKind::Download
    }

    fn describe(&self) -> String {
        format!("probe {}", self.name)
    }

    fn adding(&self) {
        self.record("adding");
    }

    fn started(&self) {
        self.record("started");
    }

    async fn do_call(&self, cancel: &CancellationToken) -> Result<String> {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(now, Ordering::SeqCst);

        let result = match self.behavior {
            Behavior::Succeed => Ok(self.name.clone()),
            Behavior::Fail => Err(Error::Other(format!("{} broke", self.name))),
            Behavior::Panic => panic!("probe {} panicked", self.name),
            Behavior::Hang => {
                cancel.cancelled().await;
                Err(Error::Canceled)
            }
            Behavior::Gated => {
                tokio::select! {
                    permit = self.gate.acquire() => {
                        permit.unwrap().forget();
                        Ok(self.name.clone())
                    }
                    _ = cancel.cancelled() => Err(Error::Canceled),
                }
            }
        };

        self.running.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn ended(&self, _output: &String) {
        self.record("ended");
    }

    fn failed(&self, _error: &Error) {
        self.record("failed");
    }

    fn canceled(&self) {
        self.record("canceled");
    }
}

#[derive(Default)]
struct RecordingListener {
    events: Mutex<Vec<String>>,
}

impl RecordingListener {
    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl TaskListener for RecordingListener {
    async fn on_task_ended(&self) {
        self.events.lock().unwrap().push("ended".into());
    }

    async fn on_task_failed(&self, error: &Error) {
        self.events.lock().unwrap().push(format!("failed: {error}"));
    }

    async fn on_task_canceled(&self) {
        self.events.lock().unwrap().push("canceled".into());
    }
}

#[derive(Default)]
struct DrainCounter {
    drained: Mutex<Vec<String>>,
    crashes: AtomicUsize,
}

impl PoolListener for DrainCounter {
    fn on_drained(&self, category: &str) {
        self.drained.lock().unwrap().push(category.to_string());
    }

    fn on_crash(&self, _category: &str, _error: &Error) {
        self.crashes.fetch_add(1, Ordering::SeqCst);
    }
}

fn pools() -> CategoryPools<String> {
    CategoryPools::new(TaskKind::Download, PoolConfig::default())
}

/// Wait until `cond` holds, failing the test after a few seconds
async fn eventually(mut cond: impl FnMut() -> bool) {
    for _ in 0..500 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}
