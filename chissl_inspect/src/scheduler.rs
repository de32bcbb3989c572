//! Keyed registry of periodic refresh tasks
//!
//! Every poller in the dashboard (stats cards, tables, per-view refresh)
//! registers here under a key. Registering a key that is already active
//! replaces the old task, so a key never owns more than one timer.

use crate::error::InspectError;
use futures_util::FutureExt;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Shortest period a task may run at
const MIN_INTERVAL: Duration = Duration::from_millis(1);

struct RegisteredTask {
    interval: Duration,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct SchedulerInner {
    tasks: Mutex<HashMap<String, RegisteredTask>>,
}

impl SchedulerInner {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, RegisteredTask>> {
        // Nothing panics while holding the lock; recover the map regardless
        self.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for SchedulerInner {
    fn drop(&mut self) {
        for (_, task) in self.lock().drain() {
            task.handle.abort();
        }
    }
}

/// Cloneable handle to a shared task registry
///
/// All clones see the same keys. Tasks are cancelled when the last clone is
/// dropped.
#[derive(Clone, Default)]
pub struct RefreshScheduler {
    inner: Arc<SchedulerInner>,
}

impl RefreshScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `callback` every `interval` under `key`, replacing any task
    /// already registered for that key.
    ///
    /// The first run happens one interval after registration. A callback
    /// that returns an error or panics is logged and keeps its schedule.
    /// Must be called from within a tokio runtime.
    pub fn start<F, Fut>(&self, key: impl Into<String>, callback: F, interval: Duration)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let key = key.into();
        let interval = if interval.is_zero() {
            tracing::warn!(key = %key, "Zero refresh interval, using {:?}", MIN_INTERVAL);
            MIN_INTERVAL
        } else {
            interval
        };

        let first_tick = Instant::now() + interval;
        let task_key = key.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(first_tick, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(err) = run_tick(&task_key, &callback).await {
                    tracing::warn!(key = %task_key, "{}", err);
                }
            }
        });

        let mut tasks = self.inner.lock();
        if let Some(previous) = tasks.insert(key.clone(), RegisteredTask { interval, handle }) {
            previous.handle.abort();
            tracing::debug!(key = %key, "Refresh task replaced");
        }
        tracing::debug!(key = %key, "Refresh started every {:?}", interval);
    }

    /// Cancel the task registered under `key`, if any
    pub fn stop(&self, key: &str) {
        if let Some(task) = self.inner.lock().remove(key) {
            task.handle.abort();
            tracing::debug!(key = %key, "Refresh stopped");
        }
    }

    /// Cancel every registered task
    pub fn stop_all(&self) {
        let drained: Vec<(String, RegisteredTask)> = self.inner.lock().drain().collect();
        for (key, task) in drained {
            task.handle.abort();
            tracing::debug!(key = %key, "Refresh stopped");
        }
    }

    /// Check if a task is registered under `key`
    pub fn is_active(&self, key: &str) -> bool {
        self.inner.lock().contains_key(key)
    }

    /// Period of the task registered under `key`
    pub fn interval(&self, key: &str) -> Option<Duration> {
        self.inner.lock().get(key).map(|task| task.interval)
    }

    /// Registered keys, sorted
    pub fn active_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.inner.lock().keys().cloned().collect();
        keys.sort();
        keys
    }
}

/// Run one tick, turning errors and panics into a `SchedulerTask` error
async fn run_tick<F, Fut>(key: &str, callback: &F) -> Result<(), InspectError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = anyhow::Result<()>>,
{
    let failure = |reason: String| InspectError::SchedulerTask {
        key: key.to_string(),
        reason,
    };

    let fut = std::panic::catch_unwind(AssertUnwindSafe(callback))
        .map_err(|panic| failure(panic_message(panic.as_ref())))?;

    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(failure(format!("{:#}", err))),
        Err(panic) => Err(failure(panic_message(panic.as_ref()))),
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked".to_string()
    }
}
