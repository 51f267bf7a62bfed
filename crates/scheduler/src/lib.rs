//! Named periodic task scheduler.
//!
//! Each registered task runs as one spawned loop holding a
//! [`CancellationToken`]; the scheduler object owns the name-to-handle map,
//! so there is no ambient or static registry. Runs of the same task never
//! overlap because the loop awaits the callback before the next tick;
//! distinct tasks are fully independent. A failing callback is logged and
//! the schedule continues.

use std::collections::HashMap;
use std::future::Future;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A task body: invoked once per tick, awaited to completion.
pub type TaskCallback = Arc<dyn Fn() -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// When a task should run.
#[derive(Debug, Clone)]
pub enum Schedule {
    /// Fixed delay between the end of one run and the start of the next
    /// tick window.
    Interval(Duration),
    /// Cron expression evaluated in UTC.
    Cron(Box<cron::Schedule>),
}

/// Errors from parsing a schedule expression.
#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    #[error("interval must be at least one second")]
    ZeroInterval,

    #[error("invalid cron expression {expr:?}: {source}")]
    Cron {
        expr: String,
        source: cron::error::Error,
    },
}

impl Schedule {
    /// Parse a schedule expression from configuration.
    ///
    /// An all-digit string is a fixed interval in seconds; anything else is
    /// parsed as a cron expression.
    pub fn parse(expr: &str) -> Result<Self, ScheduleError> {
        let expr = expr.trim();
        if !expr.is_empty() && expr.bytes().all(|b| b.is_ascii_digit()) {
            let secs: u64 = expr.parse().map_err(|_| ScheduleError::ZeroInterval)?;
            if secs == 0 {
                return Err(ScheduleError::ZeroInterval);
            }
            return Ok(Schedule::Interval(Duration::from_secs(secs)));
        }
        let parsed = cron::Schedule::from_str(expr).map_err(|source| ScheduleError::Cron {
            expr: expr.to_string(),
            source,
        })?;
        Ok(Schedule::Cron(Box::new(parsed)))
    }
}

struct TaskHandle {
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

/// Registry of named recurring tasks.
///
/// Dropping the scheduler cancels every task.
#[derive(Default)]
pub struct TaskScheduler {
    tasks: Mutex<HashMap<String, TaskHandle>>,
}

impl TaskScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a named task. The timer starts immediately;
    /// the first run happens after the first schedule boundary. Last
    /// registration for a name wins: any prior task under the same name is
    /// cancelled first.
    pub fn register(&self, name: &str, schedule: Schedule, callback: TaskCallback) {
        let cancel = CancellationToken::new();
        let join = tokio::spawn(run_task(
            name.to_string(),
            schedule,
            callback,
            cancel.clone(),
        ));

        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = tasks.insert(name.to_string(), TaskHandle { cancel, join }) {
            tracing::debug!(task = name, "Replacing previously registered task");
            previous.cancel.cancel();
            previous.join.abort();
        }
    }

    /// Convenience wrapper over [`register`](Self::register) for plain
    /// async closures.
    pub fn register_fn<F, Fut>(&self, name: &str, schedule: Schedule, f: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.register(name, schedule, Arc::new(move || f().boxed()));
    }

    /// Cancel a task by name. Returns `false` when no such task exists.
    pub fn cancel(&self, name: &str) -> bool {
        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        match tasks.remove(name) {
            Some(handle) => {
                handle.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Whether a task with this name is registered.
    pub fn is_registered(&self, name: &str) -> bool {
        self.tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(name)
    }

    /// Cancel every registered task.
    pub fn shutdown(&self) {
        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        for (name, handle) in tasks.drain() {
            tracing::debug!(task = %name, "Cancelling scheduled task");
            handle.cancel.cancel();
        }
    }
}

impl Drop for TaskScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn run_task(name: String, schedule: Schedule, callback: TaskCallback, cancel: CancellationToken) {
    tracing::info!(task = %name, "Scheduled task registered");
    match schedule {
        Schedule::Interval(period) => {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick of a tokio interval fires immediately; consume
            // it so the first run happens after one full period.
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => invoke(&name, &callback).await,
                }
            }
        }
        Schedule::Cron(schedule) => loop {
            let Some(next) = schedule.upcoming(chrono::Utc).next() else {
                tracing::warn!(task = %name, "Cron schedule has no upcoming runs; stopping");
                break;
            };
            let wait = (next - chrono::Utc::now())
                .to_std()
                .unwrap_or(Duration::ZERO);
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(wait) => invoke(&name, &callback).await,
            }
        },
    }
    tracing::debug!(task = %name, "Scheduled task stopped");
}

async fn invoke(name: &str, callback: &TaskCallback) {
    if let Err(e) = callback().await {
        tracing::warn!(task = name, error = %e, "Scheduled task run failed; schedule continues");
    }
}
