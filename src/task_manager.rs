//! Task management for async service lifecycle.

use std::{future::Future, time::Duration};

use anyhow::{Context, Result, anyhow};
use log::{error, info, warn};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Upper bound on how long a cancelled service may take to wind down.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

struct ManagedTask {
    name: String,
    handle: JoinHandle<Result<()>>,
}

/// Spawns named service tasks and stops them together.
///
/// Every task receives a child of one root [`CancellationToken`];
/// [`TaskManager::shutdown_all`] cancels the root and waits for each task.
pub struct TaskManager {
    tasks: Vec<ManagedTask>,
    root_token: CancellationToken,
}

impl TaskManager {
    pub fn new() -> Self {
        Self {
            tasks: Vec::new(),
            root_token: CancellationToken::new(),
        }
    }

    pub async fn spawn_task<F, Fut>(&mut self, name: String, task_fn: F) -> Result<()>
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let token = self.root_token.child_token();
        let task_name = name.clone();

        let handle = tokio::spawn(async move {
            let result = task_fn(token).await;
            match &result {
                Ok(()) => info!("Task '{task_name}' finished"),
                Err(e) => error!("Task '{task_name}' failed: {e:#}"),
            }
            result
        });

        info!("Task '{name}' spawned");
        self.tasks.push(ManagedTask { name, handle });
        Ok(())
    }

    /// Cancels every task and waits for them to finish.
    ///
    /// All tasks are awaited even when one fails; the first failure is
    /// returned.
    pub async fn shutdown_all(&mut self) -> Result<()> {
        info!("Stopping all {} tasks", self.tasks.len());
        self.root_token.cancel();

        let mut first_error = None;
        for ManagedTask { name, handle } in self.tasks.drain(..) {
            let outcome = match tokio::time::timeout(SHUTDOWN_TIMEOUT, handle).await {
                Ok(Ok(result)) => result,
                Ok(Err(join_err)) => Err(anyhow!("Task '{name}' panicked: {join_err}")),
                Err(_) => Err(anyhow!("Task '{name}' did not stop within {SHUTDOWN_TIMEOUT:?}")),
            };
            if let Err(e) = outcome {
                warn!("{e:#}");
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e).context("One or more tasks failed during shutdown"),
            None => {
                info!("All tasks stopped");
                Ok(())
            }
        }
    }

    #[cfg(test)]
    pub fn active_count(&self) -> usize {
        self.tasks.len()
    }

    #[cfg(test)]
    pub fn is_running(&self, name: &str) -> bool {
        self.tasks.iter().any(|task| task.name == name)
    }
}

impl Default for TaskManager {
    fn default() -> Self {
        Self::new()
    }
}
