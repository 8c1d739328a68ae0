//! Shutdown coordination for the detector.

use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Coordinator for graceful shutdown.
///
/// Long-running tasks hold a token (or a child of it) and exit once it is
/// cancelled. Tracked join handles are awaited on `drain`.
pub struct Shutdown {
    token: CancellationToken,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl Shutdown {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            tasks: Vec::new(),
        }
    }

    /// Token cancelled when shutdown is triggered.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Track a background task so `drain` waits for it.
    pub fn track(&mut self, name: &'static str, task: JoinHandle<()>) {
        self.tasks.push((name, task));
    }

    /// Get the number of tracked tasks.
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Trigger shutdown and wait up to `deadline` for tracked tasks.
    /// Returns the names of tasks that did not finish in time; they are
    /// aborted.
    pub async fn drain(self, deadline: Duration) -> Vec<&'static str> {
        self.token.cancel();
        let mut stragglers = Vec::new();

        let wait = tokio::time::Instant::now() + deadline;
        for (name, mut task) in self.tasks {
            match tokio::time::timeout_at(wait, &mut task).await {
                Ok(Ok(())) => tracing::debug!(task = name, "Task stopped"),
                Ok(Err(e)) => tracing::error!(task = name, error = %e, "Task failed during shutdown"),
                Err(_) => {
                    tracing::warn!(task = name, "Task did not stop before deadline, aborting");
                    task.abort();
                    stragglers.push(name);
                }
            }
        }
        stragglers
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
