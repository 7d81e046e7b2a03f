//! Tracks the background tasks of a running `App` and joins them on shutdown.
use futures::future::join_all;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Owns the join handles of every named background task.
///
/// Tasks are expected to observe the shared shutdown receiver and return on
/// their own; [`TaskManager::shutdown`] only waits for them.
#[derive(Clone, Debug)]
pub struct TaskManager {
    tasks: Arc<Mutex<Vec<(&'static str, JoinHandle<()>)>>>,
    shutdown_rx: watch::Receiver<bool>,
}

impl TaskManager {
    pub fn new(shutdown_rx: watch::Receiver<bool>) -> Self {
        Self {
            tasks: Arc::new(Mutex::new(Vec::new())),
            shutdown_rx,
        }
    }

    /// Spawns `future` on the runtime under `name`.
    pub fn spawn<F>(&self, name: &'static str, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        debug!(task = name, "Spawning task");
        let handle = tokio::spawn(future);
        match self.tasks.lock() {
            Ok(mut tasks) => tasks.push((name, handle)),
            Err(poisoned) => poisoned.into_inner().push((name, handle)),
        }
    }

    /// A receiver that flips to `true` when shutdown begins.
    pub fn shutdown_rx(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }

    /// Waits for every spawned task to return and reports how many panicked.
    pub async fn shutdown(self) -> usize {
        let tasks: Vec<_> = match self.tasks.lock() {
            Ok(mut tasks) => tasks.drain(..).collect(),
            Err(poisoned) => poisoned.into_inner().drain(..).collect(),
        };
        info!(tasks = tasks.len(), "Waiting for background tasks to finish...");

        let (names, handles): (Vec<_>, Vec<_>) = tasks.into_iter().unzip();
        let results = join_all(handles).await;

        let mut panicked = 0;
        for (name, result) in names.into_iter().zip(results) {
            match result {
                Ok(()) => debug!(task = name, "Task finished."),
                Err(e) => {
                    panicked += 1;
                    error!(task = name, error = %e, "Task panicked.");
                }
            }
        }

        if panicked == 0 {
            info!("All background tasks finished.");
        } else {
            error!(panicked, "Some background tasks panicked.");
        }
        panicked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_shutdown_waits_for_tasks_observing_the_signal() {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let manager = TaskManager::new(shutdown_rx);

        for name in ["first", "second"] {
            let mut rx = manager.shutdown_rx();
            manager.spawn(name, async move {
                let _ = rx.changed().await;
            });
        }

        shutdown_tx.send(true).unwrap();
        let panicked = tokio::time::timeout(Duration::from_secs(1), manager.shutdown())
            .await
            .expect("tasks did not finish");
        assert_eq!(panicked, 0);
    }

    #[tokio::test]
    async fn test_shutdown_counts_panicked_tasks() {
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let manager = TaskManager::new(shutdown_rx);
        manager.spawn("boom", async { panic!("task failure") });
        manager.spawn("fine", async {});

        assert_eq!(manager.shutdown().await, 1);
    }
}
