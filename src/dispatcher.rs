// ============================================================================
// Bounded Task Dispatcher
// ============================================================================
//
// Fixed pool of workers draining a capacity-bounded queue.
//
// - enqueue waits at most `enqueue_timeout` for space, then drops the task
// - workers stop after their current task once cancellation is raised
// - shutdown waits at most `shutdown_timeout`; workers still busy after that
//   are left to finish on their own (detached, not aborted)
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chat_config::NotificationConfig;
use futures_util::future::join_all;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Executes one task. Failures are returned for logging; they never stop the
/// worker.
#[async_trait]
pub trait TaskHandler<T>: Send + Sync + 'static {
    async fn handle(&self, task: T) -> anyhow::Result<()>;
}

#[derive(Debug, Clone)]
pub struct DispatcherSettings {
    /// Label used in logs and metrics
    pub name: &'static str,
    pub workers: usize,
    pub queue_capacity: usize,
    pub enqueue_timeout: Duration,
    pub shutdown_timeout: Duration,
}

impl DispatcherSettings {
    pub fn notifications(config: &NotificationConfig) -> Self {
        Self {
            name: "notifications",
            workers: config.workers,
            queue_capacity: config.queue_capacity,
            enqueue_timeout: config.enqueue_timeout(),
            shutdown_timeout: config.shutdown_timeout(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Queued,
    Dropped,
}

pub struct BoundedDispatcher<T> {
    name: &'static str,
    sender: mpsc::Sender<T>,
    cancel: CancellationToken,
    workers: std::sync::Mutex<Vec<JoinHandle<()>>>,
    enqueue_timeout: Duration,
    shutdown_timeout: Duration,
}

impl<T: Send + 'static> BoundedDispatcher<T> {
    /// Spawn `settings.workers` workers running `handler`
    pub fn start<H>(settings: DispatcherSettings, handler: H) -> Self
    where
        H: TaskHandler<T>,
    {
        let (sender, receiver) = mpsc::channel(settings.queue_capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));
        let handler = Arc::new(handler);
        let cancel = CancellationToken::new();

        let workers = (0..settings.workers.max(1))
            .map(|worker_id| {
                tokio::spawn(run_worker(
                    settings.name,
                    worker_id,
                    Arc::clone(&receiver),
                    Arc::clone(&handler),
                    cancel.clone(),
                ))
            })
            .collect::<Vec<_>>();

        info!(
            dispatcher = settings.name,
            workers = workers.len(),
            capacity = settings.queue_capacity,
            "Dispatcher started"
        );

        Self {
            name: settings.name,
            sender,
            cancel,
            workers: std::sync::Mutex::new(workers),
            enqueue_timeout: settings.enqueue_timeout,
            shutdown_timeout: settings.shutdown_timeout,
        }
    }

    /// Queue `task`, waiting up to the enqueue timeout for space
    pub async fn enqueue(&self, task: T) -> EnqueueOutcome {
        if self.cancel.is_cancelled() {
            return self.dropped("dispatcher is shut down");
        }

        match tokio::time::timeout(self.enqueue_timeout, self.sender.send(task)).await {
            Ok(Ok(())) => EnqueueOutcome::Queued,
            Ok(Err(_)) => self.dropped("workers have stopped"),
            Err(_) => self.dropped("queue full"),
        }
    }

    fn dropped(&self, reason: &str) -> EnqueueOutcome {
        chat_metrics::TASKS_DROPPED_TOTAL
            .with_label_values(&[self.name])
            .inc();
        warn!(dispatcher = self.name, reason = reason, "Task dropped");
        EnqueueOutcome::Dropped
    }

    pub fn is_shut_down(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Stop the workers, waiting at most the shutdown timeout
    pub async fn shutdown(&self) {
        self.cancel.cancel();

        let handles = match self.workers.lock() {
            Ok(mut workers) => std::mem::take(&mut *workers),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        if handles.is_empty() {
            return;
        }

        match tokio::time::timeout(self.shutdown_timeout, join_all(handles)).await {
            Ok(results) => {
                for result in results {
                    if let Err(e) = result {
                        error!(dispatcher = self.name, error = %e, "Worker panicked");
                    }
                }
                info!(dispatcher = self.name, "All workers stopped");
            }
            Err(_) => {
                warn!(
                    dispatcher = self.name,
                    timeout = ?self.shutdown_timeout,
                    "Timeout waiting for workers to stop"
                );
            }
        }
    }
}

async fn run_worker<T, H>(
    name: &'static str,
    worker_id: usize,
    receiver: Arc<Mutex<mpsc::Receiver<T>>>,
    handler: Arc<H>,
    cancel: CancellationToken,
) where
    T: Send + 'static,
    H: TaskHandler<T>,
{
    debug!(dispatcher = name, worker_id, "Worker started");

    loop {
        let task = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            task = async { receiver.lock().await.recv().await } => task,
        };

        let Some(task) = task else {
            break;
        };

        if let Err(e) = handler.handle(task).await {
            error!(dispatcher = name, worker_id, error = %e, "Task failed");
        }
        chat_metrics::TASKS_EXECUTED_TOTAL
            .with_label_values(&[name])
            .inc();
    }

    debug!(dispatcher = name, worker_id, "Worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting(Arc<AtomicUsize>);

    #[async_trait]
    impl TaskHandler<u32> for Counting {
        async fn handle(&self, _task: u32) -> anyhow::Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn settings(workers: usize, capacity: usize) -> DispatcherSettings {
        DispatcherSettings {
            name: "test",
            workers,
            queue_capacity: capacity,
            enqueue_timeout: Duration::from_millis(200),
            shutdown_timeout: Duration::from_secs(1),
        }
    }

    #[tokio::test]
    async fn test_tasks_run_on_workers() {
        let count = Arc::new(AtomicUsize::new(0));
        let dispatcher = BoundedDispatcher::start(settings(3, 10), Counting(count.clone()));

        for i in 0..5 {
            assert_eq!(dispatcher.enqueue(i).await, EnqueueOutcome::Queued);
        }

        tokio::time::timeout(Duration::from_secs(1), async {
            while count.load(Ordering::SeqCst) < 5 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        dispatcher.shutdown().await;
    }

    #[tokio::test]
    async fn test_enqueue_after_shutdown_is_dropped() {
        let count = Arc::new(AtomicUsize::new(0));
        let dispatcher = BoundedDispatcher::start(settings(1, 1), Counting(count));
        dispatcher.shutdown().await;

        assert!(dispatcher.is_shut_down());
        assert_eq!(dispatcher.enqueue(1).await, EnqueueOutcome::Dropped);
    }
}
