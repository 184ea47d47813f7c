use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::worker::executor::JobExecutor;

/// Fixed-size pool of workers draining the shared ready queue.
///
/// Each worker pulls one job id at a time and runs it to completion before
/// looking at the queue again. On shutdown, idle workers exit immediately and
/// busy workers exit after their current attempt.
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn spawn(
        count: usize,
        executor: Arc<JobExecutor>,
        ready_rx: mpsc::Receiver<String>,
        shutdown: CancellationToken,
    ) -> Self {
        let ready_rx = Arc::new(Mutex::new(ready_rx));
        let handles = (0..count)
            .map(|worker_id| {
                let executor = executor.clone();
                let ready_rx = ready_rx.clone();
                let shutdown = shutdown.clone();
                tokio::spawn(async move {
                    worker_loop(worker_id, executor, ready_rx, shutdown).await;
                })
            })
            .collect();

        tracing::info!(workers = count, "Worker pool started");
        Self { handles }
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Wait for every worker to exit.
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Worker task panicked");
            }
        }
    }
}

async fn worker_loop(
    worker_id: usize,
    executor: Arc<JobExecutor>,
    ready_rx: Arc<Mutex<mpsc::Receiver<String>>>,
    shutdown: CancellationToken,
) {
    tracing::debug!(worker_id, "Worker started");

    loop {
        let job_id = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            next = async { ready_rx.lock().await.recv().await } => match next {
                Some(job_id) => job_id,
                None => break,
            },
        };

        executor.execute(worker_id, &job_id).await;
    }

    tracing::debug!(worker_id, "Worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QuorumConfig;
    use crate::network::SimulatedDispatcher;
    use crate::scheduler::selector::RandomSelector;
    use crate::scheduler::state::SchedulerState;
    use crate::scheduler::trigger::TriggerSet;
    use crate::scheduler::{Job, JobStatus};
    use std::time::Duration;

    #[tokio::test]
    async fn workers_drain_queue_and_exit_on_shutdown() {
        let state = SchedulerState::shared(&QuorumConfig::default());
        let shutdown = CancellationToken::new();
        let (trigger_tx, _trigger_rx) = mpsc::channel(1);
        let triggers = Arc::new(TriggerSet::new(
            state.clone(),
            trigger_tx,
            Duration::from_secs(60),
            shutdown.clone(),
        ));
        let dispatcher = SimulatedDispatcher::new(1.0).with_delay(Duration::ZERO, Duration::ZERO);
        let executor = Arc::new(JobExecutor::new(
            state.clone(),
            "default",
            Arc::new(RandomSelector),
            Arc::new(dispatcher),
            triggers,
        ));

        {
            let mut state = state.write().await;
            for id in ["a", "b", "c"] {
                state.jobs.insert(Job::new(id, 5, 60));
            }
        }

        let (tx, rx) = mpsc::channel(10);
        let pool = WorkerPool::spawn(2, executor, rx, shutdown.clone());
        assert_eq!(pool.len(), 2);
        for id in ["a", "b", "c"] {
            tx.send(id.to_string()).await.unwrap();
        }

        tokio::time::sleep(Duration::from_millis(200)).await;
        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), pool.join())
            .await
            .unwrap();

        let state = state.read().await;
        for id in ["a", "b", "c"] {
            assert_eq!(state.jobs.status(id), Some(JobStatus::Completed));
        }
    }
}
