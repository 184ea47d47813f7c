use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::SchedulerConfig;
use crate::error::{Result, SchedulerError};
use crate::network::Dispatcher;
use crate::resources::{ResourceMonitor, ResourceSampler, SysinfoSampler, SystemResources};
use crate::scheduler::job::{Job, JobDetails};
use crate::scheduler::quorum::Quorum;
use crate::scheduler::selector::{KeeperSelector, RandomSelector};
use crate::scheduler::state::{SchedulerState, SharedState};
use crate::scheduler::trigger::TriggerSet;
use crate::scheduler::waiting::{WaitingJobInfo, WaitingQueue};
use crate::worker::{JobExecutor, WorkerPool};

/// Counts reported by [`JobScheduler::get_queue_status`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueStatus {
    /// Jobs admitted to the registry, in any status
    pub active_jobs: usize,
    /// Jobs held back by resource pressure
    pub waiting_jobs: usize,
    /// Job ids sitting in the ready queue
    pub ready_jobs: usize,
    pub cpu_usage: f64,
    pub memory_usage: f64,
}

/// Pluggable collaborators of the scheduler.
pub struct SchedulerDeps {
    pub dispatcher: Arc<dyn Dispatcher>,
    pub sampler: Arc<dyn ResourceSampler>,
    pub selector: Arc<dyn KeeperSelector>,
}

impl SchedulerDeps {
    /// Host sampling through sysinfo and random keeper selection.
    pub fn new(dispatcher: Arc<dyn Dispatcher>) -> Self {
        Self {
            dispatcher,
            sampler: Arc::new(SysinfoSampler::default()),
            selector: Arc::new(RandomSelector),
        }
    }

    pub fn with_sampler(mut self, sampler: Arc<dyn ResourceSampler>) -> Self {
        self.sampler = sampler;
        self
    }

    pub fn with_selector(mut self, selector: Arc<dyn KeeperSelector>) -> Self {
        self.selector = selector;
        self
    }
}

/// Admission control, recurring triggers and the worker pool behind one
/// handle.
///
/// Lock order is scheduler state, then the waiting queue. Neither is held
/// across a dispatch or a ready-queue send.
pub struct JobScheduler {
    config: SchedulerConfig,
    state: SharedState,
    waiting: Arc<Mutex<WaitingQueue>>,
    monitor: Arc<ResourceMonitor>,
    triggers: Arc<TriggerSet>,
    ready_tx: mpsc::Sender<String>,
    shutdown: CancellationToken,
    workers: Mutex<Option<WorkerPool>>,
    background: Mutex<Vec<JoinHandle<()>>>,
}

impl JobScheduler {
    /// Build the scheduler and start its resource monitor, promotion loop,
    /// retention sweeper and workers. Resources are sampled once before this
    /// returns so the first admission decision sees real readings.
    pub async fn start(config: SchedulerConfig, deps: SchedulerDeps) -> Arc<Self> {
        let shutdown = CancellationToken::new();
        let state = SchedulerState::shared(&config.default_quorum);
        let (ready_tx, ready_rx) = mpsc::channel(config.ready_queue_capacity.max(1));

        let monitor = Arc::new(ResourceMonitor::new(
            deps.sampler,
            config.limits,
            config.metrics_interval,
        ));
        monitor.sample().await;

        let triggers = Arc::new(TriggerSet::new(
            state.clone(),
            ready_tx.clone(),
            config.initial_delay,
            shutdown.child_token(),
        ));

        let executor = Arc::new(JobExecutor::new(
            state.clone(),
            config.default_quorum.quorum_id.clone(),
            deps.selector,
            deps.dispatcher,
            triggers.clone(),
        ));
        let workers = WorkerPool::spawn(
            config.workers_count.max(1),
            executor,
            ready_rx,
            shutdown.clone(),
        );

        let scheduler = Arc::new(Self {
            config,
            state,
            waiting: Arc::new(Mutex::new(WaitingQueue::new())),
            monitor,
            triggers,
            ready_tx,
            shutdown,
            workers: Mutex::new(Some(workers)),
            background: Mutex::new(Vec::new()),
        });

        let background = vec![
            tokio::spawn(
                scheduler
                    .monitor
                    .clone()
                    .run(scheduler.shutdown.clone()),
            ),
            tokio::spawn(Self::promotion_loop(scheduler.clone())),
            tokio::spawn(Self::retention_loop(scheduler.clone())),
        ];
        *scheduler.background.lock().await = background;

        tracing::info!(
            workers = scheduler.config.workers_count,
            max_cpu = scheduler.config.limits.max_cpu,
            max_memory = scheduler.config.limits.max_memory,
            quorum = %scheduler.config.default_quorum.quorum_id,
            "Job scheduler started"
        );
        scheduler
    }

    /// Accept a job. It is scheduled immediately when the host has capacity,
    /// otherwise it is parked in the waiting queue until capacity returns.
    pub async fn submit_job(&self, job: Job) -> Result<()> {
        if self.shutdown.is_cancelled() {
            return Err(SchedulerError::Stopped);
        }
        if !job.has_valid_schedule() {
            return Err(SchedulerError::InvalidSchedule {
                time_interval: job.time_interval,
                time_frame: job.time_frame,
            });
        }

        if self.monitor.has_capacity().await {
            return self.schedule_job(job).await;
        }

        let state = self.state.read().await;
        let mut waiting = self.waiting.lock().await;
        if state.jobs.contains(&job.job_id) || waiting.contains(&job.job_id) {
            return Err(SchedulerError::DuplicateJob(job.job_id));
        }

        let estimated_start =
            state.estimate_wait(Utc::now(), self.config.default_wait_estimate);
        let job_id = job.job_id.clone();
        waiting.push(job, estimated_start);

        tracing::info!(
            job_id = %job_id,
            position = waiting.len(),
            estimated_start = %estimated_start,
            "System at capacity, job added to waiting queue"
        );
        Ok(())
    }

    /// Admit a job into the registry and start its recurring trigger.
    async fn schedule_job(&self, job: Job) -> Result<()> {
        {
            let mut state = self.state.write().await;
            if state.jobs.contains(&job.job_id) || self.waiting.lock().await.contains(&job.job_id)
            {
                return Err(SchedulerError::DuplicateJob(job.job_id));
            }
            state.jobs.insert(job.clone());
        }
        self.register_trigger(&job).await?;

        tracing::info!(
            job_id = %job.job_id,
            interval_secs = job.time_interval,
            time_frame_secs = job.time_frame,
            max_retries = job.max_retries,
            "Job scheduled"
        );
        Ok(())
    }

    /// Admitted jobs without a trigger would never run, so they are dropped.
    async fn register_trigger(&self, job: &Job) -> Result<()> {
        if let Err(e) = self.triggers.register(job).await {
            self.state.write().await.jobs.remove(&job.job_id);
            tracing::error!(job_id = %job.job_id, error = %e, "Failed to register job trigger");
            return Err(e);
        }
        Ok(())
    }

    /// Move the head of the waiting queue into the registry if the host has
    /// capacity. Returns `None` when nothing was attempted.
    ///
    /// A job whose admission fails is dropped, not put back.
    pub async fn promote_next(&self) -> Option<Result<String>> {
        if !self.monitor.has_capacity().await {
            return None;
        }

        let job = {
            let mut state = self.state.write().await;
            let mut waiting = self.waiting.lock().await;
            let next = waiting.pop_front()?;
            if !state.jobs.insert(next.job.clone()) {
                tracing::error!(
                    job_id = %next.job.job_id,
                    "Waiting job already admitted, dropping"
                );
                return Some(Err(SchedulerError::DuplicateJob(next.job.job_id)));
            }
            next.job
        };

        if let Err(e) = self.register_trigger(&job).await {
            return Some(Err(e));
        }
        tracing::info!(job_id = %job.job_id, "Job promoted from waiting queue");
        Some(Ok(job.job_id))
    }

    async fn promotion_loop(self: Arc<Self>) {
        let period = self.config.promotion_interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    self.promote_next().await;
                }
            }
        }
        tracing::debug!("Promotion loop stopped");
    }

    /// Evict completed and failed jobs last executed before the retention
    /// window, and pending jobs whose time frame ended before it. Their
    /// triggers are cancelled. Returns the evicted ids.
    pub async fn sweep_finished_jobs(&self) -> Vec<String> {
        let retention = chrono::Duration::from_std(self.config.finished_job_retention)
            .unwrap_or_else(|_| chrono::Duration::hours(1));
        let cutoff = Utc::now() - retention;

        let removed = self.state.write().await.jobs.cleanup_finished_jobs(cutoff);
        for job_id in &removed {
            self.triggers.cancel(job_id).await;
        }
        if !removed.is_empty() {
            tracing::info!(count = removed.len(), "Evicted finished jobs");
        }
        removed
    }

    async fn retention_loop(self: Arc<Self>) {
        let period = self.config.retention_sweep_interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    self.sweep_finished_jobs().await;
                }
            }
        }
        tracing::debug!("Retention sweeper stopped");
    }

    /// Details of an accepted job, whether admitted or still waiting.
    pub async fn get_job_details(&self, job_id: &str) -> Result<JobDetails> {
        let state = self.state.read().await;
        if let Some(job) = state.jobs.get_job(job_id) {
            return Ok(job.details());
        }
        let waiting = self.waiting.lock().await;
        waiting
            .get(job_id)
            .map(Job::details)
            .ok_or_else(|| SchedulerError::NotFound(job_id.to_string()))
    }

    pub async fn get_queue_status(&self) -> QueueStatus {
        let resources = self.monitor.snapshot().await;
        let active_jobs = self.state.read().await.jobs.len();
        let waiting_jobs = self.waiting.lock().await.len();
        let ready_jobs = self.ready_tx.max_capacity() - self.ready_tx.capacity();

        QueueStatus {
            active_jobs,
            waiting_jobs,
            ready_jobs,
            cpu_usage: resources.cpu_usage,
            memory_usage: resources.memory_usage,
        }
    }

    pub async fn get_system_metrics(&self) -> SystemResources {
        self.monitor.snapshot().await
    }

    /// Replace both thresholds; takes effect on the next admission decision.
    pub async fn set_resource_limits(&self, max_cpu: f64, max_memory: f64) {
        self.monitor.set_limits(max_cpu, max_memory).await;
    }

    pub async fn waiting_jobs(&self) -> Vec<WaitingJobInfo> {
        self.waiting.lock().await.snapshot()
    }

    /// All admitted jobs, oldest first.
    pub async fn list_jobs(&self) -> Vec<JobDetails> {
        let state = self.state.read().await;
        state.jobs.all_jobs().into_iter().map(Job::details).collect()
    }

    pub async fn has_active_trigger(&self, job_id: &str) -> bool {
        self.triggers.is_registered(job_id).await
    }

    pub async fn add_quorum(&self, quorum: Quorum) {
        tracing::info!(
            quorum_id = %quorum.quorum_id,
            nodes = quorum.active_nodes.len(),
            "Quorum registered"
        );
        self.state.write().await.quorums.upsert(quorum);
    }

    pub async fn set_active_keepers(&self, quorum_id: &str, keepers: Vec<String>) -> Result<()> {
        let mut state = self.state.write().await;
        let quorum = state
            .quorums
            .get_mut(quorum_id)
            .ok_or_else(|| SchedulerError::QuorumNotFound(quorum_id.to_string()))?;
        quorum.set_active_nodes(keepers);
        tracing::info!(quorum_id, nodes = quorum.active_nodes.len(), "Active keepers updated");
        Ok(())
    }

    pub async fn quorum(&self, quorum_id: &str) -> Option<Quorum> {
        self.state.read().await.quorums.get(quorum_id).cloned()
    }

    pub fn is_stopped(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Stop accepting work, cancel every trigger and wait for workers to
    /// finish the attempt they are on. Safe to call more than once.
    pub async fn stop(&self) {
        self.shutdown.cancel();
        self.triggers.stop().await;

        if let Some(workers) = self.workers.lock().await.take() {
            workers.join().await;
        }
        let background: Vec<_> = self.background.lock().await.drain(..).collect();
        for handle in background {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Background task panicked");
            }
        }
        tracing::info!("Job scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::SimulatedDispatcher;
    use crate::resources::SampleError;
    use crate::scheduler::JobStatus;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Duration;

    /// Sampler whose CPU reading can be changed from the test
    #[derive(Default)]
    struct AdjustableSampler {
        cpu: AtomicU64,
    }

    impl AdjustableSampler {
        fn set_cpu(&self, value: f64) {
            self.cpu.store(value.to_bits(), Ordering::SeqCst);
        }
    }

    impl ResourceSampler for AdjustableSampler {
        fn sample_cpu(&self) -> std::result::Result<f64, SampleError> {
            Ok(f64::from_bits(self.cpu.load(Ordering::SeqCst)))
        }

        fn sample_memory(&self) -> std::result::Result<f64, SampleError> {
            Ok(10.0)
        }
    }

    async fn scheduler(cpu: f64) -> (Arc<JobScheduler>, Arc<AdjustableSampler>) {
        let sampler = Arc::new(AdjustableSampler::default());
        sampler.set_cpu(cpu);
        let dispatcher = SimulatedDispatcher::new(1.0).with_delay(Duration::ZERO, Duration::ZERO);
        let deps = SchedulerDeps::new(Arc::new(dispatcher)).with_sampler(sampler.clone());
        let config = SchedulerConfig::new(2)
            .with_intervals(Duration::from_secs(3600), Duration::from_secs(3600))
            .with_initial_delay(Duration::from_secs(3600));
        (JobScheduler::start(config, deps).await, sampler)
    }

    #[tokio::test]
    async fn invalid_schedule_is_rejected() {
        let (scheduler, _) = scheduler(1.0).await;
        let err = scheduler.submit_job(Job::new("bad", 0, 60)).await.unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidSchedule { time_interval: 0, .. }));
        let err = scheduler.submit_job(Job::new("bad", 5, -1)).await.unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidSchedule { .. }));
        assert_eq!(scheduler.get_queue_status().await.active_jobs, 0);
        scheduler.stop().await;
    }

    #[tokio::test]
    async fn admitted_job_is_pending_with_trigger() {
        let (scheduler, _) = scheduler(1.0).await;
        scheduler.submit_job(Job::new("job_1", 5, 60)).await.unwrap();

        let details = scheduler.get_job_details("job_1").await.unwrap();
        assert_eq!(details.status, JobStatus::Pending);
        assert!(scheduler.has_active_trigger("job_1").await);

        let err = scheduler.submit_job(Job::new("job_1", 5, 60)).await.unwrap_err();
        assert!(matches!(err, SchedulerError::DuplicateJob(_)));
        scheduler.stop().await;
    }

    #[tokio::test]
    async fn pressure_parks_jobs_and_promotion_is_fifo() {
        let (scheduler, sampler) = scheduler(95.0).await;
        for id in ["w1", "w2"] {
            scheduler.submit_job(Job::new(id, 5, 60)).await.unwrap();
        }

        let status = scheduler.get_queue_status().await;
        assert_eq!(status.active_jobs, 0);
        assert_eq!(status.waiting_jobs, 2);
        assert_eq!(status.cpu_usage, 95.0);
        assert!(scheduler.promote_next().await.is_none());

        let waiting = scheduler.get_job_details("w2").await.unwrap();
        assert_eq!(waiting.status, JobStatus::Pending);

        sampler.set_cpu(1.0);
        scheduler.monitor.sample().await;

        let first = scheduler.promote_next().await.unwrap().unwrap();
        assert_eq!(first, "w1");
        let status = scheduler.get_queue_status().await;
        assert_eq!(status.active_jobs, 1);
        assert_eq!(status.waiting_jobs, 1);

        assert_eq!(scheduler.promote_next().await.unwrap().unwrap(), "w2");
        assert!(scheduler.promote_next().await.is_none());
        scheduler.stop().await;
    }

    #[tokio::test]
    async fn raising_limits_readmits_jobs() {
        let (scheduler, _) = scheduler(50.0).await;
        scheduler.submit_job(Job::new("held", 5, 60)).await.unwrap();
        assert_eq!(scheduler.waiting_jobs().await.len(), 1);

        scheduler.set_resource_limits(90.0, 90.0).await;
        assert_eq!(scheduler.get_system_metrics().await.max_cpu, 90.0);
        assert_eq!(scheduler.promote_next().await.unwrap().unwrap(), "held");
        assert!(scheduler.waiting_jobs().await.is_empty());
        scheduler.stop().await;
    }

    #[tokio::test]
    async fn keepers_can_be_replaced() {
        let (scheduler, _) = scheduler(1.0).await;
        scheduler
            .set_active_keepers("default", vec!["k1".to_string(), "k1".to_string()])
            .await
            .unwrap();
        let quorum = scheduler.quorum("default").await.unwrap();
        assert_eq!(quorum.active_nodes, vec!["k1".to_string()]);

        let err = scheduler.set_active_keepers("missing", Vec::new()).await.unwrap_err();
        assert!(matches!(err, SchedulerError::QuorumNotFound(_)));

        scheduler.add_quorum(Quorum::new("eu", "chain_2", vec!["k9".to_string()])).await;
        assert!(scheduler.quorum("eu").await.is_some());
        scheduler.stop().await;
    }

    #[tokio::test]
    async fn stopped_scheduler_refuses_jobs() {
        let (scheduler, _) = scheduler(1.0).await;
        scheduler.stop().await;
        scheduler.stop().await;
        assert!(scheduler.is_stopped());
        let err = scheduler.submit_job(Job::new("late", 5, 60)).await.unwrap_err();
        assert!(matches!(err, SchedulerError::Stopped));
    }
}
