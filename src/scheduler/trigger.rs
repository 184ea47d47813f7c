use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, Mutex};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::error::{Result, SchedulerError};
use crate::scheduler::job::{Job, JobStatus, MAX_SCHEDULE_SECS};
use crate::scheduler::state::SharedState;

/// What a single timer firing did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireOutcome {
    /// Job pushed onto the ready queue
    Enqueued,
    /// Job is mid-attempt; nothing pushed this time
    Skipped,
    /// Job aged out, finished or disappeared; the timer stops
    Expired,
}

#[derive(Debug)]
struct TimerEntry {
    generation: u64,
    token: CancellationToken,
}

/// Cancellable per-job periodic timers keyed by job identifier.
///
/// Each registered job gets a task that fires once after `initial_delay` and
/// then every `time_interval` seconds, pushing the job id onto the ready
/// queue while the job is pending and inside its time frame.
pub struct TriggerSet {
    timers: Arc<Mutex<HashMap<String, TimerEntry>>>,
    generation: AtomicU64,
    state: SharedState,
    ready_tx: mpsc::Sender<String>,
    initial_delay: Duration,
    shutdown: CancellationToken,
}

impl TriggerSet {
    pub fn new(
        state: SharedState,
        ready_tx: mpsc::Sender<String>,
        initial_delay: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            timers: Arc::new(Mutex::new(HashMap::new())),
            generation: AtomicU64::new(0),
            state,
            ready_tx,
            initial_delay,
            shutdown,
        }
    }

    /// Start the recurring timer for `job`.
    pub async fn register(&self, job: &Job) -> Result<()> {
        let registration_error = |reason: &str| SchedulerError::SchedulingRegistration {
            job_id: job.job_id.clone(),
            reason: reason.to_string(),
        };

        if self.shutdown.is_cancelled() {
            return Err(registration_error("trigger scheduler is stopped"));
        }
        let period = u64::try_from(job.time_interval)
            .ok()
            .filter(|secs| (1..=MAX_SCHEDULE_SECS.unsigned_abs()).contains(secs))
            .map(Duration::from_secs)
            .ok_or_else(|| registration_error("time interval is out of range"))?;

        let mut timers = self.timers.lock().await;
        if timers.contains_key(&job.job_id) {
            return Err(registration_error("a timer is already registered for this job"));
        }

        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let token = self.shutdown.child_token();
        timers.insert(
            job.job_id.clone(),
            TimerEntry {
                generation,
                token: token.clone(),
            },
        );
        drop(timers);

        let timer = JobTimer {
            job_id: job.job_id.clone(),
            period,
            initial_delay: self.initial_delay,
            state: self.state.clone(),
            ready_tx: self.ready_tx.clone(),
            token,
        };
        let timers = self.timers.clone();
        tokio::spawn(async move {
            timer.run().await;
            let mut timers = timers.lock().await;
            if timers
                .get(&timer.job_id)
                .is_some_and(|entry| entry.generation == generation)
            {
                timers.remove(&timer.job_id);
            }
        });

        tracing::debug!(
            job_id = %job.job_id,
            interval_secs = period.as_secs(),
            "Trigger registered"
        );
        Ok(())
    }

    /// Cancel the timer for `job_id`. Returns false if none was registered.
    pub async fn cancel(&self, job_id: &str) -> bool {
        match self.timers.lock().await.remove(job_id) {
            Some(entry) => {
                entry.token.cancel();
                tracing::debug!(job_id, "Trigger cancelled");
                true
            }
            None => false,
        }
    }

    pub async fn is_registered(&self, job_id: &str) -> bool {
        self.timers.lock().await.contains_key(job_id)
    }

    pub async fn len(&self) -> usize {
        self.timers.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Cancel every timer and refuse further registrations.
    pub async fn stop(&self) {
        self.shutdown.cancel();
        let mut timers = self.timers.lock().await;
        for (_, entry) in timers.drain() {
            entry.token.cancel();
        }
    }
}

struct JobTimer {
    job_id: String,
    period: Duration,
    initial_delay: Duration,
    state: SharedState,
    ready_tx: mpsc::Sender<String>,
    token: CancellationToken,
}

impl JobTimer {
    async fn run(&self) {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => return,
            _ = tokio::time::sleep(self.initial_delay) => {}
        }
        if self.fire().await == FireOutcome::Expired {
            return;
        }

        let Some(start) = Instant::now().checked_add(self.period) else {
            tracing::warn!(job_id = %self.job_id, "Time interval out of range, timer stopping");
            return;
        };
        let mut ticker = tokio::time::interval_at(start, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.token.cancelled() => return,
                _ = ticker.tick() => {
                    if self.fire().await == FireOutcome::Expired {
                        return;
                    }
                }
            }
        }
    }

    async fn fire(&self) -> FireOutcome {
        let status = {
            let state = self.state.read().await;
            match state.jobs.get_job(&self.job_id) {
                Some(job) if job.has_aged_out(Utc::now()) => {
                    tracing::debug!(
                        job_id = %self.job_id,
                        "Job time frame elapsed, timer stopping"
                    );
                    return FireOutcome::Expired;
                }
                Some(job) => job.status,
                None => return FireOutcome::Expired,
            }
        };

        match status {
            JobStatus::Completed | JobStatus::Failed => FireOutcome::Expired,
            JobStatus::Processing => FireOutcome::Skipped,
            JobStatus::Pending => {
                // Blocks while the ready queue is full
                tokio::select! {
                    biased;
                    _ = self.token.cancelled() => FireOutcome::Expired,
                    sent = self.ready_tx.send(self.job_id.clone()) => match sent {
                        Ok(()) => {
                            tracing::debug!(job_id = %self.job_id, "Job enqueued for execution");
                            FireOutcome::Enqueued
                        }
                        Err(_) => FireOutcome::Expired,
                    },
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QuorumConfig;
    use crate::scheduler::state::SchedulerState;

    fn setup(capacity: usize) -> (SharedState, TriggerSet, mpsc::Receiver<String>) {
        let state = SchedulerState::shared(&QuorumConfig::default());
        let (tx, rx) = mpsc::channel(capacity);
        let triggers = TriggerSet::new(
            state.clone(),
            tx,
            Duration::from_millis(10),
            CancellationToken::new(),
        );
        (state, triggers, rx)
    }

    #[tokio::test]
    async fn initial_firing_enqueues_pending_job() {
        let (state, triggers, mut rx) = setup(10);
        let job = Job::new("job_1", 60, 600);
        state.write().await.jobs.insert(job.clone());

        triggers.register(&job).await.unwrap();
        let received = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap();
        assert_eq!(received.as_deref(), Some("job_1"));
        assert!(triggers.is_registered("job_1").await);
    }

    #[tokio::test]
    async fn duplicate_registration_is_rejected() {
        let (state, triggers, _rx) = setup(10);
        let job = Job::new("job_1", 60, 600);
        state.write().await.jobs.insert(job.clone());

        triggers.register(&job).await.unwrap();
        let err = triggers.register(&job).await.unwrap_err();
        assert!(matches!(err, SchedulerError::SchedulingRegistration { .. }));
    }

    #[tokio::test]
    async fn out_of_range_interval_is_not_registered() {
        let (state, triggers, _rx) = setup(10);
        let job = Job::new("huge", i64::MAX, 60);
        state.write().await.jobs.insert(job.clone());

        let err = triggers.register(&job).await.unwrap_err();
        assert!(matches!(err, SchedulerError::SchedulingRegistration { .. }));
        assert!(!triggers.is_registered("huge").await);
    }

    #[tokio::test]
    async fn aged_out_job_is_never_enqueued() {
        let (state, triggers, mut rx) = setup(10);
        let mut job = Job::new("old", 1, 5);
        job.created_at = Utc::now() - chrono::Duration::seconds(10);
        state.write().await.jobs.insert(job.clone());

        triggers.register(&job).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(rx.try_recv().is_err());
        assert!(!triggers.is_registered("old").await);
    }

    #[tokio::test]
    async fn terminal_job_stops_its_timer() {
        let (state, triggers, mut rx) = setup(10);
        let mut job = Job::new("done", 1, 600);
        job.status = JobStatus::Completed;
        state.write().await.jobs.insert(job.clone());

        triggers.register(&job).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(rx.try_recv().is_err());
        assert!(triggers.is_empty().await);
    }

    #[tokio::test]
    async fn cancel_and_stop() {
        let (state, triggers, _rx) = setup(10);
        let a = Job::new("a", 60, 600);
        let b = Job::new("b", 60, 600);
        {
            let mut state = state.write().await;
            state.jobs.insert(a.clone());
            state.jobs.insert(b.clone());
        }
        triggers.register(&a).await.unwrap();
        triggers.register(&b).await.unwrap();

        assert!(triggers.cancel("a").await);
        assert!(!triggers.cancel("a").await);
        assert_eq!(triggers.len().await, 1);

        triggers.stop().await;
        assert!(triggers.is_empty().await);
        let err = triggers.register(&a).await.unwrap_err();
        assert!(matches!(err, SchedulerError::SchedulingRegistration { .. }));
    }

    #[tokio::test]
    async fn full_ready_queue_blocks_until_drained() {
        let (state, triggers, mut rx) = setup(1);
        let a = Job::new("a", 60, 600);
        let b = Job::new("b", 60, 600);
        {
            let mut state = state.write().await;
            state.jobs.insert(a.clone());
            state.jobs.insert(b.clone());
        }
        triggers.register(&a).await.unwrap();
        triggers.register(&b).await.unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        let first = rx.recv().await.unwrap();
        let second = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        let mut got = vec![first, second];
        got.sort();
        assert_eq!(got, vec!["a", "b"]);
    }
}
