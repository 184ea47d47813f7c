use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::config::QuorumConfig;
use crate::scheduler::quorum::QuorumDirectory;
use crate::scheduler::registry::JobRegistry;

/// Job registry and quorum directory, guarded together by one lock.
#[derive(Debug, Default)]
pub struct SchedulerState {
    pub jobs: JobRegistry,
    pub quorums: QuorumDirectory,
}

pub type SharedState = Arc<RwLock<SchedulerState>>;

impl SchedulerState {
    pub fn new(default_quorum: &QuorumConfig) -> Self {
        Self {
            jobs: JobRegistry::new(),
            quorums: QuorumDirectory::with_default(default_quorum),
        }
    }

    pub fn shared(default_quorum: &QuorumConfig) -> SharedState {
        Arc::new(RwLock::new(Self::new(default_quorum)))
    }

    /// Earliest expected completion among processing jobs, or
    /// `now + default_wait` when nothing is processing.
    pub fn estimate_wait(&self, now: DateTime<Utc>, default_wait: Duration) -> DateTime<Utc> {
        self.jobs
            .processing_jobs()
            .iter()
            .filter_map(|job| job.expected_completion())
            .min()
            .unwrap_or_else(|| {
                now + chrono::Duration::from_std(default_wait)
                    .unwrap_or_else(|_| chrono::Duration::seconds(30))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::job::{Job, JobStatus};

    #[test]
    fn estimate_defaults_when_nothing_processing() {
        let state = SchedulerState::new(&QuorumConfig::default());
        let now = Utc::now();
        let estimate = state.estimate_wait(now, Duration::from_secs(30));
        assert_eq!(estimate, now + chrono::Duration::seconds(30));
    }

    #[test]
    fn estimate_uses_earliest_processing_completion() {
        let mut state = SchedulerState::new(&QuorumConfig::default());
        let now = Utc::now();

        let mut slow = Job::new("slow", 5, 120);
        slow.status = JobStatus::Processing;
        slow.last_executed = Some(now);

        let mut fast = Job::new("fast", 5, 60);
        fast.status = JobStatus::Processing;
        fast.last_executed = Some(now);

        let mut idle = Job::new("idle", 5, 1);
        idle.last_executed = Some(now);

        state.jobs.insert(slow);
        state.jobs.insert(fast);
        state.jobs.insert(idle);

        let estimate = state.estimate_wait(now, Duration::from_secs(30));
        assert_eq!(estimate, now + chrono::Duration::seconds(60));
    }
}
