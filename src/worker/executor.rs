use std::sync::Arc;

use chrono::Utc;

use crate::error::SchedulerError;
use crate::network::Dispatcher;
use crate::scheduler::selector::KeeperSelector;
use crate::scheduler::state::{SchedulerState, SharedState};
use crate::scheduler::trigger::TriggerSet;
use crate::scheduler::{Job, JobStatus};

pub const NO_ACTIVE_KEEPERS: &str = "no active keepers available";

/// Result of one execution attempt
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResult {
    pub job_id: String,
    /// Status the job was left in after the attempt
    pub status: JobStatus,
    pub keeper: Option<String>,
    pub current_retries: u32,
    pub error: Option<String>,
}

impl ExecutionResult {
    fn from_job(job: &Job, keeper: Option<String>) -> Self {
        Self {
            job_id: job.job_id.clone(),
            status: job.status,
            keeper,
            current_retries: job.current_retries,
            error: job.error.clone(),
        }
    }
}

/// Drives a job through one attempt of its lifecycle:
/// `pending → processing → {completed, pending (retry), failed}`.
///
/// Status reads and writes happen under the scheduler state lock; the lock is
/// released while the job is being dispatched.
pub struct JobExecutor {
    state: SharedState,
    quorum_id: String,
    selector: Arc<dyn KeeperSelector>,
    dispatcher: Arc<dyn Dispatcher>,
    triggers: Arc<TriggerSet>,
}

impl JobExecutor {
    pub fn new(
        state: SharedState,
        quorum_id: impl Into<String>,
        selector: Arc<dyn KeeperSelector>,
        dispatcher: Arc<dyn Dispatcher>,
        triggers: Arc<TriggerSet>,
    ) -> Self {
        Self {
            state,
            quorum_id: quorum_id.into(),
            selector,
            dispatcher,
            triggers,
        }
    }

    /// Run one attempt of `job_id`. Returns `None` when the job is unknown or
    /// not pending (finished, or already owned by another worker).
    pub async fn execute(&self, worker_id: usize, job_id: &str) -> Option<ExecutionResult> {
        let claim = self.claim(job_id).await?;
        let (keeper, snapshot) = match claim {
            Ok(claimed) => claimed,
            Err(result) => {
                self.triggers.cancel(job_id).await;
                tracing::error!(
                    worker_id,
                    job_id,
                    error = %SchedulerError::NoCapacityKeeper(self.quorum_id.clone()),
                    "Job failed"
                );
                return Some(result);
            }
        };

        tracing::info!(
            worker_id,
            job_id,
            keeper = %keeper,
            target = %snapshot.target_function,
            chain_id = %snapshot.chain_id,
            "Processing job"
        );

        let outcome = self.dispatcher.dispatch(&keeper, &snapshot).await;
        self.selector.release(&keeper);

        let failure = match outcome {
            Ok(ack) if ack.executed => None,
            Ok(ack) => Some(
                ack.error
                    .unwrap_or_else(|| "keeper reported execution failure".to_string()),
            ),
            Err(e) => Some(SchedulerError::from(e).to_string()),
        };

        let result = self.record_outcome(job_id, &keeper, failure).await?;

        match result.status {
            JobStatus::Completed => {
                self.triggers.cancel(job_id).await;
                tracing::info!(worker_id, job_id, keeper = %keeper, "Job completed");
            }
            JobStatus::Failed => {
                self.triggers.cancel(job_id).await;
                tracing::error!(
                    worker_id,
                    job_id,
                    retries = result.current_retries,
                    error = ?result.error,
                    "Job failed"
                );
            }
            _ => {
                tracing::warn!(
                    worker_id,
                    job_id,
                    retries = result.current_retries,
                    error = ?result.error,
                    "Job attempt failed, will retry on next firing"
                );
            }
        }

        Some(result)
    }

    /// Move a pending job to processing and pick its keeper. A quorum without
    /// active keepers fails the job terminally.
    async fn claim(&self, job_id: &str) -> Option<Result<(String, Job), ExecutionResult>> {
        let mut state = self.state.write().await;
        let SchedulerState { jobs, quorums } = &mut *state;

        let job = jobs.get_job_mut(job_id)?;
        if job.status != JobStatus::Pending {
            return None;
        }

        job.status = JobStatus::Processing;
        job.last_executed = Some(Utc::now());

        let keeper = quorums
            .get(&self.quorum_id)
            .filter(|quorum| quorum.can_service())
            .and_then(|quorum| self.selector.select(quorum));

        Some(match keeper {
            Some(keeper) => Ok((keeper, job.clone())),
            None => {
                job.status = JobStatus::Failed;
                job.error = Some(NO_ACTIVE_KEEPERS.to_string());
                Err(ExecutionResult::from_job(job, None))
            }
        })
    }

    async fn record_outcome(
        &self,
        job_id: &str,
        keeper: &str,
        failure: Option<String>,
    ) -> Option<ExecutionResult> {
        let mut state = self.state.write().await;
        let job = state.jobs.get_job_mut(job_id)?;

        match failure {
            None => {
                job.status = JobStatus::Completed;
                job.error = None;
            }
            Some(reason) => {
                if job.current_retries < job.max_retries {
                    job.current_retries += 1;
                }
                if job.current_retries >= job.max_retries {
                    job.status = JobStatus::Failed;
                    job.error = Some(format!("maximum retries exceeded: {}", reason));
                } else {
                    job.status = JobStatus::Pending;
                    job.error = Some(reason);
                }
            }
        }

        Some(ExecutionResult::from_job(job, Some(keeper.to_string())))
    }
}
