use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::scheduler::job::{Job, JobStatus};

/// Authoritative mapping of job identifier to job state
#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: HashMap<String, Job>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a job. Returns false, leaving the registry untouched, if the
    /// identifier is already present.
    pub fn insert(&mut self, job: Job) -> bool {
        if self.jobs.contains_key(&job.job_id) {
            return false;
        }
        self.jobs.insert(job.job_id.clone(), job);
        true
    }

    pub fn contains(&self, job_id: &str) -> bool {
        self.jobs.contains_key(job_id)
    }

    pub fn get_job(&self, job_id: &str) -> Option<&Job> {
        self.jobs.get(job_id)
    }

    pub fn get_job_mut(&mut self, job_id: &str) -> Option<&mut Job> {
        self.jobs.get_mut(job_id)
    }

    pub fn remove(&mut self, job_id: &str) -> Option<Job> {
        self.jobs.remove(job_id)
    }

    pub fn status(&self, job_id: &str) -> Option<JobStatus> {
        self.jobs.get(job_id).map(|j| j.status)
    }

    /// Jobs with an attempt currently in flight
    pub fn processing_jobs(&self) -> Vec<&Job> {
        self.jobs
            .values()
            .filter(|j| j.status == JobStatus::Processing)
            .collect()
    }

    /// Get all jobs sorted chronologically by creation time
    pub fn all_jobs(&self) -> Vec<&Job> {
        let mut jobs: Vec<&Job> = self.jobs.values().collect();
        jobs.sort_by_key(|j| j.created_at);
        jobs
    }

    /// Evict jobs that will never run again: completed and failed jobs whose
    /// last attempt happened before `cutoff`, and pending jobs whose time
    /// frame had already elapsed at `cutoff`. Returns the removed identifiers.
    pub fn cleanup_finished_jobs(&mut self, cutoff: DateTime<Utc>) -> Vec<String> {
        let expired: Vec<String> = self
            .jobs
            .values()
            .filter(|job| match job.status {
                JobStatus::Completed | JobStatus::Failed => {
                    job.last_executed.unwrap_or(job.created_at) < cutoff
                }
                JobStatus::Pending => job.has_aged_out(cutoff),
                // Mid-attempt; the outcome still has to be recorded
                JobStatus::Processing => false,
            })
            .map(|job| job.job_id.clone())
            .collect();

        for job_id in &expired {
            self.jobs.remove(job_id);
        }
        expired
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}
