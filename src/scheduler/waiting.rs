use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::scheduler::job::Job;

/// A job held back at admission because the host was under pressure.
#[derive(Debug, Clone)]
pub struct WaitingJob {
    pub job: Job,
    /// Advisory only; promotion is decided by live capacity checks
    pub estimated_start: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaitingJobInfo {
    pub job_id: String,
    pub position: usize,
    pub estimated_start: DateTime<Utc>,
}

/// Strict FIFO of jobs rejected at admission time.
#[derive(Debug, Default)]
pub struct WaitingQueue {
    jobs: VecDeque<WaitingJob>,
}

impl WaitingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, job: Job, estimated_start: DateTime<Utc>) {
        self.jobs.push_back(WaitingJob {
            job,
            estimated_start,
        });
    }

    /// Remove and return the earliest-submitted job.
    pub fn pop_front(&mut self) -> Option<WaitingJob> {
        self.jobs.pop_front()
    }

    pub fn contains(&self, job_id: &str) -> bool {
        self.jobs.iter().any(|w| w.job.job_id == job_id)
    }

    pub fn get(&self, job_id: &str) -> Option<&Job> {
        self.jobs
            .iter()
            .map(|w| &w.job)
            .find(|job| job.job_id == job_id)
    }

    pub fn snapshot(&self) -> Vec<WaitingJobInfo> {
        self.jobs
            .iter()
            .enumerate()
            .map(|(position, w)| WaitingJobInfo {
                job_id: w.job.job_id.clone(),
                position,
                estimated_start: w.estimated_start,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}
