use thiserror::Error;

use crate::network::DispatchError;

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("Invalid schedule: time interval ({time_interval}s) and time frame ({time_frame}s) must be positive and at most one year")]
    InvalidSchedule { time_interval: i64, time_frame: i64 },

    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("Job already accepted: {0}")]
    DuplicateJob(String),

    #[error("Quorum not found: {0}")]
    QuorumNotFound(String),

    #[error("No active keepers available in quorum {0}")]
    NoCapacityKeeper(String),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Failed to register recurring trigger for job {job_id}: {reason}")]
    SchedulingRegistration { job_id: String, reason: String },

    #[error("Scheduler is stopped")]
    Stopped,
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
