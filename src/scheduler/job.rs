use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    /// Completed and failed jobs never run again.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Processing => write!(f, "processing"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Longest accepted time frame or interval: one year, in seconds.
pub const MAX_SCHEDULE_SECS: i64 = 365 * 24 * 60 * 60;

/// A recurring on-chain action and its orchestration state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub job_id: String,
    pub user_id: String,
    pub chain_id: String,
    pub contract_address: String,
    pub target_function: String,
    pub arg_type: String,
    pub arguments: Vec<String>,
    pub job_cost_prediction: f64,
    pub stake: f64,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    /// Seconds the job stays eligible for firing, counted from `created_at`
    pub time_frame: i64,
    /// Seconds between firings
    pub time_interval: i64,
    pub max_retries: u32,
    pub current_retries: u32,
    pub last_executed: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl Job {
    pub fn new(job_id: impl Into<String>, time_interval: i64, time_frame: i64) -> Self {
        Self {
            job_id: job_id.into(),
            user_id: String::new(),
            chain_id: String::new(),
            contract_address: String::new(),
            target_function: String::new(),
            arg_type: String::new(),
            arguments: Vec::new(),
            job_cost_prediction: 0.0,
            stake: 0.0,
            status: JobStatus::Pending,
            created_at: Utc::now(),
            time_frame,
            time_interval,
            max_retries: 0,
            current_retries: 0,
            last_executed: None,
            error: None,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_owner(mut self, user_id: impl Into<String>, chain_id: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self.chain_id = chain_id.into();
        self
    }

    pub fn with_target(
        mut self,
        contract_address: impl Into<String>,
        target_function: impl Into<String>,
    ) -> Self {
        self.contract_address = contract_address.into();
        self.target_function = target_function.into();
        self
    }

    pub fn with_arguments(mut self, arg_type: impl Into<String>, arguments: Vec<String>) -> Self {
        self.arg_type = arg_type.into();
        self.arguments = arguments;
        self
    }

    pub fn with_cost(mut self, job_cost_prediction: f64, stake: f64) -> Self {
        self.job_cost_prediction = job_cost_prediction;
        self.stake = stake;
        self
    }

    pub fn has_valid_schedule(&self) -> bool {
        let accepted = 1..=MAX_SCHEDULE_SECS;
        accepted.contains(&self.time_interval) && accepted.contains(&self.time_frame)
    }

    /// True once `now - created_at` exceeds the time frame. A frame too
    /// large to represent never elapses.
    pub fn has_aged_out(&self, now: DateTime<Utc>) -> bool {
        Duration::try_seconds(self.time_frame)
            .is_some_and(|frame| now.signed_duration_since(self.created_at) > frame)
    }

    /// Expected completion of an in-flight attempt, used for wait estimates.
    pub fn expected_completion(&self) -> Option<DateTime<Utc>> {
        let frame = Duration::try_seconds(self.time_frame)?;
        self.last_executed?.checked_add_signed(frame)
    }

    pub fn details(&self) -> JobDetails {
        JobDetails {
            job_id: self.job_id.clone(),
            status: self.status,
            created_at: self.created_at,
            last_executed: self.last_executed,
            current_retries: self.current_retries,
            max_retries: self.max_retries,
            time_frame: self.time_frame,
            time_interval: self.time_interval,
            error: self.error.clone(),
        }
    }
}

/// Read-only view of a job returned to observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDetails {
    pub job_id: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub last_executed: Option<DateTime<Utc>>,
    pub current_retries: u32,
    pub max_retries: u32,
    pub time_frame: i64,
    pub time_interval: i64,
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_job_is_pending() {
        let job = Job::new("job_1", 5, 20).with_max_retries(2);
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.current_retries, 0);
        assert_eq!(job.max_retries, 2);
        assert!(job.last_executed.is_none());
        assert!(job.error.is_none());
    }

    #[test]
    fn schedule_validation() {
        assert!(Job::new("a", 5, 20).has_valid_schedule());
        assert!(!Job::new("b", 0, 20).has_valid_schedule());
        assert!(!Job::new("c", 5, 0).has_valid_schedule());
        assert!(!Job::new("d", -1, 20).has_valid_schedule());

        assert!(Job::new("e", MAX_SCHEDULE_SECS, MAX_SCHEDULE_SECS).has_valid_schedule());
        assert!(!Job::new("f", 1, MAX_SCHEDULE_SECS + 1).has_valid_schedule());
        assert!(!Job::new("g", i64::MAX, 60).has_valid_schedule());
        assert!(!Job::new("h", 1, i64::MAX).has_valid_schedule());
    }

    #[test]
    fn unrepresentable_time_frame_does_not_panic() {
        let mut job = Job::new("huge", 1, i64::MAX);
        assert!(!job.has_aged_out(Utc::now()));

        job.last_executed = Some(Utc::now());
        assert!(job.expected_completion().is_none());
    }

    #[test]
    fn aged_out_after_time_frame() {
        let mut job = Job::new("a", 5, 20);
        job.created_at = Utc::now() - Duration::seconds(21);
        assert!(job.has_aged_out(Utc::now()));

        job.created_at = Utc::now() - Duration::seconds(10);
        assert!(!job.has_aged_out(Utc::now()));
    }

    #[test]
    fn terminal_statuses() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
    }

    #[test]
    fn status_serializes_lowercase() {
        let json = serde_json::to_string(&JobStatus::Processing).unwrap();
        assert_eq!(json, "\"processing\"");
        assert_eq!(JobStatus::Failed.to_string(), "failed");
    }

    #[test]
    fn expected_completion_uses_last_executed() {
        let mut job = Job::new("a", 5, 30);
        assert!(job.expected_completion().is_none());

        let at = Utc::now();
        job.last_executed = Some(at);
        assert_eq!(job.expected_completion(), Some(at + Duration::seconds(30)));
    }
}
