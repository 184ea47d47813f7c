//! Job lifecycle, admission control and recurring triggers.
//!
//! - [`job`]: the job record and its status machine
//! - [`registry`] / [`waiting`]: admitted jobs and jobs held back by resource pressure
//! - [`quorum`] / [`selector`]: keeper groups and how one keeper is picked per attempt
//! - [`trigger`]: per-job periodic timers feeding the ready queue
//! - [`engine`]: [`JobScheduler`], the handle tying these together with the worker pool

pub mod engine;
pub mod job;
pub mod quorum;
pub mod registry;
pub mod selector;
pub mod state;
pub mod trigger;
pub mod waiting;

pub use engine::{JobScheduler, QueueStatus, SchedulerDeps};
pub use job::{Job, JobDetails, JobStatus};
pub use quorum::{Quorum, QuorumStatus, DEFAULT_QUORUM_ID};
pub use registry::JobRegistry;
pub use selector::{KeeperSelector, LeastLoadedSelector, RandomSelector, RoundRobinSelector};
pub use waiting::{WaitingJobInfo, WaitingQueue};
