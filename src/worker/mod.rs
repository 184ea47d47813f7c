//! Job execution.
//!
//! - [`JobExecutor`]: runs one attempt of a job against a selected keeper and
//!   applies the retry policy
//! - [`WorkerPool`]: fixed set of workers draining the ready queue
//!
//! # Attempt Flow
//!
//! 1. A worker receives a job id from the ready queue
//! 2. [`JobExecutor::execute`] claims the job (`pending → processing`) and picks a keeper
//! 3. The job is dispatched with the state lock released
//! 4. The outcome moves the job to `completed`, back to `pending`, or to `failed`

pub mod executor;
pub mod pool;

pub use executor::{ExecutionResult, JobExecutor};
pub use pool::WorkerPool;
