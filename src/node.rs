use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::{DashboardConfig, SchedulerConfig};
use crate::dashboard::{bind_dashboard, run_dashboard, DashboardState};
use crate::scheduler::{Job, JobScheduler, SchedulerDeps};

/// Process-level wiring: the scheduler, the optional dashboard, and the
/// shutdown sequence that ties them together.
pub struct ManagerNode {
    scheduler: Arc<JobScheduler>,
    dashboard: Option<DashboardConfig>,
}

impl ManagerNode {
    pub async fn start(
        config: SchedulerConfig,
        deps: SchedulerDeps,
        dashboard: Option<DashboardConfig>,
    ) -> Self {
        Self {
            scheduler: JobScheduler::start(config, deps).await,
            dashboard,
        }
    }

    pub fn scheduler(&self) -> Arc<JobScheduler> {
        self.scheduler.clone()
    }

    /// Submit the sample workload. Returns how many jobs were accepted.
    pub async fn submit_demo_jobs(&self) -> usize {
        let mut accepted = 0;
        for job in demo_jobs() {
            let job_id = job.job_id.clone();
            match self.scheduler.submit_job(job).await {
                Ok(()) => accepted += 1,
                Err(e) => tracing::warn!(job_id = %job_id, error = %e, "Demo job rejected"),
            }
        }
        tracing::info!(accepted, "Demo jobs submitted");
        accepted
    }

    /// Run until `shutdown` is cancelled, then stop the dashboard and drain
    /// the scheduler.
    ///
    /// Fails without waiting for shutdown if the dashboard cannot bind; the
    /// scheduler is stopped first.
    pub async fn run(self, shutdown: CancellationToken) -> std::io::Result<()> {
        let dashboard = match self.dashboard {
            Some(config) => match bind_dashboard(config.listen_addr).await {
                Ok(listener) => {
                    let state = DashboardState {
                        scheduler: self.scheduler.clone(),
                    };
                    Some(tokio::spawn(run_dashboard(
                        listener,
                        state,
                        shutdown.child_token(),
                    )))
                }
                Err(e) => {
                    self.scheduler.stop().await;
                    return Err(e);
                }
            },
            None => None,
        };

        shutdown.cancelled().await;
        tracing::info!("Shutting down manager node");

        self.scheduler.stop().await;
        if let Some(handle) = dashboard {
            match handle.await {
                Ok(result) => result?,
                Err(e) => tracing::error!(error = %e, "Dashboard task panicked"),
            }
        }
        Ok(())
    }
}

/// Ten recurring jobs with mixed windows, intervals and retry budgets.
pub fn demo_jobs() -> Vec<Job> {
    const SCHEDULES: [(i64, i64, u32); 10] = [
        (120, 15, 2),
        (60, 5, 3),
        (90, 30, 5),
        (75, 20, 3),
        (45, 10, 2),
        (100, 25, 4),
        (80, 15, 3),
        (70, 20, 2),
        (55, 10, 3),
        (65, 25, 4),
    ];

    SCHEDULES
        .iter()
        .enumerate()
        .map(|(i, &(time_frame, time_interval, max_retries))| {
            let job_id = format!("job_{}", i + 1);
            let contract = format!("0x123...{}", job_id);
            Job::new(job_id, time_interval, time_frame)
                .with_max_retries(max_retries)
                .with_owner("system_test", "chain_1")
                .with_target(contract, "execute")
                .with_cost(0.5, 1.0)
        })
        .collect()
}
