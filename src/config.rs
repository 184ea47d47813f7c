use std::net::SocketAddr;
use std::time::Duration;

/// CPU and memory ceilings (percent) above which admission is refused.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceLimits {
    pub max_cpu: f64,
    pub max_memory: f64,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_cpu: 10.0,
            max_memory: 80.0,
        }
    }
}

/// Membership of the quorum created when the scheduler starts.
#[derive(Debug, Clone)]
pub struct QuorumConfig {
    pub quorum_id: String,
    pub chain_id: String,
    pub keepers: Vec<String>,
}

impl Default for QuorumConfig {
    fn default() -> Self {
        Self {
            quorum_id: "default".to_string(),
            chain_id: "chain_1".to_string(),
            keepers: vec![
                "node1".to_string(),
                "node2".to_string(),
                "node3".to_string(),
            ],
        }
    }
}

/// Configuration for the observability HTTP API.
#[derive(Debug, Clone)]
pub struct DashboardConfig {
    pub listen_addr: SocketAddr,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Number of concurrent workers draining the ready queue
    pub workers_count: usize,
    /// Capacity of the ready queue; a full queue stalls trigger firings
    pub ready_queue_capacity: usize,
    /// How often host CPU and memory are sampled
    pub metrics_interval: Duration,
    /// How often the waiting queue is re-evaluated against capacity
    pub promotion_interval: Duration,
    /// Delay before the first firing of a newly scheduled job
    pub initial_delay: Duration,
    /// Wait estimate used when no job is currently processing
    pub default_wait_estimate: Duration,
    /// How long completed and failed jobs stay in the registry
    pub finished_job_retention: Duration,
    /// How often finished jobs are swept from the registry
    pub retention_sweep_interval: Duration,
    pub limits: ResourceLimits,
    pub default_quorum: QuorumConfig,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            workers_count: 5,
            ready_queue_capacity: 1000,
            metrics_interval: Duration::from_secs(5),
            promotion_interval: Duration::from_secs(5),
            initial_delay: Duration::from_secs(2),
            default_wait_estimate: Duration::from_secs(30),
            finished_job_retention: Duration::from_secs(3600),
            retention_sweep_interval: Duration::from_secs(60),
            limits: ResourceLimits::default(),
            default_quorum: QuorumConfig::default(),
        }
    }
}

impl SchedulerConfig {
    pub fn new(workers_count: usize) -> Self {
        Self {
            workers_count,
            ..Default::default()
        }
    }

    pub fn with_limits(mut self, max_cpu: f64, max_memory: f64) -> Self {
        self.limits = ResourceLimits {
            max_cpu,
            max_memory,
        };
        self
    }

    pub fn with_keepers(mut self, keepers: Vec<String>) -> Self {
        self.default_quorum.keepers = keepers;
        self
    }

    pub fn with_intervals(mut self, metrics: Duration, promotion: Duration) -> Self {
        self.metrics_interval = metrics;
        self.promotion_interval = promotion;
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_retention(mut self, retention: Duration, sweep_interval: Duration) -> Self {
        self.finished_job_retention = retention;
        self.retention_sweep_interval = sweep_interval;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_limits_default() {
        let limits = ResourceLimits::default();
        assert_eq!(limits.max_cpu, 10.0);
        assert_eq!(limits.max_memory, 80.0);
    }

    #[test]
    fn quorum_config_default() {
        let cfg = QuorumConfig::default();
        assert_eq!(cfg.quorum_id, "default");
        assert_eq!(cfg.chain_id, "chain_1");
        assert_eq!(cfg.keepers, vec!["node1", "node2", "node3"]);
    }

    #[test]
    fn dashboard_config_default() {
        let cfg = DashboardConfig::default();
        assert_eq!(cfg.listen_addr.to_string(), "127.0.0.1:8080");
    }

    #[test]
    fn scheduler_config_default() {
        let cfg = SchedulerConfig::default();
        assert_eq!(cfg.workers_count, 5);
        assert_eq!(cfg.ready_queue_capacity, 1000);
        assert_eq!(cfg.metrics_interval, Duration::from_secs(5));
        assert_eq!(cfg.promotion_interval, Duration::from_secs(5));
        assert_eq!(cfg.initial_delay, Duration::from_secs(2));
        assert_eq!(cfg.default_wait_estimate, Duration::from_secs(30));
        assert_eq!(cfg.finished_job_retention, Duration::from_secs(3600));
    }

    #[test]
    fn scheduler_config_builders() {
        let cfg = SchedulerConfig::new(2)
            .with_limits(50.0, 90.0)
            .with_keepers(vec!["k1".to_string()])
            .with_intervals(Duration::from_millis(10), Duration::from_millis(20))
            .with_initial_delay(Duration::from_millis(5))
            .with_retention(Duration::from_secs(1), Duration::from_millis(100));

        assert_eq!(cfg.workers_count, 2);
        assert_eq!(
            cfg.limits,
            ResourceLimits {
                max_cpu: 50.0,
                max_memory: 90.0
            }
        );
        assert_eq!(cfg.default_quorum.keepers, vec!["k1"]);
        assert_eq!(cfg.default_quorum.quorum_id, "default");
        assert_eq!(cfg.metrics_interval, Duration::from_millis(10));
        assert_eq!(cfg.promotion_interval, Duration::from_millis(20));
        assert_eq!(cfg.initial_delay, Duration::from_millis(5));
        assert_eq!(cfg.finished_job_retention, Duration::from_secs(1));
        assert_eq!(cfg.retention_sweep_interval, Duration::from_millis(100));
    }
}
