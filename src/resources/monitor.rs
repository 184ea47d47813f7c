use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::config::ResourceLimits;
use crate::resources::sampler::ResourceSampler;

/// Most recent host utilization sample together with the admission limits.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SystemResources {
    pub cpu_usage: f64,
    pub memory_usage: f64,
    pub max_cpu: f64,
    pub max_memory: f64,
}

impl SystemResources {
    pub fn has_capacity(&self) -> bool {
        self.cpu_usage < self.max_cpu && self.memory_usage < self.max_memory
    }
}

/// Periodically samples CPU and memory and answers admission queries.
///
/// The snapshot is written only by [`ResourceMonitor::sample`] and read by
/// any actor; it has its own lock, independent of the scheduler state.
pub struct ResourceMonitor {
    sampler: Arc<dyn ResourceSampler>,
    snapshot: RwLock<SystemResources>,
    interval: Duration,
}

impl ResourceMonitor {
    pub fn new(
        sampler: Arc<dyn ResourceSampler>,
        limits: ResourceLimits,
        interval: Duration,
    ) -> Self {
        Self {
            sampler,
            snapshot: RwLock::new(SystemResources {
                cpu_usage: 0.0,
                memory_usage: 0.0,
                max_cpu: limits.max_cpu,
                max_memory: limits.max_memory,
            }),
            interval,
        }
    }

    pub async fn snapshot(&self) -> SystemResources {
        *self.snapshot.read().await
    }

    pub async fn has_capacity(&self) -> bool {
        self.snapshot.read().await.has_capacity()
    }

    /// Adjust thresholds without restarting the sampling loop.
    pub async fn set_limits(&self, max_cpu: f64, max_memory: f64) {
        let mut snapshot = self.snapshot.write().await;
        snapshot.max_cpu = max_cpu;
        snapshot.max_memory = max_memory;
        tracing::info!(max_cpu, max_memory, "Resource limits updated");
    }

    /// Take one sample. A failed reading keeps the previous value.
    pub async fn sample(&self) {
        let cpu = self.sampler.sample_cpu();
        let memory = self.sampler.sample_memory();

        let mut snapshot = self.snapshot.write().await;
        match cpu {
            Ok(value) => snapshot.cpu_usage = value,
            Err(e) => tracing::warn!(error = %e, "CPU sampling failed, keeping last sample"),
        }
        match memory {
            Ok(value) => snapshot.memory_usage = value,
            Err(e) => tracing::warn!(error = %e, "Memory sampling failed, keeping last sample"),
        }

        tracing::debug!(
            cpu = snapshot.cpu_usage,
            memory = snapshot.memory_usage,
            "System resources sampled"
        );
    }

    /// Sample on a fixed interval until `shutdown` is cancelled. The first
    /// sample is taken one interval after the call.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        let mut ticker =
            tokio::time::interval_at(tokio::time::Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    tracing::debug!("Resource monitor stopped");
                    return;
                }
                _ = ticker.tick() => self.sample().await,
            }
        }
    }
}
