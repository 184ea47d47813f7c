use std::sync::Mutex;

use sysinfo::System;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SampleError {
    #[error("Resource metric unavailable: {0}")]
    Unavailable(String),
}

/// Source of host utilization percentages. Failures are transient.
pub trait ResourceSampler: Send + Sync {
    fn sample_cpu(&self) -> Result<f64, SampleError>;
    fn sample_memory(&self) -> Result<f64, SampleError>;
}

/// Samples the local host through `sysinfo`.
///
/// CPU usage is computed from the difference between two refreshes, so the
/// same `System` is kept between samples and the first CPU reading after
/// construction may be zero.
pub struct SysinfoSampler {
    system: Mutex<System>,
}

impl SysinfoSampler {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu_usage();
        system.refresh_memory();
        Self {
            system: Mutex::new(system),
        }
    }
}

impl Default for SysinfoSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceSampler for SysinfoSampler {
    fn sample_cpu(&self) -> Result<f64, SampleError> {
        let mut system = self
            .system
            .lock()
            .map_err(|_| SampleError::Unavailable("sampler lock poisoned".to_string()))?;
        system.refresh_cpu_usage();

        let cpus = system.cpus();
        if cpus.is_empty() {
            return Err(SampleError::Unavailable("no CPUs reported".to_string()));
        }
        let total: f64 = cpus.iter().map(|cpu| cpu.cpu_usage() as f64).sum();
        Ok(total / cpus.len() as f64)
    }

    fn sample_memory(&self) -> Result<f64, SampleError> {
        let mut system = self
            .system
            .lock()
            .map_err(|_| SampleError::Unavailable("sampler lock poisoned".to_string()))?;
        system.refresh_memory();

        let total = system.total_memory();
        if total == 0 {
            return Err(SampleError::Unavailable("total memory reported as zero".to_string()));
        }
        Ok(system.used_memory() as f64 / total as f64 * 100.0)
    }
}
