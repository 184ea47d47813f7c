//! Host resource sampling and the admission verdict derived from it.
//!
//! - [`ResourceSampler`]: source of CPU and memory percentages ([`SysinfoSampler`] for the local host)
//! - [`ResourceMonitor`]: sampling loop plus the `has_capacity` check used at admission

pub mod monitor;
pub mod sampler;

pub use monitor::{ResourceMonitor, SystemResources};
pub use sampler::{ResourceSampler, SampleError, SysinfoSampler};
