use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;

use crate::network::dispatch::{Dispatcher, KeeperAck};
use crate::network::DispatchError;
use crate::scheduler::Job;

/// Stand-in dispatcher that succeeds with a fixed probability after a random
/// delay. Intended for demos and load tests only; it never talks to a keeper.
#[derive(Debug, Clone)]
pub struct SimulatedDispatcher {
    success_rate: f64,
    min_delay: Duration,
    max_delay: Duration,
}

impl SimulatedDispatcher {
    /// `success_rate` is clamped to `0.0..=1.0`; NaN counts as never.
    pub fn new(success_rate: f64) -> Self {
        let success_rate = if success_rate.is_nan() {
            0.0
        } else {
            success_rate.clamp(0.0, 1.0)
        };
        Self {
            success_rate,
            min_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(4),
        }
    }

    pub fn with_delay(mut self, min: Duration, max: Duration) -> Self {
        self.min_delay = min;
        self.max_delay = max.max(min);
        self
    }
}

#[async_trait]
impl Dispatcher for SimulatedDispatcher {
    async fn dispatch(&self, keeper: &str, job: &Job) -> Result<KeeperAck, DispatchError> {
        let (delay, succeeded) = {
            let mut rng = rand::thread_rng();
            let delay = if self.max_delay > self.min_delay {
                rng.gen_range(self.min_delay..=self.max_delay)
            } else {
                self.min_delay
            };
            (delay, rng.gen_bool(self.success_rate))
        };

        tracing::debug!(
            job_id = %job.job_id,
            keeper,
            delay_ms = delay.as_millis() as u64,
            "Simulating job execution"
        );
        tokio::time::sleep(delay).await;

        if succeeded {
            Ok(KeeperAck::executed())
        } else {
            Ok(KeeperAck::failed("simulated execution failure"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn certain_outcomes() {
        let job = Job::new("j", 5, 20);

        let always = SimulatedDispatcher::new(1.0).with_delay(Duration::ZERO, Duration::ZERO);
        assert!(always.dispatch("node1", &job).await.unwrap().executed);

        let never = SimulatedDispatcher::new(0.0).with_delay(Duration::ZERO, Duration::ZERO);
        let ack = never.dispatch("node1", &job).await.unwrap();
        assert!(!ack.executed);
        assert!(ack.error.is_some());
    }

    #[test]
    fn success_rate_is_clamped() {
        assert_eq!(SimulatedDispatcher::new(3.0).success_rate, 1.0);
        assert_eq!(SimulatedDispatcher::new(-1.0).success_rate, 0.0);
        assert_eq!(SimulatedDispatcher::new(f64::INFINITY).success_rate, 1.0);
    }

    #[tokio::test]
    async fn nan_rate_always_fails() {
        let never = SimulatedDispatcher::new(f64::NAN).with_delay(Duration::ZERO, Duration::ZERO);
        assert_eq!(never.success_rate, 0.0);
        let ack = never.dispatch("node1", &Job::new("j", 5, 20)).await.unwrap();
        assert!(!ack.executed);
    }
}
