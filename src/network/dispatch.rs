use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::network::discovery::{Discovery, PeerDirectory};
use crate::network::DispatchError;
use crate::scheduler::Job;

const DEFAULT_DISPATCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Payload delivered to a keeper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobMessage {
    pub message_id: Uuid,
    pub keeper: String,
    pub job: Job,
    pub sent_at: DateTime<Utc>,
}

impl JobMessage {
    pub fn new(keeper: &str, job: &Job) -> Self {
        Self {
            message_id: Uuid::new_v4(),
            keeper: keeper.to_string(),
            job: job.clone(),
            sent_at: Utc::now(),
        }
    }
}

/// Keeper's answer to a dispatched job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeeperAck {
    pub executed: bool,
    #[serde(default)]
    pub error: Option<String>,
}

impl KeeperAck {
    pub fn executed() -> Self {
        Self {
            executed: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            executed: false,
            error: Some(error.into()),
        }
    }
}

/// Delivers a job to a selected keeper and reports the execution outcome.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(&self, keeper: &str, job: &Job) -> Result<KeeperAck, DispatchError>;
}

/// Resolves the keeper through [`Discovery`] and POSTs a [`JobMessage`] as
/// JSON to `<keeper>/job`, expecting a [`KeeperAck`] body.
#[derive(Clone)]
pub struct NetworkDispatcher {
    discovery: Discovery,
    client: reqwest::Client,
    timeout: Duration,
}

impl NetworkDispatcher {
    pub fn new(directory: Arc<dyn PeerDirectory>) -> Self {
        Self {
            discovery: Discovery::new(directory),
            client: reqwest::Client::new(),
            timeout: DEFAULT_DISPATCH_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl Dispatcher for NetworkDispatcher {
    async fn dispatch(&self, keeper: &str, job: &Job) -> Result<KeeperAck, DispatchError> {
        let peer = self.discovery.resolve(keeper).await?;
        let message = JobMessage::new(keeper, job);
        let url = format!("{}/job", peer.base_url());

        tracing::debug!(
            job_id = %job.job_id,
            keeper,
            message_id = %message.message_id,
            url = %url,
            "Sending job to keeper"
        );

        let response = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .json(&message)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    DispatchError::Connect {
                        keeper: keeper.to_string(),
                        reason: e.to_string(),
                    }
                } else {
                    DispatchError::Delivery {
                        keeper: keeper.to_string(),
                        reason: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(DispatchError::Rejected {
                keeper: keeper.to_string(),
                reason: format!("HTTP {}", status),
            });
        }

        response
            .json::<KeeperAck>()
            .await
            .map_err(|e| DispatchError::Delivery {
                keeper: keeper.to_string(),
                reason: format!("invalid acknowledgement: {}", e),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ack_defaults_error_to_none() {
        let ack: KeeperAck = serde_json::from_str(r#"{"executed": true}"#).unwrap();
        assert_eq!(ack, KeeperAck::executed());
    }

    #[test]
    fn job_message_carries_job_snapshot() {
        let job = Job::new("job_1", 5, 20).with_target("0xabc", "execute");
        let message = JobMessage::new("node1", &job);
        assert_eq!(message.keeper, "node1");
        assert_eq!(message.job.job_id, "job_1");
        assert_eq!(message.job.target_function, "execute");

        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["job"]["status"], "pending");
    }
}
