use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::QuorumConfig;

pub const DEFAULT_QUORUM_ID: &str = "default";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuorumStatus {
    Active,
    Inactive,
}

/// A named group of keepers eligible to receive dispatched jobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quorum {
    pub quorum_id: String,
    /// Ordered set of keeper names; no duplicates
    pub active_nodes: Vec<String>,
    pub status: QuorumStatus,
    pub chain_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Quorum {
    pub fn new(
        quorum_id: impl Into<String>,
        chain_id: impl Into<String>,
        nodes: Vec<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            quorum_id: quorum_id.into(),
            active_nodes: dedup_preserving_order(nodes),
            status: QuorumStatus::Active,
            chain_id: chain_id.into(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn from_config(config: &QuorumConfig) -> Self {
        Self::new(
            config.quorum_id.clone(),
            config.chain_id.clone(),
            config.keepers.clone(),
        )
    }

    /// A quorum with no active nodes cannot service any job.
    pub fn can_service(&self) -> bool {
        self.status == QuorumStatus::Active && !self.active_nodes.is_empty()
    }

    pub fn set_active_nodes(&mut self, nodes: Vec<String>) {
        self.active_nodes = dedup_preserving_order(nodes);
        self.updated_at = Utc::now();
    }
}

fn dedup_preserving_order(nodes: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    nodes
        .into_iter()
        .filter(|n| seen.insert(n.clone()))
        .collect()
}

/// Mapping of quorum identifier to quorum membership
#[derive(Debug, Default)]
pub struct QuorumDirectory {
    quorums: HashMap<String, Quorum>,
}

impl QuorumDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Directory seeded with the configured default quorum.
    pub fn with_default(config: &QuorumConfig) -> Self {
        let mut directory = Self::new();
        directory.upsert(Quorum::from_config(config));
        directory
    }

    pub fn upsert(&mut self, quorum: Quorum) {
        self.quorums.insert(quorum.quorum_id.clone(), quorum);
    }

    pub fn get(&self, quorum_id: &str) -> Option<&Quorum> {
        self.quorums.get(quorum_id)
    }

    pub fn get_mut(&mut self, quorum_id: &str) -> Option<&mut Quorum> {
        self.quorums.get_mut(quorum_id)
    }

    pub fn len(&self) -> usize {
        self.quorums.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quorums.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_directory_has_default_quorum() {
        let directory = QuorumDirectory::with_default(&QuorumConfig::default());
        let quorum = directory.get(DEFAULT_QUORUM_ID).unwrap();
        assert_eq!(quorum.active_nodes, vec!["node1", "node2", "node3"]);
        assert_eq!(quorum.status, QuorumStatus::Active);
        assert!(quorum.can_service());
    }

    #[test]
    fn empty_quorum_cannot_service() {
        let quorum = Quorum::new("q", "chain_1", Vec::new());
        assert!(!quorum.can_service());
    }

    #[test]
    fn active_nodes_are_deduplicated_in_order() {
        let mut quorum = Quorum::new(
            "q",
            "chain_1",
            vec!["b".to_string(), "a".to_string(), "b".to_string()],
        );
        assert_eq!(quorum.active_nodes, vec!["b", "a"]);

        let before = quorum.updated_at;
        quorum.set_active_nodes(vec!["c".to_string(), "c".to_string()]);
        assert_eq!(quorum.active_nodes, vec!["c"]);
        assert!(quorum.updated_at >= before);
    }

    #[test]
    fn upsert_replaces_existing_quorum() {
        let mut directory = QuorumDirectory::new();
        directory.upsert(Quorum::new("q", "chain_1", vec!["a".to_string()]));
        directory.upsert(Quorum::new("q", "chain_2", vec!["b".to_string()]));
        assert_eq!(directory.len(), 1);
        assert_eq!(directory.get("q").unwrap().chain_id, "chain_2");
    }
}
