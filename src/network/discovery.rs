use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::network::DispatchError;

/// Connection metadata of a keeper as stored in the peer directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerInfo {
    /// `host:port`, or a full `http://` base URL
    pub address: String,
    #[serde(default)]
    pub peer_id: Option<String>,
}

/// A resolved, connectable keeper
#[derive(Debug, Clone, PartialEq)]
pub struct PeerHandle {
    pub keeper: String,
    pub address: String,
    pub peer_id: Option<String>,
}

impl PeerHandle {
    pub fn base_url(&self) -> String {
        if self.address.starts_with("http://") || self.address.starts_with("https://") {
            self.address.trim_end_matches('/').to_string()
        } else {
            format!("http://{}", self.address)
        }
    }
}

/// Keyed mapping from keeper name to connection metadata.
#[async_trait]
pub trait PeerDirectory: Send + Sync {
    async fn load(&self) -> Result<HashMap<String, PeerInfo>, DispatchError>;
}

/// Peer directory backed by a JSON object file, re-read on every lookup so
/// edits are picked up without a restart.
#[derive(Debug, Clone)]
pub struct FilePeerDirectory {
    path: PathBuf,
}

impl FilePeerDirectory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl PeerDirectory for FilePeerDirectory {
    async fn load(&self) -> Result<HashMap<String, PeerInfo>, DispatchError> {
        let data = tokio::fs::read(&self.path).await.map_err(|e| {
            DispatchError::PeerDirectory(format!("{}: {}", self.path.display(), e))
        })?;
        serde_json::from_slice(&data).map_err(|e| {
            DispatchError::PeerDirectory(format!("{}: {}", self.path.display(), e))
        })
    }
}

/// In-memory peer directory
#[derive(Debug, Clone, Default)]
pub struct StaticPeerDirectory {
    peers: HashMap<String, PeerInfo>,
}

impl StaticPeerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_peer(mut self, keeper: impl Into<String>, address: impl Into<String>) -> Self {
        self.peers.insert(
            keeper.into(),
            PeerInfo {
                address: address.into(),
                peer_id: None,
            },
        );
        self
    }
}

#[async_trait]
impl PeerDirectory for StaticPeerDirectory {
    async fn load(&self) -> Result<HashMap<String, PeerInfo>, DispatchError> {
        Ok(self.peers.clone())
    }
}

/// Resolves keeper names to connectable handles.
#[derive(Clone)]
pub struct Discovery {
    directory: Arc<dyn PeerDirectory>,
}

impl Discovery {
    pub fn new(directory: Arc<dyn PeerDirectory>) -> Self {
        Self { directory }
    }

    pub async fn resolve(&self, keeper: &str) -> Result<PeerHandle, DispatchError> {
        let peers = self.directory.load().await?;
        let info = peers
            .get(keeper)
            .filter(|info| !info.address.trim().is_empty())
            .ok_or_else(|| DispatchError::PeerUnknown(keeper.to_string()))?;

        Ok(PeerHandle {
            keeper: keeper.to_string(),
            address: info.address.clone(),
            peer_id: info.peer_id.clone(),
        })
    }
}
