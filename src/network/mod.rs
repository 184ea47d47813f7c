//! Delivery of jobs to keepers.
//!
//! - [`discovery`]: keeper name → connection metadata ([`PeerDirectory`]) and resolution ([`Discovery`])
//! - [`dispatch`]: the [`Dispatcher`] seam used by workers and its HTTP implementation
//! - [`simulated`]: probabilistic stand-in for demos

use thiserror::Error;

pub mod discovery;
pub mod dispatch;
pub mod simulated;

pub use discovery::{
    Discovery, FilePeerDirectory, PeerDirectory, PeerHandle, PeerInfo, StaticPeerDirectory,
};
pub use dispatch::{Dispatcher, JobMessage, KeeperAck, NetworkDispatcher};
pub use simulated::SimulatedDispatcher;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DispatchError {
    #[error("Keeper {0} not found in peer directory")]
    PeerUnknown(String),

    #[error("Failed to load peer directory: {0}")]
    PeerDirectory(String),

    #[error("Failed to connect to keeper {keeper}: {reason}")]
    Connect { keeper: String, reason: String },

    #[error("Failed to deliver job to keeper {keeper}: {reason}")]
    Delivery { keeper: String, reason: String },

    #[error("Keeper {keeper} rejected job: {reason}")]
    Rejected { keeper: String, reason: String },
}
