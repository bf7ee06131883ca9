pub mod config;
pub mod memory;
pub mod message;
pub mod network;
pub mod topic;

pub use config::GossipConfig;
pub use memory::MemoryTransport;
pub use message::GossipEnvelope;
pub use network::{GossipNetwork, NetworkHandle};
pub use topic::{Topic, TopicFamily};

use std::time::Duration;

use tokio::sync::mpsc;

use credence_core::error::CredenceError;
use credence_core::types::ContentAddress;

/// A message delivered to a topic subscriber.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GossipMessage {
    pub topic: Topic,
    pub payload: Vec<u8>,
}

/// The transport contract the core consumes.
///
/// Publish is best-effort and may surface back-pressure as `Busy`; the
/// caller retries with back-off. Fetch by content address is
/// point-to-point with a first-class deadline. Rate limits and per-peer
/// quotas are the transport's policy, not the core's.
pub trait GossipTransport: Send + Sync {
    fn publish(
        &self,
        topic: &Topic,
        payload: Vec<u8>,
    ) -> impl std::future::Future<Output = Result<(), CredenceError>> + Send;

    fn subscribe(
        &self,
        topic: &Topic,
    ) -> impl std::future::Future<Output = Result<mpsc::Receiver<GossipMessage>, CredenceError>> + Send;

    fn fetch(
        &self,
        addr: &ContentAddress,
        deadline: Duration,
    ) -> impl std::future::Future<Output = Result<Vec<u8>, CredenceError>> + Send;
}
