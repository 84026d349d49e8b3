use crate::err::Result;
use crate::network::PeerMessage;
use async_trait::async_trait;
use tokio::sync::broadcast;

mod peer_table;
pub use peer_table::{Peer, PeerTable};

/// Connection state change of a single node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeEvent {
    Connected(String),
    Disconnected(String),
}

/// Directory of peers this node can talk to directly.
#[async_trait]
pub trait NodeDirectory: Send + Sync {
    async fn is_connected(&self, node_id: &str) -> bool;
    /// Ask the connection layer to reach out to `node_id` as soon as possible.
    async fn mark_for_immediate_connect(&self, node_id: &str);
    async fn send_message(&self, node_id: &str, message: &PeerMessage) -> Result<()>;
    fn subscribe(&self) -> broadcast::Receiver<NodeEvent>;
}
