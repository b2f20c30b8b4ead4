mod grpc;
mod in_memory;

pub use grpc::GrpcTransport;
pub use in_memory::InMemoryNetwork;

pub(crate) use grpc::shutdown_signal;
pub(crate) use grpc::RpcServer;
pub(crate) use grpc::RpcServerShutdownHandle;

use crate::actor::WeakActorClient;
use crate::exchange::ExchangeMessage;
use crate::topology::{ClusterNode, NodeId};

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Node {0} is not reachable")]
    UnknownNode(NodeId),
    #[error("Node {0} has no address")]
    NoAddress(NodeId),
    #[error("Node {0} has stopped")]
    ReceiverStopped(NodeId),
    #[error("Failed to connect to {node}: {message}")]
    Connect { node: NodeId, message: String },
    #[error("Delivery to {node} failed: {message}")]
    Delivery { node: NodeId, message: String },
}

/// Point-to-point channel between exchange workers. Delivery is best-effort; the protocol
/// retries what it needs.
#[async_trait::async_trait]
pub trait ExchangeTransport: Send + Sync {
    async fn send(&self, to: &ClusterNode, message: ExchangeMessage) -> Result<(), TransportError>;
}

/// Where a transport hands messages addressed to the local node.
#[derive(Clone)]
pub struct MessageInbox {
    node: NodeId,
    actor_client: WeakActorClient,
}

impl MessageInbox {
    pub(crate) fn new(node: NodeId, actor_client: WeakActorClient) -> Self {
        MessageInbox { node, actor_client }
    }

    pub fn node(&self) -> &NodeId {
        &self.node
    }

    pub async fn deliver(&self, message: ExchangeMessage) -> Result<(), TransportError> {
        self.actor_client
            .deliver(message)
            .await
            .map_err(|_| TransportError::ReceiverStopped(self.node.clone()))
    }
}
