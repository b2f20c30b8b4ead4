use crate::exchange::ExchangeMessage;
use crate::grpc::grpc_exchange_client::GrpcExchangeClient;
use crate::grpc::proto_delivery_result;
use crate::topology::{ClusterNode, NodeId};
use crate::transport::grpc::convert;
use crate::transport::{ExchangeTransport, TransportError};
use std::collections::HashMap;
use tokio::sync::Mutex;
use tokio::time::Duration;
use tonic::transport::{Channel, Endpoint};

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Sends exchange messages over gRPC, one lazily opened channel per peer.
pub struct GrpcTransport {
    logger: slog::Logger,
    connect_timeout: Duration,
    clients: Mutex<HashMap<NodeId, GrpcExchangeClient<Channel>>>,
}

impl GrpcTransport {
    pub fn new(logger: slog::Logger) -> Self {
        GrpcTransport::with_connect_timeout(logger, DEFAULT_CONNECT_TIMEOUT)
    }

    pub fn with_connect_timeout(logger: slog::Logger, connect_timeout: Duration) -> Self {
        GrpcTransport {
            logger: logger.new(slog::o!("Component" => "grpc-transport")),
            connect_timeout,
            clients: Mutex::new(HashMap::new()),
        }
    }

    async fn client(&self, to: &ClusterNode) -> Result<GrpcExchangeClient<Channel>, TransportError> {
        if let Some(client) = self.clients.lock().await.get(to.id()) {
            return Ok(client.clone());
        }

        let address = to.address().ok_or_else(|| TransportError::NoAddress(to.id().clone()))?;
        let url = format!("http://{}", address);
        slog::debug!(self.logger, "Connecting to {} at {}", to.id(), url);

        let connect_error = |message: String| TransportError::Connect {
            node: to.id().clone(),
            message,
        };
        let endpoint = Endpoint::from_shared(url).map_err(|e| connect_error(e.to_string()))?;
        // Connect without holding the map, so an unreachable peer does not stall sends to others.
        let channel = match tokio::time::timeout(self.connect_timeout, endpoint.connect()).await {
            Ok(Ok(channel)) => channel,
            Ok(Err(e)) => return Err(connect_error(e.to_string())),
            Err(_) => return Err(connect_error(format!("timed out after {:?}", self.connect_timeout))),
        };

        let mut clients = self.clients.lock().await;
        let client = clients
            .entry(to.id().clone())
            .or_insert_with(|| GrpcExchangeClient::new(channel));
        Ok(client.clone())
    }

    async fn forget(&self, node: &NodeId) {
        self.clients.lock().await.remove(node);
    }
}

#[async_trait::async_trait]
impl ExchangeTransport for GrpcTransport {
    async fn send(&self, to: &ClusterNode, message: ExchangeMessage) -> Result<(), TransportError> {
        let mut client = self.client(to).await?;
        let envelope = convert::to_envelope(&message);

        let delivery_error = |message: String| TransportError::Delivery {
            node: to.id().clone(),
            message,
        };
        let reply = match client.deliver(envelope).await {
            Ok(reply) => reply.into_inner(),
            Err(status) => {
                // Next send reconnects.
                self.forget(to.id()).await;
                return Err(delivery_error(status.to_string()));
            }
        };

        match reply.result {
            Some(proto_delivery_result::Result::Ok(_)) => Ok(()),
            Some(proto_delivery_result::Result::Err(fault)) => Err(delivery_error(fault.message)),
            None => Err(delivery_error("empty reply".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::{ExchangeId, FullAck};
    use crate::topology::{NodeSpec, TopologyVersion};
    use std::net::{Ipv4Addr, SocketAddr};
    use std::sync::Arc;

    fn logger() -> slog::Logger {
        slog::Logger::root(slog::Discard, slog::o!())
    }

    fn peer(id: &str, address: Option<SocketAddr>, order: u64) -> ClusterNode {
        NodeSpec {
            address,
            ..NodeSpec::server(id)
        }
        .admit(order)
    }

    fn ack() -> ExchangeMessage {
        ExchangeMessage::FullAck(FullAck {
            sender: NodeId::new("a"),
            exchange_id: ExchangeId::new(TopologyVersion::new(2, 0)),
        })
    }

    #[tokio::test]
    async fn unreachable_peer_does_not_block_other_sends() {
        let transport = Arc::new(GrpcTransport::with_connect_timeout(logger(), Duration::from_millis(300)));
        // Non-routable: the connect either hangs until the timeout or fails outright.
        let unreachable = peer("slow", Some(SocketAddr::from((Ipv4Addr::new(10, 255, 255, 1), 47399))), 1);
        let no_address = peer("lost", None, 2);

        let slow_send = {
            let transport = transport.clone();
            tokio::spawn(async move { transport.send(&unreachable, ack()).await })
        };
        tokio::task::yield_now().await;

        let other = tokio::time::timeout(Duration::from_millis(100), transport.send(&no_address, ack()))
            .await
            .expect("Send to another peer waited on the unreachable one");
        assert!(matches!(other, Err(TransportError::NoAddress(_))));

        let slow = tokio::time::timeout(Duration::from_secs(2), slow_send)
            .await
            .expect("Connect was not bounded")
            .unwrap();
        assert!(matches!(slow, Err(TransportError::Connect { .. })));
    }
}
