use crate::exchange::{ExchangeMessage, MessageKind};
use crate::topology::{ClusterNode, NodeId};
use crate::transport::{ExchangeTransport, MessageInbox, TransportError};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

type DropFilter = Arc<dyn Fn(&NodeId, &NodeId, &ExchangeMessage) -> bool + Send + Sync>;

#[derive(Default)]
struct NetworkState {
    inboxes: HashMap<NodeId, MessageInbox>,
    sent: HashMap<MessageKind, u64>,
    drop_filter: Option<DropFilter>,
}

/// In-process network shared by every node of a test cluster. Counts every send by message kind,
/// including sends a drop filter then discards.
#[derive(Default)]
pub struct InMemoryNetwork {
    state: Mutex<NetworkState>,
}

impl InMemoryNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(InMemoryNetwork::default())
    }

    pub fn register(&self, inbox: MessageInbox) {
        self.lock().inboxes.insert(inbox.node().clone(), inbox);
    }

    pub fn unregister(&self, node: &NodeId) {
        self.lock().inboxes.remove(node);
    }

    pub fn sent(&self, kind: MessageKind) -> u64 {
        self.lock().sent.get(&kind).copied().unwrap_or(0)
    }

    pub fn reset_counters(&self) {
        self.lock().sent.clear();
    }

    /// Messages for which `filter(from, to, message)` returns true are silently lost.
    pub fn drop_messages<F>(&self, filter: F)
    where
        F: Fn(&NodeId, &NodeId, &ExchangeMessage) -> bool + Send + Sync + 'static,
    {
        self.lock().drop_filter = Some(Arc::new(filter));
    }

    pub fn deliver_all(&self) {
        self.lock().drop_filter = None;
    }

    fn lock(&self) -> MutexGuard<'_, NetworkState> {
        self.state.lock().expect("InMemoryNetwork mutex guard poison")
    }
}

#[async_trait::async_trait]
impl ExchangeTransport for InMemoryNetwork {
    async fn send(&self, to: &ClusterNode, message: ExchangeMessage) -> Result<(), TransportError> {
        let inbox = {
            let mut state = self.lock();
            *state.sent.entry(message.kind()).or_insert(0) += 1;

            let dropped = state
                .drop_filter
                .as_ref()
                .map(|filter| filter(message.sender(), to.id(), &message))
                .unwrap_or(false);
            if dropped {
                return Ok(());
            }

            state
                .inboxes
                .get(to.id())
                .cloned()
                .ok_or_else(|| TransportError::UnknownNode(to.id().clone()))?
        };

        inbox.deliver(message).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::{ActorClient, Event};
    use crate::exchange::{ExchangeId, FullAck};
    use crate::topology::{NodeSpec, TopologyVersion};

    fn ack(from: &str) -> ExchangeMessage {
        ExchangeMessage::FullAck(FullAck {
            sender: NodeId::new(from),
            exchange_id: ExchangeId::new(TopologyVersion::new(1, 0)),
        })
    }

    #[tokio::test]
    async fn counts_and_delivers() {
        let network = InMemoryNetwork::new();
        let (actor_client, mut rx) = ActorClient::new(4);
        network.register(MessageInbox::new(NodeId::new("b"), actor_client.weak()));
        let b = NodeSpec::server("b").admit(2);

        network.send(&b, ack("a")).await.unwrap();
        assert!(matches!(rx.recv().await, Some(Event::Message(ExchangeMessage::FullAck(_)))));
        assert_eq!(network.sent(MessageKind::FullAck), 1);
        assert_eq!(network.sent(MessageKind::Single), 0);

        network.reset_counters();
        assert_eq!(network.sent(MessageKind::FullAck), 0);
    }

    #[tokio::test]
    async fn filtered_messages_are_counted_but_lost() {
        let network = InMemoryNetwork::new();
        let (actor_client, mut rx) = ActorClient::new(4);
        network.register(MessageInbox::new(NodeId::new("b"), actor_client.weak()));
        let b = NodeSpec::server("b").admit(2);

        network.drop_messages(|from, _, _| from.as_str() == "a");
        network.send(&b, ack("a")).await.unwrap();
        network.send(&b, ack("c")).await.unwrap();

        match rx.recv().await {
            Some(Event::Message(message)) => assert_eq!(message.sender(), &NodeId::new("c")),
            other => panic!("Unexpected event {:?}", other),
        }
        assert_eq!(network.sent(MessageKind::FullAck), 2);

        let unknown = NodeSpec::server("z").admit(9);
        assert!(matches!(
            network.send(&unknown, ack("c")).await,
            Err(TransportError::UnknownNode(_))
        ));
    }
}
