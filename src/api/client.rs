use crate::actor::ActorClient;
use crate::affinity::AssignmentSet;
use crate::api::event_bus::ExchangeEventListener;
use crate::api::{AdminRequest, AdminResponse};
use crate::discovery::DiscoveryFeed;
use crate::exchange::{AwaitExchangeError, ExchangeStateListener, ExchangeSummary};
use crate::partition::{PartitionKey, PartitionSnapshot, PartitionState, PartitionStateReader};
use crate::topology::{NodeId, TopologyVersion};
use crate::transport::{MessageInbox, RpcServerShutdownHandle};
use crate::txn::{GuardError, PartitionReady, TransactionContinuityGuard};
use std::sync::Arc;

/// One node of the data grid: its exchange worker, partition table, and transaction guard.
///
/// Dropping the node stops its exchange worker and, if it has one, its gRPC server.
pub struct GridNode {
    id: NodeId,
    actor_client: ActorClient,
    store: PartitionStateReader,
    guard: Arc<TransactionContinuityGuard>,
    listener: ExchangeStateListener,
    inbox: MessageInbox,
    feed: DiscoveryFeed,
    _server_shutdown: Option<RpcServerShutdownHandle>,
}

#[derive(Debug, thiserror::Error)]
pub enum NodeRequestError {
    #[error("Node has stopped")]
    NodeStopped,
    #[error("Node halted: {0}")]
    Halted(String),
    #[error("Partition {key} is not moving on this node ({state:?})")]
    NotMoving {
        key: PartitionKey,
        state: Option<PartitionState>,
    },
    // Retry once `await_exchange()` returns for this version.
    #[error("Exchange for {0} is in progress")]
    ExchangeInProgress(TopologyVersion),
}

impl GridNode {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: NodeId,
        actor_client: ActorClient,
        store: PartitionStateReader,
        guard: Arc<TransactionContinuityGuard>,
        listener: ExchangeStateListener,
        inbox: MessageInbox,
        feed: DiscoveryFeed,
        server_shutdown: Option<RpcServerShutdownHandle>,
    ) -> Self {
        GridNode {
            id,
            actor_client,
            store,
            guard,
            listener,
            inbox,
            feed,
            _server_shutdown: server_shutdown,
        }
    }

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    /// Hand this to the discovery layer when joining.
    pub fn discovery_feed(&self) -> DiscoveryFeed {
        self.feed.clone()
    }

    /// Where an in-process transport delivers messages for this node.
    pub fn message_inbox(&self) -> MessageInbox {
        self.inbox.clone()
    }

    pub fn current_version(&self) -> TopologyVersion {
        self.store.version()
    }

    pub fn partition_table(&self) -> Arc<PartitionSnapshot> {
        self.store.snapshot()
    }

    pub fn partition_reader(&self) -> PartitionStateReader {
        self.store.clone()
    }

    /// Assignment in effect at `version`, while it is still retained.
    pub fn current_assignment(&self, version: TopologyVersion) -> Option<AssignmentSet> {
        self.store.assignment_at(version)
    }

    /// Local replicas still receiving data.
    pub fn moving_partitions(&self) -> Vec<PartitionKey> {
        let snapshot = self.store.snapshot();
        snapshot
            .partitions()
            .iter()
            .flat_map(|(group, map)| {
                map.local_partitions(&self.id)
                    .into_iter()
                    .filter(|(_, state)| *state == PartitionState::Moving)
                    .map(move |(partition, _)| PartitionKey::new(group.clone(), partition))
            })
            .collect()
    }

    pub fn transactions(&self) -> &TransactionContinuityGuard {
        &self.guard
    }

    pub async fn await_partition_ready(&self, key: &PartitionKey) -> Result<PartitionReady, GuardError> {
        self.guard.await_partition_ready(key).await
    }

    /// Data movement for `key` finished locally. Returns the version the replica became OWNING at.
    pub async fn complete_rebalance(&self, key: PartitionKey) -> Result<TopologyVersion, NodeRequestError> {
        self.actor_client.rebalance_completed(key).await
    }

    pub fn last_exchange(&self) -> Option<Arc<ExchangeSummary>> {
        self.listener.current().last
    }

    pub fn halted(&self) -> Option<String> {
        self.listener.current().halted
    }

    /// Waits for the exchange whose result covers `version`. A coordinator change restarts the
    /// exchange; this keeps waiting for the restarted one.
    pub async fn await_exchange(&self, version: TopologyVersion) -> Result<Arc<ExchangeSummary>, AwaitExchangeError> {
        loop {
            match self.actor_client.await_exchange(version).await {
                Err(AwaitExchangeError::Superseded { .. }) => continue,
                result => return result,
            }
        }
    }

    pub async fn admin(&self, request: AdminRequest) -> Result<AdminResponse, NodeRequestError> {
        self.actor_client.admin(request).await
    }

    pub fn event_listener(&self) -> ExchangeEventListener {
        ExchangeEventListener::new(self.listener.clone())
    }
}
