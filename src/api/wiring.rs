use crate::actor::{ActorClient, ExchangeActor, WeakActorClient};
use crate::affinity::CacheGroupConfig;
use crate::api::client::GridNode;
use crate::api::options::{ExchangeOptions, ExchangeOptionsValidated};
use crate::discovery::{DiscoveryFeed, DiscoverySink};
use crate::exchange::{self, ExchangeWorker, WorkerConfig, WorkerContext};
use crate::partition::{self, CacheGroupId};
use crate::topology::{DiscoveryEvent, NodeId, NodeSpec};
use crate::transport::{self, ExchangeTransport, GrpcTransport, MessageInbox, RpcServer};
use crate::txn::TransactionContinuityGuard;
use std::collections::BTreeSet;
use std::convert::TryFrom;
use std::sync::Arc;
use tokio::sync::mpsc;

pub struct GridNodeConfig {
    pub node: NodeSpec,
    pub cache_groups: Vec<CacheGroupConfig>,
    pub logger: slog::Logger,
    pub options: ExchangeOptions,
}

#[derive(Debug, thiserror::Error)]
pub enum GridNodeCreationError {
    #[error("Illegal options for configuring node: {0}")]
    IllegalOptions(String),
    #[error("No cache groups configured")]
    NoCacheGroups,
    #[error("Cache group {0} configured twice")]
    DuplicateCacheGroup(CacheGroupId),
    #[error("Cache group {0} has no partitions")]
    EmptyCacheGroup(CacheGroupId),
    #[error("Node {0} needs an address to serve gRPC")]
    MissingAddress(NodeId),
}

/// Creates a node that talks to its peers through `transport`. The node takes part in the
/// cluster once `discovery` admits it with the node's `discovery_feed()`.
pub async fn try_create_grid_node(
    config: GridNodeConfig,
    transport: Arc<dyn ExchangeTransport>,
    discovery: Arc<dyn DiscoverySink>,
) -> Result<GridNode, GridNodeCreationError> {
    create(config, transport, discovery, false)
}

/// Like `try_create_grid_node()`, with messages exchanged over gRPC. The node serves on its
/// spec's address until it is dropped.
pub async fn try_create_grpc_grid_node(
    config: GridNodeConfig,
    discovery: Arc<dyn DiscoverySink>,
) -> Result<GridNode, GridNodeCreationError> {
    let transport = Arc::new(GrpcTransport::new(config.logger.clone()));
    create(config, transport, discovery, true)
}

fn create(
    config: GridNodeConfig,
    transport: Arc<dyn ExchangeTransport>,
    discovery: Arc<dyn DiscoverySink>,
    serve_grpc: bool,
) -> Result<GridNode, GridNodeCreationError> {
    let options = ExchangeOptionsValidated::try_from(config.options)
        .map_err(|e| GridNodeCreationError::IllegalOptions(e.to_string()))?;
    validate_cache_groups(&config.cache_groups)?;
    let server_addr = match (serve_grpc, config.node.address) {
        (false, _) => None,
        (true, Some(addr)) => Some(addr),
        (true, None) => return Err(GridNodeCreationError::MissingAddress(config.node.id)),
    };

    let node = config.node;
    let root_logger = config.logger.new(slog::o!("NodeId" => node.id.to_string()));

    let (actor_client, actor_queue_rx) = ActorClient::new(options.actor_queue_size);
    let (store_writer, store_reader) = partition::new_store(options.history_size);
    let guard = Arc::new(TransactionContinuityGuard::new(
        root_logger.clone(),
        store_reader.clone(),
        &config.cache_groups,
    ));
    let (notifier, listener) = exchange::new_state_listener();

    let worker = ExchangeWorker::new(
        root_logger.clone(),
        node.id.clone(),
        node.is_client,
        config.cache_groups,
        WorkerConfig {
            single_message_timeout: options.single_message_timeout,
            full_ack_timeout: options.full_ack_timeout,
            max_message_retries: options.max_message_retries,
            retry_jitter: options.retry_jitter,
            history_size: options.history_size,
        },
        WorkerContext {
            transport,
            discovery,
            store: store_writer,
            guard: guard.clone(),
            notifier,
            actor_client: actor_client.weak(),
        },
    );
    let actor = ExchangeActor::new(root_logger.clone(), actor_queue_rx, worker);
    tokio::spawn(actor.run_event_loop());

    let (feed_tx, feed_rx) = mpsc::unbounded_channel();
    tokio::spawn(forward_discovery_events(root_logger.clone(), feed_rx, actor_client.weak()));

    let inbox = MessageInbox::new(node.id.clone(), actor_client.weak());
    let server_shutdown = server_addr.map(|addr| {
        let (handle, signal) = transport::shutdown_signal();
        let server = RpcServer::new(root_logger.clone(), inbox.clone());
        tokio::spawn(server.run(addr, signal));
        handle
    });

    Ok(GridNode::new(
        node.id,
        actor_client,
        store_reader,
        guard,
        listener,
        inbox,
        DiscoveryFeed::new(feed_tx),
        server_shutdown,
    ))
}

fn validate_cache_groups(groups: &[CacheGroupConfig]) -> Result<(), GridNodeCreationError> {
    if groups.is_empty() {
        return Err(GridNodeCreationError::NoCacheGroups);
    }

    let mut seen = BTreeSet::new();
    for group in groups {
        if !seen.insert(group.id.clone()) {
            return Err(GridNodeCreationError::DuplicateCacheGroup(group.id.clone()));
        }
        if group.partitions() == 0 {
            return Err(GridNodeCreationError::EmptyCacheGroup(group.id.clone()));
        }
    }

    Ok(())
}

async fn forward_discovery_events(
    logger: slog::Logger,
    mut feed: mpsc::UnboundedReceiver<DiscoveryEvent>,
    actor_client: WeakActorClient,
) {
    while let Some(event) = feed.recv().await {
        if actor_client.discovery_event(event).await.is_err() {
            break;
        }
    }
    slog::debug!(logger, "Discovery feed closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::affinity::RendezvousAffinity;
    use crate::discovery::{ClusterMode, InMemoryDiscovery};
    use crate::transport::InMemoryNetwork;
    use crate::topology::TopologyVersion;

    fn config(node: NodeSpec, groups: Vec<CacheGroupConfig>) -> GridNodeConfig {
        GridNodeConfig {
            node,
            cache_groups: groups,
            logger: slog::Logger::root(slog::Discard, slog::o!()),
            options: ExchangeOptions::default(),
        }
    }

    fn group(name: &str, partitions: u32) -> CacheGroupConfig {
        CacheGroupConfig::with_affinity(name, 1, Arc::new(RendezvousAffinity::new(partitions)))
    }

    #[tokio::test]
    async fn rejects_bad_cache_groups() {
        let discovery = InMemoryDiscovery::new(slog::Logger::root(slog::Discard, slog::o!()), ClusterMode::InMemory);
        let network = InMemoryNetwork::new();

        let result = try_create_grid_node(config(NodeSpec::server("a"), vec![]), network.clone(), discovery.clone()).await;
        assert!(matches!(result, Err(GridNodeCreationError::NoCacheGroups)));

        let groups = vec![group("cache", 8), group("cache", 8)];
        let result = try_create_grid_node(config(NodeSpec::server("a"), groups), network, discovery).await;
        assert!(matches!(result, Err(GridNodeCreationError::DuplicateCacheGroup(_))));
    }

    #[tokio::test]
    async fn grpc_node_needs_an_address() {
        let discovery = InMemoryDiscovery::new(slog::Logger::root(slog::Discard, slog::o!()), ClusterMode::InMemory);
        let result = try_create_grpc_grid_node(config(NodeSpec::server("a"), vec![group("cache", 8)]), discovery).await;
        assert!(matches!(result, Err(GridNodeCreationError::MissingAddress(_))));
    }

    #[tokio::test]
    async fn joined_node_applies_its_first_exchange() {
        let discovery = InMemoryDiscovery::new(slog::Logger::root(slog::Discard, slog::o!()), ClusterMode::InMemory);
        let network = InMemoryNetwork::new();
        let node = try_create_grid_node(config(NodeSpec::server("a"), vec![group("cache", 8)]), network.clone(), discovery.clone())
            .await
            .unwrap();
        network.register(node.message_inbox());

        let joined = discovery.join(NodeSpec::server("a"), node.discovery_feed()).unwrap();
        assert_eq!(joined.id(), node.id());

        let summary = node.await_exchange(TopologyVersion::new(1, 0)).await.unwrap();
        assert_eq!(summary.result_version, TopologyVersion::new(1, 0));
        assert_eq!(node.current_version(), TopologyVersion::new(1, 0));
        assert!(node.moving_partitions().is_empty());
    }
}
