use partition_exchange::{
    CacheGroupConfig, ClusterMode, ExchangeOptions, ExchangeSummary, GridNode, GridNodeConfig, InMemoryDiscovery,
    InMemoryNetwork, MessageKind, NodeRequestError, NodeSpec, RendezvousAffinity,
};
use slog::Drain;
use std::error::Error;
use std::sync::Arc;
use tokio::time::Duration;

// Runs a small in-process cluster through joins, rebalancing, and a departure, and prints what
// each exchange cost in messages.
#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let logger = create_root_logger_for_stdout();
    let discovery = InMemoryDiscovery::new(logger.clone(), ClusterMode::InMemory);
    let network = InMemoryNetwork::new();

    let mut nodes = Vec::new();
    for id in &["node-1", "node-2", "node-3"] {
        let node = partition_exchange::try_create_grid_node(
            config(&logger, NodeSpec::server(id)),
            network.clone(),
            discovery.clone(),
        )
        .await?;
        network.register(node.message_inbox());
        discovery.join(NodeSpec::server(id), node.discovery_feed())?;

        let version = discovery.current_version();
        let summary = node.await_exchange(version).await?;
        report(&summary, &network);
        nodes.push(node);
    }

    for node in &nodes {
        complete_rebalancing(node).await?;
    }
    tokio::time::sleep(Duration::from_millis(200)).await;
    println!("Rebalanced at {}", nodes[0].current_version());

    network.reset_counters();
    let leaving = nodes.remove(1);
    let version = discovery.leave(leaving.id())?;
    network.unregister(leaving.id());
    drop(leaving);
    let summary = nodes[0].await_exchange(version).await?;
    report(&summary, &network);

    Ok(())
}

async fn complete_rebalancing(node: &GridNode) -> Result<(), Box<dyn Error>> {
    for key in node.moving_partitions() {
        loop {
            match node.complete_rebalance(key.clone()).await {
                Err(NodeRequestError::ExchangeInProgress(version)) => {
                    node.await_exchange(version).await?;
                }
                // A later exchange already settled it.
                Err(NodeRequestError::NotMoving { .. }) => break,
                result => {
                    result?;
                    break;
                }
            }
        }
    }
    Ok(())
}

fn report(summary: &ExchangeSummary, network: &InMemoryNetwork) {
    println!(
        "Exchange {} -> {} via {:?} (rebalanced={}, singles sent so far={}, fulls sent so far={})",
        summary.exchange_id,
        summary.result_version,
        summary.path,
        summary.rebalanced,
        network.sent(MessageKind::Single),
        network.sent(MessageKind::Full),
    );
}

fn config(logger: &slog::Logger, node: NodeSpec) -> GridNodeConfig {
    GridNodeConfig {
        node,
        cache_groups: vec![CacheGroupConfig::with_affinity(
            "accounts",
            1,
            Arc::new(RendezvousAffinity::new(64)),
        )],
        logger: logger.clone(),
        options: ExchangeOptions {
            single_message_timeout: Some(Duration::from_secs(2)),
            full_ack_timeout: Some(Duration::from_secs(2)),
            ..ExchangeOptions::default()
        },
    }
}

fn create_root_logger_for_stdout() -> slog::Logger {
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();

    slog::Logger::root(drain, slog::o!())
}
