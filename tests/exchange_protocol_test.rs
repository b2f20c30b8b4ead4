use partition_exchange::{
    AdminRequest, AdminResponse, AwaitExchangeError, CacheGroupConfig, CacheGroupId, ClusterMode, ExchangeEvent,
    ExchangeId, ExchangeOptions, ExchangePath, ExchangeSummary, GridNode, GridNodeConfig, InMemoryDiscovery,
    InMemoryNetwork, MessageCounters, MessageKind, NodeId, NodeRequestError, NodeSpec, PartitionKey,
    RendezvousAffinity, TopologyVersion, TxError,
};
use slog::Drain;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::Duration;

const PARTITIONS: u32 = 16;
const GROUP: &str = "accounts";

#[tokio::test]
async fn departure_with_fixed_baseline_switches_without_messages() {
    let mut cluster = TestCluster::new(ClusterMode::Persistent);
    for id in &["a", "b", "c"] {
        cluster.start(NodeSpec::server(id)).await;
    }
    let activated = cluster.discovery.activate();
    let summaries = cluster.await_all(activated).await;
    assert!(summaries.values().all(|s| s.path == ExchangePath::Full && s.rebalanced));

    cluster.network.reset_counters();
    let left = cluster.leave("c");
    let summaries = cluster.await_all(left).await;

    assert_eq!(summaries.len(), 2);
    for summary in summaries.values() {
        assert_eq!(summary.path, ExchangePath::ExchangeFree);
        assert!(summary.exchange_free_switch);
        assert!(summary.rebalanced);
        assert!(summary.lost_partitions.is_empty());
        assert_eq!(summary.messages, MessageCounters::default());
    }
    assert_eq!(cluster.network.sent(MessageKind::Single), 0);
    assert_eq!(cluster.network.sent(MessageKind::Full), 0);
    cluster.assert_same_owners();
    cluster.assert_not_owner("c");
}

#[tokio::test]
async fn one_node_without_support_forces_a_full_exchange() {
    let mut cluster = TestCluster::new(ClusterMode::Persistent);
    for id in &["a", "b", "c"] {
        cluster.start(NodeSpec::server(id)).await;
    }
    cluster.start(NodeSpec::server("d").exchange_free_switch_disabled()).await;
    let activated = cluster.discovery.activate();
    cluster.await_all(activated).await;

    cluster.network.reset_counters();
    let left = cluster.leave("c");
    let summaries = cluster.await_all(left).await;

    let coordinator = &summaries["a"];
    assert_eq!(coordinator.path, ExchangePath::Full);
    assert!(!coordinator.exchange_free_switch);
    assert!(coordinator.free_switch_rejection.is_some());
    assert_eq!(coordinator.coordinator, Some(NodeId::new("a")));
    assert_eq!(coordinator.messages.singles_received, 2);
    assert_eq!(coordinator.messages.fulls_sent, 2);

    // One single and one full per survivor other than the coordinator.
    assert_eq!(cluster.network.sent(MessageKind::Single), 2);
    assert_eq!(cluster.network.sent(MessageKind::Full), 2);
    assert_eq!(cluster.network.sent(MessageKind::FullAck), 2);
    cluster.assert_same_owners();
    cluster.assert_not_owner("c");
}

#[tokio::test]
async fn rebalancing_ends_with_late_affinity_assignment() {
    let mut cluster = TestCluster::new(ClusterMode::InMemory);
    let first = cluster.start(NodeSpec::server("a")).await;
    assert!(cluster.await_all(first).await["a"].rebalanced);

    let joined = cluster.start(NodeSpec::server("b")).await;
    let summaries = cluster.await_all(joined).await;
    assert!(summaries.values().all(|s| !s.rebalanced));

    let b = cluster.node("b");
    let moving = b.moving_partitions();
    assert!(!moving.is_empty());
    for key in moving {
        b.complete_rebalance(key).await.unwrap();
    }
    assert!(b.moving_partitions().is_empty());

    let late = joined.next_minor();
    cluster.await_topology_version(late).await;
    let summaries = cluster.await_all(late).await;
    for summary in summaries.values() {
        assert_eq!(summary.path, ExchangePath::LateAffinity);
        assert!(summary.rebalanced);
    }
    cluster.assert_same_owners();

    let a = cluster.node("a");
    let key = PartitionKey::new(CacheGroupId::new(GROUP), 0);
    match a.complete_rebalance(key).await {
        Err(NodeRequestError::NotMoving { .. }) => {}
        other => panic!("Expected NotMoving, got {:?}", other),
    }
    match a.admin(AdminRequest::LastExchange).await.unwrap() {
        AdminResponse::LastExchange(Some(last)) => assert_eq!(last.result_version, late),
        other => panic!("Unexpected admin response {:?}", other),
    }
    match a.admin(AdminRequest::Coordinator).await.unwrap() {
        AdminResponse::Coordinator(coordinator) => assert_eq!(coordinator, Some(NodeId::new("a"))),
        other => panic!("Unexpected admin response {:?}", other),
    }
}

#[tokio::test]
async fn transactions_survive_backup_loss_and_retry_after_primary_loss() {
    let mut cluster = TestCluster::new(ClusterMode::Persistent);
    for id in &["a", "b", "c"] {
        cluster.start(NodeSpec::server(id)).await;
    }
    let activated = cluster.discovery.activate();
    cluster.await_all(activated).await;

    let b_id = NodeId::new("b");
    let a = cluster.node("a");
    let table = a.partition_table();
    let keys: Vec<PartitionKey> = (0..PARTITIONS)
        .map(|p| PartitionKey::new(CacheGroupId::new(GROUP), p))
        .collect();
    let led_by_b = keys
        .iter()
        .find(|key| table.primary(key) == Some(&b_id))
        .cloned()
        .expect("b leads no partition");
    let backed_by_b = keys
        .iter()
        .find(|key| {
            let owners = table.owners(key).unwrap_or(&[]);
            owners.first() != Some(&b_id) && owners.contains(&b_id)
        })
        .cloned()
        .expect("b backs no partition");

    let guard = a.transactions();
    let doomed = guard.begin();
    let enlistment = guard.enlist_partition(doomed, led_by_b.clone()).await.unwrap();
    assert_eq!(enlistment.primary, b_id);
    let survivor = guard.begin();
    let enlistment = guard.enlist_partition(survivor, backed_by_b.clone()).await.unwrap();
    assert!(enlistment.backups.contains(&b_id));

    let failed = cluster.fail("b");
    cluster.await_all(failed).await;

    match guard.commit(doomed) {
        Err(TxError::RolledBack { retryable, .. }) => assert!(retryable),
        other => panic!("Expected a retryable rollback, got {:?}", other),
    }
    let outcome = guard.commit(survivor).unwrap();
    assert!(outcome.enlistments.iter().all(|e| !e.backups.contains(&b_id)));

    let ready = a.await_partition_ready(&led_by_b).await.unwrap();
    assert_ne!(ready.primary, b_id);
    assert_eq!(ready.version, failed);
    assert!(guard.blocked_partitions().is_empty());
}

#[tokio::test]
async fn coordinator_death_restarts_collection_on_next_oldest() {
    let mut cluster = TestCluster::new(ClusterMode::InMemory);
    for id in &["a", "b", "c"] {
        let joined = cluster.start(NodeSpec::server(id)).await;
        cluster.await_all(joined).await;
    }

    cluster.network.drop_messages(|_, to, _| to.as_str() == "a");
    let joined = cluster.start(NodeSpec::server("d")).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    let failed = cluster.fail("a");
    cluster.network.deliver_all();

    let summaries = cluster.await_all(failed).await;
    assert_eq!(summaries.len(), 3);
    for summary in summaries.values() {
        assert_eq!(summary.exchange_id, ExchangeId::new(joined));
        assert_eq!(summary.result_version, failed);
        assert_eq!(summary.coordinator, Some(NodeId::new("b")));
    }
    cluster.assert_same_owners();
    cluster.assert_not_owner("a");
}

#[tokio::test]
async fn departure_during_collection_is_merged_into_the_exchange() {
    let mut cluster = TestCluster::new(ClusterMode::InMemory);
    for id in &["a", "b", "c"] {
        let joined = cluster.start(NodeSpec::server(id)).await;
        cluster.await_all(joined).await;
    }

    cluster.network.drop_messages(|from, to, message| {
        from.as_str() == "c" && to.as_str() == "a" && message.kind() == MessageKind::Single
    });
    let joined = cluster.start(NodeSpec::server("d")).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    let failed = cluster.fail("c");

    let summaries = cluster.await_all(failed).await;
    let coordinator = &summaries["a"];
    assert_eq!(coordinator.exchange_id, ExchangeId::new(joined));
    assert_eq!(coordinator.merged_versions, vec![failed]);
    assert_eq!(coordinator.messages.singles_received, 2);
    assert_eq!(coordinator.messages.fulls_sent, 2);
    for summary in summaries.values() {
        assert_eq!(summary.result_version, failed);
    }
    cluster.assert_same_owners();
    cluster.assert_not_owner("c");
}

#[tokio::test]
async fn lost_single_is_requested_again() {
    let mut cluster = TestCluster::new(ClusterMode::InMemory).with_options(ExchangeOptions {
        single_message_timeout: Some(Duration::from_millis(200)),
        ..options()
    });
    for id in &["a", "b"] {
        let joined = cluster.start(NodeSpec::server(id)).await;
        cluster.await_all(joined).await;
    }

    let dropped = Arc::new(AtomicBool::new(false));
    let flag = dropped.clone();
    cluster.network.drop_messages(move |from, _, message| {
        from.as_str() == "c" && message.kind() == MessageKind::Single && !flag.swap(true, Ordering::SeqCst)
    });
    cluster.network.reset_counters();

    let joined = cluster.start(NodeSpec::server("c")).await;
    let summaries = cluster.await_all(joined).await;

    assert!(dropped.load(Ordering::SeqCst));
    assert!(cluster.network.sent(MessageKind::SingleRequest) >= 1);
    assert!(summaries["c"].messages.singles_sent >= 2);
    assert_eq!(summaries["a"].messages.singles_received, 2);
    cluster.assert_same_owners();
}

#[tokio::test]
async fn client_join_needs_no_exchange() {
    let mut cluster = TestCluster::new(ClusterMode::InMemory);
    for id in &["a", "b"] {
        let joined = cluster.start(NodeSpec::server(id)).await;
        cluster.await_all(joined).await;
    }

    cluster.network.reset_counters();
    let joined = cluster.start(NodeSpec::client("z")).await;
    let summaries = cluster.await_all(joined).await;

    assert!(summaries.values().all(|s| s.path == ExchangePath::LocalOnly));
    assert_eq!(cluster.network.sent(MessageKind::Single), 0);
    assert_eq!(cluster.network.sent(MessageKind::Full), 0);

    let key = PartitionKey::new(CacheGroupId::new(GROUP), 0);
    let routing = cluster.node("z").partition_table();
    let owners = routing.owners(&key).expect("client has no routing view");
    assert!(!owners.is_empty());
    assert!(!owners.contains(&NodeId::new("z")));
}

#[tokio::test]
async fn mismatched_configuration_halts_the_joiner() {
    let mut cluster = TestCluster::new(ClusterMode::InMemory);
    let first = cluster.start(NodeSpec::server("a")).await;
    cluster.await_all(first).await;

    let joined = cluster.start_with_partitions(NodeSpec::server("b"), PARTITIONS / 2).await;
    let b = cluster.node("b");
    let result = tokio::time::timeout(Duration::from_secs(10), b.await_exchange(joined))
        .await
        .expect("Timed out waiting for the exchange");
    assert!(matches!(result, Err(AwaitExchangeError::Failed(_))));
    assert!(b.halted().is_some());
    match b.event_listener().next_event().await {
        Some(ExchangeEvent::Halted(reason)) => assert!(reason.contains("partitions")),
        other => panic!("Expected a halt event, got {:?}", other),
    }

    // The halted node removes itself and the survivor carries on alone.
    let b_id = NodeId::new("b");
    cluster.await_condition(|c| !c.discovery.topology().contains(&b_id)).await;
    let left = cluster.discovery.current_version();
    let summaries = cluster.await_all(left).await;
    assert_eq!(summaries.keys().collect::<Vec<_>>(), vec!["a"]);
    assert_eq!(cluster.node("a").current_version(), left);
}

#[tokio::test]
async fn full_exchange_without_backups_stays_rebalanced_when_partitions_are_lost() {
    let mut cluster = TestCluster::new(ClusterMode::Persistent).with_backups(0);
    for id in &["a", "b", "c"] {
        cluster.start(NodeSpec::server(id)).await;
    }
    cluster.start(NodeSpec::server("d").exchange_free_switch_disabled()).await;
    let activated = cluster.discovery.activate();
    cluster.await_all(activated).await;

    let c_id = NodeId::new("c");
    let table = cluster.node("a").partition_table();
    let owned_by_c: Vec<PartitionKey> = (0..PARTITIONS)
        .map(|p| PartitionKey::new(CacheGroupId::new(GROUP), p))
        .filter(|key| table.primary(key) == Some(&c_id))
        .collect();
    assert!(!owned_by_c.is_empty());

    let left = cluster.leave("c");
    let summaries = cluster.await_all(left).await;

    assert_eq!(summaries["a"].path, ExchangePath::Full);
    assert_eq!(summaries["a"].lost_partitions.len(), owned_by_c.len());
    for summary in summaries.values() {
        assert_eq!(summary.result_version, left);
        assert!(summary.rebalanced);
    }
    for (_, node) in cluster.live_nodes() {
        let table = node.partition_table();
        for key in owned_by_c.iter() {
            assert!(table.owners(key).unwrap_or(&[]).is_empty(), "{}", key);
        }
    }
    cluster.assert_same_owners();

    // Nothing is moving, so no late affinity assignment follows.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(cluster.discovery.current_version(), left);
}

#[tokio::test]
async fn sequential_departures_all_switch_without_messages() {
    let mut cluster = TestCluster::new(ClusterMode::Persistent);
    for id in &["a", "b", "c", "d", "e"] {
        cluster.start(NodeSpec::server(id)).await;
    }
    let activated = cluster.discovery.activate();
    cluster.await_all(activated).await;

    for departed in &["c", "a", "e"] {
        cluster.network.reset_counters();
        let left = cluster.leave(departed);
        let summaries = cluster.await_all(left).await;

        for summary in summaries.values() {
            assert_eq!(summary.path, ExchangePath::ExchangeFree, "{} leaving", departed);
            assert!(summary.rebalanced, "{} leaving", departed);
        }
        assert_eq!(cluster.network.sent(MessageKind::Single), 0);
        assert_eq!(cluster.network.sent(MessageKind::Full), 0);
        cluster.assert_same_owners();
        cluster.assert_not_owner(departed);
    }
}

#[tokio::test]
async fn departures_switch_without_messages_again_once_the_unsupported_node_leaves() {
    let mut cluster = TestCluster::new(ClusterMode::Persistent);
    for id in &["a", "b", "c"] {
        cluster.start(NodeSpec::server(id)).await;
    }
    cluster.start(NodeSpec::server("d").exchange_free_switch_disabled()).await;
    let activated = cluster.discovery.activate();
    cluster.await_all(activated).await;

    let left = cluster.leave("c");
    let summaries = cluster.await_all(left).await;
    assert_eq!(summaries["a"].path, ExchangePath::Full);
    assert!(summaries.values().all(|s| s.rebalanced));

    // Support is judged over the nodes that remain.
    let left = cluster.leave("d");
    let summaries = cluster.await_all(left).await;
    assert!(summaries.values().all(|s| s.path == ExchangePath::ExchangeFree));

    cluster.network.reset_counters();
    let left = cluster.leave("b");
    let summaries = cluster.await_all(left).await;
    assert_eq!(summaries["a"].path, ExchangePath::ExchangeFree);
    assert!(summaries["a"].rebalanced);
    assert_eq!(cluster.network.sent(MessageKind::Single), 0);
    assert_eq!(cluster.network.sent(MessageKind::Full), 0);
    cluster.assert_not_owner("b");
}

#[tokio::test]
async fn rejoined_node_is_rebalanced_by_late_affinity_assignment() {
    let mut cluster = TestCluster::new(ClusterMode::Persistent);
    for id in &["a", "b", "c"] {
        cluster.start(NodeSpec::server(id)).await;
    }
    let activated = cluster.discovery.activate();
    cluster.await_all(activated).await;

    let left = cluster.leave("c");
    cluster.await_all(left).await;

    let rejoined = cluster.start(NodeSpec::server("c")).await;
    assert_eq!(rejoined, TopologyVersion::new(left.major() + 1, 0));
    let summaries = cluster.await_all(rejoined).await;
    for summary in summaries.values() {
        assert_eq!(summary.path, ExchangePath::Full);
        assert!(!summary.rebalanced);
    }

    let c = cluster.node("c");
    let moving = c.moving_partitions();
    assert!(!moving.is_empty());
    for key in moving {
        c.complete_rebalance(key).await.unwrap();
    }

    let late = rejoined.next_minor();
    cluster.await_topology_version(late).await;
    let summaries = cluster.await_all(late).await;
    assert_eq!(summaries.len(), 3);
    for summary in summaries.values() {
        assert_eq!(summary.path, ExchangePath::LateAffinity);
        assert!(summary.rebalanced);
    }
    cluster.assert_same_owners();
}

#[tokio::test]
async fn node_whose_single_never_arrives_is_reported_failed() {
    let mut cluster = TestCluster::new(ClusterMode::InMemory).with_options(retrying_options());
    for id in &["a", "b"] {
        let joined = cluster.start(NodeSpec::server(id)).await;
        cluster.await_all(joined).await;
    }

    cluster.network.drop_messages(|from, _, message| {
        from.as_str() == "c" && message.kind() == MessageKind::Single
    });
    cluster.network.reset_counters();
    let joined = cluster.start(NodeSpec::server("c")).await;

    let c_id = NodeId::new("c");
    cluster.await_condition(|c| !c.discovery.topology().contains(&c_id)).await;
    let failed = cluster.discovery.current_version();
    assert_eq!(failed, TopologyVersion::new(joined.major() + 1, 0));

    let summaries = cluster.await_all(failed).await;
    assert_eq!(summaries.len(), 2);
    let coordinator = &summaries["a"];
    assert_eq!(coordinator.exchange_id, ExchangeId::new(joined));
    assert_eq!(coordinator.merged_versions, vec![failed]);
    for summary in summaries.values() {
        assert_eq!(summary.result_version, failed);
    }
    assert!(cluster.network.sent(MessageKind::SingleRequest) >= 1);
    cluster.assert_same_owners();
    cluster.assert_not_owner("c");
}

#[tokio::test]
async fn missing_ack_completes_the_exchange_and_resends_the_full_message() {
    let mut cluster = TestCluster::new(ClusterMode::InMemory).with_options(retrying_options());
    for id in &["a", "b"] {
        let joined = cluster.start(NodeSpec::server(id)).await;
        cluster.await_all(joined).await;
    }

    cluster.network.drop_messages(|from, _, message| {
        from.as_str() == "c" && message.kind() == MessageKind::FullAck
    });
    cluster.network.reset_counters();
    let joined = cluster.start(NodeSpec::server("c")).await;

    let summaries = cluster.await_all(joined).await;
    assert_eq!(summaries.len(), 3);
    assert_eq!(summaries["a"].path, ExchangePath::Full);
    assert!(summaries.values().all(|s| s.result_version == joined));

    // The slow node gets the full message again before it is given up on.
    let c_id = NodeId::new("c");
    cluster.await_condition(|c| !c.discovery.topology().contains(&c_id)).await;
    assert!(cluster.network.sent(MessageKind::Full) >= 3);

    let failed = cluster.discovery.current_version();
    let summaries = cluster.await_all(failed).await;
    assert_eq!(summaries.keys().collect::<Vec<_>>(), vec!["a", "b"]);
    cluster.assert_same_owners();
    cluster.assert_not_owner("c");
}

// ------- Test cluster -------

struct TestCluster {
    discovery: Arc<InMemoryDiscovery>,
    network: Arc<InMemoryNetwork>,
    nodes: BTreeMap<String, GridNode>,
    options: ExchangeOptions,
    backups: usize,
}

impl TestCluster {
    fn new(mode: ClusterMode) -> Self {
        TestCluster {
            discovery: InMemoryDiscovery::new(logger(), mode),
            network: InMemoryNetwork::new(),
            nodes: BTreeMap::new(),
            options: options(),
            backups: 1,
        }
    }

    fn with_backups(mut self, backups: usize) -> Self {
        self.backups = backups;
        self
    }

    fn with_options(mut self, options: ExchangeOptions) -> Self {
        self.options = options;
        self
    }

    async fn start(&mut self, spec: NodeSpec) -> TopologyVersion {
        self.start_with_partitions(spec, PARTITIONS).await
    }

    /// Creates the node and joins it, replacing any earlier node with the same id. Returns the
    /// version of the join.
    async fn start_with_partitions(&mut self, spec: NodeSpec, partitions: u32) -> TopologyVersion {
        let config = GridNodeConfig {
            node: spec.clone(),
            cache_groups: vec![CacheGroupConfig::with_affinity(
                GROUP,
                self.backups,
                Arc::new(RendezvousAffinity::new(partitions)),
            )],
            logger: logger(),
            options: self.options.clone(),
        };
        let node = partition_exchange::try_create_grid_node(config, self.network.clone(), self.discovery.clone())
            .await
            .unwrap();
        self.network.register(node.message_inbox());
        self.discovery.join(spec.clone(), node.discovery_feed()).unwrap();
        self.nodes.insert(spec.id.as_str().to_string(), node);

        self.discovery.current_version()
    }

    fn node(&self, id: &str) -> &GridNode {
        &self.nodes[id]
    }

    fn leave(&self, id: &str) -> TopologyVersion {
        let node = NodeId::new(id);
        let version = self.discovery.leave(&node).unwrap();
        self.network.unregister(&node);
        version
    }

    fn fail(&self, id: &str) -> TopologyVersion {
        let node = NodeId::new(id);
        let version = self.discovery.fail(&node).unwrap();
        self.network.unregister(&node);
        version
    }

    fn live_nodes(&self) -> Vec<(&String, &GridNode)> {
        let topology = self.discovery.topology();
        self.nodes
            .iter()
            .filter(|(_, node)| topology.contains(node.id()))
            .collect()
    }

    /// Waits for the exchange covering `version` on every node still in the topology.
    async fn await_all(&self, version: TopologyVersion) -> BTreeMap<String, Arc<ExchangeSummary>> {
        let mut summaries = BTreeMap::new();
        for (id, node) in self.live_nodes() {
            let summary = tokio::time::timeout(Duration::from_secs(10), node.await_exchange(version))
                .await
                .unwrap_or_else(|_| panic!("Timed out waiting for {} on {}", version, id))
                .unwrap_or_else(|e| panic!("Exchange for {} failed on {}: {}", version, id, e));
            summaries.insert(id.clone(), summary);
        }
        summaries
    }

    async fn await_topology_version(&self, version: TopologyVersion) {
        self.await_condition(|c| c.discovery.current_version() >= version).await;
    }

    async fn await_condition<F: Fn(&TestCluster) -> bool>(&self, condition: F) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        while !condition(self) {
            assert!(tokio::time::Instant::now() < deadline, "Timed out waiting for condition");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    fn assert_same_owners(&self) {
        let tables: Vec<_> = self
            .live_nodes()
            .into_iter()
            .map(|(_, node)| node.partition_table())
            .collect();
        for partition in 0..PARTITIONS {
            let key = PartitionKey::new(CacheGroupId::new(GROUP), partition);
            let expected = tables[0].owners(&key).map(|owners| owners.to_vec());
            for table in tables.iter() {
                assert_eq!(table.owners(&key).map(|owners| owners.to_vec()), expected, "{}", key);
            }
        }
    }

    fn assert_not_owner(&self, id: &str) {
        let departed = NodeId::new(id);
        for (_, node) in self.live_nodes() {
            let table = node.partition_table();
            for partition in 0..PARTITIONS {
                let key = PartitionKey::new(CacheGroupId::new(GROUP), partition);
                assert!(!table.owners(&key).unwrap_or(&[]).contains(&departed));
            }
        }
    }
}

fn options() -> ExchangeOptions {
    ExchangeOptions {
        single_message_timeout: Some(Duration::from_secs(5)),
        full_ack_timeout: Some(Duration::from_secs(5)),
        retry_jitter: Some(Duration::from_millis(10)),
        ..ExchangeOptions::default()
    }
}

fn retrying_options() -> ExchangeOptions {
    ExchangeOptions {
        single_message_timeout: Some(Duration::from_millis(200)),
        full_ack_timeout: Some(Duration::from_millis(200)),
        max_message_retries: Some(1),
        ..options()
    }
}

fn logger() -> slog::Logger {
    slog::Logger::root(slog::Discard, slog::o!())
}

#[allow(dead_code)]
fn create_root_logger_for_stdout() -> slog::Logger {
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).use_file_location().build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();

    slog::Logger::root(drain, slog::o!())
}
