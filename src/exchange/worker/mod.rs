mod coordinator;
mod local;
mod participant;

use crate::actor::WeakActorClient;
use crate::affinity::CacheGroupConfig;
use crate::api::{AdminRequest, AdminResponse, NodeRequestError};
use crate::discovery::DiscoverySink;
use crate::exchange::free_switch::{self, SwitchContext, SwitchDecision};
use crate::exchange::future::{AwaitExchangeError, ExchangeFuture, ExchangePath, ExchangePhase, ExchangeWaiter};
use crate::exchange::history::ExchangeHistory;
use crate::exchange::listener::ExchangeStateNotifier;
use crate::exchange::messages::{ExchangeMessage, FullMessage};
use crate::exchange::timers::{ExchangeTimerHandle, ExchangeTimerTick, TimeoutKind};
use crate::partition::{PartitionKey, PartitionSnapshot, PartitionStateWriter, StoreError};
use crate::topology::{ClusterNode, DiscoveryEvent, DiscoveryEventKind, NodeId, TopologySnapshot, TopologyVersion};
use crate::transport::ExchangeTransport;
use crate::txn::TransactionContinuityGuard;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;
use tokio::time::Duration;

const MAX_EARLY_MESSAGES: usize = 4096;

#[derive(Clone, Debug)]
pub(crate) struct WorkerConfig {
    pub single_message_timeout: Duration,
    pub full_ack_timeout: Duration,
    pub max_message_retries: u32,
    pub retry_jitter: Duration,
    pub history_size: usize,
}

/// Collaborators the worker talks to. Everything here outlives the worker.
pub(crate) struct WorkerContext {
    pub transport: Arc<dyn ExchangeTransport>,
    pub discovery: Arc<dyn DiscoverySink>,
    pub store: PartitionStateWriter,
    pub guard: Arc<TransactionContinuityGuard>,
    pub notifier: ExchangeStateNotifier,
    pub actor_client: WeakActorClient,
}

/// Slow nodes of a finished exchange that still owe an acknowledgement.
struct FullResend {
    full: Arc<FullMessage>,
    topology: Arc<TopologySnapshot>,
    attempts: BTreeMap<NodeId, u32>,
    timer: Option<ExchangeTimerHandle>,
    generation: u32,
}

/// Drives every exchange on the local node, one at a time and in version order.
pub(crate) struct ExchangeWorker {
    logger: slog::Logger,
    local: LocalNode,
    groups: Vec<CacheGroupConfig>,
    config: WorkerConfig,
    transport: Arc<dyn ExchangeTransport>,
    discovery: Arc<dyn DiscoverySink>,
    store: PartitionStateWriter,
    guard: Arc<TransactionContinuityGuard>,
    notifier: ExchangeStateNotifier,
    actor_client: WeakActorClient,

    // Topology of the last applied exchange, and of the newest event seen.
    topology: Option<Arc<TopologySnapshot>>,
    latest_topology: Option<Arc<TopologySnapshot>>,
    last_seen: TopologyVersion,
    applied: TopologyVersion,

    current: Option<ExchangeFuture>,
    timer: Option<ExchangeTimerHandle>,
    deferred: VecDeque<DiscoveryEvent>,
    early_messages: Vec<ExchangeMessage>,
    resend: Option<FullResend>,
    history: ExchangeHistory,
    awaiting: Vec<(TopologyVersion, ExchangeWaiter)>,
    laa_requested: Option<TopologyVersion>,
    reported_failed: BTreeSet<NodeId>,
    halted: Option<String>,
}

struct LocalNode {
    id: NodeId,
    is_client: bool,
}

impl ExchangeWorker {
    pub(crate) fn new(
        logger: slog::Logger,
        local: NodeId,
        is_client: bool,
        groups: Vec<CacheGroupConfig>,
        config: WorkerConfig,
        context: WorkerContext,
    ) -> Self {
        ExchangeWorker {
            logger,
            local: LocalNode { id: local, is_client },
            groups,
            history: ExchangeHistory::new(config.history_size),
            config,
            transport: context.transport,
            discovery: context.discovery,
            store: context.store,
            guard: context.guard,
            notifier: context.notifier,
            actor_client: context.actor_client,
            topology: None,
            latest_topology: None,
            last_seen: TopologyVersion::ZERO,
            applied: TopologyVersion::ZERO,
            current: None,
            timer: None,
            deferred: VecDeque::new(),
            early_messages: Vec::new(),
            resend: None,
            awaiting: Vec::new(),
            laa_requested: None,
            reported_failed: BTreeSet::new(),
            halted: None,
        }
    }

    // ------- Entry points, one per actor event -------

    pub(crate) fn on_discovery_event(&mut self, event: DiscoveryEvent) {
        if self.halted.is_some() {
            return;
        }
        if event.version <= self.last_seen {
            slog::debug!(
                self.logger,
                "Dropping stale {} at {}, already saw {}",
                event.kind.name(),
                event.version,
                self.last_seen
            );
            return;
        }

        slog::info!(self.logger, "Discovery event {} at {}", event.kind.name(), event.version);
        self.last_seen = event.version;
        self.latest_topology = Some(event.topology.clone());

        if let Some(departed) = event.kind.departed_node() {
            if departed.id() == &self.local.id {
                return self.halt(format!("Local node removed from the topology at {}", event.version));
            }
            self.on_node_departed(departed, event.version);
        }

        if self.current.is_some() {
            self.on_event_during_exchange(event);
        } else {
            self.deferred.push_back(event);
        }
        self.process_deferred();
    }

    pub(crate) fn on_message(&mut self, message: ExchangeMessage) {
        self.dispatch_message(message);
        self.process_deferred();
    }

    pub(crate) fn on_exchange_timeout(&mut self, tick: ExchangeTimerTick) {
        if self.halted.is_some() {
            return;
        }

        match tick.kind {
            TimeoutKind::FullResend => self.on_full_resend_timeout(tick),
            TimeoutKind::SingleMessages | TimeoutKind::FullAcks => {
                if self.timer.as_ref().map(ExchangeTimerHandle::tick) != Some(tick) {
                    slog::debug!(self.logger, "Ignoring stale timer {:?}", tick);
                    return;
                }
                self.timer = None;
                match tick.kind {
                    TimeoutKind::SingleMessages => self.on_single_timeout(),
                    _ => self.on_full_ack_timeout(),
                }
            }
        }
        self.process_deferred();
    }

    pub(crate) fn complete_rebalance(&mut self, key: PartitionKey) -> Result<TopologyVersion, NodeRequestError> {
        let result = self.mark_rebalanced(key);
        self.process_deferred();
        result
    }

    pub(crate) fn await_exchange(&mut self, version: TopologyVersion, waiter: ExchangeWaiter) {
        if let Some(reason) = &self.halted {
            waiter.send(Err(AwaitExchangeError::Failed(reason.clone())));
            return;
        }

        if version <= self.applied {
            self.answer_from_history(version, waiter);
            return;
        }
        match self.current.as_mut() {
            Some(fut) if fut.id().version() <= version && version <= fut.result_version() => fut.add_waiter(waiter),
            _ => self.awaiting.push((version, waiter)),
        }
    }

    pub(crate) fn admin(&mut self, request: AdminRequest) -> Result<AdminResponse, NodeRequestError> {
        slog::debug!(self.logger, "Admin request {:?}", request);

        let response = match request {
            AdminRequest::CurrentVersion => AdminResponse::CurrentVersion(self.store.current().version()),
            AdminRequest::LastExchange => AdminResponse::LastExchange(self.history.last().cloned()),
            AdminRequest::ExchangeHistory => AdminResponse::ExchangeHistory(self.history.to_vec()),
            AdminRequest::Baseline => {
                AdminResponse::Baseline(self.latest_topology.as_ref().and_then(|t| t.baseline().cloned()))
            }
            AdminRequest::PartitionStates(group) => {
                AdminResponse::PartitionStates(self.store.current().partitions().get(&group).cloned())
            }
            AdminRequest::Coordinator => {
                let coordinator = match self.current.as_ref() {
                    Some(fut) if fut.path() == ExchangePath::Full => Some(fut.coordinator().clone()),
                    _ => self.oldest_server(),
                };
                AdminResponse::Coordinator(coordinator)
            }
        };

        Ok(response)
    }

    // ------- Event sequencing -------

    fn on_node_departed(&mut self, departed: &ClusterNode, version: TopologyVersion) {
        if departed.is_server() {
            let report = self.guard.on_node_left(departed.id(), version, self.store.current());
            for (tx, decision) in report.decisions.iter() {
                slog::debug!(self.logger, "{} after {} left: {:?}", tx, departed.id(), decision);
            }
        }

        if let Some(resend) = self.resend.as_mut() {
            resend.attempts.remove(departed.id());
        }
        self.reported_failed.remove(departed.id());
    }

    /// Starts queued exchanges until one has to wait for messages, then retries buffered messages.
    fn process_deferred(&mut self) {
        loop {
            while self.current.is_none() && self.halted.is_none() {
                let event = match self.deferred.pop_front() {
                    Some(event) => event,
                    None => break,
                };
                if event.version <= self.applied {
                    slog::debug!(self.logger, "Skipping {} at {}, covered by {}", event.kind.name(), event.version, self.applied);
                    continue;
                }
                self.start_exchange(event);
            }

            let applied_before = self.applied;
            self.drain_early_messages();
            if self.applied == applied_before || self.current.is_some() || self.deferred.is_empty() {
                break;
            }
        }
    }

    fn start_exchange(&mut self, event: DiscoveryEvent) {
        let deactivated = matches!(event.kind, DiscoveryEventKind::ActivationChanged { active: false });
        if self.local.is_client || !event.topology.is_active() || deactivated {
            return self.apply_local_only(event);
        }

        match &event.kind {
            DiscoveryEventKind::AffinityChange => self.apply_late_affinity(event),
            DiscoveryEventKind::NodeJoined(node) | DiscoveryEventKind::NodeLeft(node) | DiscoveryEventKind::NodeFailed(node)
                if node.is_client() =>
            {
                self.apply_local_only(event)
            }
            DiscoveryEventKind::NodeLeft(_) | DiscoveryEventKind::NodeFailed(_) => {
                let decision = free_switch::evaluate(&SwitchContext {
                    event: &event,
                    previous_baseline: self.topology.as_ref().and_then(|topology| topology.baseline()),
                    last_exchange: self.store.current(),
                });
                match decision {
                    SwitchDecision::Eligible => self.apply_free_switch(event),
                    SwitchDecision::Ineligible(reason) => {
                        slog::info!(self.logger, "Exchange-free switch not possible at {}: {}", event.version, reason);
                        self.begin_full_exchange(event, Some(reason.to_string()))
                    }
                }
            }
            DiscoveryEventKind::NodeJoined(_)
            | DiscoveryEventKind::BaselineChanged
            | DiscoveryEventKind::ActivationChanged { .. } => self.begin_full_exchange(event, None),
        }
    }

    fn dispatch_message(&mut self, message: ExchangeMessage) {
        if self.halted.is_some() {
            return;
        }

        slog::debug!(self.logger, "Received {:?} from {}", message.kind(), message.sender());
        match message {
            ExchangeMessage::Single(single) => self.on_single(single),
            ExchangeMessage::Full(full) => self.on_full(full),
            ExchangeMessage::FullAck(ack) => self.on_full_ack(ack),
            ExchangeMessage::SingleRequest(request) => self.on_single_request(request),
            ExchangeMessage::PartitionsUpdate(update) => self.on_partitions_update(update),
        }
    }

    /// Keeps a message for an exchange this node has not reached yet.
    fn buffer(&mut self, message: ExchangeMessage) {
        if self.early_messages.len() >= MAX_EARLY_MESSAGES {
            slog::warn!(self.logger, "Early message buffer full, dropping the oldest");
            self.early_messages.remove(0);
        }
        self.early_messages.push(message);
    }

    fn drain_early_messages(&mut self) {
        if self.early_messages.is_empty() {
            return;
        }

        let pending = std::mem::take(&mut self.early_messages);
        for message in pending {
            self.dispatch_message(message);
        }
    }

    // ------- Completion -------

    fn complete_current(&mut self) {
        let fut = match self.current.take() {
            Some(fut) => fut,
            None => return,
        };
        self.timer = None;

        let result_version = fut.result_version();
        let topology = fut.topology().clone();
        let summary = fut.complete();

        self.applied = self.applied.max(result_version);
        self.topology = Some(topology);
        self.history.push(summary.clone());
        self.notifier.notify_completed(summary);

        self.evict_renting();
        self.resolve_awaiting();
        self.check_late_affinity();
    }

    fn resolve_awaiting(&mut self) {
        let applied = self.applied;
        let (ready, pending): (Vec<_>, Vec<_>) = self.awaiting.drain(..).partition(|(version, _)| *version <= applied);
        self.awaiting = pending;

        for (version, waiter) in ready {
            self.answer_from_history(version, waiter);
        }
    }

    fn answer_from_history(&self, version: TopologyVersion, waiter: ExchangeWaiter) {
        match self.history.covering(version).or_else(|| self.history.last()) {
            Some(summary) => waiter.send(Ok(summary.clone())),
            None => waiter.send(Err(AwaitExchangeError::Failed(format!(
                "No exchange recorded at or after {}",
                version
            )))),
        }
    }

    /// Publishes `snapshot` and unblocks partitions whose new primary it installs.
    fn commit(&mut self, snapshot: PartitionSnapshot) -> Result<Arc<PartitionSnapshot>, StoreError> {
        let committed = self.store.commit(snapshot)?;
        self.guard.release(committed.version());
        Ok(committed)
    }

    fn transition(&mut self, next: ExchangePhase) -> bool {
        let result = match self.current.as_mut() {
            Some(fut) => fut.transition(next),
            None => return false,
        };

        match result {
            Ok(()) => true,
            Err(e) => {
                self.halt(e.to_string());
                false
            }
        }
    }

    /// The node cannot go on: fail everything in flight and leave the cluster.
    fn halt(&mut self, reason: String) {
        if self.halted.is_some() {
            return;
        }
        slog::error!(self.logger, "Halting exchange worker: {}", reason);
        self.halted = Some(reason.clone());

        self.timer = None;
        self.resend = None;
        self.deferred.clear();
        self.early_messages.clear();
        if let Some(fut) = self.current.take() {
            self.history.push(fut.fail(reason.clone()));
        }
        for (_, waiter) in self.awaiting.drain(..) {
            waiter.send(Err(AwaitExchangeError::Failed(reason.clone())));
        }

        self.guard.halt();
        self.notifier.notify_halted(reason);

        let discovery = self.discovery.clone();
        let local = self.local.id.clone();
        tokio::spawn(async move {
            discovery.leave(&local).await;
        });
    }

    // ------- Outbound -------

    fn send(&self, topology: &TopologySnapshot, to: &NodeId, message: ExchangeMessage) {
        let node = match topology.node(to) {
            Some(node) => node.clone(),
            None => {
                slog::debug!(self.logger, "Not sending {:?} to {}, not in topology", message.kind(), to);
                return;
            }
        };

        slog::debug!(self.logger, "Sending {:?} to {}", message.kind(), to);
        let transport = self.transport.clone();
        let logger = self.logger.clone();
        tokio::spawn(async move {
            if let Err(e) = transport.send(&node, message).await {
                slog::warn!(logger, "{}", e);
            }
        });
    }

    fn report_failed(&mut self, suspect: NodeId) {
        if !self.reported_failed.insert(suspect.clone()) {
            return;
        }
        slog::warn!(self.logger, "Reporting {} as failed, it stopped answering", suspect);

        let discovery = self.discovery.clone();
        let reporter = self.local.id.clone();
        tokio::spawn(async move {
            discovery.report_failed(&reporter, &suspect).await;
        });
    }

    fn arm_exchange_timer(&mut self, kind: TimeoutKind, timeout: Duration) {
        let fut = match self.current.as_mut() {
            Some(fut) => fut,
            None => return,
        };
        fut.timer_attempt += 1;

        let tick = ExchangeTimerTick {
            exchange_id: fut.id(),
            kind,
            attempt: fut.timer_attempt,
        };
        self.timer = Some(ExchangeTimerHandle::spawn_timer_task(
            timeout,
            self.config.retry_jitter,
            tick,
            self.actor_client.clone(),
        ));
    }

    fn oldest_server(&self) -> Option<NodeId> {
        self.latest_topology
            .as_ref()
            .and_then(|topology| topology.oldest_server())
            .map(|node| node.id().clone())
    }

    fn is_oldest_server(&self) -> bool {
        self.oldest_server().as_ref() == Some(&self.local.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::ActorClient;
    use crate::affinity::RendezvousAffinity;
    use crate::exchange::listener;
    use crate::exchange::messages::{ExchangeId, FullAck, SingleMessage};
    use crate::exchange::MessageKind;
    use crate::partition::{self, CacheGroupId, PartitionState, PartitionStateReader};
    use crate::topology::{NodeSpec, TopologyVersionClock, VersionBump};
    use crate::transport::TransportError;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<(NodeId, ExchangeMessage)>>,
    }

    impl RecordingTransport {
        fn sent(&self) -> Vec<(NodeId, ExchangeMessage)> {
            self.sent.lock().unwrap().clone()
        }

        fn first(&self, kind: MessageKind) -> ExchangeMessage {
            self.sent()
                .into_iter()
                .map(|(_, message)| message)
                .find(|message| message.kind() == kind)
                .expect("no message of that kind was sent")
        }

        fn count(&self, kind: MessageKind) -> usize {
            self.sent().iter().filter(|(_, m)| m.kind() == kind).count()
        }
    }

    #[async_trait::async_trait]
    impl ExchangeTransport for RecordingTransport {
        async fn send(&self, to: &ClusterNode, message: ExchangeMessage) -> Result<(), TransportError> {
            self.sent.lock().unwrap().push((to.id().clone(), message));
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingDiscovery {
        left: Mutex<Vec<NodeId>>,
    }

    #[async_trait::async_trait]
    impl DiscoverySink for RecordingDiscovery {
        async fn report_failed(&self, _reporter: &NodeId, _suspect: &NodeId) {}

        async fn request_affinity_change(&self, _based_on: TopologyVersion) {}

        async fn leave(&self, node: &NodeId) {
            self.left.lock().unwrap().push(node.clone());
        }
    }

    struct Harness {
        worker: ExchangeWorker,
        transport: Arc<RecordingTransport>,
        discovery: Arc<RecordingDiscovery>,
        reader: PartitionStateReader,
        _actor_client: ActorClient,
    }

    fn harness(local: &str, partitions: u32) -> Harness {
        let logger = slog::Logger::root(slog::Discard, slog::o!());
        let groups = vec![CacheGroupConfig::with_affinity(
            "cache",
            1,
            Arc::new(RendezvousAffinity::new(partitions)),
        )];
        let (writer, reader) = partition::new_store(8);
        let guard = Arc::new(TransactionContinuityGuard::new(logger.clone(), reader.clone(), &groups));
        let (notifier, _listener) = listener::new();
        let (actor_client, _rx) = ActorClient::new(16);
        let transport = Arc::new(RecordingTransport::default());
        let discovery = Arc::new(RecordingDiscovery::default());

        let worker = ExchangeWorker::new(
            logger,
            NodeId::new(local),
            false,
            groups,
            WorkerConfig {
                single_message_timeout: Duration::from_secs(60),
                full_ack_timeout: Duration::from_secs(60),
                max_message_retries: 3,
                retry_jitter: Duration::from_millis(0),
                history_size: 8,
            },
            WorkerContext {
                transport: transport.clone(),
                discovery: discovery.clone(),
                store: writer,
                guard,
                notifier,
                actor_client: actor_client.weak(),
            },
        );

        Harness {
            worker,
            transport,
            discovery,
            reader,
            _actor_client: actor_client,
        }
    }

    /// Join events for `ids` in order, each carrying the topology after the join.
    fn joins(ids: &[&str]) -> Vec<DiscoveryEvent> {
        let mut clock = TopologyVersionClock::new();
        let mut members = Vec::new();
        ids.iter()
            .enumerate()
            .map(|(i, id)| {
                let node = NodeSpec::server(id).admit(i as u64 + 1);
                members.push(node.clone());
                DiscoveryEvent {
                    version: clock.tick(VersionBump::Major),
                    kind: DiscoveryEventKind::NodeJoined(node),
                    topology: Arc::new(TopologySnapshot::new(members.clone(), None, true)),
                }
            })
            .collect()
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn lone_server_owns_everything_after_its_join() {
        let mut h = harness("a", 8);
        h.worker.on_discovery_event(joins(&["a"]).remove(0));

        let snapshot = h.reader.snapshot();
        assert_eq!(snapshot.version(), TopologyVersion::new(1, 0));
        assert!(snapshot.is_rebalanced());
        let map = &snapshot.partitions()[&CacheGroupId::new("cache")];
        assert!((0..8).all(|p| map.state(p, &NodeId::new("a")) == Some(PartitionState::Owning)));
        assert!(h.worker.current.is_none());
    }

    #[tokio::test]
    async fn participant_sends_single_to_oldest_and_applies_full() {
        let events = joins(&["a", "b"]);
        let mut b = harness("b", 8);
        let mut a = harness("a", 8);

        b.worker.on_discovery_event(events[1].clone());
        settle().await;
        let sent = b.transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, NodeId::new("a"));
        assert_eq!(sent[0].1.kind(), MessageKind::Single);

        a.worker.on_discovery_event(events[0].clone());
        a.worker.on_discovery_event(events[1].clone());
        a.worker.on_message(sent[0].1.clone());
        settle().await;

        b.worker.on_message(a.transport.first(MessageKind::Full));
        settle().await;

        assert_eq!(b.reader.version(), TopologyVersion::new(2, 0));
        assert_eq!(b.transport.count(MessageKind::FullAck), 1);
        let summary = b.worker.history.last().cloned().unwrap();
        assert_eq!(summary.messages.singles_sent, 1);
        assert_eq!(summary.messages.fulls_received, 1);
        // "b" holds no data yet, so it is still moving in.
        assert!(!summary.rebalanced);

        assert!(a.worker.current.is_some());
        a.worker.on_message(ExchangeMessage::FullAck(FullAck {
            sender: NodeId::new("b"),
            exchange_id: ExchangeId::new(TopologyVersion::new(2, 0)),
        }));
        assert!(a.worker.current.is_none());
        assert_eq!(a.reader.version(), TopologyVersion::new(2, 0));
    }

    #[tokio::test]
    async fn single_for_unseen_exchange_is_buffered() {
        let events = joins(&["a", "b"]);
        let mut a = harness("a", 4);
        a.worker.on_discovery_event(events[0].clone());

        a.worker.on_message(ExchangeMessage::Single(SingleMessage {
            sender: NodeId::new("b"),
            exchange_id: ExchangeId::new(events[1].version),
            partitions: Default::default(),
            errors: Vec::new(),
        }));
        assert_eq!(a.worker.early_messages.len(), 1);

        a.worker.on_discovery_event(events[1].clone());
        settle().await;

        assert!(a.worker.early_messages.is_empty());
        assert_eq!(a.reader.version(), TopologyVersion::new(2, 0));
        assert_eq!(a.transport.count(MessageKind::Full), 1);
    }

    #[tokio::test]
    async fn mismatched_partition_count_halts_and_leaves() {
        let events = joins(&["a", "b"]);
        let mut b = harness("b", 8);
        let mut a = harness("a", 16);

        b.worker.on_discovery_event(events[1].clone());
        settle().await;
        a.worker.on_discovery_event(events[0].clone());
        a.worker.on_discovery_event(events[1].clone());
        a.worker.on_message(b.transport.first(MessageKind::Single));
        settle().await;

        b.worker.on_message(a.transport.first(MessageKind::Full));
        settle().await;

        assert!(b.worker.halted.is_some());
        assert_eq!(*b.discovery.left.lock().unwrap(), vec![NodeId::new("b")]);
        assert_eq!(b.reader.version(), TopologyVersion::ZERO);
        assert_eq!(b.transport.count(MessageKind::FullAck), 0);
    }
}
