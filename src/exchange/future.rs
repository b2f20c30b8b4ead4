use crate::actor::Callback;
use crate::exchange::messages::{ExchangeId, FullMessage, SingleMessage};
use crate::partition::PartitionKey;
use crate::topology::{DiscoveryEvent, NodeId, TopologySnapshot, TopologyVersion};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Lifecycle of one exchange on one node.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ExchangePhase {
    Init,
    CollectingSingle,
    Merging,
    ComputingAffinity,
    BroadcastingFull,
    Done,
    Failed,
}

impl ExchangePhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExchangePhase::Done | ExchangePhase::Failed)
    }

    fn can_transition_to(&self, next: ExchangePhase) -> bool {
        use ExchangePhase::*;

        match (*self, next) {
            (from, Failed) => !from.is_terminal(),
            (Init, CollectingSingle) | (Init, Done) => true,
            // Coordinator failover restarts collection.
            (CollectingSingle, CollectingSingle) => true,
            (CollectingSingle, Merging) | (CollectingSingle, Done) => true,
            (Merging, ComputingAffinity) => true,
            (ComputingAffinity, BroadcastingFull) => true,
            (BroadcastingFull, Done) => true,
            _ => false,
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Illegal exchange phase transition {from:?} -> {to:?}")]
pub struct IllegalTransition {
    pub from: ExchangePhase,
    pub to: ExchangePhase,
}

/// How the exchange reached its result.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ExchangePath {
    /// Single and full messages through the coordinator.
    Full,
    /// Survivors derived the result locally after a server departure.
    ExchangeFree,
    /// Switch to the ideal assignment once rebalancing finished.
    LateAffinity,
    /// Nothing to exchange: client node events and inactive clusters.
    LocalOnly,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ExchangeOutcome {
    Completed,
    Failed(String),
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct MessageCounters {
    pub singles_sent: u32,
    pub singles_received: u32,
    pub fulls_sent: u32,
    pub fulls_received: u32,
}

/// What a finished exchange did, as recorded in the exchange history.
#[derive(Clone, Debug)]
pub struct ExchangeSummary {
    pub exchange_id: ExchangeId,
    pub result_version: TopologyVersion,
    pub trigger: &'static str,
    pub coordinator: Option<NodeId>,
    pub path: ExchangePath,
    pub rebalanced: bool,
    pub exchange_free_switch: bool,
    /// Why the exchange-free switch was not taken, when it was considered.
    pub free_switch_rejection: Option<String>,
    pub messages: MessageCounters,
    /// Versions of later events folded into this exchange.
    pub merged_versions: Vec<TopologyVersion>,
    pub lost_partitions: Vec<PartitionKey>,
    pub participant_errors: Vec<(NodeId, String)>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcome: ExchangeOutcome,
}

impl ExchangeSummary {
    /// True if this exchange's result covers `version`.
    pub fn covers(&self, version: TopologyVersion) -> bool {
        self.exchange_id.version() <= version && version <= self.result_version
    }
}

#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum AwaitExchangeError {
    #[error("Exchange was superseded by the one for version {by}")]
    Superseded { by: TopologyVersion },
    #[error("Exchange failed: {0}")]
    Failed(String),
    #[error("Node stopped before the exchange completed")]
    NodeStopped,
}

pub(crate) type ExchangeWaiter = Callback<Arc<ExchangeSummary>, AwaitExchangeError>;

/// In-flight exchange state. Owned by the exchange worker; never shared.
pub(crate) struct ExchangeFuture {
    logger: slog::Logger,
    id: ExchangeId,
    result_version: TopologyVersion,
    trigger: &'static str,
    topology: Arc<TopologySnapshot>,
    phase: ExchangePhase,
    coordinator: NodeId,
    path: ExchangePath,
    free_switch_rejection: Option<String>,
    merged_versions: Vec<TopologyVersion>,
    started_at: DateTime<Utc>,
    waiters: Vec<ExchangeWaiter>,

    pub(crate) counters: MessageCounters,
    /// Coordinator: participants whose single message is still needed.
    pub(crate) expected: BTreeSet<NodeId>,
    pub(crate) singles: BTreeMap<NodeId, SingleMessage>,
    pub(crate) retries: BTreeMap<NodeId, u32>,
    pub(crate) pending_acks: BTreeSet<NodeId>,
    pub(crate) full: Option<Arc<FullMessage>>,
    pub(crate) timer_attempt: u32,
    /// Participant: whether our single already went to the current coordinator.
    pub(crate) single_sent: bool,
    pub(crate) rebalanced: bool,
    pub(crate) exchange_free_switch: bool,
    pub(crate) lost: Vec<PartitionKey>,
    pub(crate) participant_errors: Vec<(NodeId, String)>,
}

impl ExchangeFuture {
    pub(crate) fn new(
        logger: &slog::Logger,
        event: &DiscoveryEvent,
        coordinator: NodeId,
        path: ExchangePath,
        free_switch_rejection: Option<String>,
    ) -> Self {
        let id = ExchangeId::new(event.version);
        let logger = logger.new(slog::o!("Exchange" => id.to_string()));
        slog::debug!(logger, "Exchange started by {} via {:?}", event.kind.name(), path);

        ExchangeFuture {
            logger,
            id,
            result_version: event.version,
            trigger: event.kind.name(),
            topology: event.topology.clone(),
            phase: ExchangePhase::Init,
            coordinator,
            path,
            free_switch_rejection,
            merged_versions: Vec::new(),
            started_at: Utc::now(),
            waiters: Vec::new(),
            counters: MessageCounters::default(),
            expected: BTreeSet::new(),
            singles: BTreeMap::new(),
            retries: BTreeMap::new(),
            pending_acks: BTreeSet::new(),
            full: None,
            timer_attempt: 0,
            single_sent: false,
            rebalanced: false,
            exchange_free_switch: false,
            lost: Vec::new(),
            participant_errors: Vec::new(),
        }
    }

    pub(crate) fn id(&self) -> ExchangeId {
        self.id
    }

    pub(crate) fn result_version(&self) -> TopologyVersion {
        self.result_version
    }

    pub(crate) fn phase(&self) -> ExchangePhase {
        self.phase
    }

    pub(crate) fn coordinator(&self) -> &NodeId {
        &self.coordinator
    }

    pub(crate) fn path(&self) -> ExchangePath {
        self.path
    }

    pub(crate) fn topology(&self) -> &Arc<TopologySnapshot> {
        &self.topology
    }

    pub(crate) fn logger(&self) -> &slog::Logger {
        &self.logger
    }

    /// True if a message tagged `id` belongs to this exchange.
    pub(crate) fn accepts(&self, id: ExchangeId) -> bool {
        self.id <= id && id.version() <= self.result_version
    }

    pub(crate) fn transition(&mut self, next: ExchangePhase) -> Result<(), IllegalTransition> {
        if !self.phase.can_transition_to(next) {
            return Err(IllegalTransition {
                from: self.phase,
                to: next,
            });
        }

        slog::debug!(self.logger, "Phase {:?} -> {:?}", self.phase, next);
        self.phase = next;
        Ok(())
    }

    /// Folds a later event into this exchange. Its result will be published at the event's version.
    pub(crate) fn merge_event(&mut self, event: &DiscoveryEvent) {
        slog::info!(
            self.logger,
            "Merging {} at {} into exchange",
            event.kind.name(),
            event.version
        );
        self.result_version = event.version;
        self.topology = event.topology.clone();
        self.merged_versions.push(event.version);
    }

    /// Coordinator died: start collecting again under `coordinator`. Collected singles are
    /// discarded and waiters are told to retry.
    pub(crate) fn restart_collecting(&mut self, coordinator: NodeId) -> Result<(), IllegalTransition> {
        self.transition(ExchangePhase::CollectingSingle)?;
        slog::info!(
            self.logger,
            "Coordinator {} replaced by {}",
            self.coordinator,
            coordinator
        );
        self.coordinator = coordinator;
        self.expected.clear();
        self.singles.clear();
        self.retries.clear();
        self.timer_attempt += 1;
        self.single_sent = false;

        let by = self.result_version;
        for waiter in self.waiters.drain(..) {
            waiter.send(Err(AwaitExchangeError::Superseded { by }));
        }
        Ok(())
    }

    pub(crate) fn add_waiter(&mut self, waiter: ExchangeWaiter) {
        self.waiters.push(waiter);
    }

    /// Collected singles cover every expected participant.
    pub(crate) fn all_singles_received(&self) -> bool {
        self.expected.iter().all(|node| self.singles.contains_key(node))
    }

    pub(crate) fn missing_singles(&self) -> Vec<NodeId> {
        self.expected
            .iter()
            .filter(|node| !self.singles.contains_key(*node))
            .cloned()
            .collect()
    }

    pub(crate) fn complete(mut self) -> Arc<ExchangeSummary> {
        if self.phase != ExchangePhase::Done {
            if let Err(e) = self.transition(ExchangePhase::Done) {
                slog::warn!(self.logger, "Completing exchange out of order: {}", e);
                self.phase = ExchangePhase::Done;
            }
        }
        slog::info!(
            self.logger,
            "Exchange done at {} via {:?}, rebalanced={}",
            self.result_version,
            self.path,
            self.rebalanced
        );

        let summary = Arc::new(self.summary(ExchangeOutcome::Completed));
        for waiter in self.waiters.drain(..) {
            waiter.send(Ok(summary.clone()));
        }
        summary
    }

    pub(crate) fn fail(mut self, reason: String) -> Arc<ExchangeSummary> {
        if !self.phase.is_terminal() {
            self.phase = ExchangePhase::Failed;
        }
        slog::error!(self.logger, "Exchange failed: {}", reason);

        let summary = Arc::new(self.summary(ExchangeOutcome::Failed(reason.clone())));
        for waiter in self.waiters.drain(..) {
            waiter.send(Err(AwaitExchangeError::Failed(reason.clone())));
        }
        summary
    }

    fn summary(&self, outcome: ExchangeOutcome) -> ExchangeSummary {
        let coordinator = match self.path {
            ExchangePath::Full => Some(self.coordinator.clone()),
            _ => None,
        };

        ExchangeSummary {
            exchange_id: self.id,
            result_version: self.result_version,
            trigger: self.trigger,
            coordinator,
            path: self.path,
            rebalanced: self.rebalanced,
            exchange_free_switch: self.exchange_free_switch,
            free_switch_rejection: self.free_switch_rejection.clone(),
            messages: self.counters,
            merged_versions: self.merged_versions.clone(),
            lost_partitions: self.lost.clone(),
            participant_errors: self.participant_errors.clone(),
            started_at: self.started_at,
            finished_at: Utc::now(),
            outcome,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::{DiscoveryEventKind, NodeSpec};
    use tokio::sync::oneshot;

    fn logger() -> slog::Logger {
        slog::Logger::root(slog::Discard, slog::o!())
    }

    fn event(major: u64) -> DiscoveryEvent {
        let node = NodeSpec::server("a").admit(1);
        DiscoveryEvent {
            version: TopologyVersion::new(major, 0),
            kind: DiscoveryEventKind::NodeJoined(node.clone()),
            topology: Arc::new(TopologySnapshot::new(vec![node], None, true)),
        }
    }

    #[test]
    fn phases_follow_the_exchange_order() {
        let mut fut = ExchangeFuture::new(&logger(), &event(1), NodeId::new("a"), ExchangePath::Full, None);

        assert!(fut.transition(ExchangePhase::Merging).is_err());
        fut.transition(ExchangePhase::CollectingSingle).unwrap();
        fut.transition(ExchangePhase::Merging).unwrap();
        assert!(fut.transition(ExchangePhase::BroadcastingFull).is_err());
        fut.transition(ExchangePhase::ComputingAffinity).unwrap();
        fut.transition(ExchangePhase::BroadcastingFull).unwrap();
        fut.transition(ExchangePhase::Done).unwrap();
        assert!(fut.transition(ExchangePhase::Failed).is_err());
    }

    #[test]
    fn merged_event_extends_accepted_range() {
        let mut fut = ExchangeFuture::new(&logger(), &event(3), NodeId::new("a"), ExchangePath::Full, None);
        assert!(!fut.accepts(ExchangeId::new(TopologyVersion::new(4, 0))));

        fut.merge_event(&event(4));
        assert_eq!(fut.result_version(), TopologyVersion::new(4, 0));
        assert!(fut.accepts(ExchangeId::new(TopologyVersion::new(3, 0))));
        assert!(fut.accepts(ExchangeId::new(TopologyVersion::new(4, 0))));
        assert!(!fut.accepts(ExchangeId::new(TopologyVersion::new(2, 0))));
    }

    #[tokio::test]
    async fn restart_supersedes_waiters_and_completion_releases_them() {
        let mut fut = ExchangeFuture::new(&logger(), &event(3), NodeId::new("a"), ExchangePath::Full, None);
        fut.transition(ExchangePhase::CollectingSingle).unwrap();

        let (tx, rx) = oneshot::channel();
        fut.add_waiter(Callback(tx));
        fut.merge_event(&event(4));
        fut.restart_collecting(NodeId::new("b")).unwrap();
        assert_eq!(
            rx.await.unwrap().unwrap_err(),
            AwaitExchangeError::Superseded {
                by: TopologyVersion::new(4, 0)
            }
        );

        let (tx, rx) = oneshot::channel();
        fut.add_waiter(Callback(tx));
        let summary = fut.complete();
        let received = rx.await.unwrap().unwrap();
        assert_eq!(received.result_version, summary.result_version);
        assert_eq!(received.merged_versions, vec![TopologyVersion::new(4, 0)]);
        assert_eq!(received.outcome, ExchangeOutcome::Completed);
    }
}
