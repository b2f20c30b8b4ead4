use crate::discovery::DiscoverySink;
use crate::topology::{
    BaselineTopology, ClusterNode, ConsistentId, DiscoveryEvent, DiscoveryEventKind, NodeId, NodeSpec,
    TopologySnapshot, TopologyVersion, TopologyVersionClock,
};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ClusterMode {
    /// Active from the start, no baseline.
    InMemory,
    /// Inactive until `activate()`, which fixes the baseline to the servers present.
    Persistent,
}

/// Where discovery delivers the ordered event stream of one node.
#[derive(Clone)]
pub struct DiscoveryFeed {
    sender: mpsc::UnboundedSender<DiscoveryEvent>,
}

impl DiscoveryFeed {
    pub(crate) fn new(sender: mpsc::UnboundedSender<DiscoveryEvent>) -> Self {
        DiscoveryFeed { sender }
    }

    fn publish(&self, event: DiscoveryEvent) {
        let _ = self.sender.send(event);
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("Node {0} is already a member")]
    AlreadyMember(NodeId),
    #[error("Node {0} is not a member")]
    UnknownNode(NodeId),
}

struct DiscoveryState {
    clock: TopologyVersionClock,
    members: Vec<ClusterNode>,
    next_order: u64,
    baseline: Option<BaselineTopology>,
    active: bool,
    feeds: BTreeMap<NodeId, DiscoveryFeed>,
}

/// Single-process discovery service. Every event is versioned by one clock and delivered to
/// every member's feed in the same order, which is the guarantee the exchange protocol needs
/// from a real discovery layer.
pub struct InMemoryDiscovery {
    logger: slog::Logger,
    state: Mutex<DiscoveryState>,
}

impl InMemoryDiscovery {
    pub fn new(logger: slog::Logger, mode: ClusterMode) -> Arc<Self> {
        Arc::new(InMemoryDiscovery {
            logger: logger.new(slog::o!("Component" => "discovery")),
            state: Mutex::new(DiscoveryState {
                clock: TopologyVersionClock::new(),
                members: Vec::new(),
                next_order: 1,
                baseline: None,
                active: mode == ClusterMode::InMemory,
                feeds: BTreeMap::new(),
            }),
        })
    }

    /// Admits `spec`. The joiner's own feed receives the join event first.
    pub fn join(&self, spec: NodeSpec, feed: DiscoveryFeed) -> Result<ClusterNode, DiscoveryError> {
        let mut state = self.lock();
        if state.members.iter().any(|member| member.id() == &spec.id) {
            return Err(DiscoveryError::AlreadyMember(spec.id));
        }

        let node = spec.admit(state.next_order);
        state.next_order += 1;
        state.members.push(node.clone());
        state.feeds.insert(node.id().clone(), feed);
        self.emit(&mut state, DiscoveryEventKind::NodeJoined(node.clone()));

        Ok(node)
    }

    pub fn leave(&self, id: &NodeId) -> Result<TopologyVersion, DiscoveryError> {
        self.remove(id, DiscoveryEventKind::NodeLeft)
    }

    pub fn fail(&self, id: &NodeId) -> Result<TopologyVersion, DiscoveryError> {
        self.remove(id, DiscoveryEventKind::NodeFailed)
    }

    /// Activates the cluster. The first activation fixes the baseline to the current servers.
    pub fn activate(&self) -> TopologyVersion {
        let mut state = self.lock();
        if state.active {
            return state.clock.current();
        }

        state.active = true;
        if state.baseline.is_none() {
            let servers: Vec<ConsistentId> = state
                .members
                .iter()
                .filter(|node| node.is_server())
                .map(|node| node.consistent_id().clone())
                .collect();
            state.baseline = Some(BaselineTopology::new(servers));
        }
        self.emit(&mut state, DiscoveryEventKind::ActivationChanged { active: true })
    }

    pub fn deactivate(&self) -> TopologyVersion {
        let mut state = self.lock();
        if !state.active {
            return state.clock.current();
        }

        state.active = false;
        self.emit(&mut state, DiscoveryEventKind::ActivationChanged { active: false })
    }

    pub fn set_baseline<I: IntoIterator<Item = ConsistentId>>(&self, members: I) -> TopologyVersion {
        let mut state = self.lock();
        state.baseline = Some(BaselineTopology::new(members));
        self.emit(&mut state, DiscoveryEventKind::BaselineChanged)
    }

    pub fn current_version(&self) -> TopologyVersion {
        self.lock().clock.current()
    }

    pub fn topology(&self) -> TopologySnapshot {
        let state = self.lock();
        TopologySnapshot::new(state.members.clone(), state.baseline.clone(), state.active)
    }

    fn remove(
        &self,
        id: &NodeId,
        kind: fn(ClusterNode) -> DiscoveryEventKind,
    ) -> Result<TopologyVersion, DiscoveryError> {
        let mut state = self.lock();
        let position = state
            .members
            .iter()
            .position(|member| member.id() == id)
            .ok_or_else(|| DiscoveryError::UnknownNode(id.clone()))?;

        let node = state.members.remove(position);
        state.feeds.remove(id);
        Ok(self.emit(&mut state, kind(node)))
    }

    fn emit(&self, state: &mut DiscoveryState, kind: DiscoveryEventKind) -> TopologyVersion {
        let version = state.clock.tick(kind.version_bump());
        let topology = Arc::new(TopologySnapshot::new(
            state.members.clone(),
            state.baseline.clone(),
            state.active,
        ));
        slog::info!(
            self.logger,
            "{} at {} ({} members)",
            kind.name(),
            version,
            state.members.len()
        );

        let event = DiscoveryEvent {
            version,
            kind,
            topology,
        };
        for feed in state.feeds.values() {
            feed.publish(event.clone());
        }

        version
    }

    fn lock(&self) -> MutexGuard<'_, DiscoveryState> {
        self.state.lock().expect("InMemoryDiscovery mutex guard poison")
    }
}

#[async_trait::async_trait]
impl DiscoverySink for InMemoryDiscovery {
    async fn report_failed(&self, reporter: &NodeId, suspect: &NodeId) {
        slog::warn!(self.logger, "{} reports {} as failed", reporter, suspect);
        if let Err(e) = self.fail(suspect) {
            slog::debug!(self.logger, "Ignoring failure report from {}: {}", reporter, e);
        }
    }

    async fn request_affinity_change(&self, based_on: TopologyVersion) {
        let mut state = self.lock();
        if !state.active || state.clock.current() != based_on {
            slog::debug!(
                self.logger,
                "Ignoring affinity change based on {}, topology is at {}",
                based_on,
                state.clock.current()
            );
            return;
        }
        self.emit(&mut state, DiscoveryEventKind::AffinityChange);
    }

    async fn leave(&self, node: &NodeId) {
        if let Err(e) = InMemoryDiscovery::leave(self, node) {
            slog::debug!(self.logger, "Ignoring leave request: {}", e);
        }
    }
}
