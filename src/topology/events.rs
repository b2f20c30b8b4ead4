use crate::topology::version::VersionBump;
use crate::topology::{ClusterNode, ConsistentId, NodeId, TopologyVersion};
use std::collections::BTreeSet;
use std::sync::Arc;

/// The set of nodes eligible to hold persistent partitions.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct BaselineTopology {
    members: BTreeSet<ConsistentId>,
}

impl BaselineTopology {
    pub fn new<I: IntoIterator<Item = ConsistentId>>(members: I) -> Self {
        BaselineTopology {
            members: members.into_iter().collect(),
        }
    }

    pub fn contains(&self, consistent_id: &ConsistentId) -> bool {
        self.members.contains(consistent_id)
    }

    pub fn members(&self) -> impl Iterator<Item = &ConsistentId> {
        self.members.iter()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Cluster state right after a discovery event was applied.
#[derive(Clone, Debug)]
pub struct TopologySnapshot {
    members: Vec<ClusterNode>,
    baseline: Option<BaselineTopology>,
    active: bool,
}

impl TopologySnapshot {
    pub fn new(mut members: Vec<ClusterNode>, baseline: Option<BaselineTopology>, active: bool) -> Self {
        members.sort_by_key(|node| node.order());
        TopologySnapshot {
            members,
            baseline,
            active,
        }
    }

    /// All members, oldest first.
    pub fn members(&self) -> &[ClusterNode] {
        &self.members
    }

    pub fn server_nodes(&self) -> impl Iterator<Item = &ClusterNode> {
        self.members.iter().filter(|node| node.is_server())
    }

    pub fn node(&self, id: &NodeId) -> Option<&ClusterNode> {
        self.members.iter().find(|node| node.id() == id)
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.node(id).is_some()
    }

    pub fn node_by_consistent_id(&self, consistent_id: &ConsistentId) -> Option<&ClusterNode> {
        self.members
            .iter()
            .find(|node| node.is_server() && node.consistent_id() == consistent_id)
    }

    /// The exchange coordinator: the oldest surviving server node.
    pub fn oldest_server(&self) -> Option<&ClusterNode> {
        self.server_nodes().next()
    }

    pub fn baseline(&self) -> Option<&BaselineTopology> {
        self.baseline.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }
}

#[derive(Clone, Debug)]
pub enum DiscoveryEventKind {
    NodeJoined(ClusterNode),
    NodeLeft(ClusterNode),
    NodeFailed(ClusterNode),
    BaselineChanged,
    ActivationChanged { active: bool },
    /// Custom event requested by the coordinator once every ideal owner caught up.
    AffinityChange,
}

impl DiscoveryEventKind {
    pub fn departed_node(&self) -> Option<&ClusterNode> {
        match self {
            DiscoveryEventKind::NodeLeft(node) | DiscoveryEventKind::NodeFailed(node) => Some(node),
            _ => None,
        }
    }

    pub fn joined_node(&self) -> Option<&ClusterNode> {
        match self {
            DiscoveryEventKind::NodeJoined(node) => Some(node),
            _ => None,
        }
    }

    pub fn version_bump(&self) -> VersionBump {
        match self {
            DiscoveryEventKind::NodeJoined(_) | DiscoveryEventKind::NodeLeft(_) | DiscoveryEventKind::NodeFailed(_) => {
                VersionBump::Major
            }
            DiscoveryEventKind::BaselineChanged
            | DiscoveryEventKind::ActivationChanged { .. }
            | DiscoveryEventKind::AffinityChange => VersionBump::Minor,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DiscoveryEventKind::NodeJoined(_) => "NodeJoined",
            DiscoveryEventKind::NodeLeft(_) => "NodeLeft",
            DiscoveryEventKind::NodeFailed(_) => "NodeFailed",
            DiscoveryEventKind::BaselineChanged => "BaselineChanged",
            DiscoveryEventKind::ActivationChanged { .. } => "ActivationChanged",
            DiscoveryEventKind::AffinityChange => "AffinityChange",
        }
    }
}

/// One entry of the ordered discovery feed.
#[derive(Clone, Debug)]
pub struct DiscoveryEvent {
    pub version: TopologyVersion,
    pub kind: DiscoveryEventKind,
    pub topology: Arc<TopologySnapshot>,
}
