use crate::affinity::{is_rebalanced, AssignmentSet};
use crate::partition::{PartitionFullMap, PartitionKey, PartitionSnapshot};
use crate::topology::{nodes_lacking, BaselineTopology, DiscoveryEvent, Feature, NodeId, TopologyVersion};
use std::sync::Arc;

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SwitchDecision {
    Eligible,
    Ineligible(IneligibleReason),
}

/// Why a departure has to go through a full exchange.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum IneligibleReason {
    #[error("event is not a server node departure")]
    NotServerDeparture,
    #[error("cluster is not active")]
    ClusterInactive,
    #[error("no baseline topology is set")]
    NoBaseline,
    #[error("baseline topology changed with this event")]
    BaselineChanged,
    #[error("no exchange has completed on this node yet")]
    NoPriorExchange,
    #[error("last exchange is not rebalanced")]
    NotRebalanced,
    #[error("nodes without exchange-free switch support: {0:?}")]
    UnsupportedNodes(Vec<NodeId>),
}

pub(crate) struct SwitchContext<'a> {
    pub event: &'a DiscoveryEvent,
    /// Baseline in effect before the event.
    pub previous_baseline: Option<&'a BaselineTopology>,
    pub last_exchange: &'a PartitionSnapshot,
}

pub(crate) fn evaluate(context: &SwitchContext<'_>) -> SwitchDecision {
    match check(context) {
        Ok(()) => SwitchDecision::Eligible,
        Err(reason) => SwitchDecision::Ineligible(reason),
    }
}

fn check(context: &SwitchContext<'_>) -> Result<(), IneligibleReason> {
    let event = context.event;
    match event.kind.departed_node() {
        Some(node) if node.is_server() => {}
        _ => return Err(IneligibleReason::NotServerDeparture),
    }

    let topology = &event.topology;
    if !topology.is_active() {
        return Err(IneligibleReason::ClusterInactive);
    }

    let baseline = topology.baseline().ok_or(IneligibleReason::NoBaseline)?;
    if context.previous_baseline != Some(baseline) {
        return Err(IneligibleReason::BaselineChanged);
    }

    if context.last_exchange.version() == TopologyVersion::ZERO {
        return Err(IneligibleReason::NoPriorExchange);
    }
    if !context.last_exchange.is_rebalanced() {
        return Err(IneligibleReason::NotRebalanced);
    }

    let lacking = nodes_lacking(topology.server_nodes(), Feature::ExchangeFreeSwitch);
    if !lacking.is_empty() {
        return Err(IneligibleReason::UnsupportedNodes(
            lacking.into_iter().map(|node| node.id().clone()).collect(),
        ));
    }

    Ok(())
}

/// Result of dropping a departed node from the last rebalanced assignment.
#[derive(Debug)]
pub(crate) struct SwitchOutcome {
    pub snapshot: PartitionSnapshot,
    /// Partitions whose primary departed, with the backup that took over.
    pub promoted: Vec<(PartitionKey, NodeId)>,
    /// Partitions the departed node held alone.
    pub lost: Vec<PartitionKey>,
}

pub(crate) fn apply(current: &PartitionSnapshot, departed: &NodeId, version: TopologyVersion) -> SwitchOutcome {
    let mut assignments = AssignmentSet::new();
    let mut ideal = AssignmentSet::new();
    let mut partitions: PartitionFullMap = current.partitions().clone();
    let mut promoted = Vec::new();
    let mut lost = Vec::new();

    for (group, assignment) in current.assignments().iter() {
        let next = assignment.without_node(departed, version);
        for partition in 0..assignment.partitions() {
            if assignment.primary(partition) != Some(departed) {
                continue;
            }
            let key = PartitionKey::new(group.clone(), partition);
            match next.primary(partition) {
                Some(successor) => promoted.push((key, successor.clone())),
                None => lost.push(key),
            }
        }
        assignments.insert(group.clone(), Arc::new(next));
    }

    for (group, assignment) in current.ideal_assignments().iter() {
        ideal.insert(group.clone(), Arc::new(assignment.without_node(departed, version)));
    }

    for map in partitions.values_mut() {
        map.remove_node(departed);
    }

    let rebalanced = assignments.iter().all(|(group, actual)| match (ideal.get(group), partitions.get(group)) {
        (Some(ideal), Some(states)) => is_rebalanced(ideal, actual, states),
        _ => false,
    });

    SwitchOutcome {
        snapshot: PartitionSnapshot::new(version, assignments, ideal, partitions, rebalanced),
        promoted,
        lost,
    }
}
