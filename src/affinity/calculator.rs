use crate::affinity::{AffinityAssignment, AffinityContext, AffinityFunction, RendezvousAffinity};
use crate::partition::{CacheGroupId, GroupPartitionMap, PartitionState};
use crate::topology::{ConsistentId, NodeId, TopologySnapshot, TopologyVersion};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Static configuration of one cache group.
#[derive(Clone, Debug)]
pub struct CacheGroupConfig {
    pub id: CacheGroupId,
    pub backups: usize,
    pub affinity: Arc<dyn AffinityFunction>,
}

impl CacheGroupConfig {
    pub fn new(name: &str, backups: usize) -> Self {
        CacheGroupConfig::with_affinity(name, backups, Arc::new(RendezvousAffinity::default()))
    }

    pub fn with_affinity(name: &str, backups: usize, affinity: Arc<dyn AffinityFunction>) -> Self {
        CacheGroupConfig {
            id: CacheGroupId::new(name),
            backups,
            affinity,
        }
    }

    pub fn partitions(&self) -> u32 {
        self.affinity.partitions()
    }
}

/// Candidate owners for `topology`. With a baseline, every baseline member is a candidate
/// (alive ones first, in join order) so that offline members keep their slots; without one,
/// the alive server nodes are.
pub(crate) fn candidates(topology: &TopologySnapshot) -> Vec<ConsistentId> {
    match topology.baseline() {
        Some(baseline) => {
            let mut candidates: Vec<ConsistentId> = topology
                .server_nodes()
                .filter(|node| baseline.contains(node.consistent_id()))
                .map(|node| node.consistent_id().clone())
                .collect();
            let offline: Vec<ConsistentId> = baseline
                .members()
                .filter(|member| topology.node_by_consistent_id(member).is_none())
                .cloned()
                .collect();
            candidates.extend(offline);
            candidates
        }
        None => topology
            .server_nodes()
            .map(|node| node.consistent_id().clone())
            .collect(),
    }
}

/// From-scratch assignment over `topology`, restricted to alive nodes.
pub(crate) fn ideal_assignment(
    group: &CacheGroupConfig,
    topology: &TopologySnapshot,
    version: TopologyVersion,
) -> AffinityAssignment {
    let candidates = candidates(topology);
    let raw = group.affinity.assign_partitions(&AffinityContext {
        group: &group.id,
        candidates: &candidates,
        backups: group.backups,
        version,
    });

    let owners = (0..group.partitions() as usize)
        .map(|partition| match raw.get(partition) {
            Some(ids) => {
                let mut alive: Vec<NodeId> = Vec::with_capacity(ids.len());
                for id in ids {
                    if let Some(node) = topology.node_by_consistent_id(id) {
                        if !alive.contains(node.id()) {
                            alive.push(node.id().clone());
                        }
                    }
                }
                alive
            }
            None => Vec::new(),
        })
        .collect();

    AffinityAssignment::new(version, owners)
}

/// Outcome of the affinity step for one cache group.
#[derive(Debug)]
pub(crate) struct GroupPlan {
    pub ideal: AffinityAssignment,
    pub actual: AffinityAssignment,
    pub states: GroupPartitionMap,
    pub rebalanced: bool,
    pub lost: Vec<u32>,
}

pub(crate) struct PlanInput<'a> {
    pub topology: &'a TopologySnapshot,
    pub merged: &'a GroupPartitionMap,
    pub previous: Option<&'a AffinityAssignment>,
    pub primary_claims: &'a BTreeMap<u32, NodeId>,
    pub version: TopologyVersion,
}

/// Computes the assignment a full exchange publishes. A partition whose ideal primary holds no
/// data yet keeps a data holder as primary; the ideal primary joins as a moving backup until
/// a late affinity assignment promotes it.
pub(crate) fn plan_group(group: &CacheGroupConfig, input: PlanInput<'_>) -> GroupPlan {
    let ideal = ideal_assignment(group, input.topology, input.version);
    let fresh = input.previous.is_none() && !input.merged.has_any_data();

    let mut owners = Vec::with_capacity(ideal.partitions() as usize);
    let mut states = GroupPartitionMap::new(ideal.partitions());
    let mut rebalanced = true;
    let mut lost = Vec::new();

    for partition in 0..ideal.partitions() {
        let ideal_owners = ideal.owners(partition).unwrap_or(&[]);
        let holders = input.merged.holders(partition);

        let actual: Vec<NodeId> = if holders.is_empty() {
            if !fresh {
                lost.push(partition);
            }
            for owner in ideal_owners {
                states.set(partition, owner.clone(), PartitionState::Owning);
            }
            ideal_owners.to_vec()
        } else {
            let primary = choose_primary(partition, ideal_owners, &holders, &input);
            let mut actual = vec![primary.clone()];
            actual.extend(ideal_owners.iter().filter(|owner| **owner != primary).cloned());
            for owner in actual.iter() {
                let state = if holders.contains(&owner) {
                    PartitionState::Owning
                } else {
                    PartitionState::Moving
                };
                states.set(partition, owner.clone(), state);
            }
            actual
        };

        if let Some(replicas) = input.merged.replicas(partition) {
            for (node, state) in replicas {
                if actual.contains(node) {
                    continue;
                }
                match state {
                    PartitionState::Owning | PartitionState::Moving | PartitionState::Renting => {
                        states.set(partition, node.clone(), PartitionState::Renting)
                    }
                    PartitionState::Evicted => {}
                }
            }
        }

        if actual.as_slice() != ideal_owners
            || actual
                .iter()
                .any(|owner| states.state(partition, owner) != Some(PartitionState::Owning))
        {
            rebalanced = false;
        }
        owners.push(actual);
    }

    GroupPlan {
        actual: AffinityAssignment::new(input.version, owners),
        ideal,
        states,
        rebalanced,
        lost,
    }
}

fn choose_primary(partition: u32, ideal_owners: &[NodeId], holders: &[&NodeId], input: &PlanInput<'_>) -> NodeId {
    if let Some(ideal_primary) = ideal_owners.first() {
        if holders.contains(&ideal_primary) {
            return ideal_primary.clone();
        }
    }
    if let Some(claimant) = input.primary_claims.get(&partition) {
        if holders.contains(&claimant) {
            return claimant.clone();
        }
    }
    if let Some(previous) = input.previous.and_then(|previous| previous.owners(partition)) {
        if let Some(owner) = previous.iter().find(|owner| holders.contains(owner)) {
            return owner.clone();
        }
    }

    // Oldest holder; holders are never empty here.
    let mut sorted: Vec<&NodeId> = holders.to_vec();
    sorted.sort_by_key(|node| input.topology.node(node).map(|n| n.order()).unwrap_or(u64::MAX));
    sorted[0].clone()
}

/// True when `actual` lists exactly the ideal owners and every one of them is OWNING.
pub(crate) fn is_rebalanced(ideal: &AffinityAssignment, actual: &AffinityAssignment, states: &GroupPartitionMap) -> bool {
    ideal.same_owners(actual)
        && (0..actual.partitions()).all(|partition| {
            actual
                .owners(partition)
                .unwrap_or(&[])
                .iter()
                .all(|owner| states.state(partition, owner) == Some(PartitionState::Owning))
        })
}

/// True once every ideal owner of every partition holds complete data.
pub(crate) fn ready_for_late_assignment(ideal: &AffinityAssignment, states: &GroupPartitionMap) -> bool {
    (0..ideal.partitions()).all(|partition| {
        ideal
            .owners(partition)
            .unwrap_or(&[])
            .iter()
            .all(|owner| states.state(partition, owner) == Some(PartitionState::Owning))
    })
}

/// Switches a group to its ideal assignment. Replicas outside the ideal lists start renting.
pub(crate) fn late_assignment(ideal: &AffinityAssignment, current: &GroupPartitionMap, version: TopologyVersion) -> GroupPlan {
    let actual = ideal.retag(version);
    let mut states = GroupPartitionMap::new(actual.partitions());

    for partition in 0..actual.partitions() {
        let owners = actual.owners(partition).unwrap_or(&[]);
        for owner in owners {
            states.set(partition, owner.clone(), PartitionState::Owning);
        }
        if let Some(replicas) = current.replicas(partition) {
            for (node, state) in replicas {
                if !owners.contains(node) && *state != PartitionState::Evicted {
                    states.set(partition, node.clone(), PartitionState::Renting);
                }
            }
        }
    }

    GroupPlan {
        ideal: ideal.retag(version),
        actual,
        states,
        rebalanced: true,
        lost: Vec::new(),
    }
}
