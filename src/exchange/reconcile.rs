use crate::affinity::{ideal_assignment, AffinityAssignment, AssignmentSet, CacheGroupConfig};
use crate::exchange::messages::FullMessage;
use crate::partition::{CacheGroupId, PartitionFullMap, PartitionKey, PartitionSnapshot, PartitionState};
use crate::topology::{NodeId, TopologySnapshot};
use std::sync::Arc;

/// The local node cannot accept a full message. Always fatal for the node.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("Cache group {0} is configured locally but missing from the full message")]
    MissingGroup(CacheGroupId),
    #[error("Cache group {group} has {local} partitions locally but {remote} in the full message")]
    PartitionCountMismatch {
        group: CacheGroupId,
        local: u32,
        remote: u32,
    },
    #[error("Ideal assignment of {group} disagrees with the coordinator (local {local:x}, remote {remote:x})")]
    IdealDigestMismatch {
        group: CacheGroupId,
        local: u64,
        remote: u64,
    },
    #[error("Full message makes this node own {key} but its replica is {state:?}")]
    MissingOwnedData { key: PartitionKey, state: PartitionState },
}

/// Validates `full` against local configuration and state, and builds the snapshot to commit.
pub(crate) fn reconcile_full(
    local: &NodeId,
    groups: &[CacheGroupConfig],
    topology: &TopologySnapshot,
    current: &PartitionSnapshot,
    full: &FullMessage,
) -> Result<PartitionSnapshot, ReconcileError> {
    let version = full.result_version;
    let mut assignments = AssignmentSet::new();
    let mut ideal = AssignmentSet::new();
    let mut partitions = PartitionFullMap::new();

    for group in groups {
        let remote = full
            .groups
            .get(&group.id)
            .ok_or_else(|| ReconcileError::MissingGroup(group.id.clone()))?;

        let local_count = group.partitions();
        let remote_count = remote.owners.len() as u32;
        if local_count != remote_count || remote.partitions.partitions() != local_count {
            return Err(ReconcileError::PartitionCountMismatch {
                group: group.id.clone(),
                local: local_count,
                remote: remote_count,
            });
        }

        let local_ideal = ideal_assignment(group, topology, version);
        let digest = local_ideal.digest();
        if digest != remote.ideal_digest {
            return Err(ReconcileError::IdealDigestMismatch {
                group: group.id.clone(),
                local: digest,
                remote: remote.ideal_digest,
            });
        }

        for (partition, replicas) in remote.partitions.iter() {
            if replicas.get(local) != Some(&PartitionState::Owning) {
                continue;
            }
            let key = PartitionKey::new(group.id.clone(), partition);
            if full.lost.contains(&key) {
                continue;
            }
            match current.state(&key, local) {
                Some(state @ PartitionState::Renting) | Some(state @ PartitionState::Evicted) => {
                    return Err(ReconcileError::MissingOwnedData { key, state });
                }
                _ => {}
            }
        }

        assignments.insert(
            group.id.clone(),
            Arc::new(AffinityAssignment::new(version, remote.owners.clone())),
        );
        ideal.insert(group.id.clone(), Arc::new(local_ideal));
        partitions.insert(group.id.clone(), remote.partitions.clone());
    }

    Ok(PartitionSnapshot::new(
        version,
        assignments,
        ideal,
        partitions,
        full.rebalanced,
    ))
}
