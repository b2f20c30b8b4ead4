use crate::affinity::CacheGroupConfig;
use crate::partition::{CacheGroupId, GroupPartitionMap, LocalPartitionStates, PartitionFullMap, PartitionKey, PartitionState};
use crate::topology::{NodeId, TopologySnapshot};
use std::collections::BTreeMap;

/// Two or more nodes claimed primary ownership of the same partition.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PrimaryConflict {
    pub key: PartitionKey,
    pub contenders: Vec<NodeId>,
    pub winner: NodeId,
}

#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    #[error("Partition {key} is claimed as primary by {contenders:?} and join order cannot separate them")]
    IrreconcilablePrimary {
        key: PartitionKey,
        contenders: Vec<NodeId>,
    },
}

/// Cluster-wide view assembled by the coordinator from every report.
#[derive(Debug, Default)]
pub(crate) struct MergedPartitions {
    pub partitions: PartitionFullMap,
    pub primary_claims: BTreeMap<CacheGroupId, BTreeMap<u32, NodeId>>,
    pub conflicts: Vec<PrimaryConflict>,
    pub errors: Vec<(NodeId, String)>,
}

pub(crate) fn merge_single_messages<'a, I>(
    groups: &[CacheGroupConfig],
    topology: &TopologySnapshot,
    reports: I,
) -> Result<MergedPartitions, MergeError>
where
    I: IntoIterator<Item = (&'a NodeId, &'a LocalPartitionStates)>,
{
    let mut merged = MergedPartitions::default();
    let mut claims: BTreeMap<PartitionKey, Vec<NodeId>> = BTreeMap::new();

    for group in groups {
        merged
            .partitions
            .insert(group.id.clone(), GroupPartitionMap::new(group.partitions()));
    }

    for (node, report) in reports {
        for (group_id, local) in report.groups.iter() {
            let map = match merged.partitions.get_mut(group_id) {
                Some(map) => map,
                None => {
                    merged
                        .errors
                        .push((node.clone(), format!("reported unknown cache group {}", group_id)));
                    continue;
                }
            };

            for replica in local {
                if replica.partition >= map.partitions() {
                    merged.errors.push((
                        node.clone(),
                        format!("reported partition {} beyond {} of {}", replica.partition, map.partitions(), group_id),
                    ));
                    continue;
                }
                if replica.state == PartitionState::Evicted {
                    continue;
                }

                map.set(replica.partition, node.clone(), replica.state);
                if replica.primary && replica.state.has_data() {
                    claims
                        .entry(PartitionKey::new(group_id.clone(), replica.partition))
                        .or_default()
                        .push(node.clone());
                }
            }
        }
    }

    for (key, contenders) in claims {
        let winner = resolve_claim(&key, &contenders, topology)?;
        if contenders.len() > 1 {
            merged.conflicts.push(PrimaryConflict {
                key: key.clone(),
                contenders: contenders.clone(),
                winner: winner.clone(),
            });
        }
        merged
            .primary_claims
            .entry(key.group)
            .or_default()
            .insert(key.partition, winner);
    }

    Ok(merged)
}

/// Oldest contender wins. Contenders unknown to the topology or sharing a join order cannot be ranked.
fn resolve_claim(key: &PartitionKey, contenders: &[NodeId], topology: &TopologySnapshot) -> Result<NodeId, MergeError> {
    if contenders.len() == 1 {
        return Ok(contenders[0].clone());
    }

    let mut ranked = Vec::with_capacity(contenders.len());
    for contender in contenders {
        match topology.node(contender) {
            Some(node) => ranked.push((node.order(), contender)),
            None => {
                return Err(MergeError::IrreconcilablePrimary {
                    key: key.clone(),
                    contenders: contenders.to_vec(),
                })
            }
        }
    }
    ranked.sort();

    if ranked.len() > 1 && ranked[0].0 == ranked[1].0 {
        return Err(MergeError::IrreconcilablePrimary {
            key: key.clone(),
            contenders: contenders.to_vec(),
        });
    }

    Ok(ranked[0].1.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::LocalPartition;
    use crate::topology::NodeSpec;

    fn topology() -> TopologySnapshot {
        TopologySnapshot::new(
            vec![NodeSpec::server("old").admit(1), NodeSpec::server("young").admit(2)],
            None,
            true,
        )
    }

    fn report(group: &str, partitions: &[(u32, PartitionState, bool)]) -> LocalPartitionStates {
        let mut states = LocalPartitionStates::default();
        states.groups.insert(
            CacheGroupId::new(group),
            partitions
                .iter()
                .map(|(partition, state, primary)| LocalPartition {
                    partition: *partition,
                    state: *state,
                    primary: *primary,
                })
                .collect(),
        );
        states
    }

    #[test]
    fn oldest_claimant_wins_conflict() {
        let groups = vec![CacheGroupConfig::new("cache", 1)];
        let old = NodeId::new("old");
        let young = NodeId::new("young");
        let old_report = report("cache", &[(0, PartitionState::Owning, true)]);
        let young_report = report(
            "cache",
            &[(0, PartitionState::Owning, true), (1, PartitionState::Moving, false)],
        );

        let merged =
            merge_single_messages(&groups, &topology(), vec![(&young, &young_report), (&old, &old_report)]).unwrap();

        let group = CacheGroupId::new("cache");
        assert_eq!(merged.primary_claims[&group][&0], old);
        assert_eq!(merged.conflicts.len(), 1);
        assert_eq!(merged.conflicts[0].winner, old);
        assert_eq!(merged.partitions[&group].state(1, &young), Some(PartitionState::Moving));
    }

    #[test]
    fn unknown_claimant_is_irreconcilable() {
        let groups = vec![CacheGroupConfig::new("cache", 1)];
        let old = NodeId::new("old");
        let ghost = NodeId::new("ghost");
        let claim = report("cache", &[(3, PartitionState::Owning, true)]);

        let result = merge_single_messages(&groups, &topology(), vec![(&old, &claim), (&ghost, &claim)]);
        assert!(matches!(result, Err(MergeError::IrreconcilablePrimary { .. })));
    }

    #[test]
    fn unknown_groups_are_reported_not_merged() {
        let groups = vec![CacheGroupConfig::new("cache", 1)];
        let old = NodeId::new("old");
        let stray = report("other", &[(0, PartitionState::Owning, false)]);

        let merged = merge_single_messages(&groups, &topology(), vec![(&old, &stray)]).unwrap();
        assert_eq!(merged.errors.len(), 1);
        assert!(!merged.partitions[&CacheGroupId::new("cache")].has_any_data());
    }
}
