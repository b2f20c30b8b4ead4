use crate::topology::NodeId;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct CacheGroupId(String);

impl CacheGroupId {
    pub fn new(name: impl Into<String>) -> Self {
        CacheGroupId(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheGroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct PartitionKey {
    pub group: CacheGroupId,
    pub partition: u32,
}

impl PartitionKey {
    pub fn new(group: CacheGroupId, partition: u32) -> Self {
        PartitionKey { group, partition }
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.group, self.partition)
    }
}

/// Lifecycle of one replica of one partition on one node.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum PartitionState {
    /// Holds complete, up-to-date data.
    Owning,
    /// Assigned, still receiving data.
    Moving,
    /// No longer assigned, data waits to be evicted.
    Renting,
    Evicted,
}

impl PartitionState {
    pub fn has_data(&self) -> bool {
        matches!(self, PartitionState::Owning)
    }
}

/// Replica states of every partition of one cache group, across all nodes.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct GroupPartitionMap {
    partitions: Vec<BTreeMap<NodeId, PartitionState>>,
}

impl GroupPartitionMap {
    pub fn new(partitions: u32) -> Self {
        GroupPartitionMap {
            partitions: vec![BTreeMap::new(); partitions as usize],
        }
    }

    pub fn from_replicas(partitions: Vec<BTreeMap<NodeId, PartitionState>>) -> Self {
        GroupPartitionMap { partitions }
    }

    pub fn partitions(&self) -> u32 {
        self.partitions.len() as u32
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &BTreeMap<NodeId, PartitionState>)> {
        self.partitions
            .iter()
            .enumerate()
            .map(|(partition, replicas)| (partition as u32, replicas))
    }

    pub fn replicas(&self, partition: u32) -> Option<&BTreeMap<NodeId, PartitionState>> {
        self.partitions.get(partition as usize)
    }

    pub fn state(&self, partition: u32, node: &NodeId) -> Option<PartitionState> {
        self.replicas(partition).and_then(|replicas| replicas.get(node).copied())
    }

    pub fn set(&mut self, partition: u32, node: NodeId, state: PartitionState) {
        if let Some(replicas) = self.partitions.get_mut(partition as usize) {
            replicas.insert(node, state);
        }
    }

    pub fn remove(&mut self, partition: u32, node: &NodeId) {
        if let Some(replicas) = self.partitions.get_mut(partition as usize) {
            replicas.remove(node);
        }
    }

    pub fn remove_node(&mut self, node: &NodeId) {
        for replicas in self.partitions.iter_mut() {
            replicas.remove(node);
        }
    }

    /// Nodes holding complete data for `partition`.
    pub fn holders(&self, partition: u32) -> Vec<&NodeId> {
        self.replicas(partition)
            .map(|replicas| {
                replicas
                    .iter()
                    .filter(|(_, state)| state.has_data())
                    .map(|(node, _)| node)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn has_any_data(&self) -> bool {
        self.partitions
            .iter()
            .any(|replicas| replicas.values().any(PartitionState::has_data))
    }

    pub fn local_partitions(&self, node: &NodeId) -> Vec<(u32, PartitionState)> {
        self.partitions
            .iter()
            .enumerate()
            .filter_map(|(partition, replicas)| replicas.get(node).map(|state| (partition as u32, *state)))
            .collect()
    }
}

pub type PartitionFullMap = BTreeMap<CacheGroupId, GroupPartitionMap>;

/// One replica reported by its holder.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct LocalPartition {
    pub partition: u32,
    pub state: PartitionState,
    /// Holder believes it is primary at its last applied version.
    pub primary: bool,
}

/// A node's own replicas, per group. Payload of single messages and partition updates.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct LocalPartitionStates {
    pub groups: BTreeMap<CacheGroupId, Vec<LocalPartition>>,
}

impl LocalPartitionStates {
    pub fn group(&self, group: &CacheGroupId) -> &[LocalPartition] {
        self.groups.get(group).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.groups.values().all(Vec::is_empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn holders_only_include_owning_replicas() {
        let mut map = GroupPartitionMap::new(2);
        map.set(0, NodeId::new("a"), PartitionState::Owning);
        map.set(0, NodeId::new("b"), PartitionState::Moving);
        map.set(1, NodeId::new("b"), PartitionState::Renting);

        assert_eq!(map.holders(0), vec![&NodeId::new("a")]);
        assert!(map.holders(1).is_empty());
        assert!(map.has_any_data());

        map.remove_node(&NodeId::new("a"));
        assert!(!map.has_any_data());
        assert_eq!(
            map.local_partitions(&NodeId::new("b")),
            vec![(0, PartitionState::Moving), (1, PartitionState::Renting)]
        );
    }

    #[test]
    fn out_of_range_partitions_are_ignored() {
        let mut map = GroupPartitionMap::new(1);
        map.set(7, NodeId::new("a"), PartitionState::Owning);
        assert_eq!(map.state(7, &NodeId::new("a")), None);
        assert!(!map.has_any_data());
    }
}
