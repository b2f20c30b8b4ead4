use crate::affinity::rendezvous::stable_hash;
use crate::partition::CacheGroupId;
use crate::topology::{NodeId, TopologyVersion};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Partition to owners mapping of one cache group. The first owner is the primary.
///
/// Never mutated after publication. Changing ownership means building a new assignment tagged
/// with the version that produced it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AffinityAssignment {
    version: TopologyVersion,
    owners: Vec<Vec<NodeId>>,
}

/// Assignments of all cache groups at one version.
pub type AssignmentSet = BTreeMap<CacheGroupId, Arc<AffinityAssignment>>;

impl AffinityAssignment {
    pub fn new(version: TopologyVersion, owners: Vec<Vec<NodeId>>) -> Self {
        AffinityAssignment { version, owners }
    }

    pub fn version(&self) -> TopologyVersion {
        self.version
    }

    pub fn partitions(&self) -> u32 {
        self.owners.len() as u32
    }

    pub fn owners(&self, partition: u32) -> Option<&[NodeId]> {
        self.owners.get(partition as usize).map(Vec::as_slice)
    }

    pub fn primary(&self, partition: u32) -> Option<&NodeId> {
        self.owners(partition).and_then(|owners| owners.first())
    }

    pub fn backups(&self, partition: u32) -> &[NodeId] {
        match self.owners(partition) {
            Some(owners) if !owners.is_empty() => &owners[1..],
            _ => &[],
        }
    }

    pub fn all_owners(&self) -> &[Vec<NodeId>] {
        &self.owners
    }

    /// Partitions for which `node` is primary.
    pub fn primary_partitions<'a>(&'a self, node: &'a NodeId) -> impl Iterator<Item = u32> + 'a {
        self.owners
            .iter()
            .enumerate()
            .filter(move |(_, owners)| owners.first() == Some(node))
            .map(|(partition, _)| partition as u32)
    }

    /// Same ownership, ignoring the version tag.
    pub fn same_owners(&self, other: &AffinityAssignment) -> bool {
        self.owners == other.owners
    }

    pub fn retag(&self, version: TopologyVersion) -> Self {
        AffinityAssignment {
            version,
            owners: self.owners.clone(),
        }
    }

    /// Drops `node` from every owner list, promoting the next backup wherever it was primary.
    pub fn without_node(&self, node: &NodeId, version: TopologyVersion) -> Self {
        let owners = self
            .owners
            .iter()
            .map(|owners| owners.iter().filter(|owner| *owner != node).cloned().collect())
            .collect();

        AffinityAssignment { version, owners }
    }

    /// Version-independent fingerprint of the ownership lists, compared across nodes.
    pub fn digest(&self) -> u64 {
        let mut bytes = Vec::new();
        for owners in self.owners.iter() {
            for owner in owners {
                bytes.extend_from_slice(owner.as_str().as_bytes());
                bytes.push(0);
            }
            bytes.push(0xff);
        }
        stable_hash(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assignment(owners: &[&[&str]]) -> AffinityAssignment {
        AffinityAssignment::new(
            TopologyVersion::new(1, 0),
            owners
                .iter()
                .map(|list| list.iter().map(|id| NodeId::new(*id)).collect())
                .collect(),
        )
    }

    #[test]
    fn without_node_promotes_next_backup() {
        let before = assignment(&[&["a", "b"], &["b", "c"], &["c", "a"]]);
        let after = before.without_node(&NodeId::new("b"), TopologyVersion::new(2, 0));

        assert_eq!(after.version(), TopologyVersion::new(2, 0));
        assert_eq!(after.primary(0), Some(&NodeId::new("a")));
        assert_eq!(after.primary(1), Some(&NodeId::new("c")));
        assert!(after.backups(1).is_empty());
        assert_eq!(after.backups(2), &[NodeId::new("a")]);
        assert_eq!(before.primary(1), Some(&NodeId::new("b")));
    }

    #[test]
    fn digest_ignores_version_but_not_order() {
        let a = assignment(&[&["a", "b"]]);
        let retagged = a.retag(TopologyVersion::new(9, 9));
        let swapped = assignment(&[&["b", "a"]]);

        assert_eq!(a.digest(), retagged.digest());
        assert!(a.same_owners(&retagged));
        assert_ne!(a.digest(), swapped.digest());
    }

    #[test]
    fn primary_partitions() {
        let a = assignment(&[&["a", "b"], &["b"], &["a"]]);
        let node = NodeId::new("a");
        assert_eq!(a.primary_partitions(&node).collect::<Vec<_>>(), vec![0, 2]);
    }
}
