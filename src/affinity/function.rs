use crate::partition::CacheGroupId;
use crate::topology::{ConsistentId, TopologyVersion};
use std::fmt::Debug;

/// Input of an affinity calculation. Candidates are identified by consistent id so the same
/// physical node keeps its partitions across restarts.
#[derive(Debug)]
pub struct AffinityContext<'a> {
    pub group: &'a CacheGroupId,
    /// Candidate owners. Alive nodes come first in join order.
    pub candidates: &'a [ConsistentId],
    pub backups: usize,
    pub version: TopologyVersion,
}

/// Maps keys to partitions and partitions to ordered owner lists (primary first).
///
/// Implementations must be deterministic: every node calls them independently and the results
/// are compared across the cluster.
pub trait AffinityFunction: Debug + Send + Sync {
    fn partitions(&self) -> u32;

    fn partition(&self, key: &[u8]) -> u32;

    /// Returns exactly `partitions()` lists of at most `backups + 1` candidates each.
    fn assign_partitions(&self, context: &AffinityContext<'_>) -> Vec<Vec<ConsistentId>>;
}
