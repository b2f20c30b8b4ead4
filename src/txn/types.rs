use crate::partition::{CacheGroupId, PartitionKey};
use crate::topology::{NodeId, TopologyVersion};
use std::fmt;

#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct TxId(u64);

impl TxId {
    pub(crate) fn new(id: u64) -> Self {
        TxId(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tx-{}", self.0)
    }
}

/// A partition a transaction writes to, with the replicas it must reach at commit.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Enlistment {
    pub key: PartitionKey,
    pub primary: NodeId,
    pub backups: Vec<NodeId>,
    /// Version of the assignment the enlistment was taken from.
    pub version: TopologyVersion,
}

/// The partition is served by a live primary at `version`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PartitionReady {
    pub key: PartitionKey,
    pub primary: NodeId,
    pub backups: Vec<NodeId>,
    pub version: TopologyVersion,
}

#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum AbortReason {
    #[error("primary {node} of {key} left at {version}")]
    PrimaryLeft {
        node: NodeId,
        key: PartitionKey,
        version: TopologyVersion,
    },
    #[error("local node halted")]
    NodeHalted,
}

/// What happens to one in-flight transaction when a node leaves.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TxDecision {
    Continue { dropped_backups: Vec<PartitionKey> },
    Abort(AbortReason),
}

#[derive(Clone, Debug, Default)]
pub struct LeaveReport {
    /// Partitions whose primary departed, blocked until a new primary is installed.
    pub blocked: Vec<PartitionKey>,
    pub decisions: Vec<(TxId, TxDecision)>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommitOutcome {
    pub tx: TxId,
    pub enlistments: Vec<Enlistment>,
}

#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum GuardError {
    #[error("Partition {0} has no surviving owner")]
    PartitionLost(PartitionKey),
    #[error("Partition {0} is not assigned at the current version")]
    NotAssigned(PartitionKey),
    #[error("Local node halted")]
    NodeHalted,
}

#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum TxError {
    /// Recoverable: the caller should run the transaction again.
    #[error("Transaction {tx} rolled back: {reason}")]
    RolledBack {
        tx: TxId,
        reason: AbortReason,
        retryable: bool,
    },
    #[error("Unknown transaction {0}")]
    UnknownTransaction(TxId),
    #[error("Unknown cache group {0}")]
    UnknownCacheGroup(CacheGroupId),
    #[error(transparent)]
    Partition(#[from] GuardError),
}
