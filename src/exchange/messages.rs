use crate::partition::{CacheGroupId, GroupPartitionMap, LocalPartitionStates, PartitionKey};
use crate::topology::{NodeId, TopologyVersion};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Identifies an exchange by the version of the event that started it.
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct ExchangeId(TopologyVersion);

impl ExchangeId {
    pub fn new(version: TopologyVersion) -> Self {
        ExchangeId(version)
    }

    pub fn version(&self) -> TopologyVersion {
        self.0
    }
}

impl fmt::Display for ExchangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "exchange@{}", self.0)
    }
}

/// A participant's report of what it holds, sent to the coordinator.
#[derive(Clone, Debug)]
pub struct SingleMessage {
    pub sender: NodeId,
    pub exchange_id: ExchangeId,
    pub partitions: LocalPartitionStates,
    pub errors: Vec<String>,
}

/// Outcome of a full exchange for one cache group.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GroupFullState {
    pub partitions: GroupPartitionMap,
    pub owners: Vec<Vec<NodeId>>,
    /// Digest of the ideal assignment the coordinator computed. Every node recomputes and compares.
    pub ideal_digest: u64,
}

/// The coordinator's authoritative result, broadcast to every participant.
#[derive(Clone, Debug)]
pub struct FullMessage {
    pub sender: NodeId,
    pub exchange_id: ExchangeId,
    /// Version the result applies to. Greater than the exchange id when later events were merged.
    pub result_version: TopologyVersion,
    pub groups: BTreeMap<CacheGroupId, GroupFullState>,
    pub rebalanced: bool,
    pub lost: Vec<PartitionKey>,
}

impl FullMessage {
    /// True if this result also completes the exchange started for `id`.
    pub fn covers(&self, id: ExchangeId) -> bool {
        self.exchange_id <= id && id.version() <= self.result_version
    }
}

#[derive(Clone, Debug)]
pub struct FullAck {
    pub sender: NodeId,
    pub exchange_id: ExchangeId,
}

/// Coordinator asks a participant to resend its single message.
#[derive(Clone, Debug)]
pub struct SingleRequest {
    pub sender: NodeId,
    pub exchange_id: ExchangeId,
}

/// Sent to the coordinator when local rebalancing changed partition states between exchanges.
#[derive(Clone, Debug)]
pub struct PartitionsUpdate {
    pub sender: NodeId,
    pub version: TopologyVersion,
    pub partitions: LocalPartitionStates,
}

#[derive(Clone, Debug)]
pub enum ExchangeMessage {
    Single(SingleMessage),
    Full(Arc<FullMessage>),
    FullAck(FullAck),
    SingleRequest(SingleRequest),
    PartitionsUpdate(PartitionsUpdate),
}

#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub enum MessageKind {
    Single,
    Full,
    FullAck,
    SingleRequest,
    PartitionsUpdate,
}

impl ExchangeMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            ExchangeMessage::Single(_) => MessageKind::Single,
            ExchangeMessage::Full(_) => MessageKind::Full,
            ExchangeMessage::FullAck(_) => MessageKind::FullAck,
            ExchangeMessage::SingleRequest(_) => MessageKind::SingleRequest,
            ExchangeMessage::PartitionsUpdate(_) => MessageKind::PartitionsUpdate,
        }
    }

    pub fn sender(&self) -> &NodeId {
        match self {
            ExchangeMessage::Single(m) => &m.sender,
            ExchangeMessage::Full(m) => &m.sender,
            ExchangeMessage::FullAck(m) => &m.sender,
            ExchangeMessage::SingleRequest(m) => &m.sender,
            ExchangeMessage::PartitionsUpdate(m) => &m.sender,
        }
    }
}
