use crate::exchange::ExchangeSummary;
use crate::partition::{CacheGroupId, GroupPartitionMap};
use crate::topology::{BaselineTopology, NodeId, TopologyVersion};
use std::sync::Arc;

/// Administrative queries, answered by the exchange worker in event order.
#[derive(Clone, Debug)]
pub enum AdminRequest {
    CurrentVersion,
    LastExchange,
    ExchangeHistory,
    Baseline,
    PartitionStates(CacheGroupId),
    /// Coordinator of the in-flight full exchange, or the node that would coordinate the next one.
    Coordinator,
}

#[derive(Clone, Debug)]
pub enum AdminResponse {
    CurrentVersion(TopologyVersion),
    LastExchange(Option<Arc<ExchangeSummary>>),
    ExchangeHistory(Vec<Arc<ExchangeSummary>>),
    Baseline(Option<BaselineTopology>),
    PartitionStates(Option<GroupPartitionMap>),
    Coordinator(Option<NodeId>),
}
