use crate::topology::{Feature, FeatureSet};
use std::fmt;
use std::net::SocketAddr;

/// Runtime identity of a node. Used for messaging and in ownership lists.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        NodeId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity that survives restarts. Baseline membership and affinity hashing use it.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct ConsistentId(String);

impl ConsistentId {
    pub fn new(id: impl Into<String>) -> Self {
        ConsistentId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConsistentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What a node declares about itself before discovery admits it.
#[derive(Clone, Debug)]
pub struct NodeSpec {
    pub id: NodeId,
    pub consistent_id: ConsistentId,
    pub is_client: bool,
    pub features: FeatureSet,
    pub address: Option<SocketAddr>,
}

impl NodeSpec {
    pub fn server(id: &str) -> Self {
        NodeSpec {
            id: NodeId::new(id),
            consistent_id: ConsistentId::new(id),
            is_client: false,
            features: FeatureSet::current(),
            address: None,
        }
    }

    pub fn client(id: &str) -> Self {
        NodeSpec {
            is_client: true,
            ..NodeSpec::server(id)
        }
    }

    /// Administrative opt-out: the node stops advertising exchange-free switch support, which
    /// sends every server departure through a full exchange.
    pub fn exchange_free_switch_disabled(mut self) -> Self {
        self.features = self.features.without(Feature::ExchangeFreeSwitch);
        self
    }

    pub fn with_address(mut self, address: SocketAddr) -> Self {
        self.address = Some(address);
        self
    }

    pub(crate) fn admit(self, order: u64) -> ClusterNode {
        ClusterNode {
            id: self.id,
            consistent_id: self.consistent_id,
            is_client: self.is_client,
            features: self.features,
            order,
            address: self.address,
        }
    }
}

/// A member of the cluster as seen by discovery. Immutable once admitted.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClusterNode {
    id: NodeId,
    consistent_id: ConsistentId,
    is_client: bool,
    features: FeatureSet,
    order: u64,
    address: Option<SocketAddr>,
}

impl ClusterNode {
    pub fn id(&self) -> &NodeId {
        &self.id
    }

    pub fn consistent_id(&self) -> &ConsistentId {
        &self.consistent_id
    }

    pub fn is_client(&self) -> bool {
        self.is_client
    }

    pub fn is_server(&self) -> bool {
        !self.is_client
    }

    pub fn features(&self) -> FeatureSet {
        self.features
    }

    /// Join order. Lower is older.
    pub fn order(&self) -> u64 {
        self.order
    }

    pub fn address(&self) -> Option<SocketAddr> {
        self.address
    }
}
