mod in_memory;

pub use in_memory::ClusterMode;
pub use in_memory::DiscoveryError;
pub use in_memory::DiscoveryFeed;
pub use in_memory::InMemoryDiscovery;

use crate::topology::{NodeId, TopologyVersion};

/// Requests the exchange worker makes of the discovery layer. Every call results, at most, in a
/// new event on the ordered discovery feed.
#[async_trait::async_trait]
pub trait DiscoverySink: Send + Sync {
    /// `suspect` stopped answering exchange messages after every retry.
    async fn report_failed(&self, reporter: &NodeId, suspect: &NodeId);

    /// Every ideal owner caught up at `based_on`. Ignored if the topology moved since.
    async fn request_affinity_change(&self, based_on: TopologyVersion);

    /// `node` cannot continue and removes itself from the cluster.
    async fn leave(&self, node: &NodeId);
}
