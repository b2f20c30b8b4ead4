mod events;
mod features;
mod node;
mod version;

pub use events::BaselineTopology;
pub use events::DiscoveryEvent;
pub use events::DiscoveryEventKind;
pub use events::TopologySnapshot;
pub use features::nodes_lacking;
pub use features::Feature;
pub use features::FeatureSet;
pub use node::ClusterNode;
pub use node::ConsistentId;
pub use node::NodeId;
pub use node::NodeSpec;
pub use version::TopologyVersion;
pub use version::TopologyVersionClock;
pub use version::VersionBump;
