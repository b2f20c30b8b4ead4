// Modules stay private; the public API is the flat list of re-exports below.
mod actor;
mod affinity;
mod api;
mod discovery;
mod exchange;
mod partition;
mod topology;
mod transport;
mod txn;
mod grpc {
    include!("../generated/exchange.rs");
}

pub use affinity::AffinityAssignment;
pub use affinity::AffinityContext;
pub use affinity::AffinityFunction;
pub use affinity::AssignmentSet;
pub use affinity::CacheGroupConfig;
pub use affinity::RendezvousAffinity;
pub use api::try_create_grid_node;
pub use api::try_create_grpc_grid_node;
pub use api::AdminRequest;
pub use api::AdminResponse;
pub use api::ExchangeEvent;
pub use api::ExchangeEventListener;
pub use api::ExchangeOptions;
pub use api::GridNode;
pub use api::GridNodeConfig;
pub use api::GridNodeCreationError;
pub use api::NodeRequestError;
pub use discovery::ClusterMode;
pub use discovery::DiscoveryError;
pub use discovery::DiscoveryFeed;
pub use discovery::DiscoverySink;
pub use discovery::InMemoryDiscovery;
pub use exchange::AwaitExchangeError;
pub use exchange::ExchangeId;
pub use exchange::ExchangeMessage;
pub use exchange::ExchangeOutcome;
pub use exchange::ExchangePath;
pub use exchange::ExchangePhase;
pub use exchange::ExchangeSummary;
pub use exchange::FullAck;
pub use exchange::FullMessage;
pub use exchange::GroupFullState;
pub use exchange::IneligibleReason;
pub use exchange::MergeError;
pub use exchange::MessageCounters;
pub use exchange::MessageKind;
pub use exchange::PartitionsUpdate;
pub use exchange::PrimaryConflict;
pub use exchange::ReconcileError;
pub use exchange::SingleMessage;
pub use exchange::SingleRequest;
pub use exchange::SwitchDecision;
pub use partition::CacheGroupId;
pub use partition::GroupPartitionMap;
pub use partition::LocalPartition;
pub use partition::LocalPartitionStates;
pub use partition::PartitionFullMap;
pub use partition::PartitionKey;
pub use partition::PartitionSnapshot;
pub use partition::PartitionState;
pub use partition::PartitionStateReader;
pub use partition::StoreError;
pub use topology::nodes_lacking;
pub use topology::BaselineTopology;
pub use topology::ClusterNode;
pub use topology::ConsistentId;
pub use topology::DiscoveryEvent;
pub use topology::DiscoveryEventKind;
pub use topology::Feature;
pub use topology::FeatureSet;
pub use topology::NodeId;
pub use topology::NodeSpec;
pub use topology::TopologySnapshot;
pub use topology::TopologyVersion;
pub use topology::TopologyVersionClock;
pub use topology::VersionBump;
pub use transport::ExchangeTransport;
pub use transport::GrpcTransport;
pub use transport::InMemoryNetwork;
pub use transport::MessageInbox;
pub use transport::TransportError;
pub use txn::AbortReason;
pub use txn::CommitOutcome;
pub use txn::Enlistment;
pub use txn::GuardError;
pub use txn::LeaveReport;
pub use txn::PartitionReady;
pub use txn::TransactionContinuityGuard;
pub use txn::TxDecision;
pub use txn::TxError;
pub use txn::TxId;
