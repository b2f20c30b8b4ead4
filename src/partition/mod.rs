mod state;
mod store;

pub use state::CacheGroupId;
pub use state::GroupPartitionMap;
pub use state::LocalPartition;
pub use state::LocalPartitionStates;
pub use state::PartitionFullMap;
pub use state::PartitionKey;
pub use state::PartitionState;
pub use store::PartitionSnapshot;
pub use store::PartitionStateReader;
pub use store::StoreError;

pub(crate) use store::new as new_store;
pub(crate) use store::PartitionStateWriter;
