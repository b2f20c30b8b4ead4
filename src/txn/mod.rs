mod guard;
mod types;

pub use guard::TransactionContinuityGuard;
pub use types::AbortReason;
pub use types::CommitOutcome;
pub use types::Enlistment;
pub use types::GuardError;
pub use types::LeaveReport;
pub use types::PartitionReady;
pub use types::TxDecision;
pub use types::TxError;
pub use types::TxId;
