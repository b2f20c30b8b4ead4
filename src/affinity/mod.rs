mod assignment;
mod calculator;
mod function;
mod rendezvous;

pub use assignment::AffinityAssignment;
pub use assignment::AssignmentSet;
pub use calculator::CacheGroupConfig;
pub use function::AffinityContext;
pub use function::AffinityFunction;
pub use rendezvous::RendezvousAffinity;

pub(crate) use calculator::ideal_assignment;
pub(crate) use calculator::is_rebalanced;
pub(crate) use calculator::late_assignment;
pub(crate) use calculator::plan_group;
pub(crate) use calculator::ready_for_late_assignment;
pub(crate) use calculator::GroupPlan;
pub(crate) use calculator::PlanInput;
