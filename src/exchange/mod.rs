mod free_switch;
mod future;
mod history;
mod listener;
mod merge;
mod messages;
mod reconcile;
mod timers;
mod worker;

pub use free_switch::IneligibleReason;
pub use free_switch::SwitchDecision;
pub use future::AwaitExchangeError;
pub use future::ExchangeOutcome;
pub use future::ExchangePath;
pub use future::ExchangePhase;
pub use future::ExchangeSummary;
pub use future::MessageCounters;
pub use merge::MergeError;
pub use merge::PrimaryConflict;
pub use messages::ExchangeId;
pub use messages::ExchangeMessage;
pub use messages::FullAck;
pub use messages::FullMessage;
pub use messages::GroupFullState;
pub use messages::MessageKind;
pub use messages::PartitionsUpdate;
pub use messages::SingleMessage;
pub use messages::SingleRequest;
pub use reconcile::ReconcileError;

pub(crate) use listener::new as new_state_listener;
pub(crate) use listener::ExchangeStateListener;
pub(crate) use listener::ExchangeStateNotifier;
pub(crate) use listener::ExchangeStateSnapshot;
pub(crate) use timers::ExchangeTimerTick;
pub(crate) use worker::ExchangeWorker;
pub(crate) use worker::WorkerConfig;
pub(crate) use worker::WorkerContext;
